// MIT License - Copyright (c) 2026 Peter Wright
// TCP link to a networked Keybus decoder

use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::panel::PanelState;
use crate::protocol::{key_line, KeybusLine};
use crate::transport::Keybus;

/// Lines buffered between the socket reader task and the bridge task.
const LINE_CAPACITY: usize = 256;

struct Link {
    lines: mpsc::Receiver<String>,
    writer: OwnedWriteHalf,
    reader_handle: tokio::task::JoinHandle<()>,
}

impl Drop for Link {
    fn drop(&mut self) {
        self.reader_handle.abort();
    }
}

/// [`Keybus`] fed by a decoder reachable over TCP.
///
/// A reader task splits the socket into lines and hands them over an mpsc
/// channel; only [`Keybus::process`] folds them into the snapshot, so the
/// snapshot never leaves the bridge task. A dropped link is re-established
/// from `process` after `keybus_reconnect_delay_ms`.
pub struct TcpKeybus {
    addr: String,
    step: Duration,
    reconnect_delay: Duration,
    state: PanelState,
    link: Option<Link>,
    last_connect_attempt: Option<Instant>,
}

impl TcpKeybus {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            addr: format!("{}:{}", config.keybus_host, config.keybus_port),
            step: Duration::from_millis(config.keybus_step_ms),
            reconnect_delay: Duration::from_millis(config.keybus_reconnect_delay_ms),
            state: PanelState::new(),
            link: None,
            last_connect_attempt: None,
        }
    }

    /// Whether the decoder link is up.
    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    async fn connect(&mut self) -> Result<()> {
        info!("Connecting to keybus decoder at {}", self.addr);
        self.last_connect_attempt = Some(Instant::now());

        let stream = TcpStream::connect(&self.addr).await.map_err(|e| {
            error!("TCP connect failed: {}", e);
            BridgeError::Io(e)
        })?;
        stream.set_nodelay(true)?;

        let (reader, writer) = stream.into_split();
        let (tx, rx) = mpsc::channel(LINE_CAPACITY);
        let reader_handle = spawn_reader_task(reader, tx);

        // The decoder re-announces readiness on connect.
        self.state.write_ready = false;
        self.link = Some(Link {
            lines: rx,
            writer,
            reader_handle,
        });
        info!("Keybus decoder connected");
        Ok(())
    }

    async fn reconnect_if_due(&mut self) {
        let due = self
            .last_connect_attempt
            .is_none_or(|at| at.elapsed() >= self.reconnect_delay);
        if !due {
            sleep(self.step).await;
            return;
        }
        if let Err(e) = self.connect().await {
            warn!(
                "Keybus reconnection failed: {}. Retrying in {:.1}s...",
                e,
                self.reconnect_delay.as_secs_f64()
            );
        }
    }

    fn drop_link(&mut self) {
        self.link = None;
        self.state.write_ready = false;
        self.last_connect_attempt = Some(Instant::now());
    }
}

impl Keybus for TcpKeybus {
    async fn begin(&mut self) -> Result<()> {
        self.connect().await
    }

    async fn process(&mut self) -> bool {
        let Some(link) = self.link.as_mut() else {
            self.reconnect_if_due().await;
            return false;
        };

        let received = timeout(self.step, link.lines.recv()).await;
        match received {
            Err(_) => false,
            Ok(None) => {
                warn!("Keybus decoder link closed");
                self.drop_link();
                false
            }
            Ok(Some(line)) => match KeybusLine::parse(&line) {
                Some(decoded) => {
                    self.state.apply(&decoded);
                    true
                }
                None => {
                    debug!("Ignoring unrecognised keybus line: {:?}", line);
                    false
                }
            },
        }
    }

    fn state(&self) -> &PanelState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut PanelState {
        &mut self.state
    }

    async fn write(&mut self, keys: &str) -> Result<()> {
        let link = self.link.as_mut().ok_or(BridgeError::Disconnected)?;
        let written = link.writer.write_all(key_line(keys).as_bytes()).await;
        if let Err(e) = written {
            error!("Keybus write failed: {}", e);
            self.drop_link();
            return Err(BridgeError::Io(e));
        }
        // Consumed until the decoder reports the channel free again.
        self.state.write_ready = false;
        Ok(())
    }
}

/// Spawn the reader task that turns the socket into a stream of lines.
/// The channel closes when the socket does.
fn spawn_reader_task(reader: OwnedReadHalf, tx: mpsc::Sender<String>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).await.is_err() {
                        debug!("Reader: bridge side dropped");
                        break;
                    }
                }
                Ok(None) => {
                    debug!("Reader: connection closed");
                    break;
                }
                Err(e) => {
                    error!("Reader: read error: {}", e);
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    async fn decoder_pair() -> (TcpKeybus, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let config = BridgeConfig::builder()
            .keybus_host("127.0.0.1")
            .keybus_port(port)
            .keybus_step_ms(50)
            .build();
        let mut bus = TcpKeybus::new(&config);
        let (accepted, begun) = tokio::join!(listener.accept(), bus.begin());
        begun.unwrap();
        (bus, accepted.unwrap().0)
    }

    async fn process_until_decoded(bus: &mut TcpKeybus) -> bool {
        for _ in 0..40 {
            if bus.process().await {
                return true;
            }
        }
        false
    }

    #[tokio::test]
    async fn test_lines_update_snapshot() {
        let (mut bus, mut decoder) = decoder_pair().await;
        decoder.write_all(b"PSTT1=AW-----\nZSTT1=03\n").await.unwrap();

        assert!(process_until_decoded(&mut bus).await);
        assert!(bus.state().partitions[0].armed_away);
        assert!(bus.state().status_changed);

        assert!(process_until_decoded(&mut bus).await);
        assert!(bus.state().zones.is_open(1));
        assert!(bus.state().zones.is_open(2));
    }

    #[tokio::test]
    async fn test_garbage_line_is_not_a_unit() {
        let (mut bus, mut decoder) = decoder_pair().await;
        decoder.write_all(b"NOISE\nWRDY=1\n").await.unwrap();

        assert!(process_until_decoded(&mut bus).await);
        assert!(bus.write_ready());
        assert!(!bus.state().status_changed);
    }

    #[tokio::test]
    async fn test_write_sends_key_line_and_consumes_readiness() {
        let (mut bus, mut decoder) = decoder_pair().await;
        decoder.write_all(b"WRDY=1\n").await.unwrap();
        assert!(process_until_decoded(&mut bus).await);

        bus.write("s").await.unwrap();
        assert!(!bus.write_ready());

        let mut buf = [0u8; 6];
        decoder.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"KEY=s\n");
    }

    #[tokio::test]
    async fn test_closed_link_is_dropped() {
        let (mut bus, decoder) = decoder_pair().await;
        drop(decoder);

        for _ in 0..40 {
            bus.process().await;
            if !bus.is_connected() {
                break;
            }
        }
        assert!(!bus.is_connected());
        assert!(matches!(bus.write("w").await, Err(BridgeError::Disconnected)));
    }
}
