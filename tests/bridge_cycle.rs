// End-to-end bridge cycle tests
//
// These drive a Bridge with an in-memory keybus fed decoder lines and an
// in-memory broker, and check what reaches the topics and the keypad.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use keybus_bridge::protocol::KeybusLine;
use keybus_bridge::{
    Bridge, BridgeConfig, BridgeEvent, Broker, ConnectionState, InboundMessage, Keybus,
    PanelState, Publish, PublishPolicy, RemoteCommand, Result, StatusMessage, WriteWait,
};

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeKeybus {
    state: PanelState,
    lines: VecDeque<String>,
    writes: Vec<String>,
}

impl FakeKeybus {
    fn feed(&mut self, line: &str) {
        self.lines.push_back(line.to_string());
    }
}

impl Keybus for FakeKeybus {
    async fn begin(&mut self) -> Result<()> {
        Ok(())
    }

    async fn process(&mut self) -> bool {
        let Some(line) = self.lines.pop_front() else {
            tokio::time::sleep(Duration::from_millis(1)).await;
            return false;
        };
        match KeybusLine::parse(&line) {
            Some(decoded) => {
                self.state.apply(&decoded);
                true
            }
            None => false,
        }
    }

    fn state(&self) -> &PanelState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut PanelState {
        &mut self.state
    }

    async fn write(&mut self, keys: &str) -> Result<()> {
        self.writes.push(keys.to_string());
        self.state.write_ready = false;
        Ok(())
    }
}

#[derive(Default)]
struct FakeBroker {
    reachable: bool,
    connects: usize,
    connected: bool,
    published: Vec<StatusMessage>,
    inbound: VecDeque<InboundMessage>,
}

impl FakeBroker {
    fn reachable() -> Self {
        Self {
            reachable: true,
            ..Default::default()
        }
    }

    fn command(&mut self, payload: &str) {
        self.inbound.push_back(InboundMessage {
            topic: "dsc/Set".to_string(),
            payload: payload.as_bytes().to_vec(),
        });
    }

    fn take(&mut self) -> Vec<(String, &'static str, bool)> {
        self.published
            .drain(..)
            .map(|m| (m.topic, m.payload, m.retain))
            .collect()
    }
}

impl Publish for FakeBroker {
    fn publish(&mut self, message: &StatusMessage) -> bool {
        if !self.connected {
            return false;
        }
        self.published.push(message.clone());
        true
    }
}

impl Broker for FakeBroker {
    async fn connect(&mut self, _client_id: &str) -> bool {
        self.connects += 1;
        self.connected = self.reachable;
        self.connected
    }

    fn connected(&self) -> bool {
        self.connected
    }

    fn subscribe(&mut self, _topic: &str) -> Result<()> {
        Ok(())
    }

    async fn poll(&mut self) -> Option<InboundMessage> {
        self.inbound.pop_front()
    }
}

const INTERVAL: Duration = Duration::from_millis(5000);

fn owned(topic: &str, payload: &'static str, retain: bool) -> (String, &'static str, bool) {
    (topic.to_string(), payload, retain)
}

/// A started bridge whose broker is connected and whose "online" message
/// has been drained.
async fn connected_bridge(config: BridgeConfig, bus: FakeKeybus) -> (Bridge<FakeKeybus, FakeBroker>, Instant) {
    let mut bridge = Bridge::new(&config, bus, FakeBroker::reachable());
    bridge.begin().await.unwrap();
    let now = Instant::now();
    assert_eq!(bridge.supervisor().state(), ConnectionState::Connected);
    assert_eq!(bridge.broker_mut().take(), vec![owned("dsc/Status", "online", true)]);
    (bridge, now)
}

// ---------------------------------------------------------------------------
// Status publishing
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_first_reports_seed_retained_topics() {
    let (mut bridge, now) = connected_bridge(BridgeConfig::default(), FakeKeybus::default()).await;

    bridge.bus_mut().feed("PSTT1=AW-----");
    let summary = bridge.cycle(now).await.unwrap();
    assert_eq!(summary.published, 2);
    assert_eq!(
        bridge.broker_mut().take(),
        vec![
            owned("dsc/Get/Partition1", "AA", true),
            owned("dsc/Get/Fire1", "0", false),
        ]
    );

    bridge.bus_mut().feed("ZSTT1=04");
    bridge.cycle(now).await;
    let zones = bridge.broker_mut().take();
    assert_eq!(zones.len(), 8);
    assert_eq!(zones[0], owned("dsc/Get/Zone1", "0", true));
    assert_eq!(zones[2], owned("dsc/Get/Zone3", "1", true));
}

#[tokio::test(start_paused = true)]
async fn test_begin_connects_before_first_reports() {
    let mut bus = FakeKeybus::default();
    bus.feed("PSTT1=AW-----");
    bus.feed("ZSTT1=01");
    let mut bridge = Bridge::new(&BridgeConfig::default(), bus, FakeBroker::reachable());

    bridge.begin().await.unwrap();
    assert_eq!(bridge.supervisor().state(), ConnectionState::Connected);

    let start = Instant::now();
    let partitions = bridge.cycle(start).await.unwrap();
    let zones = bridge.cycle(start + Duration::from_millis(100)).await.unwrap();
    assert_eq!((partitions.published, partitions.failed), (2, 0));
    assert_eq!((zones.published, zones.failed), (8, 0));

    let published = bridge.broker_mut().take();
    assert_eq!(published[0], owned("dsc/Status", "online", true));
    assert_eq!(published[1], owned("dsc/Get/Partition1", "AA", true));
    assert!(published.contains(&owned("dsc/Get/Zone1", "1", true)));
    assert!(!bridge.bus().state().has_pending_changes());
}

#[tokio::test(start_paused = true)]
async fn test_failed_first_connect_waits_full_interval() {
    let mut bridge = Bridge::new(&BridgeConfig::default(), FakeKeybus::default(), FakeBroker::default());
    bridge.begin().await.unwrap();
    let start = Instant::now();
    assert_eq!(bridge.broker().connects, 1);

    bridge.cycle(start + Duration::from_millis(4000)).await;
    assert_eq!(bridge.broker().connects, 1);

    bridge.broker_mut().reachable = true;
    bridge.cycle(start + INTERVAL).await;
    assert_eq!(bridge.broker().connects, 2);
    assert_eq!(bridge.supervisor().state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_only_changes_are_published() {
    let (mut bridge, now) = connected_bridge(BridgeConfig::default(), FakeKeybus::default()).await;
    bridge.bus_mut().feed("PSTT1=-------");
    bridge.bus_mut().feed("ZSTT2=00");
    bridge.cycle(now).await;
    bridge.cycle(now).await;
    bridge.broker_mut().take();

    bridge.bus_mut().feed("ZSTT2=00");
    assert!(bridge.cycle(now).await.is_none());

    bridge.bus_mut().feed("ZSTT2=81");
    bridge.cycle(now).await;
    assert_eq!(
        bridge.broker_mut().take(),
        vec![owned("dsc/Get/Zone9", "1", true), owned("dsc/Get/Zone16", "1", true)]
    );

    bridge.bus_mut().feed("PSTT1=a------");
    bridge.cycle(now).await;
    assert_eq!(bridge.broker_mut().take(), vec![owned("dsc/Get/Partition1", "T", true)]);

    bridge.bus_mut().feed("PSTT1=-------");
    bridge.cycle(now).await;
    assert!(bridge.broker_mut().take().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_retry_policy_republishes_after_reconnect() {
    let config = BridgeConfig::builder()
        .publish_policy(PublishPolicy::RetryUntilSuccess)
        .build();
    let mut bridge = Bridge::new(&config, FakeKeybus::default(), FakeBroker::default());
    let mut events = bridge.subscribe();
    let start = Instant::now();

    bridge.bus_mut().feed("PSTT1=AH-----");
    let summary = bridge.cycle(start).await.unwrap();
    assert_eq!(summary.failed, 2);
    assert!(bridge.bus().state().partitions[0].armed_changed);

    bridge.broker_mut().reachable = true;
    bridge.bus_mut().feed("ZSTT8=80");
    let later = start + INTERVAL + Duration::from_millis(1);
    bridge.cycle(later).await;

    let published = bridge.broker_mut().take();
    assert!(published.contains(&owned("dsc/Get/Partition1", "SA", true)));
    assert!(published.contains(&owned("dsc/Get/Fire1", "0", false)));
    assert!(published.contains(&owned("dsc/Get/Zone64", "1", true)));

    let seen: Vec<_> = std::iter::from_fn(|| events.try_recv().ok()).collect();
    assert!(seen.contains(&BridgeEvent::StatusPublished { published: 0, failed: 2 }));
    assert!(seen.contains(&BridgeEvent::BrokerConnected));
}

#[tokio::test(start_paused = true)]
async fn test_retry_policy_republishes_without_new_change() {
    let config = BridgeConfig::builder()
        .publish_policy(PublishPolicy::RetryUntilSuccess)
        .build();
    let mut bridge = Bridge::new(&config, FakeKeybus::default(), FakeBroker::default());
    bridge.begin().await.unwrap();
    let start = Instant::now();

    bridge.bus_mut().feed("PSTT1=AH-----");
    assert_eq!(bridge.cycle(start).await.unwrap().failed, 2);
    assert!(bridge.cycle(start).await.is_none());

    bridge.broker_mut().reachable = true;
    let later = start + INTERVAL;
    let retried = bridge.cycle(later).await.unwrap();
    assert_eq!((retried.published, retried.failed), (2, 0));
    assert_eq!(
        bridge.broker_mut().take(),
        vec![
            owned("dsc/Status", "online", true),
            owned("dsc/Get/Partition1", "SA", true),
            owned("dsc/Get/Fire1", "0", false),
        ]
    );
    assert!(!bridge.bus().state().has_pending_changes());
    assert!(bridge.cycle(later).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_fire_and_forget_does_not_retry() {
    let mut bridge = Bridge::new(&BridgeConfig::default(), FakeKeybus::default(), FakeBroker::default());
    bridge.begin().await.unwrap();
    let start = Instant::now();

    bridge.bus_mut().feed("PSTT1=AH-----");
    bridge.cycle(start).await;

    bridge.broker_mut().reachable = true;
    assert!(bridge.cycle(start + INTERVAL).await.is_none());
    assert_eq!(bridge.broker_mut().take(), vec![owned("dsc/Status", "online", true)]);
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_command_written_when_panel_ready() {
    let config = BridgeConfig::builder().access_code("7890").build();
    let (mut bridge, now) = connected_bridge(config, FakeKeybus::default()).await;
    let mut events = bridge.subscribe();

    bridge.bus_mut().feed("PSTT1=-------");
    bridge.bus_mut().feed("WRDY=1");
    bridge.cycle(now).await;
    bridge.cycle(now).await;

    bridge.broker_mut().command("A");
    bridge.cycle(now).await;
    assert_eq!(bridge.bus().writes, vec!["w".to_string()]);

    // Panel now armed: a second arm is dropped, disarm goes through.
    bridge.bus_mut().feed("PSTT1=AW-----");
    bridge.bus_mut().feed("WRDY=1");
    bridge.cycle(now).await;
    bridge.cycle(now).await;
    bridge.broker_mut().command("S");
    bridge.cycle(now).await;
    bridge.broker_mut().command("D");
    bridge.cycle(now).await;
    assert_eq!(bridge.bus().writes, vec!["w".to_string(), "7890".to_string()]);

    let stats = bridge.command_stats();
    assert_eq!((stats.written, stats.rejected), (2, 1));

    let seen: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
        .filter(|e| !matches!(e, BridgeEvent::StatusPublished { .. }))
        .collect();
    assert_eq!(
        seen,
        vec![
            BridgeEvent::CommandWritten(RemoteCommand::Away),
            BridgeEvent::CommandRejected(RemoteCommand::Stay),
            BridgeEvent::CommandWritten(RemoteCommand::Disarm),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_command_waits_for_write_ready() {
    let (mut bridge, now) = connected_bridge(BridgeConfig::default(), FakeKeybus::default()).await;
    bridge.bus_mut().feed("PSTT1=-------");
    bridge.cycle(now).await;
    bridge.broker_mut().take();

    // Readiness and a zone change arrive while the gate is spinning.
    bridge.bus_mut().feed("ZSTT1=01");
    bridge.bus_mut().feed("WRDY=1");
    bridge.broker_mut().command("N");
    bridge.cycle(now).await;

    assert_eq!(bridge.bus().writes, vec!["n".to_string()]);
    let published = bridge.broker_mut().take();
    assert!(published.contains(&owned("dsc/Get/Zone1", "1", true)));
}

#[tokio::test(start_paused = true)]
async fn test_command_timeout_writes_nothing() {
    let config = BridgeConfig::builder()
        .write_wait(WriteWait::Timeout(Duration::from_millis(200)))
        .build();
    let (mut bridge, now) = connected_bridge(config, FakeKeybus::default()).await;
    let mut events = bridge.subscribe();
    bridge.bus_mut().feed("PSTT1=-------");
    bridge.cycle(now).await;

    bridge.broker_mut().command("S");
    bridge.cycle(now).await;

    assert!(bridge.bus().writes.is_empty());
    assert_eq!(bridge.command_stats().timed_out, 1);
    let seen: Vec<_> = std::iter::from_fn(|| events.try_recv().ok()).collect();
    assert!(seen.contains(&BridgeEvent::CommandTimedOut(RemoteCommand::Stay)));
}

// ---------------------------------------------------------------------------
// Panel-level flags
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_access_code_prompt_entered_once() {
    let config = BridgeConfig::builder().access_code("1234").build();
    let (mut bridge, now) = connected_bridge(config, FakeKeybus::default()).await;
    let mut events = bridge.subscribe();

    bridge.bus_mut().feed("WRDY=1");
    bridge.bus_mut().feed("ACP=1");
    bridge.cycle(now).await;
    bridge.cycle(now).await;
    bridge.cycle(now).await;

    assert_eq!(bridge.bus().writes, vec!["1234".to_string()]);
    assert!(!bridge.bus().state().access_code_prompt);
    assert_eq!(events.try_recv().unwrap(), BridgeEvent::AccessCodeEntered);
}

#[tokio::test(start_paused = true)]
async fn test_buffer_overflow_is_reported_and_cleared() {
    let (mut bridge, now) = connected_bridge(BridgeConfig::default(), FakeKeybus::default()).await;
    let mut events = bridge.subscribe();

    bridge.bus_mut().feed("OVF");
    bridge.cycle(now).await;

    assert!(!bridge.bus().state().buffer_overflow);
    assert!(!bridge.bus().state().status_changed);
    assert_eq!(events.try_recv().unwrap(), BridgeEvent::BufferOverflow);
    assert!(bridge.broker_mut().take().is_empty());
}
