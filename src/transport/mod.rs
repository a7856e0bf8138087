// MIT License - Copyright (c) 2026 Peter Wright
// Keybus transport abstraction

pub mod tcp;

use crate::error::Result;
use crate::panel::PanelState;

/// A decoded view of the panel bus plus its keypad write channel.
///
/// Implementations own the [`PanelState`] snapshot and are its only writer
/// apart from the status translator clearing change markers.
#[allow(async_fn_in_trait)]
pub trait Keybus {
    /// Start decoding.
    async fn begin(&mut self) -> Result<()>;

    /// Advance decoding by one step. Returns true when a complete, valid unit
    /// was decoded. Must return promptly when nothing is pending.
    async fn process(&mut self) -> bool;

    /// Current snapshot.
    fn state(&self) -> &PanelState;

    /// Current snapshot, for clearing change markers.
    fn state_mut(&mut self) -> &mut PanelState;

    /// Whether the panel write channel can accept a keypad write.
    fn write_ready(&self) -> bool {
        self.state().write_ready
    }

    /// Type `keys` on the emulated keypad. Only valid while [`Keybus::write_ready`].
    async fn write(&mut self, keys: &str) -> Result<()>;
}
