//! Bookkeeping of last-known switch states, keyed by device group id.

use std::collections::HashMap;
use std::sync::RwLock;

use kaku_shared::protocol::SwitchToggled;

/// Switches exposed per device group.
pub const SWITCHES_PER_DEVICE: usize = 3;

/// Last commanded state of every known switch.
///
/// Owned by the composition root and handed out by reference to whatever
/// needs lookups; there is no global instance.
#[derive(Debug, Default)]
pub struct SwitchRegistry {
    states: RwLock<HashMap<u32, [bool; SWITCHES_PER_DEVICE]>>,
}

impl SwitchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a device group visible in status reports before any toggle.
    pub fn register(&self, device_id: u32) {
        self.states.write().unwrap().entry(device_id).or_default();
    }

    /// Record the outcome of a transmitted toggle.
    pub fn record(&self, event: &SwitchToggled) {
        let mut states = self.states.write().unwrap();
        let switches = states.entry(event.device_id).or_default();
        if let Some(slot) = switches.get_mut(usize::from(event.channel)) {
            *slot = event.state;
        }
    }

    /// Point-in-time copy of all known switch states.
    pub fn snapshot(&self) -> HashMap<u32, [bool; SWITCHES_PER_DEVICE]> {
        self.states.read().unwrap().clone()
    }
}
