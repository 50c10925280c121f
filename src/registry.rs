use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

/// Per-zone mapping to the schedule id temporary holds target. Seeded with
/// `base + zone_id` so writes can proceed before first telemetry; overwritten
/// only by telemetry observation, never by the write path, so a write can't
/// confirm its own guess.
pub struct HoldScheduleRegistry {
    base: u32,
    learned: Mutex<HashMap<u8, u32>>,
}

impl HoldScheduleRegistry {
    pub fn new(base: u32) -> Self {
        Self {
            base,
            learned: Mutex::new(HashMap::new()),
        }
    }

    /// Total lookup: the learned value, or the deterministic default.
    pub fn get(&self, zone_id: u8) -> u32 {
        self.learned
            .lock()
            .map(|m| m.get(&zone_id).copied())
            .ok()
            .flatten()
            .unwrap_or(self.base + zone_id as u32)
    }

    /// Record the device's authoritative hold schedule id for a zone.
    /// Called only from telemetry dispatch.
    pub fn observe(&self, zone_id: u8, schedule_id: u32) {
        let previous = self.get(zone_id);
        if previous == schedule_id {
            return;
        }
        if let Ok(mut learned) = self.learned.lock() {
            learned.insert(zone_id, schedule_id);
        }
        debug!(zone_id, previous, schedule_id, "hold schedule id updated from telemetry");
    }
}
