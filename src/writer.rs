use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::Result;
use crate::buffer::SetpointSink;
use crate::protocol::{self, ZONES_PATH};
use crate::registry::HoldScheduleRegistry;
use crate::transport::Session;
use crate::types::SetpointPair;

/// Pause between the period write and the hold arm. The device snapshots the
/// period into the hold when it is armed; arming too early captures stale
/// setpoints.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(150);

/// The hold-arming commands, in the order they are attempted. Different
/// firmware revisions accept different ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldArmMethod {
    ConfigToggle,
    CommandDirective,
    StatusDirective,
}

impl HoldArmMethod {
    pub const CASCADE: [HoldArmMethod; 3] = [
        HoldArmMethod::ConfigToggle,
        HoldArmMethod::CommandDirective,
        HoldArmMethod::StatusDirective,
    ];
}

#[derive(Debug, Clone, Copy)]
pub struct WriteOutcome {
    /// Hold schedule the period was written into.
    pub schedule_id: u32,
    /// Which cascade member armed the hold, or None when all three failed
    /// (non-fatal: the period write may already be visible to the device).
    pub hold_armed: Option<HoldArmMethod>,
}

/// The ordered, fallback-chained sequence that turns a desired setpoint pair
/// into device-accepted state.
pub struct SetpointWriter {
    session: Arc<Session>,
    registry: Arc<HoldScheduleRegistry>,
    settle_delay: Duration,
}

impl SetpointWriter {
    pub fn new(session: Arc<Session>, registry: Arc<HoldScheduleRegistry>) -> Self {
        Self {
            session,
            registry,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Install `pair` on the device. Succeeds iff the period write succeeds;
    /// hold arming and the refresh nudge are best-effort.
    pub async fn write(&self, zone_id: u8, pair: SetpointPair) -> Result<WriteOutcome> {
        let schedule_id = self.registry.get(zone_id);

        self.session
            .write_schedule_period(schedule_id, 0, &pair)
            .await?;

        tokio::time::sleep(self.settle_delay).await;

        let mut hold_armed = None;
        for method in HoldArmMethod::CASCADE {
            match self.try_arm(method, zone_id, schedule_id, &pair).await {
                Ok(()) => {
                    debug!(zone_id, ?method, "hold armed");
                    hold_armed = Some(method);
                    break;
                }
                Err(e) => {
                    warn!(zone_id, ?method, error = %e, "hold-arm attempt failed, trying next");
                }
            }
        }
        if hold_armed.is_none() {
            warn!(
                zone_id,
                schedule_id, "no hold-arm method succeeded; period write may still take effect"
            );
        }

        if let Err(e) = self.session.request_data(&[ZONES_PATH]).await {
            warn!(zone_id, error = %e, "post-write refresh request failed");
        }

        Ok(WriteOutcome {
            schedule_id,
            hold_armed,
        })
    }

    async fn try_arm(
        &self,
        method: HoldArmMethod,
        zone_id: u8,
        schedule_id: u32,
        pair: &SetpointPair,
    ) -> Result<()> {
        let data = match method {
            HoldArmMethod::ConfigToggle => protocol::hold_config_data(zone_id, schedule_id),
            HoldArmMethod::CommandDirective => {
                protocol::hold_command_data(zone_id, schedule_id, pair)
            }
            HoldArmMethod::StatusDirective => protocol::hold_status_data(zone_id, schedule_id),
        };
        self.session.publish(ZONES_PATH, data).await
    }
}

impl SetpointSink for SetpointWriter {
    async fn send(&self, zone_id: u8, pair: SetpointPair) -> Result<WriteOutcome> {
        self.write(zone_id, pair).await
    }
}
