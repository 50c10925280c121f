use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::buffer::{DEFAULT_DEBOUNCE, SetpointBuffer};
use crate::config::Config;
use crate::protocol::SUBSCRIBE_PATHS;
use crate::registry::HoldScheduleRegistry;
use crate::transport::Session;
use crate::types::{HvacMode, ObservedSetpoints, SetpointPair, Temperature, ZoneStatus};
use crate::writer::{DEFAULT_SETTLE_DELAY, SetpointWriter};
use crate::{Error, Result};

pub const BACKOFF_FLOOR: Duration = Duration::from_secs(2);
pub const BACKOFF_CEILING: Duration = Duration::from_secs(60);

/// Reconnect pacing for the retrieval loop: sleep the current delay, then
/// double it up to the ceiling. One successful retrieve resets to the floor.
struct ExponentialBackoff {
    attempts: u32,
    base: Duration,
    max: Duration,
}

impl ExponentialBackoff {
    fn new(base: Duration, max: Duration) -> Self {
        Self {
            attempts: 0,
            base,
            max,
        }
    }

    fn reset(&mut self) {
        self.attempts = 0;
    }

    fn next_delay(&self) -> Duration {
        let multiplier = 2u64.saturating_pow(self.attempts.min(31));
        let secs = self
            .base
            .as_secs()
            .saturating_mul(multiplier)
            .min(self.max.as_secs());
        Duration::from_secs(secs)
    }

    fn bump(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
    }
}

type StatusCallback = Box<dyn Fn(&ZoneStatus) + Send + Sync>;

pub struct SyncBuilder {
    config: Config,
    status_callbacks: Vec<StatusCallback>,
    debounce: Duration,
    settle_delay: Duration,
}

impl SyncBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            status_callbacks: Vec::new(),
            debounce: DEFAULT_DEBOUNCE,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    /// Observer for zone status pushed from telemetry (the accessory-layer
    /// seam).
    pub fn on_zone_status(mut self, f: impl Fn(&ZoneStatus) + Send + Sync + 'static) -> Self {
        self.status_callbacks.push(Box::new(f));
        self
    }

    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn build(self) -> Result<S30Sync> {
        self.config.validate()?;
        let session = Arc::new(Session::from_config(&self.config)?);
        let registry = Arc::new(HoldScheduleRegistry::new(self.config.hold_schedule_base));
        let writer = Arc::new(
            SetpointWriter::new(session.clone(), registry.clone())
                .with_settle_delay(self.settle_delay),
        );
        let buffers = self
            .config
            .zones
            .iter()
            .map(|&zone_id| {
                (
                    zone_id,
                    SetpointBuffer::new(zone_id, writer.clone(), self.debounce),
                )
            })
            .collect();
        Ok(S30Sync {
            config: self.config,
            session,
            registry,
            buffers,
            status_callbacks: self.status_callbacks,
        })
    }
}

/// The supervising loop and public face of the crate: owns the transport
/// session, the hold-schedule registry and one coalescing buffer per
/// configured zone.
pub struct S30Sync {
    config: Config,
    session: Arc<Session>,
    registry: Arc<HoldScheduleRegistry>,
    buffers: HashMap<u8, SetpointBuffer<Arc<SetpointWriter>>>,
    status_callbacks: Vec<StatusCallback>,
}

impl S30Sync {
    pub fn builder(config: Config) -> SyncBuilder {
        SyncBuilder::new(config)
    }

    /// Open both device sessions and subscribe to telemetry.
    pub async fn connect(&self) -> Result<()> {
        self.session.connect_endpoint().await?;
        self.session.connect().await?;
        self.session.request_data(SUBSCRIBE_PATHS).await?;
        Ok(())
    }

    /// Schedule id the next write for `zone_id` would target.
    pub fn hold_schedule_id(&self, zone_id: u8) -> u32 {
        self.registry.get(zone_id)
    }

    /// Accessory-layer entry point: buffer a desired pair for `zone_id`.
    /// The write goes out after the debounce window, coalesced and
    /// deduplicated against known device state.
    pub async fn request_setpoint_change(&self, zone_id: u8, pair: SetpointPair) -> Result<()> {
        let buffer = self
            .buffers
            .get(&zone_id)
            .ok_or(Error::UnknownZone(zone_id))?;
        buffer.request_write(pair).await;
        Ok(())
    }

    /// One retrieve + dispatch pass.
    pub async fn poll_once(&self) -> Result<()> {
        let payloads = self
            .session
            .retrieve(self.config.max_messages, self.config.poll_timeout.as_secs())
            .await?;
        for payload in &payloads {
            self.dispatch(payload).await;
        }
        Ok(())
    }

    /// The perpetual retrieval loop. Transport errors are never fatal here:
    /// every failure re-opens both sessions (soft) and backs off before the
    /// next attempt. Exits only with the process.
    pub async fn run(&self) {
        let mut backoff = ExponentialBackoff::new(BACKOFF_FLOOR, BACKOFF_CEILING);
        loop {
            match self.poll_once().await {
                Ok(()) => backoff.reset(),
                Err(e) => {
                    warn!(error = %e, "retrieve failed, reconnecting");
                    self.reconnect().await;
                    let delay = backoff.next_delay();
                    debug!(delay_secs = delay.as_secs(), "backing off before next poll");
                    tokio::time::sleep(delay).await;
                    backoff.bump();
                }
            }
        }
    }

    /// Re-open both sessions and the subscription. Soft failures: some
    /// firmware variants accept commands without an explicit open.
    async fn reconnect(&self) {
        if let Err(e) = self.session.connect_endpoint().await {
            warn!(error = %e, "endpoint session reopen failed");
        }
        if let Err(e) = self.session.connect().await {
            warn!(error = %e, "message-bus session reopen failed");
        }
        if let Err(e) = self.session.request_data(SUBSCRIBE_PATHS).await {
            warn!(error = %e, "telemetry resubscription failed");
        }
    }

    async fn dispatch(&self, data: &Value) {
        let Some(Value::Array(zones)) = data.get("zones") else {
            return;
        };
        for zone_data in zones {
            let zone_id = match zone_data.get("id").and_then(|v| v.as_u64()) {
                Some(id) => id as u8,
                None => continue,
            };
            let Some(buffer) = self.buffers.get(&zone_id) else {
                trace!(zone_id, "telemetry for unmanaged zone ignored");
                continue;
            };

            // Registry before echo: a write racing this dispatch should see
            // the authoritative schedule id as early as possible.
            if let Some(schedule_id) = zone_data
                .pointer("/config/scheduleHold/scheduleId")
                .and_then(|v| v.as_u64())
            {
                self.registry.observe(zone_id, schedule_id as u32);
            }

            let observed = observed_setpoints(zone_data);
            if !observed.is_empty() {
                buffer.on_device_echo(observed).await;
            }

            if let Some(status) = zone_status(zone_id, zone_data) {
                for cb in &self.status_callbacks {
                    cb(&status);
                }
            }
        }
    }
}

fn observed_setpoints(zone_data: &Value) -> ObservedSetpoints {
    let period = zone_data.pointer("/status/period").unwrap_or(&Value::Null);
    ObservedSetpoints {
        heat: period
            .get("hsp")
            .and_then(|v| v.as_f64())
            .map(|v| v.round() as i32),
        cool: period
            .get("csp")
            .and_then(|v| v.as_f64())
            .map(|v| v.round() as i32),
    }
}

fn zone_status(zone_id: u8, zone_data: &Value) -> Option<ZoneStatus> {
    let status = zone_data.pointer("/status")?;
    let mut snapshot = ZoneStatus {
        zone_id,
        ..Default::default()
    };

    if let (Some(f), Some(c)) = (
        status.get("temperature").and_then(|v| v.as_f64()),
        status.get("temperatureC").and_then(|v| v.as_f64()),
    ) {
        snapshot.temperature = Some(Temperature::from_pair(f, c));
    } else if let Some(c) = status.get("temperatureC").and_then(|v| v.as_f64()) {
        snapshot.temperature = Some(Temperature::from_celsius(c));
    } else if let Some(f) = status.get("temperature").and_then(|v| v.as_f64()) {
        snapshot.temperature = Some(Temperature::from_fahrenheit(f));
    }

    if let Some(h) = status.get("humidity").and_then(|v| v.as_f64()) {
        snapshot.humidity = Some(h);
    }

    let period = status.pointer("/period").unwrap_or(&Value::Null);
    if let (Some(f), Some(c)) = (
        period.get("hsp").and_then(|v| v.as_f64()),
        period.get("hspC").and_then(|v| v.as_f64()),
    ) {
        snapshot.heat_setpoint = Some(Temperature::from_pair(f, c));
    }
    if let (Some(f), Some(c)) = (
        period.get("csp").and_then(|v| v.as_f64()),
        period.get("cspC").and_then(|v| v.as_f64()),
    ) {
        snapshot.cool_setpoint = Some(Temperature::from_pair(f, c));
    }
    if let Some(mode) = period.get("systemMode").and_then(|v| v.as_str()) {
        snapshot.mode = HvacMode::from_device_str(mode);
    }

    if let Some(enabled) = zone_data
        .pointer("/config/scheduleHold/enabled")
        .and_then(|v| v.as_bool())
    {
        snapshot.hold_active = enabled;
    }

    Some(snapshot)
}
