use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::Result;
use crate::types::{ObservedSetpoints, SetpointPair, SetpointSide};
use crate::writer::WriteOutcome;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(350);

/// Downstream write protocol. A trait seam so the buffer's state machine is
/// testable without HTTP; production wires this to `SetpointWriter`.
pub trait SetpointSink: Send + Sync + 'static {
    fn send(
        &self,
        zone_id: u8,
        pair: SetpointPair,
    ) -> impl Future<Output = Result<WriteOutcome>> + Send;
}

impl<T: SetpointSink> SetpointSink for Arc<T> {
    fn send(
        &self,
        zone_id: u8,
        pair: SetpointPair,
    ) -> impl Future<Output = Result<WriteOutcome>> + Send {
        T::send(self, zone_id, pair)
    }
}

#[derive(Default)]
struct BufferState {
    /// Most recently requested pair not yet sent. Superseded, never queued.
    pending: Option<SetpointPair>,
    /// Pair currently being transmitted.
    in_flight: Option<SetpointPair>,
    /// What we believe the device holds, possibly one field at a time.
    last_known: ObservedSetpoints,
}

struct Inner<S> {
    zone_id: u8,
    sink: S,
    debounce: Duration,
    state: Mutex<BufferState>,
    /// Held across the send so only one flush per zone is ever in progress.
    flush_gate: Mutex<()>,
    timer: StdMutex<Option<JoinHandle<()>>>,
}

/// Per-zone coalescing write buffer: absorbs a burst of setpoint requests
/// into at most one outbound write, suppresses writes the device already
/// reflects, and recognizes its own just-sent values in telemetry.
pub struct SetpointBuffer<S: SetpointSink> {
    inner: Arc<Inner<S>>,
}

impl<S: SetpointSink> Clone for SetpointBuffer<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: SetpointSink> SetpointBuffer<S> {
    pub fn new(zone_id: u8, sink: S, debounce: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                zone_id,
                sink,
                debounce,
                state: Mutex::new(BufferState::default()),
                flush_gate: Mutex::new(()),
                timer: StdMutex::new(None),
            }),
        }
    }

    pub fn zone_id(&self) -> u8 {
        self.inner.zone_id
    }

    /// Record a desired setpoint pair and (re)start the debounce timer.
    /// Repeated calls before expiry keep resetting the timer, so only the
    /// last value in a burst is transmitted.
    pub async fn request_write(&self, pair: SetpointPair) {
        let enforced = {
            let mut state = self.inner.state.lock().await;
            let reference = state.pending.or_else(|| state.last_known.complete_pair());
            let moved = reference.and_then(|r| pair.moved_side_against(&r));
            let enforced = pair.enforced(moved.unwrap_or(SetpointSide::Heat));
            state.pending = Some(enforced);
            enforced
        };
        trace!(
            zone_id = self.inner.zone_id,
            heat = enforced.heat,
            cool = enforced.cool,
            "setpoint write queued"
        );
        self.restart_timer();
    }

    fn restart_timer(&self) {
        let Ok(mut slot) = self.inner.timer.lock() else {
            return;
        };
        // Actively cancel the stale task; a superseded flush must never fire.
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        let buffer = self.clone();
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(buffer.inner.debounce).await;
            buffer.flush().await;
        }));
    }

    /// Send the pending pair unless the device already has it. Serialized
    /// per zone; a request arriving mid-send lands in `pending` and is
    /// flushed by its own timer after this one completes.
    pub async fn flush(&self) {
        let _gate = self.inner.flush_gate.lock().await;
        let zone_id = self.inner.zone_id;

        let to_send = {
            let mut state = self.inner.state.lock().await;
            let Some(pending) = state.pending.take() else {
                return;
            };
            if state.last_known.complete_pair() == Some(pending) {
                trace!(zone_id, heat = pending.heat, cool = pending.cool, "no-op write suppressed");
                return;
            }
            state.in_flight = Some(pending);
            pending
        };

        match self.inner.sink.send(zone_id, to_send).await {
            Ok(outcome) => {
                debug!(
                    zone_id,
                    schedule_id = outcome.schedule_id,
                    hold = ?outcome.hold_armed,
                    "setpoint write completed"
                );
                let mut state = self.inner.state.lock().await;
                // An echo may have already committed this; otherwise commit
                // optimistically so a delayed or dropped echo can't trigger
                // a duplicate send.
                if state.in_flight == Some(to_send) {
                    state.last_known = to_send.into();
                    state.in_flight = None;
                }
            }
            Err(e) => {
                warn!(zone_id, error = %e, "setpoint write failed");
                let mut state = self.inner.state.lock().await;
                if state.in_flight == Some(to_send) {
                    state.in_flight = None;
                }
                // Re-queue for the next flush unless a newer request
                // superseded the value meanwhile. Cached device state is
                // left untouched.
                if state.pending.is_none() {
                    state.pending = Some(to_send);
                }
            }
        }
    }

    /// Telemetry carrying setpoint fields for this zone. A match against the
    /// in-flight pair is an acknowledgment; anything else is independently-
    /// observed device state and is merged field by field.
    pub async fn on_device_echo(&self, observed: ObservedSetpoints) {
        if observed.is_empty() {
            return;
        }
        let mut state = self.inner.state.lock().await;
        if let Some(in_flight) = state.in_flight
            && observed.matches(&in_flight)
        {
            state.last_known = in_flight.into();
            state.in_flight = None;
            debug!(
                zone_id = self.inner.zone_id,
                heat = in_flight.heat,
                cool = in_flight.cool,
                "device echo acknowledged in-flight write"
            );
            return;
        }
        state.last_known.merge(&observed);
    }

    pub async fn pending(&self) -> Option<SetpointPair> {
        self.inner.state.lock().await.pending
    }

    pub async fn in_flight(&self) -> Option<SetpointPair> {
        self.inner.state.lock().await.in_flight
    }

    pub async fn last_known(&self) -> ObservedSetpoints {
        self.inner.state.lock().await.last_known
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::HoldArmMethod;

    fn outcome() -> WriteOutcome {
        WriteOutcome {
            schedule_id: 32,
            hold_armed: Some(HoldArmMethod::ConfigToggle),
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        calls: StdMutex<Vec<(u8, SetpointPair)>>,
    }

    impl RecordingSink {
        fn calls(&self) -> Vec<(u8, SetpointPair)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl SetpointSink for RecordingSink {
        async fn send(&self, zone_id: u8, pair: SetpointPair) -> Result<WriteOutcome> {
            self.calls.lock().unwrap().push((zone_id, pair));
            Ok(outcome())
        }
    }

    /// Blocks in send until a permit is released, to observe in-flight state.
    struct GatedSink {
        calls: StdMutex<Vec<SetpointPair>>,
        gate: tokio::sync::Semaphore,
    }

    impl GatedSink {
        fn new() -> Self {
            Self {
                calls: StdMutex::new(Vec::new()),
                gate: tokio::sync::Semaphore::new(0),
            }
        }
    }

    impl SetpointSink for GatedSink {
        async fn send(&self, _zone_id: u8, pair: SetpointPair) -> Result<WriteOutcome> {
            self.calls.lock().unwrap().push(pair);
            let _permit = self.gate.acquire().await.unwrap();
            Ok(outcome())
        }
    }

    struct FailingSink;

    impl SetpointSink for FailingSink {
        async fn send(&self, _zone_id: u8, _pair: SetpointPair) -> Result<WriteOutcome> {
            Err(crate::Error::Io(std::io::Error::other("wire down")))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn burst_coalesces_to_last_value() {
        let sink = Arc::new(RecordingSink::default());
        let buffer = SetpointBuffer::new(2, sink.clone(), DEFAULT_DEBOUNCE);

        buffer.request_write(SetpointPair::new(66, 72)).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        buffer.request_write(SetpointPair::new(67, 73)).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        buffer.request_write(SetpointPair::new(68, 74)).await;
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(sink.calls(), vec![(2, SetpointPair::new(68, 74))]);
        assert_eq!(buffer.pending().await, None);
        assert_eq!(
            buffer.last_known().await.complete_pair(),
            Some(SetpointPair::new(68, 74))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn noop_write_suppressed() {
        let sink = Arc::new(RecordingSink::default());
        let buffer = SetpointBuffer::new(0, sink.clone(), DEFAULT_DEBOUNCE);

        buffer
            .on_device_echo(SetpointPair::new(68, 74).into())
            .await;
        buffer.request_write(SetpointPair::new(68, 74)).await;
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(sink.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn echo_during_flight_is_acknowledgment() {
        let sink = Arc::new(GatedSink::new());
        let buffer = SetpointBuffer::new(0, sink.clone(), DEFAULT_DEBOUNCE);
        let pair = SetpointPair::new(68, 74);

        buffer.request_write(pair).await;
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(buffer.in_flight().await, Some(pair));

        buffer.on_device_echo(pair.into()).await;
        assert_eq!(buffer.in_flight().await, None);
        assert_eq!(buffer.last_known().await.complete_pair(), Some(pair));

        sink.gate.add_permits(1);
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Same target again: suppressed as a no-op.
        buffer.request_write(pair).await;
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(sink.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn partial_echo_merges_field_by_field() {
        let sink = Arc::new(RecordingSink::default());
        let buffer = SetpointBuffer::new(0, sink.clone(), DEFAULT_DEBOUNCE);

        buffer
            .on_device_echo(ObservedSetpoints {
                heat: Some(68),
                cool: None,
            })
            .await;
        buffer
            .on_device_echo(ObservedSetpoints {
                heat: None,
                cool: Some(74),
            })
            .await;

        assert_eq!(
            buffer.last_known().await.complete_pair(),
            Some(SetpointPair::new(68, 74))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_write_requeues_and_keeps_cache() {
        let buffer = SetpointBuffer::new(0, FailingSink, DEFAULT_DEBOUNCE);
        let pair = SetpointPair::new(68, 74);

        buffer.request_write(pair).await;
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(buffer.pending().await, Some(pair));
        assert_eq!(buffer.in_flight().await, None);
        assert!(buffer.last_known().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn request_write_enforces_deadband_against_cached_state() {
        let sink = Arc::new(RecordingSink::default());
        let buffer = SetpointBuffer::new(0, sink.clone(), DEFAULT_DEBOUNCE);

        buffer
            .on_device_echo(SetpointPair::new(68, 74).into())
            .await;
        // User drags cool down to 69; heat must give way.
        buffer.request_write(SetpointPair::new(68, 69)).await;

        assert_eq!(buffer.pending().await, Some(SetpointPair::new(66, 69)));
    }

    #[tokio::test(start_paused = true)]
    async fn request_during_flight_is_buffered_then_flushed() {
        let sink = Arc::new(GatedSink::new());
        let buffer = SetpointBuffer::new(0, sink.clone(), DEFAULT_DEBOUNCE);

        buffer.request_write(SetpointPair::new(66, 72)).await;
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(buffer.in_flight().await, Some(SetpointPair::new(66, 72)));

        // Arrives while the first send is blocked on the wire.
        buffer.request_write(SetpointPair::new(68, 74)).await;
        sink.gate.add_permits(2);
        tokio::time::sleep(Duration::from_millis(500)).await;

        let calls = sink.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![SetpointPair::new(66, 72), SetpointPair::new(68, 74)]
        );
    }
}
