use std::time::Duration;

use metrics::{counter, gauge, histogram};

use super::InternalEvent;

#[derive(Clone, Copy, Debug)]
pub struct CallQueued {
    pub queued: usize,
}

impl InternalEvent for CallQueued {
    fn emit(self) {
        counter!("throttle_calls_queued_total").increment(1);
        trace!(target: "throttle::stats", queued = self.queued, "Call queued.");
    }
}

#[derive(Clone, Copy, Debug)]
pub struct CallDispatched {
    pub in_flight: usize,
    pub queued: usize,
    pub waited: Duration,
}

impl InternalEvent for CallDispatched {
    fn emit(self) {
        histogram!("throttle_queue_wait_seconds").record(self.waited);
        gauge!("throttle_in_flight").set(self.in_flight as f64);
        debug!(
            target: "throttle::stats",
            in_flight = self.in_flight,
            queued = self.queued,
            waited_ms = self.waited.as_millis() as u64,
            "Call dispatched."
        );
    }
}

#[derive(Debug)]
pub struct CallFailed<'a> {
    pub error: &'a crate::Error,
}

impl InternalEvent for CallFailed<'_> {
    fn emit(self) {
        counter!("throttle_call_errors_total").increment(1);
        debug!(target: "throttle::stats", error = %self.error, "Call failed; slot is still held for the cool-down.");
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SlotReleased {
    pub in_flight: usize,
}

impl InternalEvent for SlotReleased {
    fn emit(self) {
        gauge!("throttle_in_flight").set(self.in_flight as f64);
        trace!(target: "throttle::stats", in_flight = self.in_flight, "Slot released.");
    }
}
