//! Metrics and trace events, one module per subsystem.
//!
//! Nothing here installs a recorder; without one the `metrics` macros are no-ops.

mod pagination;
mod throttle;

pub use pagination::*;
pub use throttle::*;

pub trait InternalEvent: Sized {
    fn emit(self);
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::test_utils::trace_init;

    #[test]
    fn events_emit_without_a_recorder() {
        trace_init();

        CallQueued { queued: 1 }.emit();
        CallDispatched {
            in_flight: 1,
            queued: 0,
            waited: Duration::from_millis(3),
        }
        .emit();
        let error: crate::Error = "boom".into();
        CallFailed { error: &error }.emit();
        SlotReleased { in_flight: 0 }.emit();
        PagesPlanned {
            collection: "widgets",
            count: 5,
            pages: 3,
        }
        .emit();
        CollectionAssembled {
            collection: "widgets",
            items: 5,
        }
        .emit();
    }
}
