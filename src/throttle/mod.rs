//! Limit the number of calls occupying a slot, and hold each slot for a cool-down after its call
//! settles.

mod future;
pub mod layer;
pub mod retries;
pub mod scheduler;

use std::time::Duration;

use bon::Builder;
use serde::Deserialize;
use snafu::Snafu;

pub use future::ResponseFuture;
pub use layer::SchedulerLayer;
pub use scheduler::Scheduler;

/// Configuration of a [`Scheduler`].
///
/// | Parameter | Default | Description |
/// |-----------|---------|-------------|
/// | `cooldown_ms` | 1000 | How long a slot stays occupied after its call settles |
/// | `max_concurrent` | 2 | Number of slots |
///
/// With the defaults a fast backend sees at most two calls per second.
///
/// `max_concurrent = 0` is accepted but nothing is ever dispatched. `cooldown_ms = 0` turns the
/// scheduler into a plain concurrency limit.
///
/// # Example
///
/// ```rust
/// use throttled_pager::throttle::SchedulerSettings;
///
/// let settings = SchedulerSettings::builder()
///     .cooldown_ms(500)
///     .max_concurrent(4)
///     .build();
/// assert_eq!(settings.cooldown().as_millis(), 500);
/// ```
#[derive(Clone, Copy, Debug, Builder, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerSettings {
    /// Delay after a call settles before its slot is handed to the next call.
    #[builder(default = default_cooldown_ms())]
    pub(super) cooldown_ms: u64,

    /// Upper bound on calls that are running or cooling down.
    #[builder(default = default_max_concurrent())]
    pub(super) max_concurrent: usize,
}

const fn default_cooldown_ms() -> u64 {
    1000
}

const fn default_max_concurrent() -> usize {
    2
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            cooldown_ms: default_cooldown_ms(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

impl SchedulerSettings {
    pub fn new(cooldown: Duration, max_concurrent: usize) -> Self {
        Self {
            cooldown_ms: cooldown.as_millis().try_into().unwrap_or(u64::MAX),
            max_concurrent,
        }
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}

/// Errors produced by the scheduler itself, as opposed to the wrapped service.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SchedulerError {
    /// The task running a dispatched call went away before the call settled, which happens when
    /// the runtime shuts down underneath it.
    #[snafu(display("scheduler dropped the call before it settled"))]
    Closed,

    /// The wrapped service panicked while starting or running the call.
    #[snafu(display("service panicked while handling the call"))]
    Panicked,
}
