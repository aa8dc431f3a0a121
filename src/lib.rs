//! Cool-down scheduling for outbound async calls, and count-driven page aggregation on top of it.
//!
//! This crate provides two pieces that compose through [`tower::Service`]:
//!
//! 1. [`throttle::Scheduler`] wraps any service so that at most `max_concurrent` calls occupy a
//!    slot at once. A slot is held from dispatch until `cooldown` has elapsed *after* the call
//!    settles, so a scheduler with `max_concurrent = 2` and `cooldown = 1s` issues at most two
//!    calls per second against a fast backend.
//! 2. [`pagination::Collector`] asks a `<collection>/count` endpoint how many items exist, requests
//!    every page through the same throttled service, and flattens the pages into one
//!    [`pagination::Collection`], in page order.
//!
//! # Algorithm Overview
//!
//! Calls are queued FIFO. Whenever the queue is non-empty and a slot is free the head call is
//! dispatched on its own task; the task settles the caller's future, sleeps for the cool-down and
//! then frees the slot, which kicks the next dispatch. Failed calls hold their slot for the same
//! cool-down as successful ones.
//!
//! # Safety & Concurrency
//! - Scheduler state sits behind a mutex that is never held across an await
//! - No unsafe code
//!
//! # Basic Usage
//! ```no_run
//! use std::time::Duration;
//! use throttled_pager::http::{Request, RequestOptions, Response};
//! use throttled_pager::pagination::Collector;
//! use throttled_pager::throttle::Scheduler;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let sender = tower::service_fn(|request: Request| async move {
//!     // talk to the remote API here
//!     Ok::<_, throttled_pager::Error>(Response::ok(serde_json::json!({ "count": 0 })))
//! });
//!
//! let scheduler = Scheduler::wrap(sender, Duration::from_millis(500), 2);
//! let collection = Collector::new(scheduler)
//!     .get_all("/admin/products.json", RequestOptions::default())
//!     .await?;
//! println!("{} {}", collection.name(), collection.items().len());
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//! See [`throttle::SchedulerSettings`], [`pagination::CollectorSettings`] and
//! [`client::ClientConfig`].
//!
//! # Metrics
//! Emits metrics via the `InternalEvent` trait in [`internal_event`].
pub mod client;
pub mod http;
pub mod internal_event;
pub mod pagination;
pub mod throttle;
#[cfg(test)]
pub mod test_utils;

#[macro_use]
extern crate tracing;

pub type Error = Box<dyn std::error::Error + Send + Sync + 'static>;
