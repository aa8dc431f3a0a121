use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll, ready},
};

use pin_project::pin_project;
use tokio::sync::oneshot;

use super::SchedulerError;
use crate::Error;

/// Future for the result of a call made through a [`Scheduler`](super::Scheduler).
///
/// Dropping it does not withdraw the call: once queued, a call is dispatched and occupies its
/// slot regardless, and the outcome is discarded.
#[pin_project]
#[derive(Debug)]
pub struct ResponseFuture<T> {
    #[pin]
    rx: oneshot::Receiver<Result<T, Error>>,
}

impl<T> ResponseFuture<T> {
    pub(super) fn new(rx: oneshot::Receiver<Result<T, Error>>) -> Self {
        Self { rx }
    }
}

impl<T> Future for ResponseFuture<T> {
    type Output = Result<T, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match ready!(self.project().rx.poll(cx)) {
            Ok(result) => Poll::Ready(result),
            Err(_) => Poll::Ready(Err(Box::new(SchedulerError::Closed))),
        }
    }
}
