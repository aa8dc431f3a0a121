use std::{
    collections::VecDeque,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    task::{Context, Poll},
    time::Duration,
};

use futures::{
    FutureExt, TryFutureExt,
    future::{self, BoxFuture},
    task::noop_waker,
};
use tokio::{runtime::Handle, sync::oneshot, time::Instant};
use tower::{Service, ServiceExt};

use super::{ResponseFuture, SchedulerError, SchedulerSettings};
use crate::{
    Error,
    internal_event::{CallDispatched, CallFailed, CallQueued, InternalEvent, SlotReleased},
};

type CallFuture<T> = BoxFuture<'static, Result<T, Error>>;

/// A call waiting for a slot. The request carries everything the wrapped service needs; the
/// reply half is settled exactly once, by the task that runs the call.
struct ScheduledCall<Req, T> {
    request: Req,
    reply: oneshot::Sender<Result<T, Error>>,
    queued_at: Instant,
}

struct SchedulerState<Req, T> {
    /// Slots currently held, either by a running call or by one cooling down.
    working: usize,
    queue: VecDeque<ScheduledCall<Req, T>>,
}

struct Shared<S, Req>
where
    S: Service<Req>,
{
    service: Mutex<S>,
    state: Mutex<SchedulerState<Req, S::Response>>,
    settings: SchedulerSettings,
    runtime: Handle,
}

/// Wraps a service so that at most `max_concurrent` calls hold a slot, where a slot is held from
/// dispatch until `cooldown` after the call settles.
///
/// Calls are dispatched strictly in the order they were scheduled. Every clone of a `Scheduler`
/// shares the same slots and queue; two schedulers built separately share nothing.
///
/// The wrapped service's `call` runs while the scheduler is locked, so it must not call back into
/// the same scheduler before returning its future. A call whose service panics settles with
/// [`SchedulerError::Panicked`](super::SchedulerError::Panicked) and still releases its slot.
///
/// ```
/// use std::time::Duration;
/// use throttled_pager::throttle::Scheduler;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let double = tower::service_fn(|n: u32| async move { Ok::<_, throttled_pager::Error>(n * 2) });
/// let scheduler = Scheduler::wrap(double, Duration::from_millis(10), 2);
///
/// let calls: Vec<_> = (1..=4).map(|n| scheduler.schedule(n)).collect();
/// let results = futures::future::try_join_all(calls).await.unwrap();
/// assert_eq!(results, vec![2, 4, 6, 8]);
/// # }
/// ```
pub struct Scheduler<S, Req>
where
    S: Service<Req>,
{
    shared: Arc<Shared<S, Req>>,
}

impl<S, Req> Scheduler<S, Req>
where
    S: Service<Req> + Clone + Send + 'static,
    S::Error: Into<Error>,
    S::Response: Send + 'static,
    S::Future: Send + 'static,
    Req: Send + 'static,
{
    /// Creates a scheduler around `service`.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a Tokio runtime; calls are dispatched on the runtime that
    /// was current at construction.
    pub fn new(service: S, settings: SchedulerSettings) -> Self {
        if settings.max_concurrent() == 0 {
            warn!(
                message = "Scheduler has no slots; scheduled calls will never be dispatched.",
                cooldown_ms = settings.cooldown_ms,
            );
        }
        debug!(
            message = "Scheduler created.",
            max_concurrent = settings.max_concurrent(),
            cooldown_ms = settings.cooldown_ms,
        );

        Self {
            shared: Arc::new(Shared {
                service: Mutex::new(service),
                state: Mutex::new(SchedulerState {
                    working: 0,
                    queue: VecDeque::new(),
                }),
                settings,
                runtime: Handle::current(),
            }),
        }
    }

    /// Shorthand for [`Scheduler::new`] with a cool-down and a slot count.
    pub fn wrap(service: S, cooldown: Duration, max_concurrent: usize) -> Self {
        Self::new(service, SchedulerSettings::new(cooldown, max_concurrent))
    }

    /// Queues `request` and returns a future for its outcome.
    ///
    /// Never blocks. If a slot is free the call is dispatched before this returns.
    pub fn schedule(&self, request: Req) -> ResponseFuture<S::Response> {
        let (reply, rx) = oneshot::channel();
        let queued = {
            let mut state = self.shared.lock_state();
            state.queue.push_back(ScheduledCall {
                request,
                reply,
                queued_at: Instant::now(),
            });
            state.queue.len()
        };
        CallQueued { queued }.emit();

        self.shared.dispatch();
        ResponseFuture::new(rx)
    }
}

impl<S, Req> Scheduler<S, Req>
where
    S: Service<Req>,
{
    /// Slots currently held by running or cooling-down calls.
    pub fn in_flight(&self) -> usize {
        self.shared.lock_state().working
    }

    /// Calls waiting for a slot.
    pub fn queued(&self) -> usize {
        self.shared.lock_state().queue.len()
    }

    pub fn settings(&self) -> SchedulerSettings {
        self.shared.settings
    }
}

impl<S, Req> Shared<S, Req>
where
    S: Service<Req>,
{
    fn lock_state(&self) -> MutexGuard<'_, SchedulerState<Req, S::Response>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S, Req> Shared<S, Req>
where
    S: Service<Req> + Clone + Send + 'static,
    S::Error: Into<Error>,
    S::Response: Send + 'static,
    S::Future: Send + 'static,
    Req: Send + 'static,
{
    /// Hands free slots to the head of the queue until either runs out.
    ///
    /// The wrapped service is invoked here, under the state lock, so it sees calls in queue order
    /// whatever order the runtime later polls them in.
    fn dispatch(self: &Arc<Self>) {
        let mut state = self.lock_state();
        while state.working < self.settings.max_concurrent() {
            let Some(call) = state.queue.pop_front() else {
                break;
            };
            state.working += 1;

            CallDispatched {
                in_flight: state.working,
                queued: state.queue.len(),
                waited: call.queued_at.elapsed(),
            }
            .emit();

            let ScheduledCall { request, reply, .. } = call;
            let response = self.start_call(request);
            self.spawn_settle(response, reply);
        }
    }

    /// Calls the service right away when it is ready, otherwise once it becomes ready.
    ///
    /// A panic inside the service's `call` becomes a [`SchedulerError::Panicked`] outcome.
    fn start_call(&self, request: Req) -> CallFuture<S::Response> {
        let mut service = self
            .service
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let started = panic::catch_unwind(AssertUnwindSafe(move || {
            let waker = noop_waker();
            let mut cx = Context::from_waker(&waker);
            match service.poll_ready(&mut cx) {
                Poll::Ready(Ok(())) => service.call(request).map_err(Into::<Error>::into).boxed(),
                Poll::Ready(Err(error)) => future::ready(Err(error.into())).boxed(),
                Poll::Pending => service.oneshot(request).map_err(Into::<Error>::into).boxed(),
            }
        }));

        started.unwrap_or_else(|_| {
            error!(message = "Service panicked while starting a call.");
            future::ready(Err(SchedulerError::Panicked.into())).boxed()
        })
    }

    /// Drives one started call on its own task, then holds its slot through the cool-down.
    fn spawn_settle(
        self: &Arc<Self>,
        response: CallFuture<S::Response>,
        reply: oneshot::Sender<Result<S::Response, Error>>,
    ) {
        let shared = Arc::clone(self);

        self.runtime.spawn(async move {
            let result = match AssertUnwindSafe(response).catch_unwind().await {
                Ok(result) => result,
                Err(_) => {
                    error!(message = "Service panicked while running a call.");
                    Err(SchedulerError::Panicked.into())
                }
            };
            if let Err(error) = &result {
                CallFailed { error }.emit();
            }
            if reply.send(result).is_err() {
                trace!(message = "Caller dropped its handle; discarding the result.");
            }

            shared.cool_down().await;
        });
    }

    async fn cool_down(self: Arc<Self>) {
        let cooldown = self.settings.cooldown();
        if !cooldown.is_zero() {
            tokio::time::sleep(cooldown).await;
        }

        let in_flight = {
            let mut state = self.lock_state();
            state.working = state.working.saturating_sub(1);
            state.working
        };
        SlotReleased { in_flight }.emit();

        self.dispatch();
    }
}

impl<S, Req> Clone for Scheduler<S, Req>
where
    S: Service<Req>,
{
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S, Req> fmt::Debug for Scheduler<S, Req>
where
    S: Service<Req>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock_state();
        f.debug_struct("Scheduler")
            .field("settings", &self.shared.settings)
            .field("working", &state.working)
            .field("queued", &state.queue.len())
            .finish()
    }
}

impl<S, Req> Service<Req> for Scheduler<S, Req>
where
    S: Service<Req> + Clone + Send + 'static,
    S::Error: Into<Error>,
    S::Response: Send + 'static,
    S::Future: Send + 'static,
    Req: Send + 'static,
{
    type Response = S::Response;
    type Error = Error;
    type Future = ResponseFuture<S::Response>;

    /// The queue is unbounded, so the scheduler is always ready.
    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Req) -> Self::Future {
        self.schedule(request)
    }
}
