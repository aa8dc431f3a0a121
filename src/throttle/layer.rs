use std::marker::PhantomData;

use tower::{Layer, Service};

use super::{Scheduler, SchedulerSettings};
use crate::Error;

/// Wraps services in a [`Scheduler`] so it can sit in a `tower::ServiceBuilder` stack.
///
/// Each call to [`Layer::layer`] creates a new, independent scheduler.
#[derive(Debug)]
pub struct SchedulerLayer<Req> {
    settings: SchedulerSettings,
    _request: PhantomData<fn(Req)>,
}

impl<Req> SchedulerLayer<Req> {
    pub fn new(settings: SchedulerSettings) -> Self {
        SchedulerLayer {
            settings,
            _request: PhantomData,
        }
    }
}

impl<Req> Clone for SchedulerLayer<Req> {
    fn clone(&self) -> Self {
        Self::new(self.settings)
    }
}

impl<S, Req> Layer<S> for SchedulerLayer<Req>
where
    S: Service<Req> + Clone + Send + 'static,
    S::Error: Into<Error>,
    S::Response: Send + 'static,
    S::Future: Send + 'static,
    Req: Send + 'static,
{
    type Service = Scheduler<S, Req>;

    fn layer(&self, service: S) -> Self::Service {
        Scheduler::new(service, self.settings)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::{self, Instant};
    use tower::{ServiceBuilder, ServiceExt};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn builder_stack_is_throttled() {
        let settings = SchedulerSettings::new(Duration::from_millis(100), 1);
        let service = ServiceBuilder::new()
            .layer(SchedulerLayer::new(settings))
            .service(tower::service_fn(|n: u32| async move { Ok::<_, Error>(n) }));

        let start = Instant::now();
        assert_eq!(service.clone().oneshot(1).await.unwrap(), 1);
        assert_eq!(service.clone().oneshot(2).await.unwrap(), 2);
        assert!(start.elapsed() >= Duration::from_millis(100));

        time::sleep(Duration::from_millis(101)).await;
        assert_eq!(service.in_flight(), 0);
    }
}
