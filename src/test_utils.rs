use std::sync::{Arc, Mutex};

use serde_json::Value;
use tower::util::BoxCloneService;

use crate::http::{Request, Response};

pub fn trace_init() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Shared log of every request a fake sender has seen, in invocation order.
#[derive(Clone, Default)]
pub struct RequestLog(Arc<Mutex<Vec<Request>>>);

impl RequestLog {
    pub fn push(&self, request: Request) {
        self.0.lock().unwrap().push(request);
    }

    pub fn requests(&self) -> Vec<Request> {
        self.0.lock().unwrap().clone()
    }

    pub fn targets(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.target).collect()
    }

    pub fn pages(&self) -> Vec<u64> {
        self.requests()
            .iter()
            .filter_map(|r| r.params.get("page").and_then(Value::as_u64))
            .collect()
    }
}

/// Answers `count` requests with `count` and page requests with `items_per_page[page - 1]`
/// under the `key` data key.
pub fn paged_backend(
    log: RequestLog,
    key: &'static str,
    count: u64,
    items_per_page: Vec<Vec<Value>>,
) -> BoxCloneService<Request, Response, crate::Error> {
    let items_per_page = Arc::new(items_per_page);
    BoxCloneService::new(tower::service_fn(move |request: Request| {
        let log = log.clone();
        let items_per_page = Arc::clone(&items_per_page);
        async move {
            log.push(request.clone());
            if request.target.ends_with("/count") {
                return Ok::<_, crate::Error>(Response::ok(serde_json::json!({ "count": count })));
            }
            let page = request
                .params
                .get("page")
                .and_then(Value::as_u64)
                .ok_or("page request without a page parameter")?;
            let items = items_per_page
                .get(page as usize - 1)
                .cloned()
                .unwrap_or_default();
            Ok(Response::ok(serde_json::json!({ key: items })))
        }
    }))
}
