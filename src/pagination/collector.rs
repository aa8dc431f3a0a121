use futures::future::try_join_all;
use http::Method;
use serde_json::Value;
use snafu::{OptionExt, ResultExt, ensure};
use tower::{Service, ServiceExt};

use super::{
    CollectError, Collection, CollectionNameSnafu, CollectorSettings, CountSnafu,
    InvalidPageLimitSnafu, LimitParamSnafu, MissingCountSnafu, PageParamSnafu, PageSnafu,
    UnexpectedPayloadSnafu, pages,
};
use crate::{
    Error,
    http::{MergeDefaults, Request, RequestOptions, Response, collection_name, data_key},
    internal_event::{CollectionAssembled, InternalEvent, PagesPlanned},
};

/// Fetches every page of a collection through `service` and flattens them.
///
/// `service` is normally a [`Scheduler`](crate::throttle::Scheduler), but anything that sends a
/// [`Request`] will do. The collector keeps no state between calls, so one collector can run
/// several [`get_all`](Collector::get_all)s at once; they compete for the same slots.
#[derive(Clone, Debug)]
pub struct Collector<S> {
    service: S,
    settings: CollectorSettings,
}

impl<S> Collector<S>
where
    S: Service<Request, Response = Response> + Clone,
    S::Error: Into<Error>,
{
    pub fn new(service: S) -> Self {
        Self::with_settings(service, CollectorSettings::default())
    }

    pub fn with_settings(service: S, settings: CollectorSettings) -> Self {
        Self { service, settings }
    }

    pub fn settings(&self) -> CollectorSettings {
        self.settings
    }

    /// Fetches the whole collection `target` points at.
    ///
    /// `options` apply to the count request and to every page request. Values set there take
    /// precedence over the collector's own `GET` and `limit`; a `limit` param replaces
    /// [`CollectorSettings::page_limit`] for both the page plan and the requests. `page` is the
    /// collector's to set, and `options` carrying one are rejected.
    ///
    /// Fails on the first failed request and returns nothing in that case, even if other pages
    /// arrived. Nothing is retried here.
    pub async fn get_all(
        &self,
        target: &str,
        options: RequestOptions,
    ) -> Result<Collection, CollectError> {
        let limit = effective_limit(&options, self.settings.page_limit)?;
        let collection = collection_name(target).context(CollectionNameSnafu { target })?;

        let count = self.fetch_count(&collection, &options).await?;
        let pages = pages(count, limit);
        PagesPlanned {
            collection: &collection,
            count,
            pages: *pages.end(),
        }
        .emit();

        let requests = pages.map(|page| {
            let defaults = RequestOptions::default()
                .method(Method::GET)
                .param("limit", limit)
                .param("page", page);
            let request = Request::from_options(target, options.clone().merge_defaults(defaults));
            self.fetch_page(&collection, page, request)
        });
        // Results come back in page order whatever order the responses arrived in.
        let items: Vec<Value> = try_join_all(requests).await?.into_iter().flatten().collect();

        CollectionAssembled {
            collection: &collection,
            items: items.len(),
        }
        .emit();
        Ok(Collection::new(collection, items))
    }

    async fn fetch_count(
        &self,
        collection: &str,
        options: &RequestOptions,
    ) -> Result<u64, CollectError> {
        let defaults = RequestOptions::default().method(Method::GET);
        let request = Request::from_options(
            format!("{collection}/count"),
            options.clone().merge_defaults(defaults),
        );

        let response = self
            .service
            .clone()
            .oneshot(request)
            .await
            .map_err(Into::<Error>::into)
            .context(CountSnafu { collection })?;

        match response.payload.get("count").and_then(Value::as_u64) {
            Some(count) => Ok(count),
            None => MissingCountSnafu {
                collection,
                payload: response.payload,
            }
            .fail(),
        }
    }

    async fn fetch_page(
        &self,
        collection: &str,
        page: u64,
        request: Request,
    ) -> Result<Vec<Value>, CollectError> {
        debug!(message = "Requesting page.", collection, page);
        let response = self
            .service
            .clone()
            .oneshot(request)
            .await
            .map_err(Into::<Error>::into)
            .context(PageSnafu { collection, page })?;

        extract_items(collection, page, response.payload)
    }
}

/// The page size actually sent: the caller's `limit` param when set, the configured one otherwise.
fn effective_limit(options: &RequestOptions, configured: u64) -> Result<u64, CollectError> {
    if let Some(page) = options.params.get("page") {
        return PageParamSnafu { page: page.clone() }.fail();
    }
    let limit = match options.params.get("limit") {
        None => configured,
        Some(value) => value
            .as_u64()
            .or_else(|| value.as_str()?.parse().ok())
            .context(LimitParamSnafu {
                limit: value.clone(),
            })?,
    };
    ensure!(limit > 0, InvalidPageLimitSnafu);
    Ok(limit)
}

/// Takes the item list out from under the payload's data key.
fn extract_items(
    collection: &str,
    page: u64,
    mut payload: Value,
) -> Result<Vec<Value>, CollectError> {
    let key = data_key(&payload).map(str::to_owned);
    if let Some(Value::Array(items)) = key.and_then(|key| payload.get_mut(&key)) {
        return Ok(std::mem::take(items));
    }
    UnexpectedPayloadSnafu {
        collection,
        page,
        payload,
    }
    .fail()
}

/// [`Collector::get_all`] with default settings.
pub async fn get_all<S>(
    service: S,
    target: &str,
    options: RequestOptions,
) -> Result<Collection, CollectError>
where
    S: Service<Request, Response = Response> + Clone,
    S::Error: Into<Error>,
{
    Collector::new(service).get_all(target, options).await
}
