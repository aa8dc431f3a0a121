//! A ready-made client: a [`ReqwestSender`] behind a [`Scheduler`], plus a [`Collector`] sharing
//! the same scheduler.

use std::time::Duration;

use bon::Builder;
use http::Method;
use serde::Deserialize;
use serde_json::Value;
use snafu::{OptionExt, ResultExt, Snafu};
use tower::ServiceExt;

use crate::{
    Error,
    http::{
        MergeDefaults, Request, RequestOptions, clean_shop_name, collection_name, data_key,
        reqwest_integration::ReqwestSender,
    },
    pagination::{CollectError, Collection, Collector, CollectorSettings},
    throttle::{Scheduler, SchedulerSettings},
};

#[derive(Debug, Snafu)]
pub enum ClientError {
    #[snafu(display("failed to build the HTTP client: {source}"))]
    Initialization { source: reqwest::Error },

    #[snafu(display("{method} {target} failed: {source}"))]
    Request {
        method: Method,
        target: String,
        source: Error,
    },

    #[snafu(display("{source}"))]
    Collect { source: CollectError },

    #[snafu(display("response for {target} does not name a single resource with an id"))]
    MetafieldOwner { target: String },
}

/// Configuration of a [`Client`].
#[derive(Clone, Debug, Builder, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Every target is resolved against this URL.
    #[builder(into)]
    pub base_url: String,

    /// How long a slot stays occupied after its call settled.
    #[serde(default = "default_cooldown_ms")]
    #[builder(default = default_cooldown_ms())]
    pub cooldown_ms: u64,

    #[serde(default = "default_max_concurrent")]
    #[builder(default = default_max_concurrent())]
    pub max_concurrent: usize,

    /// Items per page for [`Client::get_all`].
    #[serde(default = "default_page_limit")]
    #[builder(default = default_page_limit())]
    pub page_limit: u64,
}

const fn default_cooldown_ms() -> u64 {
    1000
}

const fn default_max_concurrent() -> usize {
    2
}

const fn default_page_limit() -> u64 {
    250
}

impl ClientConfig {
    /// Default settings for the admin API of `shop`, given as a bare name, a domain or a URL.
    pub fn for_shop(shop: &str) -> Self {
        Self::builder()
            .base_url(format!(
                "https://{}.myshopify.com/admin",
                clean_shop_name(shop)
            ))
            .build()
    }

    fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings::new(Duration::from_millis(self.cooldown_ms), self.max_concurrent)
    }

    fn collector_settings(&self) -> CollectorSettings {
        CollectorSettings::builder()
            .page_limit(self.page_limit)
            .build()
    }
}

/// Sends every request through one scheduler, so plain calls and the pages of
/// [`get_all`](Client::get_all) share the same slots.
///
/// Cloning is cheap and clones share the scheduler.
#[derive(Clone, Debug)]
pub struct Client {
    scheduler: Scheduler<ReqwestSender, Request>,
    collector: Collector<Scheduler<ReqwestSender, Request>>,
}

impl Client {
    /// Builds a client with a default `reqwest::Client`.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a Tokio runtime.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(90))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context(InitializationSnafu)?;
        Ok(Self::with_reqwest_client(config, client))
    }

    /// Builds a client around a pre-configured `reqwest::Client`, e.g. one carrying an access
    /// token in its default headers.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a Tokio runtime.
    pub fn with_reqwest_client(config: ClientConfig, client: reqwest::Client) -> Self {
        let sender = ReqwestSender::new_with_client(client, &config.base_url);
        let scheduler = Scheduler::new(sender, config.scheduler_settings());
        let collector = Collector::with_settings(scheduler.clone(), config.collector_settings());

        info!(
            message = "Client initialized.",
            base_url = %config.base_url,
            max_concurrent = config.max_concurrent,
            cooldown_ms = config.cooldown_ms,
        );
        Self {
            scheduler,
            collector,
        }
    }

    pub fn scheduler(&self) -> &Scheduler<ReqwestSender, Request> {
        &self.scheduler
    }

    /// Sends a request built from `options` alone. The method falls back to `GET`.
    pub async fn request(
        &self,
        target: &str,
        options: RequestOptions,
    ) -> Result<Value, ClientError> {
        let request = Request::from_options(target, options);
        let method = request.method.clone();
        let response = self
            .scheduler
            .clone()
            .oneshot(request)
            .await
            .context(RequestSnafu { method, target })?;
        Ok(response.into_payload())
    }

    pub async fn get(&self, target: &str, options: RequestOptions) -> Result<Value, ClientError> {
        self.send(Method::GET, target, None, options).await
    }

    pub async fn post(
        &self,
        target: &str,
        body: Value,
        options: RequestOptions,
    ) -> Result<Value, ClientError> {
        self.send(Method::POST, target, Some(body), options).await
    }

    pub async fn put(
        &self,
        target: &str,
        body: Value,
        options: RequestOptions,
    ) -> Result<Value, ClientError> {
        self.send(Method::PUT, target, Some(body), options).await
    }

    pub async fn patch(
        &self,
        target: &str,
        body: Value,
        options: RequestOptions,
    ) -> Result<Value, ClientError> {
        self.send(Method::PATCH, target, Some(body), options).await
    }

    pub async fn delete(
        &self,
        target: &str,
        options: RequestOptions,
    ) -> Result<Value, ClientError> {
        self.send(Method::DELETE, target, None, options).await
    }

    pub async fn head(&self, target: &str, options: RequestOptions) -> Result<Value, ClientError> {
        self.send(Method::HEAD, target, None, options).await
    }

    /// Fetches every page of the collection at `target`. See [`Collector::get_all`].
    pub async fn get_all(
        &self,
        target: &str,
        options: RequestOptions,
    ) -> Result<Collection, ClientError> {
        self.collector
            .get_all(target, options)
            .await
            .context(CollectSnafu)
    }

    /// Fetches a single resource and attaches its metafields to it.
    ///
    /// `products/632910392` gives `{ "product": { "id": 632910392, ..., "metafields": [...] } }`,
    /// the metafields coming from `products/632910392/metafields`. The shop's own metafields live
    /// at the top-level `metafields` endpoint. Both requests go through the scheduler.
    pub async fn get_with_metafields(
        &self,
        target: &str,
        options: RequestOptions,
    ) -> Result<Value, ClientError> {
        let mut payload = self.get(target, options).await?;

        let owner = collection_name(target).context(MetafieldOwnerSnafu { target })?;
        let key = data_key(&payload)
            .filter(|key| payload[*key].is_object())
            .map(str::to_owned)
            .context(MetafieldOwnerSnafu { target })?;

        let metafields_target = if owner == "shop" {
            "metafields".to_owned()
        } else {
            let id = match payload[key.as_str()].get("id") {
                Some(Value::String(id)) => id.clone(),
                Some(id @ Value::Number(_)) => id.to_string(),
                _ => return MetafieldOwnerSnafu { target }.fail(),
            };
            format!("{owner}/{id}/metafields")
        };

        let mut response = self
            .get(&metafields_target, RequestOptions::default())
            .await?;
        let metafields = response
            .get_mut("metafields")
            .map(Value::take)
            .unwrap_or_default();
        if let Some(Value::Object(resource)) = payload.get_mut(key.as_str()) {
            resource.insert("metafields".to_owned(), metafields);
        }
        Ok(payload)
    }

    /// The verb and body given here win over `options`; everything else comes from `options`.
    async fn send(
        &self,
        method: Method,
        target: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Result<Value, ClientError> {
        let explicit = RequestOptions {
            method: Some(method),
            body,
            ..Default::default()
        };
        self.request(target, explicit.merge_defaults(options)).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_json, method, path, query_param},
    };

    use super::*;
    use crate::{http::HttpError, test_utils::trace_init};

    fn config(server: &MockServer) -> ClientConfig {
        ClientConfig::builder()
            .base_url(format!("{}/admin", server.uri()))
            .cooldown_ms(0)
            .build()
    }

    #[test]
    fn config_defaults() {
        let config = ClientConfig::for_shop("https://acme.myshopify.com/");
        assert_eq!(config.base_url, "https://acme.myshopify.com/admin");
        assert_eq!(config.cooldown_ms, 1000);
        assert_eq!(config.max_concurrent, 2);
        assert_eq!(config.page_limit, 250);

        let config: ClientConfig = serde_json::from_value(json!({
            "base_url": "https://acme.myshopify.com/admin",
            "page_limit": 50,
        }))
        .unwrap();
        assert_eq!(config.cooldown_ms, 1000);
        assert_eq!(config.page_limit, 50);

        assert!(
            serde_json::from_value::<ClientConfig>(json!({ "base_url": "x", "limit": 1 }))
                .is_err()
        );
    }

    #[tokio::test]
    async fn get_all_over_http() {
        trace_init();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/admin/products/count.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "count": 3 })))
            .expect(1)
            .mount(&server)
            .await;
        for (page, items) in [("1", json!([{ "id": 1 }, { "id": 2 }])), ("2", json!([{ "id": 3 }]))]
        {
            Mock::given(method("GET"))
                .and(path("/admin/products.json"))
                .and(query_param("limit", "2"))
                .and(query_param("page", page))
                .and(query_param("status", "active"))
                .respond_with(
                    ResponseTemplate::new(200).set_body_json(json!({ "products": items })),
                )
                .expect(1)
                .mount(&server)
                .await;
        }

        let client = Client::new(ClientConfig {
            page_limit: 2,
            ..config(&server)
        })
        .unwrap();
        let collection = client
            .get_all("products", RequestOptions::default().param("status", "active"))
            .await
            .unwrap();

        assert_eq!(
            Value::from(collection),
            json!({ "products": [{ "id": 1 }, { "id": 2 }, { "id": 3 }] })
        );
    }

    #[tokio::test]
    async fn verbs_send_method_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/admin/products.json"))
            .and(body_json(json!({ "product": { "title": "hat" } })))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({ "product": { "id": 7 } })),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/admin/products/7.json"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = Client::new(config(&server)).unwrap();

        // The verb wins over a method smuggled in through the options.
        let created = client
            .post(
                "products",
                json!({ "product": { "title": "hat" } }),
                RequestOptions::default().method(Method::GET),
            )
            .await
            .unwrap();
        assert_eq!(created, json!({ "product": { "id": 7 } }));

        let deleted = client
            .delete("products/7", RequestOptions::default())
            .await
            .unwrap();
        assert_eq!(deleted, Value::Null);
    }

    #[tokio::test]
    async fn attaches_metafields_to_the_resource() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/admin/products/632910392.json"))
            .and(query_param("fields", "id,title"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "product": { "id": 632910392, "title": "IPod Nano" }
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/admin/products/632910392/metafields.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "metafields": [{ "key": "warehouse", "value": 25 }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = Client::new(config(&server)).unwrap();
        let product = client
            .get_with_metafields(
                "/products/632910392",
                RequestOptions::default().param("fields", "id,title"),
            )
            .await
            .unwrap();

        assert_eq!(
            product,
            json!({
                "product": {
                    "id": 632910392,
                    "title": "IPod Nano",
                    "metafields": [{ "key": "warehouse", "value": 25 }]
                }
            })
        );
    }

    #[tokio::test]
    async fn shop_metafields_come_from_the_top_level_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/admin/shop.json"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "shop": { "name": "acme" } })),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/admin/metafields.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "metafields": [] })))
            .expect(1)
            .mount(&server)
            .await;

        let client = Client::new(config(&server)).unwrap();
        let shop = client
            .get_with_metafields("shop", RequestOptions::default())
            .await
            .unwrap();

        assert_eq!(shop, json!({ "shop": { "name": "acme", "metafields": [] } }));
    }

    #[tokio::test]
    async fn metafields_need_a_resource_with_an_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/admin/products/1.json"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "product": { "title": "x" } })),
            )
            .mount(&server)
            .await;

        let client = Client::new(config(&server)).unwrap();
        let error = client
            .get_with_metafields("products/1", RequestOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(error, ClientError::MetafieldOwner { .. }));
    }

    #[tokio::test]
    async fn http_errors_are_downcastable() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/admin/products/7.json"))
            .respond_with(
                ResponseTemplate::new(422)
                    .set_body_json(json!({ "errors": { "title": ["can't be blank"] } })),
            )
            .mount(&server)
            .await;

        let client = Client::new(config(&server)).unwrap();
        let error = client
            .put("products/7", json!({ "product": { "title": "" } }), Default::default())
            .await
            .unwrap_err();

        match error {
            ClientError::Request { method, source, .. } => {
                assert_eq!(method, Method::PUT);
                let http_error = source.downcast_ref::<HttpError>().unwrap();
                assert_eq!(http_error.status().map(|s| s.as_u16()), Some(422));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn requests_share_one_budget() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/admin/shop.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "shop": {} })))
            .expect(3)
            .mount(&server)
            .await;

        let client = Client::new(ClientConfig {
            cooldown_ms: 100,
            max_concurrent: 1,
            ..config(&server)
        })
        .unwrap();

        let other = client.clone();
        let start = std::time::Instant::now();
        let (a, b, c) = tokio::join!(
            client.get("shop", RequestOptions::default()),
            client.get("shop", RequestOptions::default()),
            other.get("shop", RequestOptions::default()),
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        // Third call waits for two cool-downs.
        assert!(start.elapsed() >= Duration::from_millis(200));
    }
}
