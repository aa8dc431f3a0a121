use std::{
    sync::Arc,
    task::{Context, Poll},
};

use futures::future::BoxFuture;
use http::StatusCode;
use reqwest::Url;
use serde_json::{Map, Value};
use tower::Service;

use super::{HttpError, Request, Response, ensure_json_ext};

/// A `tower::Service` that sends [`Request`]s with a `reqwest::Client`.
///
/// Targets are resolved against `base_url` and always get a `.json` extension, so
/// `products/count` becomes `<base_url>/products/count.json`. Absolute targets are used as they
/// are, apart from the extension.
///
/// Anything credential-related (tokens, default headers) belongs on the `reqwest::Client` passed
/// to [`ReqwestSender::new_with_client`].
#[derive(Clone, Debug)]
pub struct ReqwestSender {
    client: reqwest::Client,
    base_url: Arc<str>,
}

impl ReqwestSender {
    pub fn new(base_url: impl AsRef<str>) -> Self {
        Self::new_with_client(reqwest::Client::new(), base_url)
    }

    pub fn new_with_client(client: reqwest::Client, base_url: impl AsRef<str>) -> Self {
        Self {
            client,
            base_url: Arc::from(base_url.as_ref().trim_end_matches('/')),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, request: &Request) -> Result<Url, HttpError> {
        let target = ensure_json_ext(&request.target);
        let mut url = match Url::parse(&target) {
            Ok(absolute) => absolute,
            Err(_) => {
                let joined = format!("{}/{}", self.base_url, target.trim_start_matches('/'));
                Url::parse(&joined).map_err(|e| HttpError::InvalidRequest {
                    details: format!("Invalid URL '{}': {}", joined, e),
                })?
            }
        };
        let pairs = query_pairs(&request.params);
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
        Ok(url)
    }
}

/// Strings go out verbatim, other scalars as their JSON text. `null` params are left out.
fn query_pairs(params: &Map<String, Value>) -> Vec<(&str, String)> {
    params
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.as_str(), value)
        })
        .collect()
}

/// The message to report for a failed response: its `errors` field when the body is JSON and has
/// one, otherwise the raw body.
fn error_message(body: String) -> String {
    match serde_json::from_str::<Value>(&body) {
        Ok(Value::Object(mut map)) => match map.remove("errors") {
            Some(Value::String(message)) => message,
            Some(errors) => errors.to_string(),
            None => body,
        },
        _ => body,
    }
}

impl Service<Request> for ReqwestSender {
    type Response = Response;
    type Error = HttpError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let url = match self.url_for(&request) {
            Ok(url) => url,
            Err(error) => return Box::pin(async move { Err(error) }),
        };
        debug!("{} to {}", request.method, url);

        let mut request_builder = self
            .client
            .request(request.method, url)
            .headers(request.headers);
        if let Some(body) = &request.body {
            request_builder = request_builder.json(body);
        }

        let request_future = request_builder.send();
        Box::pin(async move {
            match request_future.await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let bytes = response
                            .bytes()
                            .await
                            .map_err(|source| HttpError::Transport { source })?;
                        let payload = if bytes.is_empty() {
                            Value::Null
                        } else {
                            serde_json::from_slice(&bytes)
                                .map_err(|source| HttpError::Decode { source })?
                        };
                        Ok(Response::new(status, payload))
                    } else {
                        let error_body = response
                            .text()
                            .await
                            .unwrap_or_else(|_| "Could not read error body".to_string());
                        let error_body = error_message(error_body);

                        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                            warn!(
                                status = %status,
                                error_body = %error_body,
                                "Server error or rate limited"
                            );
                        } else if status.is_client_error() {
                            error!(
                                status = %status,
                                error_body = %error_body,
                                "Client error"
                            );
                        }

                        Err(HttpError::ServerError {
                            status: status.as_u16(),
                            body: error_body,
                        })
                    }
                }
                Err(e) => {
                    if e.is_timeout() {
                        warn!(error = %e, "Request timed out");
                        Err(HttpError::Timeout)
                    } else if e.is_builder() {
                        Err(HttpError::InvalidRequest {
                            details: e.to_string(),
                        })
                    } else {
                        error!(error = %e, "Request failed");
                        Err(HttpError::Transport { source: e })
                    }
                }
            }
        })
    }
}
