//! Request and response shapes shared by the scheduler, the collector and the transport.
//!
//! The collector never talks to the network itself. It builds [`Request`]s and hands them to
//! whatever `tower::Service<Request, Response = Response>` it was given, usually a
//! [`Scheduler`](crate::throttle::Scheduler) wrapped around a
//! [`ReqwestSender`](reqwest_integration::ReqwestSender).

pub mod options;
pub mod paths;
pub mod reqwest_integration;

use http::{HeaderMap, Method, StatusCode};
use serde_json::{Map, Value};
use snafu::Snafu;

pub use options::{MergeDefaults, RequestOptions};
pub use paths::{clean_shop_name, collection_name, data_key, ensure_json_ext, remove_ext};

/// A transport-agnostic description of one outbound call.
#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    /// Path (or path and query) of the resource, relative to the transport's base URL.
    pub target: String,
    pub method: Method,
    /// Query parameters. Scalars are sent as-is, anything else as its JSON text.
    pub params: Map<String, Value>,
    pub body: Option<Value>,
    pub headers: HeaderMap,
}

impl Request {
    /// A bare `GET` of `target`.
    pub fn get(target: impl Into<String>) -> Self {
        Self::from_options(target, RequestOptions::default())
    }

    /// Builds a request from merged options. The method falls back to `GET`.
    pub fn from_options(target: impl Into<String>, options: RequestOptions) -> Self {
        Self {
            target: target.into(),
            method: options.method.unwrap_or(Method::GET),
            params: options.params,
            body: options.body,
            headers: options.headers,
        }
    }
}

/// What a transport hands back for a successful call.
#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    pub status: StatusCode,
    pub payload: Value,
}

impl Response {
    pub fn new(status: StatusCode, payload: Value) -> Self {
        Self { status, payload }
    }

    /// A `200 OK` carrying `payload`.
    pub fn ok(payload: Value) -> Self {
        Self::new(StatusCode::OK, payload)
    }

    pub fn into_payload(self) -> Value {
        self.payload
    }
}

/// Failures of the reqwest transport.
///
/// The scheduler and collector never look inside these; they travel boxed inside
/// [`crate::Error`] and can be recovered with `downcast_ref::<HttpError>()`.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum HttpError {
    /// An error occurred during the transport of the request (e.g., network issue, DNS).
    #[snafu(display("HTTP transport error: {}", source))]
    Transport { source: reqwest::Error },

    /// The request could not be turned into a URL or a reqwest request.
    #[snafu(display("Invalid HTTP request: {}", details))]
    InvalidRequest { details: String },

    /// The server responded with a non-success status code.
    #[snafu(display("HTTP server error response (status {}): {}", status, body))]
    ServerError { status: u16, body: String },

    #[snafu(display("HTTP request timed out"))]
    Timeout,

    /// The body of a successful response was not JSON.
    #[snafu(display("Failed to decode response body as JSON: {}", source))]
    Decode { source: serde_json::Error },
}

impl HttpError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            HttpError::ServerError { status, .. } => StatusCode::from_u16(*status).ok(),
            _ => None,
        }
    }
}
