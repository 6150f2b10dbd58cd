//! In-memory transport that records requests and replays scripted responses.
//!
//! Used by tests to count network invocations and by the CLI's dry-run mode to show the exact
//! request that would be sent.

use std::{
    collections::VecDeque,
    sync::{Mutex, PoisonError},
};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::Value;

use crate::{
    error::{MpesaError, Result},
    transport::{Authorization, RequestContext, Transport, TransportResponse},
};

/// A request captured by [`RecordingTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    /// `GET` or `POST`.
    pub method: &'static str,
    /// Full URL without query string.
    pub url: String,
    /// Request path.
    pub path: String,
    /// Query parameters.
    pub query: Vec<(String, String)>,
    /// `Authorization` header value as it would be sent.
    pub authorization: Option<String>,
    /// Content-Type header, if any.
    pub content_type: Option<String>,
    /// Request body.
    pub body: Vec<u8>,
}

impl RecordedRequest {
    /// Decodes the body as JSON.
    #[must_use]
    pub fn json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

/// Transport that never touches the network.
///
/// Responses are served in the order they were pushed. Once the script runs out, every
/// request receives `200 {}`.
///
/// # Examples
///
/// ```
/// use mpesa_bridge::transport::{RecordingTransport, RequestContext, Transport};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let transport = RecordingTransport::new();
/// transport.push_response(500, "Internal Error");
///
/// let response = transport
///     .post(RequestContext::new("https://example.com", "/pay"), b"{}")
///     .await
///     .unwrap();
/// assert_eq!(response.status, 500);
/// assert_eq!(transport.calls_to("/pay"), 1);
/// # }
/// ```
#[derive(Debug, Default)]
pub struct RecordingTransport {
    script: Mutex<VecDeque<Result<TransportResponse>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl RecordingTransport {
    /// Creates a transport with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response with the given status and body.
    pub fn push_response(&self, status: u16, body: impl Into<Vec<u8>>) -> &Self {
        self.push(Ok(TransportResponse { status, body: body.into() }))
    }

    /// Queues a JSON response.
    pub fn push_json(&self, status: u16, body: &Value) -> &Self {
        self.push(Ok(TransportResponse { status, body: body.to_string().into_bytes() }))
    }

    /// Queues a failure to obtain any response.
    pub fn push_error(&self, message: impl Into<String>) -> &Self {
        self.push(Err(MpesaError::Transport(message.into())))
    }

    fn push(&self, response: Result<TransportResponse>) -> &Self {
        self.script.lock().unwrap_or_else(PoisonError::into_inner).push_back(response);
        self
    }

    /// Returns every request received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Returns the most recent request.
    #[must_use]
    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).last().cloned()
    }

    /// Returns the number of requests received.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns the number of requests received for `path`.
    #[must_use]
    pub fn calls_to(&self, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|request| request.path == path)
            .count()
    }

    fn record(
        &self,
        method: &'static str,
        ctx: &RequestContext<'_>,
        body: &[u8],
    ) -> Result<TransportResponse> {
        let request = RecordedRequest {
            method,
            url: ctx.url(),
            path: ctx.path.to_owned(),
            query: ctx.query.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect(),
            authorization: ctx.authorization.map(header_value),
            content_type: ctx.content_type.map(str::to_owned),
            body: body.to_vec(),
        };
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).push(request);

        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| Ok(TransportResponse { status: 200, body: b"{}".to_vec() }))
    }
}

fn header_value(authorization: Authorization<'_>) -> String {
    match authorization {
        Authorization::Basic { username, password } => {
            format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
        }
        Authorization::Bearer(token) => format!("Bearer {token}"),
    }
}

impl Transport for RecordingTransport {
    async fn get<'a>(&'a self, ctx: RequestContext<'a>) -> Result<TransportResponse> {
        self.record("GET", &ctx, &[])
    }

    async fn post<'a>(
        &'a self,
        ctx: RequestContext<'a>,
        body: &'a [u8],
    ) -> Result<TransportResponse> {
        self.record("POST", &ctx, body)
    }
}
