//! Transport abstraction.
//!
//! The dispatcher and the authenticator never talk to `reqwest` directly; they go through the
//! [`Transport`] trait. [`HttpTransport`] is the production implementation. Tests substitute a
//! recording transport to count network invocations.
//!
//! A transport reports every HTTP response it receives, whatever the status code. Deciding
//! what a non-200 status means is the caller's job. Only failures to obtain a response at
//! all surface as [`MpesaError::Transport`](crate::MpesaError::Transport).

use std::fmt;

use crate::error::Result;

pub mod config;
pub mod http;
mod recording;

pub use config::HttpConfig;
pub use http::HttpTransport;
pub use recording::{RecordedRequest, RecordingTransport};

/// Credentials attached to a request.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Authorization<'a> {
    /// HTTP Basic authentication.
    Basic {
        /// User name (the consumer key).
        username: &'a str,
        /// Password (the consumer secret).
        password: &'a str,
    },
    /// `Authorization: Bearer <token>`.
    Bearer(&'a str),
}

impl fmt::Debug for Authorization<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
            Self::Bearer(_) => f.debug_tuple("Bearer").field(&"[REDACTED]").finish(),
        }
    }
}

/// Parameters of a single request.
#[derive(Debug, Clone)]
pub struct RequestContext<'a> {
    /// Provider base URL (e.g. <https://sandbox.safaricom.co.ke>).
    pub base_url: &'a str,
    /// Request path (e.g. "/mpesa/b2c/v1/paymentrequest").
    pub path: &'a str,
    /// Query string parameters.
    pub query: Vec<(&'a str, &'a str)>,
    /// Content-Type header value (if applicable).
    pub content_type: Option<&'a str>,
    /// Credentials to attach.
    pub authorization: Option<Authorization<'a>>,
}

impl<'a> RequestContext<'a> {
    /// Creates a context with no query, content type or credentials.
    #[must_use]
    pub fn new(base_url: &'a str, path: &'a str) -> Self {
        Self {
            base_url,
            path,
            query: Vec::new(),
            content_type: None,
            authorization: None,
        }
    }

    /// Returns the URL without query string.
    #[must_use]
    pub fn url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.path)
    }
}

/// Response from a transport operation.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw response body bytes.
    pub body: Vec<u8>,
}

impl TransportResponse {
    /// Returns the body decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Returns true for status 200.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Protocol used to reach the provider.
///
/// # Examples
///
/// ```rust,no_run
/// use mpesa_bridge::transport::{HttpTransport, RequestContext, Transport};
///
/// # async fn example() -> mpesa_bridge::Result<()> {
/// let transport = HttpTransport::new()?;
/// let mut ctx = RequestContext::new("https://sandbox.safaricom.co.ke", "/oauth/v1/generate");
/// ctx.query.push(("grant_type", "client_credentials"));
///
/// let response = transport.get(ctx).await?;
/// println!("Status: {}", response.status);
/// # Ok(())
/// # }
/// ```
pub trait Transport: Send + Sync {
    /// Executes a GET request.
    ///
    /// # Errors
    ///
    /// Returns a transport error if no response is received, or a configuration error if the
    /// request itself is malformed.
    fn get<'a>(
        &'a self,
        ctx: RequestContext<'a>,
    ) -> impl Future<Output = Result<TransportResponse>> + Send + 'a;

    /// Executes a POST request with body.
    ///
    /// # Errors
    ///
    /// Returns a transport error if no response is received, or a configuration error if the
    /// request itself is malformed.
    fn post<'a>(
        &'a self,
        ctx: RequestContext<'a>,
        body: &'a [u8],
    ) -> impl Future<Output = Result<TransportResponse>> + Send + 'a;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_context_new() {
        let ctx = RequestContext::new("https://example.com/", "/mpesa/b2c/v1/paymentrequest");
        assert_eq!(ctx.url(), "https://example.com/mpesa/b2c/v1/paymentrequest");
        assert!(ctx.query.is_empty());
        assert!(ctx.content_type.is_none());
        assert!(ctx.authorization.is_none());
    }

    #[test]
    fn test_authorization_debug_redacts_secrets() {
        let basic = Authorization::Basic { username: "key", password: "hunter2" };
        let debug_str = format!("{basic:?}");
        assert!(debug_str.contains("key"));
        assert!(!debug_str.contains("hunter2"));

        let bearer = Authorization::Bearer("token-abc");
        assert!(!format!("{bearer:?}").contains("token-abc"));
    }

    #[test]
    fn test_transport_response_text() {
        let response =
            TransportResponse { status: 500, body: b"Internal Error".to_vec() };
        assert_eq!(response.text(), "Internal Error");
        assert!(!response.is_ok());
    }

    #[test]
    fn test_transport_response_invalid_utf8() {
        let response = TransportResponse { status: 200, body: vec![0xff, 0xfe] };
        assert!(response.is_ok());
        assert_eq!(response.text().chars().count(), 2);
    }
}
