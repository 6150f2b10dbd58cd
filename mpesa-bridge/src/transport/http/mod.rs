//! HTTP transport implementation.
//!
//! This module provides the production transport on top of reqwest.

use reqwest::{Client, RequestBuilder};
use tracing::{debug, instrument};
use url::Url;

use super::config::HttpConfig;
use crate::{
    error::{MpesaError, Result},
    transport::{Authorization, RequestContext, Transport, TransportResponse},
};

/// Validates URL for security constraints.
///
/// Credentials travel in every request, so only HTTPS is accepted.
fn validate_url(url: &Url) -> Result<()> {
    if url.scheme() != "https" {
        return Err(MpesaError::configuration(format!(
            "only HTTPS base URLs are allowed, got scheme '{}'",
            url.scheme()
        )));
    }
    if url.host_str().is_none() {
        return Err(MpesaError::configuration(format!("base URL has no host: {url}")));
    }
    Ok(())
}

/// Rejects paths containing directory traversal sequences.
fn sanitize_path(path: &str) -> Result<&str> {
    if path.contains("..") || path.contains("//") {
        return Err(MpesaError::configuration("invalid path: traversal sequences not allowed"));
    }
    if !path.is_empty() && !path.starts_with('/') {
        return Err(MpesaError::configuration("path must start with '/'"));
    }
    Ok(path)
}

/// HTTPS transport using reqwest.
///
/// Connections are pooled and kept alive for the lifetime of the transport, so construct one
/// per process and share it.
///
/// # Examples
///
/// ```
/// use mpesa_bridge::transport::{HttpConfig, HttpTransport};
///
/// let config = HttpConfig { timeout_secs: 60, ..HttpConfig::default() };
/// let transport = HttpTransport::with_config(&config).unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Creates a new HTTP transport with default settings.
    ///
    /// Default configuration:
    /// - Pool max idle per host: 10
    /// - Timeout: 30 seconds
    /// - Connect timeout: 10 seconds
    ///
    /// # Errors
    ///
    /// Returns a transport error if the TLS backend cannot be initialised.
    pub fn new() -> Result<Self> {
        Self::with_config(&HttpConfig::default())
    }

    /// Creates HTTP transport with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` is out of bounds, or a transport error if
    /// the HTTP client cannot be built.
    pub fn with_config(config: &HttpConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::builder()
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self { client })
    }

    fn authorize(
        request: RequestBuilder,
        authorization: Option<Authorization<'_>>,
    ) -> RequestBuilder {
        match authorization {
            Some(Authorization::Basic { username, password }) => {
                request.basic_auth(username, Some(password))
            }
            Some(Authorization::Bearer(token)) => request.bearer_auth(token),
            None => request,
        }
    }

    #[instrument(
        skip(self, ctx, body),
        fields(base_url = ctx.base_url, path = ctx.path, status)
    )]
    async fn execute_request(
        &self,
        ctx: RequestContext<'_>,
        method: &str,
        body: Option<&[u8]>,
    ) -> Result<TransportResponse> {
        let url = Url::parse(ctx.base_url)
            .map_err(|e| MpesaError::configuration(format!("invalid base URL: {e}")))?;
        validate_url(&url)?;

        let path = sanitize_path(ctx.path)?;

        let full_url = format!("{}{path}", ctx.base_url.trim_end_matches('/'));

        let mut request = match method {
            "GET" => self.client.get(&full_url),
            "POST" => self.client.post(&full_url),
            _ => {
                return Err(MpesaError::configuration(format!(
                    "unsupported HTTP method: {method}"
                )));
            }
        };

        if !ctx.query.is_empty() {
            request = request.query(&ctx.query);
        }

        if let Some(content_type) = ctx.content_type {
            request = request.header("Content-Type", content_type);
        }

        request = Self::authorize(request, ctx.authorization);

        if let Some(body_bytes) = body {
            request = request.body(body_bytes.to_vec());
        }

        let response = request.send().await?;

        let status = response.status().as_u16();
        tracing::Span::current().record("status", status);

        let response_body = response.bytes().await?.to_vec();
        debug!(bytes = response_body.len(), "response received");

        Ok(TransportResponse { status, body: response_body })
    }
}

impl Transport for HttpTransport {
    async fn get<'a>(&'a self, ctx: RequestContext<'a>) -> Result<TransportResponse> {
        self.execute_request(ctx, "GET", None).await
    }

    async fn post<'a>(
        &'a self,
        ctx: RequestContext<'a>,
        body: &'a [u8],
    ) -> Result<TransportResponse> {
        self.execute_request(ctx, "POST", Some(body)).await
    }
}
