//! OAuth2 client-credentials authentication.
//!
//! Every transaction is sent with a bearer token obtained from the provider's token endpoint.
//! Tokens are cached per application identity, so several consumer key/secret pairs can be
//! configured side by side (`apps.<name>.consumer_key`).
//!
//! A token lives in the cache for the lifetime the provider declares minus
//! [`EXPIRY_MARGIN_SECS`]. Lifetimes at or below the margin are never cached.
//!
//! Cache access runs on tokio's blocking pool, since a file-backed store locks and rewrites a
//! file. A cache that cannot be read or written is logged and bypassed: the token is fetched
//! from the provider and returned uncached.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::{
    cache::CredentialCache,
    config::Config,
    error::{MpesaError, Result},
    transport::{Authorization, RequestContext, Transport},
};

/// Token endpoint path, relative to the base URL.
pub const TOKEN_PATH: &str = "/oauth/v1/generate";

/// Seconds subtracted from the provider's declared token lifetime.
pub const EXPIRY_MARGIN_SECS: i64 = 60;

const TOKEN_KEY_PREFIX: &str = "mpesa_access_token:";

const INVALID_CREDENTIALS: &str = "invalid credentials";

/// Fetches and caches bearer tokens.
#[derive(Debug)]
pub struct Authenticator<T> {
    config: Arc<Config>,
    cache: CredentialCache,
    transport: Arc<T>,
}

impl<T> Clone for Authenticator<T> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            cache: self.cache.clone(),
            transport: Arc::clone(&self.transport),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<Value>,
}

impl<T: Transport> Authenticator<T> {
    /// Creates an authenticator.
    pub fn new(config: Arc<Config>, cache: CredentialCache, transport: Arc<T>) -> Self {
        Self { config, cache, transport }
    }

    /// Returns a valid access token for `app_name`, fetching one if none is cached.
    ///
    /// # Errors
    ///
    /// - [`MpesaError::Configuration`] if the app has no consumer key or secret, or the
    ///   provider rejects them as invalid credentials.
    /// - [`MpesaError::Provider`] for any other token endpoint failure.
    /// - [`MpesaError::Transport`] if the token endpoint cannot be reached.
    #[instrument(skip(self))]
    pub async fn authenticate(&self, app_name: &str) -> Result<String> {
        let key = cache_key(app_name);
        let lookup = key.clone();
        match on_blocking_pool(&self.cache, move |cache| cache.get(&lookup)).await {
            Ok(Some(Value::String(token))) => {
                debug!("using cached access token");
                return Ok(token);
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "token cache unavailable, fetching a new token"),
        }

        let credentials = self.config.app_credentials(app_name)?;
        let base_url = self.config.base_url();
        let mut ctx = RequestContext::new(&base_url, TOKEN_PATH);
        ctx.query.push(("grant_type", "client_credentials"));
        ctx.authorization = Some(Authorization::Basic {
            username: &credentials.consumer_key,
            password: &credentials.consumer_secret,
        });

        let response = self.transport.get(ctx).await?;
        let body = response.text();
        if !response.is_ok() {
            return Err(classify_failure(response.status, body));
        }

        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|_| classify_failure(response.status, body.clone()))?;
        if token.access_token.is_empty() {
            return Err(classify_failure(response.status, body));
        }

        match token.expires_in.as_ref().and_then(lifetime_secs) {
            Some(lifetime) if lifetime > EXPIRY_MARGIN_SECS => {
                let ttl = lifetime - EXPIRY_MARGIN_SECS;
                let value = Value::String(token.access_token.clone());
                let store = move |cache: &CredentialCache| {
                    cache.put(&key, value, u64::try_from(ttl).ok())
                };
                match on_blocking_pool(&self.cache, store).await {
                    Ok(()) => debug!(ttl, "access token fetched and cached"),
                    Err(err) => warn!(error = %err, "access token fetched but not cached"),
                }
            }
            lifetime => debug!(?lifetime, "access token fetched, lifetime too short to cache"),
        }
        Ok(token.access_token)
    }

    /// Drops the cached token for `app_name`, forcing the next call to fetch a new one.
    ///
    /// Runs on the calling thread; with a file-backed store this blocks on file I/O.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the cache cannot be written.
    pub fn clear_token(&self, app_name: &str) -> Result<()> {
        self.cache.forget(&cache_key(app_name))
    }
}

async fn on_blocking_pool<R, F>(cache: &CredentialCache, op: F) -> Result<R>
where
    R: Send + 'static,
    F: FnOnce(&CredentialCache) -> Result<R> + Send + 'static,
{
    let cache = cache.clone();
    tokio::task::spawn_blocking(move || op(&cache))
        .await
        .map_err(|err| MpesaError::configuration(format!("cache task failed: {err}")))?
}

fn cache_key(app_name: &str) -> String {
    format!("{TOKEN_KEY_PREFIX}{app_name}")
}

/// Reads `expires_in` as either a JSON number or a numeric string.
#[allow(clippy::cast_possible_truncation, reason = "token lifetimes are small whole numbers")]
fn lifetime_secs(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn classify_failure(status: u16, body: String) -> MpesaError {
    if body.to_ascii_lowercase().contains(INVALID_CREDENTIALS) {
        MpesaError::configuration("Invalid consumer key and secret combination")
    } else {
        MpesaError::Provider { code: status, body }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        cache::{CacheStore, Entries, MemoryStore},
        clock::ManualClock,
        transport::RecordingTransport,
    };

    fn setup() -> (Authenticator<RecordingTransport>, Arc<RecordingTransport>, Arc<ManualClock>) {
        let config = Config::from_value(json!({
            "apps": {
                "default": { "consumer_key": "key", "consumer_secret": "secret" },
                "tenant": { "consumer_key": "key2", "consumer_secret": "secret2" }
            }
        }))
        .unwrap();
        let clock = Arc::new(ManualClock::from_timestamp(1_700_000_000));
        let cache = CredentialCache::new(Arc::new(MemoryStore::new()), clock.clone());
        let transport = Arc::new(RecordingTransport::new());
        (Authenticator::new(Arc::new(config), cache, transport.clone()), transport, clock)
    }

    #[tokio::test]
    async fn test_token_is_cached_until_expiry() {
        let (auth, transport, clock) = setup();
        transport
            .push_json(200, &json!({"access_token": "first", "expires_in": "3599"}))
            .push_json(200, &json!({"access_token": "second", "expires_in": 3599}));

        assert_eq!(auth.authenticate("default").await.unwrap(), "first");
        assert_eq!(auth.authenticate("default").await.unwrap(), "first");
        assert_eq!(transport.calls_to(TOKEN_PATH), 1);

        clock.advance_secs(3599 - 60);
        assert_eq!(auth.authenticate("default").await.unwrap(), "second");
        assert_eq!(transport.calls_to(TOKEN_PATH), 2);
    }

    #[tokio::test]
    async fn test_token_request_shape() {
        let (auth, transport, _) = setup();
        transport.push_json(200, &json!({"access_token": "tok", "expires_in": "3599"}));
        auth.authenticate("default").await.unwrap();

        let request = transport.last_request().unwrap();
        assert_eq!(request.method, "GET");
        assert_eq!(request.url, "https://sandbox.safaricom.co.ke/oauth/v1/generate");
        assert_eq!(request.query, [("grant_type".to_owned(), "client_credentials".to_owned())]);
        assert_eq!(request.authorization.as_deref(), Some("Basic a2V5OnNlY3JldA=="));
    }

    #[tokio::test]
    async fn test_tokens_are_isolated_per_app() {
        let (auth, transport, _) = setup();
        transport
            .push_json(200, &json!({"access_token": "default-token", "expires_in": 3599}))
            .push_json(200, &json!({"access_token": "tenant-token", "expires_in": 3599}));

        assert_eq!(auth.authenticate("default").await.unwrap(), "default-token");
        assert_eq!(auth.authenticate("tenant").await.unwrap(), "tenant-token");
        assert_eq!(auth.authenticate("default").await.unwrap(), "default-token");
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_short_lifetime_is_not_cached() {
        let (auth, transport, _) = setup();
        transport
            .push_json(200, &json!({"access_token": "a", "expires_in": 60}))
            .push_json(200, &json!({"access_token": "b"}));

        assert_eq!(auth.authenticate("default").await.unwrap(), "a");
        assert_eq!(auth.authenticate("default").await.unwrap(), "b");
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_invalid_credentials_is_configuration_error() {
        let (auth, transport, _) = setup();
        transport.push_json(
            400,
            &json!({"errorCode": "400.008.01", "errorMessage": "Invalid Credentials passed"}),
        );

        let err = auth.authenticate("default").await.unwrap_err();
        assert_eq!(err.status_code(), 422);
        assert_eq!(
            err.to_string(),
            "configuration error: Invalid consumer key and secret combination"
        );
    }

    #[tokio::test]
    async fn test_other_failures_are_provider_errors() {
        let (auth, transport, _) = setup();
        transport.push_response(503, "Service Unavailable").push_response(200, "<html>");

        let err = auth.authenticate("default").await.unwrap_err();
        assert!(matches!(
            err,
            MpesaError::Provider { code: 503, ref body } if body == "Service Unavailable"
        ));

        let err = auth.authenticate("default").await.unwrap_err();
        assert!(matches!(err, MpesaError::Provider { code: 200, .. }));
    }

    #[tokio::test]
    async fn test_missing_credentials_make_no_request() {
        let (auth, transport, _) = setup();
        let err = auth.authenticate("unknown").await.unwrap_err();
        assert_eq!(err.status_code(), 422);
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_transport_failure_propagates() {
        let (auth, transport, _) = setup();
        transport.push_error("dns error");
        let err = auth.authenticate("default").await.unwrap_err();
        assert!(matches!(err, MpesaError::Transport(ref msg) if msg == "dns error"));
    }

    #[tokio::test]
    async fn test_clear_token_forces_refetch() {
        let (auth, transport, _) = setup();
        transport
            .push_json(200, &json!({"access_token": "a", "expires_in": 3599}))
            .push_json(200, &json!({"access_token": "b", "expires_in": 3599}));

        assert_eq!(auth.authenticate("default").await.unwrap(), "a");
        auth.clear_token("default").unwrap();
        assert_eq!(auth.authenticate("default").await.unwrap(), "b");
    }

    #[derive(Debug)]
    struct BrokenStore;

    impl CacheStore for BrokenStore {
        fn update(&self, _f: &mut dyn FnMut(&mut Entries) -> bool) -> Result<()> {
            Err(MpesaError::configuration("cannot lock cache file"))
        }
    }

    #[tokio::test]
    async fn test_broken_cache_does_not_block_authentication() {
        let config = Config::from_value(json!({
            "apps": { "default": { "consumer_key": "key", "consumer_secret": "secret" } }
        }))
        .unwrap();
        let clock = Arc::new(ManualClock::from_timestamp(1_700_000_000));
        let transport = Arc::new(RecordingTransport::new());
        let auth = Authenticator::new(
            Arc::new(config),
            CredentialCache::new(Arc::new(BrokenStore), clock),
            transport.clone(),
        );
        transport
            .push_json(200, &json!({"access_token": "a", "expires_in": 3599}))
            .push_json(200, &json!({"access_token": "b", "expires_in": 3599}));

        assert_eq!(auth.authenticate("default").await.unwrap(), "a");
        assert_eq!(auth.authenticate("default").await.unwrap(), "b");
        assert_eq!(transport.calls_to(TOKEN_PATH), 2);
    }

    #[test]
    fn test_lifetime_accepts_numbers_and_strings() {
        assert_eq!(lifetime_secs(&json!(3599)), Some(3599));
        assert_eq!(lifetime_secs(&json!(" 3599 ")), Some(3599));
        assert_eq!(lifetime_secs(&json!(3599.0)), Some(3599));
        assert_eq!(lifetime_secs(&json!("soon")), None);
        assert_eq!(lifetime_secs(&json!(null)), None);
    }
}
