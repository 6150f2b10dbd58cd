//! Request dispatch.
//!
//! [`Engine`] owns everything a transaction needs: configuration, the transport, the token
//! authenticator, the security credential cipher and one compiled [`Validator`] per endpoint.
//! Build one per configuration and share it (`Arc<Engine<_>>`) between transaction types.
//!
//! [`Engine::dispatch`] runs a fixed pipeline:
//!
//! 1. validate the body against the endpoint's rules; on failure no request is made
//! 2. drop every top-level `null` value
//! 3. obtain a bearer token
//! 4. POST the body as JSON
//! 5. classify the response: 200 with a JSON body is returned, anything else is an error
//!
//! Nothing is retried. Payment initiation is not idempotent.

use std::{collections::HashMap, sync::Arc};

use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use crate::{
    auth::Authenticator,
    cache::{CacheStore, CredentialCache, FileStore, MemoryStore},
    clock::{Clock, SystemClock},
    config::Config,
    error::{MpesaError, Result},
    normalize::ParameterNormalizer,
    security::SecurityCredentialCipher,
    transactions::Endpoint,
    transport::{Authorization, HttpTransport, RequestContext, Transport, TransportResponse},
    validation::{RuleFactory, Validator},
};

/// Format of the provider's `Timestamp` field.
pub const REQUEST_TIME_FORMAT: &str = "%Y%m%d%H%M%S";

/// Builds and dispatches provider requests.
#[derive(Debug)]
pub struct Engine<T> {
    config: Arc<Config>,
    transport: Arc<T>,
    auth: Authenticator<T>,
    cipher: SecurityCredentialCipher,
    clock: Arc<dyn Clock>,
    normalizer: ParameterNormalizer,
    validators: HashMap<Endpoint, Validator>,
}

impl Engine<HttpTransport> {
    /// Creates an engine with the HTTPS transport described by the `http` config table.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP settings are invalid, or a transport error
    /// if the HTTP client cannot be built.
    pub fn from_config(config: Config) -> Result<Self> {
        let transport = HttpTransport::with_config(&config.http()?)?;
        EngineBuilder::new(config).build(Arc::new(transport))
    }
}

impl<T: Transport> Engine<T> {
    /// Creates an engine with default cache, clock and rules.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a built-in rule fails to compile.
    pub fn new(config: Config, transport: Arc<T>) -> Result<Self> {
        EngineBuilder::new(config).build(transport)
    }

    /// Validates, authenticates and sends `body` to `endpoint`.
    ///
    /// Returns the decoded JSON body of a 200 response.
    ///
    /// # Errors
    ///
    /// - [`MpesaError::Configuration`] for validation failures (no request is sent) and
    ///   authentication configuration problems.
    /// - [`MpesaError::Provider`] for any response other than 200 with a JSON body.
    /// - [`MpesaError::Transport`] if no response is received.
    #[instrument(
        skip(self, body),
        fields(
            endpoint = %endpoint,
            request_id = %uuid::Uuid::new_v4(),
            status = tracing::field::Empty,
        )
    )]
    pub async fn dispatch(
        &self,
        endpoint: Endpoint,
        body: Map<String, Value>,
        app_name: &str,
    ) -> Result<Value> {
        let body = Value::Object(body);
        if let Some(template) = self.validators.get(&endpoint) {
            let mut validator = template.clone();
            if let Err(err) = validator.check(body.clone()) {
                debug!(failures = err.messages().len(), "request rejected before dispatch");
                return Err(err);
            }
        }

        let body = strip_nulls(body);
        let payload = serde_json::to_vec(&body)
            .map_err(|e| MpesaError::configuration(format!("cannot encode request body: {e}")))?;

        let token = self.auth.authenticate(app_name).await?;
        let base_url = self.config.base_url();
        let mut ctx = RequestContext::new(&base_url, endpoint.path());
        ctx.content_type = Some("application/json");
        ctx.authorization = Some(Authorization::Bearer(&token));

        let response = self.transport.post(ctx, &payload).await?;
        tracing::Span::current().record("status", response.status);
        classify(response)
    }

    /// Returns the current UTC time as `YYYYMMDDHHMMSS`.
    #[must_use]
    pub fn request_time(&self) -> String {
        self.clock.now().format(REQUEST_TIME_FORMAT).to_string()
    }

    /// Drops the cached access token of `app_name`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the cache cannot be written.
    pub fn clear_token(&self, app_name: &str) -> Result<()> {
        self.auth.clear_token(app_name)
    }

    /// Returns the resolved configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the token authenticator.
    #[must_use]
    pub const fn authenticator(&self) -> &Authenticator<T> {
        &self.auth
    }

    /// Returns the security credential cipher.
    #[must_use]
    pub const fn cipher(&self) -> &SecurityCredentialCipher {
        &self.cipher
    }

    /// Returns the parameter normalizer applied by transaction types.
    #[must_use]
    pub const fn normalizer(&self) -> &ParameterNormalizer {
        &self.normalizer
    }

    /// Returns the rules registered for `endpoint`.
    #[must_use]
    pub fn validator(&self, endpoint: Endpoint) -> Option<&Validator> {
        self.validators.get(&endpoint)
    }
}

/// Configures an [`Engine`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use mpesa_bridge::{
///     clock::ManualClock,
///     config::Config,
///     engine::EngineBuilder,
///     transactions::Endpoint,
///     transport::RecordingTransport,
/// };
///
/// let engine = EngineBuilder::new(Config::default())
///     .clock(Arc::new(ManualClock::from_timestamp(0)))
///     .rules(Endpoint::StkPush, "AccountReference", "max_length(12)")
///     .build(Arc::new(RecordingTransport::new()))
///     .unwrap();
///
/// assert_eq!(engine.request_time(), "19700101000000");
/// ```
#[derive(Debug)]
pub struct EngineBuilder {
    config: Config,
    clock: Option<Arc<dyn Clock>>,
    store: Option<Arc<dyn CacheStore>>,
    factory: Option<Arc<RuleFactory>>,
    normalizer: ParameterNormalizer,
    extra_rules: Vec<(Endpoint, String, String)>,
}

impl EngineBuilder {
    /// Starts from `config` with default components.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            clock: None,
            store: None,
            factory: None,
            normalizer: ParameterNormalizer::new(),
            extra_rules: Vec::new(),
        }
    }

    /// Uses `clock` for token expiry and request timestamps.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Stores tokens in `store`.
    ///
    /// Without this, tokens go to a [`FileStore`] in `cache_location` when that key is
    /// configured, and to a process-local [`MemoryStore`] otherwise.
    #[must_use]
    pub fn cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Resolves rule names through `factory`, e.g. to add custom rules.
    #[must_use]
    pub fn rule_factory(mut self, factory: Arc<RuleFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Uses `normalizer` for parameter names.
    #[must_use]
    pub fn normalizer(mut self, normalizer: ParameterNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Adds rules for `selector` on top of the endpoint's built-in ones.
    ///
    /// A rule with the same name as a built-in replaces it.
    #[must_use]
    pub fn rules(mut self, endpoint: Endpoint, selector: &str, rules: &str) -> Self {
        self.extra_rules.push((endpoint, selector.to_owned(), rules.to_owned()));
        self
    }

    /// Compiles the rules and assembles the engine.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if any rule fails to parse or names an unknown rule.
    pub fn build<T: Transport>(self, transport: Arc<T>) -> Result<Engine<T>> {
        let config = Arc::new(self.config);
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let store = self.store.unwrap_or_else(|| default_store(&config));
        let factory = self.factory.unwrap_or_else(|| Arc::new(RuleFactory::new()));

        let mut validators = HashMap::new();
        for endpoint in Endpoint::ALL {
            let mut validator = Validator::with_factory(Arc::clone(&factory));
            for (selector, rules) in endpoint.rules() {
                validator.add(selector, rules)?;
            }
            validators.insert(endpoint, validator);
        }
        for (endpoint, selector, rules) in &self.extra_rules {
            validators
                .entry(*endpoint)
                .or_insert_with(|| Validator::with_factory(Arc::clone(&factory)))
                .add(selector, rules)?;
        }

        let cache = CredentialCache::new(store, Arc::clone(&clock));
        let auth = Authenticator::new(Arc::clone(&config), cache, Arc::clone(&transport));
        Ok(Engine {
            cipher: SecurityCredentialCipher::new(Arc::clone(&config)),
            config,
            transport,
            auth,
            clock,
            normalizer: self.normalizer,
            validators,
        })
    }
}

fn default_store(config: &Config) -> Arc<dyn CacheStore> {
    match config.get_str("cache_location").filter(|dir| !dir.is_empty()) {
        Some(dir) => Arc::new(FileStore::in_dir(dir)),
        None => Arc::new(MemoryStore::new()),
    }
}

/// Removes every top-level `null` value.
fn strip_nulls(body: Value) -> Value {
    match body {
        Value::Object(mut map) => {
            map.retain(|_, value| !value.is_null());
            Value::Object(map)
        }
        other => other,
    }
}

fn classify(response: TransportResponse) -> Result<Value> {
    let body = response.text();
    if !response.is_ok() {
        warn!(status = response.status, "provider rejected request");
        return Err(MpesaError::Provider { code: response.status, body });
    }
    serde_json::from_str(&body).map_err(|_| {
        warn!("provider returned a non-JSON success body");
        MpesaError::Provider { code: response.status, body }
    })
}
