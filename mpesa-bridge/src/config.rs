//! Layered client configuration.
//!
//! Configuration is resolved once, when the client is built, from four layers. Later layers
//! win:
//!
//! 1. built-in defaults (certificate locations only)
//! 2. environment variables
//! 3. a project configuration file (TOML)
//! 4. an explicit map supplied by the caller
//!
//! Every layer is flattened into dotted keys (`lnmo.short_code`, `apps.default.consumer_key`).
//! A leading `mpesa.` segment is stripped both when values are inserted and when they are
//! looked up, so `mpesa.lnmo.short_code` and `lnmo.short_code` name the same value.
//!
//! # Examples
//!
//! ```
//! use mpesa_bridge::config::Config;
//!
//! let config = Config::builder()
//!     .with_toml_str(
//!         r#"
//!         is_sandbox = true
//!
//!         [apps.default]
//!         consumer_key = "key"
//!         consumer_secret = "secret"
//!
//!         [lnmo]
//!         short_code = 174379
//!         "#,
//!     )
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.get_str("mpesa.lnmo.short_code").as_deref(), Some("174379"));
//! assert!(config.is_sandbox());
//! ```

use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
};

use serde_json::{Map, Value};
use zeroize::Zeroizing;

use crate::{
    error::{MpesaError, Result},
    transport::HttpConfig,
};

/// Base URL of the provider sandbox.
pub const SANDBOX_BASE_URL: &str = "https://sandbox.safaricom.co.ke";

/// Base URL of the provider production environment.
pub const PRODUCTION_BASE_URL: &str = "https://api.safaricom.co.ke";

/// Default location of the sandbox public-key certificate.
pub const DEFAULT_SANDBOX_CERTIFICATE: &str = "certs/SandboxCertificate.cer";

/// Default location of the production public-key certificate.
pub const DEFAULT_PRODUCTION_CERTIFICATE: &str = "certs/ProductionCertificate.cer";

const KEY_PREFIX: &str = "mpesa.";

const ENV_PREFIX: &str = "MPESA_";

/// Nested-path form: `MPESA__LNMO__SHORT_CODE` resolves to `lnmo.short_code`.
const ENV_PATH_PREFIX: &str = "MPESA__";

/// Well-known environment variables and the keys they populate.
const ENV_KEYS: &[(&str, &str)] = &[
    ("MPESA_CONSUMER_KEY", "apps.default.consumer_key"),
    ("MPESA_CONSUMER_SECRET", "apps.default.consumer_secret"),
    ("MPESA_IS_SANDBOX", "is_sandbox"),
    ("MPESA_BASE_URL", "base_url"),
    ("MPESA_CACHE_LOCATION", "cache_location"),
    ("MPESA_CERTIFICATE_PATH", "certificate_path"),
    ("MPESA_SHORTCODE", "lnmo.short_code"),
    ("MPESA_PASSKEY", "lnmo.passkey"),
    ("MPESA_CALLBACK_URL", "lnmo.callback"),
    ("MPESA_INITIATOR_NAME", "initiator_name"),
    ("MPESA_INITIATOR_PASSWORD", "initiator_password"),
    ("MPESA_RESULT_URL", "result_url"),
    ("MPESA_TIMEOUT_URL", "timeout_url"),
];

/// Resolved, immutable configuration.
///
/// Built with [`Config::builder`]. Values are stored flattened under dotted keys; lookups of
/// a key that names a table return the table rebuilt as a JSON object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    values: BTreeMap<String, Value>,
}

impl Config {
    /// Returns a builder with no layers applied yet.
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Builds a configuration from built-in defaults plus an explicit map.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `values` is not a JSON object.
    pub fn from_value(values: Value) -> Result<Self> {
        Self::builder().with_values(values).build()
    }

    /// Looks up a value by dotted key.
    ///
    /// A leading `mpesa.` is ignored. If the key names a table rather than a leaf, the table
    /// is returned as an object.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        let key = strip_prefix(key);
        if let Some(value) = self.values.get(key) {
            return Some(value.clone());
        }
        let table = self.section(key);
        (!table.is_empty()).then_some(Value::Object(table))
    }

    /// Looks up a value, falling back to `default` when absent.
    #[must_use]
    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).unwrap_or(default)
    }

    /// Looks up a scalar as a string. Numbers and booleans are stringified.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.values.get(strip_prefix(key))? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Looks up a boolean. Accepts JSON booleans, `0`/`1`, and the strings
    /// `true`/`false`/`yes`/`no`/`1`/`0` in any case.
    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.values.get(strip_prefix(key))? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_i64().map(|n| n != 0),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Looks up `section.key`, falling back to the top-level `key`.
    ///
    /// Empty strings count as absent so that a blank per-section value does not shadow a
    /// global one.
    #[must_use]
    pub fn section_str(&self, section: &str, key: &str) -> Option<String> {
        self.get_str(&format!("{}.{key}", strip_prefix(section)))
            .filter(|value| !value.is_empty())
            .or_else(|| self.get_str(key).filter(|value| !value.is_empty()))
    }

    /// Returns every leaf under `prefix`, with the prefix removed, as a JSON object.
    #[must_use]
    pub fn section(&self, prefix: &str) -> Map<String, Value> {
        let prefix = format!("{}.", strip_prefix(prefix));
        let mut table = Value::Object(Map::new());
        for (key, value) in self.values.range(prefix.clone()..) {
            let Some(rest) = key.strip_prefix(&prefix) else {
                break;
            };
            insert_path(&mut table, rest, value.clone());
        }
        match table {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    /// Returns true when requests target the sandbox. Defaults to `true`.
    #[must_use]
    pub fn is_sandbox(&self) -> bool {
        self.get_bool("is_sandbox").unwrap_or(true)
    }

    /// Returns the provider base URL without a trailing slash.
    ///
    /// An explicit `base_url` wins; otherwise the sandbox or production URL is selected by
    /// [`is_sandbox`](Self::is_sandbox).
    #[must_use]
    pub fn base_url(&self) -> String {
        self.get_str("base_url").filter(|url| !url.is_empty()).map_or_else(
            || {
                let url = if self.is_sandbox() { SANDBOX_BASE_URL } else { PRODUCTION_BASE_URL };
                url.to_owned()
            },
            |url| url.trim_end_matches('/').to_owned(),
        )
    }

    /// Returns the consumer key and secret configured for `app_name`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if either value is missing or empty.
    pub fn app_credentials(&self, app_name: &str) -> Result<AppCredentials> {
        let key = self
            .get_str(&format!("apps.{app_name}.consumer_key"))
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                MpesaError::configuration(format!(
                    "consumer key is not configured for app '{app_name}'"
                ))
            })?;
        let secret = self
            .get_str(&format!("apps.{app_name}.consumer_secret"))
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                MpesaError::configuration(format!(
                    "consumer secret is not configured for app '{app_name}'"
                ))
            })?;
        Ok(AppCredentials { consumer_key: key, consumer_secret: Zeroizing::new(secret) })
    }

    /// Returns the HTTP transport settings from the `http` table, or defaults.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the table cannot be deserialized or the values are
    /// out of bounds.
    pub fn http(&self) -> Result<HttpConfig> {
        let table = self.section("http");
        let config: HttpConfig = if table.is_empty() {
            HttpConfig::default()
        } else {
            serde_json::from_value(Value::Object(table))
                .map_err(|e| MpesaError::configuration(format!("invalid [http] settings: {e}")))?
        };
        config.validate()?;
        Ok(config)
    }

    /// Returns the number of leaf values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no values are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn merge(&mut self, layer: &Value) {
        flatten_into(&mut self.values, "", layer);
    }
}

/// Consumer key and secret for one application identity.
///
/// The secret is wiped from memory when dropped and never printed by `Debug`.
#[derive(Clone)]
pub struct AppCredentials {
    /// OAuth client identifier.
    pub consumer_key: String,
    /// OAuth client secret.
    pub consumer_secret: Zeroizing<String>,
}

impl fmt::Debug for AppCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppCredentials")
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &"[REDACTED]")
            .finish()
    }
}

/// Builder applying configuration layers in precedence order.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    env: Vec<(String, String)>,
    file: Option<PathBuf>,
    toml: Option<String>,
    explicit: Option<Value>,
}

impl ConfigBuilder {
    /// Reads `MPESA_*` variables from the process environment.
    #[must_use]
    pub fn with_process_env(mut self) -> Self {
        self.env.extend(std::env::vars().filter(|(name, _)| name.starts_with(ENV_PREFIX)));
        self
    }

    /// Uses the given name/value pairs as the environment layer.
    #[must_use]
    pub fn with_env_vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env.extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Loads the project layer from a TOML file.
    #[must_use]
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Uses a TOML document as the project layer.
    #[must_use]
    pub fn with_toml_str(mut self, toml: &str) -> Self {
        self.toml = Some(toml.to_owned());
        self
    }

    /// Uses an explicit JSON object as the highest-precedence layer.
    #[must_use]
    pub fn with_values(mut self, values: Value) -> Self {
        self.explicit = Some(values);
        self
    }

    /// Resolves all layers into a [`Config`].
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file cannot be read, the TOML is malformed, or
    /// the explicit layer is not an object.
    pub fn build(self) -> Result<Config> {
        let mut config = Config::default();

        config.merge(&serde_json::json!({
            "sandbox_certificate_path": DEFAULT_SANDBOX_CERTIFICATE,
            "production_certificate_path": DEFAULT_PRODUCTION_CERTIFICATE,
        }));

        config.merge(&env_layer(&self.env));

        if let Some(path) = &self.file {
            let content = std::fs::read_to_string(path).map_err(|e| {
                MpesaError::configuration(format!(
                    "cannot read config file '{}': {e}",
                    path.display()
                ))
            })?;
            config.merge(&parse_toml(&content)?);
        }

        if let Some(toml) = &self.toml {
            config.merge(&parse_toml(toml)?);
        }

        if let Some(explicit) = &self.explicit {
            if !explicit.is_object() {
                return Err(MpesaError::configuration("explicit configuration must be an object"));
            }
            config.merge(explicit);
        }

        Ok(config)
    }
}

fn parse_toml(content: &str) -> Result<Value> {
    toml::from_str::<Value>(content)
        .map_err(|e| MpesaError::configuration(format!("invalid TOML config: {e}")))
}

/// Translates `MPESA_*` variables into a nested JSON layer.
fn env_layer(vars: &[(String, String)]) -> Value {
    let mut layer = Value::Object(Map::new());
    for (name, value) in vars {
        if let Some(path) = name.strip_prefix(ENV_PATH_PREFIX) {
            let key = path.split("__").map(str::to_ascii_lowercase).collect::<Vec<_>>().join(".");
            if !key.is_empty() {
                insert_path(&mut layer, &key, typed_env_value(value));
            }
        } else if name == "MPESA_ENVIRONMENT" {
            let environment = value.trim().to_ascii_lowercase();
            let sandbox = !matches!(environment.as_str(), "production" | "live");
            insert_path(&mut layer, "is_sandbox", Value::Bool(sandbox));
        } else if let Some((_, key)) = ENV_KEYS.iter().find(|(env, _)| env == name) {
            insert_path(&mut layer, key, Value::String(value.clone()));
        }
    }
    layer
}

/// Reads `true`/`false` as booleans and canonical integers as numbers, so typed settings such
/// as `MPESA__HTTP__TIMEOUT_SECS=5` deserialize. Anything that would not print back
/// identically (`007`, `+5`, `1.0`) stays a string.
fn typed_env_value(raw: &str) -> Value {
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => match raw.parse::<i64>() {
            Ok(n) if n.to_string() == raw => Value::from(n),
            _ => Value::String(raw.to_owned()),
        },
    }
}

fn strip_prefix(key: &str) -> &str {
    key.strip_prefix(KEY_PREFIX).unwrap_or(key)
}

fn flatten_into(out: &mut BTreeMap<String, Value>, prefix: &str, value: &Value) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path =
                    if prefix.is_empty() { key.clone() } else { format!("{prefix}.{key}") };
                flatten_into(out, &path, child);
            }
        }
        leaf => {
            let key = if prefix == "mpesa" { "" } else { strip_prefix(prefix) };
            if !key.is_empty() {
                out.insert(key.to_owned(), leaf.clone());
            }
        }
    }
}

/// Inserts `value` at a dotted path inside a JSON object, creating tables as needed.
fn insert_path(root: &mut Value, path: &str, value: Value) {
    let mut node = root;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let Value::Object(map) = node else {
            return;
        };
        if segments.peek().is_none() {
            map.insert(segment.to_owned(), value);
            return;
        }
        node = map.entry(segment.to_owned()).or_insert_with(|| Value::Object(Map::new()));
    }
}
