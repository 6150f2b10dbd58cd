//! M-Pesa Bridge: a client core for the Safaricom M-Pesa Daraja REST API
//!
//! The crate turns loosely-shaped caller parameters into well-formed provider requests and
//! sends them with a cached OAuth token. Nothing is sent until the request passes the
//! endpoint's validation rules.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │  Caller params   │  {"amount": 100, "phone": "2547..."}
//! └────────┬─────────┘
//!          │
//! ┌────────▼────────────────────────────────────────────┐
//! │  Transactable (StkPush, B2c, ...)                   │
//! │  ┌──────────────┐   ┌──────────┐   ┌─────────────┐  │
//! │  │  Normalizer  │──▶│ Defaults │──▶│  Validator  │  │
//! │  │ (key casing) │   │ (config) │   │ (rule DSL)  │  │
//! │  └──────────────┘   └──────────┘   └─────────────┘  │
//! └────────┬────────────────────────────────────────────┘
//!          │ Engine::dispatch
//! ┌────────▼─────────┐    ┌──────────────────────────┐
//! │  Authenticator   │◀──▶│  CredentialCache (file   │
//! │  (OAuth token)   │    │  or memory, with expiry) │
//! └────────┬─────────┘    └──────────────────────────┘
//!          │ HTTPS, Bearer token
//! ┌────────▼─────────┐
//! │  Daraja API      │  sandbox or production
//! └──────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use mpesa_bridge::{Config, Mpesa};
//! use serde_json::json;
//!
//! # async fn example() -> mpesa_bridge::Result<()> {
//! let config = Config::builder()
//!     .with_toml_str(
//!         r#"
//!         [apps.default]
//!         consumer_key = "key"
//!         consumer_secret = "secret"
//!
//!         [lnmo]
//!         short_code = 174379
//!         passkey = "bfb279f9aa9bdbcf158e97dd71a467cd2e0c893059b10f78e6b72ada1ed2c919"
//!         callback = "https://example.com/mpesa/callback"
//!         account_reference = "Invoice"
//!         transaction_desc = "Payment"
//!         "#,
//!     )
//!     .with_process_env()
//!     .build()?;
//!
//! let mpesa = Mpesa::from_config(config)?;
//! let response = mpesa.stk_push(json!({"amount": 1, "phone": "254708374149"}), "default").await?;
//! println!("{}", response["CheckoutRequestID"]);
//! # Ok(())
//! # }
//! ```
//!
//! # Module Organization
//!
//! - [`config`]: layered configuration (defaults, file, environment, overrides)
//! - [`normalize`]: caller key casing to provider field names, text clean-up
//! - [`validation`]: the rule DSL and per-endpoint validators
//! - [`cache`]: expiring key-value cache over memory or a shared file
//! - [`auth`]: OAuth client-credentials token acquisition and caching
//! - [`security`]: `SecurityCredential` encryption with the provider certificate
//! - [`engine`]: validation, authentication and the HTTP call for one request
//! - [`transactions`]: one type per provider operation
//! - [`client`]: [`Mpesa`], a method per operation
//! - [`transport`]: the HTTP seam, with a recording transport for tests and dry runs
//! - [`error`]: the error taxonomy
//!
//! # Error Handling
//!
//! All operations return [`Result<T>`](error::Result):
//!
//! ```rust,no_run
//! use mpesa_bridge::{Mpesa, MpesaError};
//! use serde_json::json;
//!
//! # async fn example(mpesa: Mpesa<mpesa_bridge::transport::HttpTransport>) {
//! match mpesa.b2c(json!({"amount": 10, "phone": "0712345678"}), "default").await {
//!     Ok(response) => println!("accepted: {response}"),
//!     Err(MpesaError::Configuration { messages, .. }) if !messages.is_empty() => {
//!         // Nothing was sent
//!         for message in messages {
//!             eprintln!("{message}");
//!         }
//!     }
//!     Err(MpesaError::Provider { code, body }) => eprintln!("provider said {code}: {body}"),
//!     Err(e) => eprintln!("{e}"),
//! }
//! # }
//! ```

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![allow(
    clippy::multiple_crate_versions,
    reason = "transitive dependencies from reqwest and openssl"
)]

pub mod auth;
pub mod cache;
pub mod client;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod normalize;
pub mod security;
pub mod transactions;
pub mod transport;
pub mod validation;

pub use client::Mpesa;
pub use config::Config;
pub use engine::{Engine, EngineBuilder};
pub use error::{MpesaError, Result};
pub use transactions::{Endpoint, Transactable};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        let _ = std::marker::PhantomData::<MpesaError>;
        let _ = std::marker::PhantomData::<Mpesa<transport::RecordingTransport>>;
        assert_eq!(Endpoint::ALL.len(), 9);
    }
}
