//! Security credentials for initiator-based operations.
//!
//! B2C, B2B, balance, status and reversal requests carry a `SecurityCredential`: the
//! initiator password encrypted with the provider's public certificate (RSA, PKCS#1 v1.5)
//! and base64-encoded.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use mpesa_bridge::{config::Config, security::SecurityCredentialCipher};
//!
//! # fn example() -> mpesa_bridge::Result<()> {
//! let config = Arc::new(Config::builder().with_file("mpesa.toml").build()?);
//! let credential = SecurityCredentialCipher::new(config).compute("initiator-password")?;
//! # Ok(())
//! # }
//! ```
//!
//! # Security Considerations
//!
//! - Initiator passwords read from configuration are wiped from memory after use
//! - Neither passwords nor credentials are written to logs

mod credential;

pub use credential::{SecurityCredentialCipher, encrypt};
