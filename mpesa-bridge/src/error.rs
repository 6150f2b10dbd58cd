//! Error types for the M-Pesa bridge.
//!
//! Every fallible operation in this crate returns [`Result<T>`], whose error side is
//! [`MpesaError`]. The taxonomy is deliberately small:
//!
//! - **Configuration errors** ([`MpesaError::Configuration`]): problems the caller can fix
//!   before any network traffic happens. Missing or invalid request fields (pre-flight
//!   validation), missing consumer key/secret, a consumer key/secret pair the provider rejects,
//!   or a missing encryption certificate.
//! - **Provider errors** ([`MpesaError::Provider`]): the provider answered with a non-200 HTTP
//!   status. The raw body is preserved so callers can read provider result codes.
//! - **Transport errors** ([`MpesaError::Transport`]): no response was received at all.
//!
//! # Examples
//!
//! ```
//! use mpesa_bridge::error::{MpesaError, Result};
//!
//! fn require_short_code(code: Option<&str>) -> Result<String> {
//!     code.map(str::to_owned)
//!         .ok_or_else(|| MpesaError::configuration("short code is not configured"))
//! }
//!
//! let err = require_short_code(None).unwrap_err();
//! assert_eq!(err.status_code(), 422);
//! ```

use thiserror::Error;

/// Result type alias for bridge operations.
///
/// All fallible functions in this crate return this type.
pub type Result<T> = std::result::Result<T, MpesaError>;

/// Errors that can occur while preparing or dispatching an M-Pesa request.
///
/// Nothing in this crate retries or swallows these errors: each one is returned to the
/// immediate caller, which decides how to present it.
#[must_use = "errors should be handled, propagated, or explicitly panicked"]
#[derive(Debug, Error)]
pub enum MpesaError {
    /// Request or client configuration is invalid.
    ///
    /// Raised before any network I/O for validation failures and missing credentials, and
    /// after authentication when the provider reports an invalid key/secret combination.
    ///
    /// `messages` holds the flattened field-level validation messages; it is empty for
    /// errors that are not about individual fields.
    ///
    /// # Recovery
    ///
    /// Fix the configuration or request parameters. Retrying unchanged input fails again.
    #[error("configuration error: {message}")]
    Configuration {
        /// Summary of what is wrong.
        message: String,
        /// Field-level messages, one rendered string per failed rule.
        messages: Vec<String>,
    },

    /// The provider responded with a non-200 HTTP status.
    ///
    /// # Recovery
    ///
    /// Inspect `body` for the provider's result code and description. Payment initiation is
    /// not idempotent, so blindly resubmitting may charge a customer twice.
    #[error("provider returned status {code}: {body}")]
    Provider {
        /// HTTP status code of the provider response.
        code: u16,
        /// Raw response body.
        body: String,
    },

    /// The HTTP call could not complete (DNS, connect, TLS, timeout).
    ///
    /// # Recovery
    ///
    /// Check connectivity and the configured base URL. Whether the provider processed the
    /// request is unknown; query the transaction status before resubmitting a payment.
    #[error("transport error: {0}")]
    Transport(String),
}

impl MpesaError {
    /// Creates a configuration error without field-level messages.
    #[allow(
        clippy::impl_trait_in_params,
        reason = "impl Into<String> is idiomatic for error constructors"
    )]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into(), messages: Vec::new() }
    }

    /// Creates a pre-flight validation error carrying field-level messages.
    pub fn validation(messages: Vec<String>) -> Self {
        let message = if messages.is_empty() {
            "request failed validation".to_owned()
        } else {
            format!("request failed validation: {}", messages.join("; "))
        };
        Self::Configuration { message, messages }
    }

    /// Returns the HTTP-style status code associated with this error.
    ///
    /// Configuration errors map to 422, provider errors to the provider's own status code,
    /// and transport errors to 503.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Configuration { .. } => 422,
            Self::Provider { code, .. } => *code,
            Self::Transport(_) => 503,
        }
    }

    /// Returns the field-level validation messages (empty for non-validation errors).
    #[must_use]
    pub fn messages(&self) -> &[String] {
        match self {
            Self::Configuration { messages, .. } => messages,
            Self::Provider { .. } | Self::Transport(_) => &[],
        }
    }

    /// Returns true if the error is transient.
    ///
    /// Only transport failures qualify. The bridge itself never retries.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<reqwest::Error> for MpesaError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
