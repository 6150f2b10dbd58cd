//! Transaction types.
//!
//! Each provider operation is a small type implementing [`Transactable`]. A transaction
//! normalizes the caller's parameters, fills in defaults from its config section (short code,
//! callback URLs, initiator, security credential) and hands the body to
//! [`Engine::dispatch`](crate::engine::Engine::dispatch).
//!
//! Caller-supplied values always win over configured defaults. A field that is neither
//! supplied nor configured is left out, and the endpoint's rules report it.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use mpesa_bridge::{
//!     config::Config,
//!     engine::Engine,
//!     transactions::{StkPush, Transactable},
//! };
//! use serde_json::json;
//!
//! # async fn example() -> mpesa_bridge::Result<()> {
//! let config = Config::builder().with_file("mpesa.toml").build()?;
//! let engine = Arc::new(Engine::from_config(config)?);
//!
//! let params = json!({"amount": 100, "phone": "254712345678"});
//! let response = StkPush::new(engine).submit(params, "default").await?;
//! println!("{response}");
//! # Ok(())
//! # }
//! ```

use serde_json::{Map, Value};

use crate::{
    engine::Engine,
    error::{MpesaError, Result},
    transport::Transport,
};

mod account;
mod b2b;
mod b2c;
mod c2b;
mod endpoint;
mod stk;

pub use account::{AccountBalance, Reversal, TransactionStatus};
pub use b2b::B2b;
pub use b2c::B2c;
pub use c2b::{C2bRegister, C2bSimulate};
pub use endpoint::Endpoint;
pub use stk::{StkPush, StkStatusQuery, stk_password};

/// Application identity used when the caller does not name one.
pub const DEFAULT_APP: &str = "default";

/// A provider operation that can be submitted.
pub trait Transactable: Send + Sync {
    /// Transport the engine sends requests through.
    type Transport: Transport;

    /// Endpoint this transaction posts to.
    fn endpoint(&self) -> Endpoint;

    /// Engine shared by all transactions of a client.
    fn engine(&self) -> &Engine<Self::Transport>;

    /// Fills in defaults on an already normalized body.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a required default cannot be derived, such as a
    /// security credential without a readable certificate.
    fn prepare(&self, body: Map<String, Value>) -> Result<Map<String, Value>>;

    /// Normalizes `params`, applies defaults and dispatches the request.
    ///
    /// `params` must be a JSON object.
    ///
    /// # Errors
    ///
    /// See [`Engine::dispatch`](crate::engine::Engine::dispatch). A non-object `params` is a
    /// configuration error.
    fn submit(
        &self,
        params: Value,
        app_name: &str,
    ) -> impl Future<Output = Result<Value>> + Send {
        async move {
            let Value::Object(params) = params else {
                return Err(MpesaError::configuration("transaction parameters must be an object"));
            };
            let engine = self.engine();
            let body = self.prepare(engine.normalizer().normalize(&params))?;
            engine.dispatch(self.endpoint(), body, app_name).await
        }
    }
}

/// Declares a transaction type holding a shared engine.
macro_rules! transaction {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug)]
        pub struct $name<T> {
            engine: std::sync::Arc<$crate::engine::Engine<T>>,
        }

        impl<T> Clone for $name<T> {
            fn clone(&self) -> Self {
                Self { engine: std::sync::Arc::clone(&self.engine) }
            }
        }

        impl<T: $crate::transport::Transport> $name<T> {
            /// Creates the transaction over a shared engine.
            #[must_use]
            pub fn new(engine: std::sync::Arc<$crate::engine::Engine<T>>) -> Self {
                Self { engine }
            }
        }
    };
}

pub(crate) use transaction;

/// Sets `key` to `value` unless the body already holds a non-null value.
fn default_field(body: &mut Map<String, Value>, key: &str, value: Option<impl Into<Value>>) {
    if body.get(key).is_some_and(|current| !current.is_null()) {
        return;
    }
    if let Some(value) = value {
        body.insert(key.to_owned(), value.into());
    }
}

/// Copies `from` into `to` when `to` is missing.
fn default_from(body: &mut Map<String, Value>, to: &str, from: &str) {
    let value = body.get(from).filter(|value| !value.is_null()).cloned();
    default_field(body, to, value);
}

/// Renames `from` to `to` when `to` is missing.
fn move_field(body: &mut Map<String, Value>, from: &str, to: &str) {
    if body.get(to).is_some_and(|value| !value.is_null()) {
        return;
    }
    if let Some(value) = body.remove(from) {
        body.insert(to.to_owned(), value);
    }
}

/// Adds `SecurityCredential` from config unless the caller supplied one.
fn security_credential<T: Transport>(
    engine: &Engine<T>,
    body: &mut Map<String, Value>,
    section: &str,
) -> Result<()> {
    if body.get("SecurityCredential").is_some_and(|value| !value.is_null()) {
        return Ok(());
    }
    let credential = engine.cipher().for_section(section)?;
    body.insert("SecurityCredential".to_owned(), Value::String(credential));
    Ok(())
}

/// Fields shared by the initiator-based result-callback operations.
fn initiator_defaults<T: Transport>(
    engine: &Engine<T>,
    body: &mut Map<String, Value>,
    section: &str,
    initiator_key: &str,
) -> Result<()> {
    let config = engine.config();
    default_field(body, initiator_key, config.section_str(section, "initiator_name"));
    default_field(body, "ResultURL", config.section_str(section, "result_url"));
    default_field(body, "QueueTimeOutURL", config.section_str(section, "timeout_url"));
    default_field(body, "Remarks", config.section_str(section, "remarks"));
    security_credential(engine, body, section)
}
