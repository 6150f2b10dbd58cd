//! High-level client.

use std::sync::Arc;

use serde_json::Value;

use crate::{
    config::Config,
    engine::Engine,
    error::Result,
    transactions::{
        AccountBalance, B2b, B2c, C2bRegister, C2bSimulate, Endpoint, Reversal, StkPush,
        StkStatusQuery, Transactable, TransactionStatus,
    },
    transport::{HttpTransport, Transport},
};

/// One method per provider operation over a shared [`Engine`].
///
/// Every method takes the caller's parameters as a JSON object (any key casing, see
/// [`ParameterNormalizer`](crate::normalize::ParameterNormalizer)) and the name of the
/// application whose credentials authenticate the call.
///
/// ```rust,no_run
/// use mpesa_bridge::{Config, Mpesa};
/// use serde_json::json;
///
/// # async fn example() -> mpesa_bridge::Result<()> {
/// let mpesa = Mpesa::from_config(Config::builder().with_process_env().build()?)?;
/// let response = mpesa
///     .b2c(json!({"amount": 500, "phone": "254712345678", "remarks": "Refund"}), "default")
///     .await?;
/// println!("{}", response["ConversationID"]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Mpesa<T> {
    engine: Arc<Engine<T>>,
}

impl<T> Clone for Mpesa<T> {
    fn clone(&self) -> Self {
        Self { engine: Arc::clone(&self.engine) }
    }
}

impl Mpesa<HttpTransport> {
    /// Creates a client sending requests over HTTPS.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client or the rule set cannot be built.
    pub fn from_config(config: Config) -> Result<Self> {
        Ok(Self::new(Engine::from_config(config)?))
    }
}

impl<T: Transport> Mpesa<T> {
    /// Wraps an engine.
    #[must_use]
    pub fn new(engine: Engine<T>) -> Self {
        Self { engine: Arc::new(engine) }
    }

    /// Wraps an engine that is already shared.
    #[must_use]
    pub const fn from_shared(engine: Arc<Engine<T>>) -> Self {
        Self { engine }
    }

    /// The engine behind this client.
    #[must_use]
    pub fn engine(&self) -> &Arc<Engine<T>> {
        &self.engine
    }

    /// Submits `params` to the transaction type of `endpoint`.
    ///
    /// # Errors
    ///
    /// See [`Transactable::submit`].
    pub async fn submit(&self, endpoint: Endpoint, params: Value, app_name: &str) -> Result<Value> {
        let engine = Arc::clone(&self.engine);
        match endpoint {
            Endpoint::StkPush => StkPush::new(engine).submit(params, app_name).await,
            Endpoint::StkStatusQuery => StkStatusQuery::new(engine).submit(params, app_name).await,
            Endpoint::B2c => B2c::new(engine).submit(params, app_name).await,
            Endpoint::B2b => B2b::new(engine).submit(params, app_name).await,
            Endpoint::C2bRegister => C2bRegister::new(engine).submit(params, app_name).await,
            Endpoint::C2bSimulate => C2bSimulate::new(engine).submit(params, app_name).await,
            Endpoint::AccountBalance => AccountBalance::new(engine).submit(params, app_name).await,
            Endpoint::TransactionStatus => {
                TransactionStatus::new(engine).submit(params, app_name).await
            }
            Endpoint::Reversal => Reversal::new(engine).submit(params, app_name).await,
        }
    }

    /// Sends an STK push payment prompt.
    ///
    /// # Errors
    ///
    /// See [`Transactable::submit`].
    pub async fn stk_push(&self, params: Value, app_name: &str) -> Result<Value> {
        self.submit(Endpoint::StkPush, params, app_name).await
    }

    /// Queries the status of an STK push.
    ///
    /// # Errors
    ///
    /// See [`Transactable::submit`].
    pub async fn stk_status(&self, params: Value, app_name: &str) -> Result<Value> {
        self.submit(Endpoint::StkStatusQuery, params, app_name).await
    }

    /// Pays a customer.
    ///
    /// # Errors
    ///
    /// See [`Transactable::submit`].
    pub async fn b2c(&self, params: Value, app_name: &str) -> Result<Value> {
        self.submit(Endpoint::B2c, params, app_name).await
    }

    /// Pays another business.
    ///
    /// # Errors
    ///
    /// See [`Transactable::submit`].
    pub async fn b2b(&self, params: Value, app_name: &str) -> Result<Value> {
        self.submit(Endpoint::B2b, params, app_name).await
    }

    /// Registers C2B confirmation and validation URLs.
    ///
    /// # Errors
    ///
    /// See [`Transactable::submit`].
    pub async fn c2b_register(&self, params: Value, app_name: &str) -> Result<Value> {
        self.submit(Endpoint::C2bRegister, params, app_name).await
    }

    /// Simulates a customer payment (sandbox only).
    ///
    /// # Errors
    ///
    /// See [`Transactable::submit`].
    pub async fn c2b_simulate(&self, params: Value, app_name: &str) -> Result<Value> {
        self.submit(Endpoint::C2bSimulate, params, app_name).await
    }

    /// Queries the short code balance.
    ///
    /// # Errors
    ///
    /// See [`Transactable::submit`].
    pub async fn account_balance(&self, params: Value, app_name: &str) -> Result<Value> {
        self.submit(Endpoint::AccountBalance, params, app_name).await
    }

    /// Queries the status of a transaction.
    ///
    /// # Errors
    ///
    /// See [`Transactable::submit`].
    pub async fn transaction_status(&self, params: Value, app_name: &str) -> Result<Value> {
        self.submit(Endpoint::TransactionStatus, params, app_name).await
    }

    /// Reverses a transaction.
    ///
    /// # Errors
    ///
    /// See [`Transactable::submit`].
    pub async fn reversal(&self, params: Value, app_name: &str) -> Result<Value> {
        self.submit(Endpoint::Reversal, params, app_name).await
    }
}
