//! Lipa na M-Pesa Online (STK push).

use std::borrow::Cow;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::{Map, Value};

use super::{Endpoint, Transactable, default_field, default_from, transaction};
use crate::{
    engine::Engine,
    error::Result,
    transport::Transport,
    validation::rules::value_text,
};

const SECTION: &str = "lnmo";

const DEFAULT_TRANSACTION_TYPE: &str = "CustomerPayBillOnline";

/// Returns the STK `Password`: base64 of short code, passkey and timestamp concatenated.
///
/// ```
/// use mpesa_bridge::transactions::stk_password;
///
/// let password = stk_password("174379", "key", "20231114221320");
/// assert_eq!(password, "MTc0Mzc5a2V5MjAyMzExMTQyMjEzMjA=");
/// ```
#[must_use]
pub fn stk_password(short_code: &str, passkey: &str, timestamp: &str) -> String {
    STANDARD.encode(format!("{short_code}{passkey}{timestamp}"))
}

transaction!(
    /// Prompts a customer's phone to authorize a payment.
    ///
    /// Defaults from `[lnmo]`: `short_code`, `passkey`, `callback`,
    /// `default_transaction_type`, `account_reference` and `transaction_desc`. `PartyA`
    /// defaults to `PhoneNumber` and `PartyB` to the short code.
    StkPush
);

transaction!(
    /// Queries the outcome of an STK push by `CheckoutRequestID`.
    StkStatusQuery
);

/// Fills `BusinessShortCode`, `Timestamp` and `Password`.
fn sign<T: Transport>(engine: &Engine<T>, body: &mut Map<String, Value>) {
    let config = engine.config();
    default_field(body, "BusinessShortCode", config.section_str(SECTION, "short_code"));
    default_field(body, "Timestamp", Some(engine.request_time()));

    let short_code = body.get("BusinessShortCode").and_then(value_text).map(Cow::into_owned);
    let timestamp = body.get("Timestamp").and_then(value_text).map(Cow::into_owned);
    let password = match (short_code, config.section_str(SECTION, "passkey"), timestamp) {
        (Some(short_code), Some(passkey), Some(timestamp)) => {
            Some(stk_password(&short_code, &passkey, &timestamp))
        }
        _ => None,
    };
    default_field(body, "Password", password);
}

impl<T: Transport> Transactable for StkPush<T> {
    type Transport = T;

    fn endpoint(&self) -> Endpoint {
        Endpoint::StkPush
    }

    fn engine(&self) -> &Engine<T> {
        &self.engine
    }

    fn prepare(&self, mut body: Map<String, Value>) -> Result<Map<String, Value>> {
        let config = self.engine.config();
        sign(&self.engine, &mut body);
        default_field(
            &mut body,
            "TransactionType",
            Some(
                config
                    .section_str(SECTION, "default_transaction_type")
                    .unwrap_or_else(|| DEFAULT_TRANSACTION_TYPE.to_owned()),
            ),
        );
        default_field(&mut body, "CallBackURL", config.section_str(SECTION, "callback"));
        default_field(
            &mut body,
            "AccountReference",
            config.section_str(SECTION, "account_reference"),
        );
        default_field(
            &mut body,
            "TransactionDesc",
            config.section_str(SECTION, "transaction_desc"),
        );
        default_from(&mut body, "PartyA", "PhoneNumber");
        default_from(&mut body, "PartyB", "BusinessShortCode");
        Ok(body)
    }
}

impl<T: Transport> Transactable for StkStatusQuery<T> {
    type Transport = T;

    fn endpoint(&self) -> Endpoint {
        Endpoint::StkStatusQuery
    }

    fn engine(&self) -> &Engine<T> {
        &self.engine
    }

    fn prepare(&self, mut body: Map<String, Value>) -> Result<Map<String, Value>> {
        sign(&self.engine, &mut body);
        Ok(body)
    }
}
