//! Initiator queries against a short code: balance, transaction status and reversal.

use serde_json::{Map, Value};

use super::{Endpoint, Transactable, default_field, initiator_defaults, transaction};
use crate::{engine::Engine, error::Result, transport::Transport};

/// Identifier type of an organisation short code.
const SHORT_CODE_IDENTIFIER: &str = "4";

/// Identifier type the reversal API expects for the receiving organisation.
const REVERSAL_IDENTIFIER: &str = "11";

transaction!(
    /// Queries the balance of a short code. The result is posted to `ResultURL`.
    AccountBalance
);

transaction!(
    /// Queries the status of a transaction by `TransactionID`.
    TransactionStatus
);

transaction!(
    /// Reverses a completed transaction.
    Reversal
);

/// Fills `CommandID` from the section's `default_command_id` or `fallback`.
fn command_id<T: Transport>(
    engine: &Engine<T>,
    body: &mut Map<String, Value>,
    section: &str,
    fallback: &str,
) {
    let command = engine
        .config()
        .section_str(section, "default_command_id")
        .unwrap_or_else(|| fallback.to_owned());
    default_field(body, "CommandID", Some(command));
}

impl<T: Transport> Transactable for AccountBalance<T> {
    type Transport = T;

    fn endpoint(&self) -> Endpoint {
        Endpoint::AccountBalance
    }

    fn engine(&self) -> &Engine<T> {
        &self.engine
    }

    fn prepare(&self, mut body: Map<String, Value>) -> Result<Map<String, Value>> {
        let section = self.endpoint().section();
        command_id(&self.engine, &mut body, section, "AccountBalance");
        default_field(&mut body, "PartyA", self.engine.config().section_str(section, "short_code"));
        default_field(&mut body, "IdentifierType", Some(SHORT_CODE_IDENTIFIER));
        initiator_defaults(&self.engine, &mut body, section, "Initiator")?;
        Ok(body)
    }
}

impl<T: Transport> Transactable for TransactionStatus<T> {
    type Transport = T;

    fn endpoint(&self) -> Endpoint {
        Endpoint::TransactionStatus
    }

    fn engine(&self) -> &Engine<T> {
        &self.engine
    }

    fn prepare(&self, mut body: Map<String, Value>) -> Result<Map<String, Value>> {
        let section = self.endpoint().section();
        command_id(&self.engine, &mut body, section, "TransactionStatusQuery");
        default_field(&mut body, "PartyA", self.engine.config().section_str(section, "short_code"));
        default_field(&mut body, "IdentifierType", Some(SHORT_CODE_IDENTIFIER));
        initiator_defaults(&self.engine, &mut body, section, "Initiator")?;
        Ok(body)
    }
}

impl<T: Transport> Transactable for Reversal<T> {
    type Transport = T;

    fn endpoint(&self) -> Endpoint {
        Endpoint::Reversal
    }

    fn engine(&self) -> &Engine<T> {
        &self.engine
    }

    fn prepare(&self, mut body: Map<String, Value>) -> Result<Map<String, Value>> {
        let section = self.endpoint().section();
        command_id(&self.engine, &mut body, section, "TransactionReversal");
        default_field(
            &mut body,
            "ReceiverParty",
            self.engine.config().section_str(section, "short_code"),
        );
        default_field(&mut body, "RecieverIdentifierType", Some(REVERSAL_IDENTIFIER));
        initiator_defaults(&self.engine, &mut body, section, "Initiator")?;
        Ok(body)
    }
}
