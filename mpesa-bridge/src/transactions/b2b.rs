//! Business to business payments.

use serde_json::{Map, Value};

use super::{Endpoint, Transactable, default_field, initiator_defaults, transaction};
use crate::{engine::Engine, error::Result, transport::Transport};

const SECTION: &str = "b2b";

const DEFAULT_COMMAND_ID: &str = "BusinessPayBill";

/// Identifier type of an organisation short code.
const SHORT_CODE_IDENTIFIER: &str = "4";

transaction!(
    /// Moves funds from one business short code to another.
    B2b
);

impl<T: Transport> Transactable for B2b<T> {
    type Transport = T;

    fn endpoint(&self) -> Endpoint {
        Endpoint::B2b
    }

    fn engine(&self) -> &Engine<T> {
        &self.engine
    }

    fn prepare(&self, mut body: Map<String, Value>) -> Result<Map<String, Value>> {
        let config = self.engine.config();
        default_field(
            &mut body,
            "CommandID",
            Some(
                config
                    .section_str(SECTION, "default_command_id")
                    .unwrap_or_else(|| DEFAULT_COMMAND_ID.to_owned()),
            ),
        );
        default_field(&mut body, "SenderIdentifierType", Some(SHORT_CODE_IDENTIFIER));
        default_field(&mut body, "RecieverIdentifierType", Some(SHORT_CODE_IDENTIFIER));
        default_field(&mut body, "PartyA", config.section_str(SECTION, "short_code"));
        initiator_defaults(&self.engine, &mut body, SECTION, "Initiator")?;
        Ok(body)
    }
}
