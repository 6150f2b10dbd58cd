//! Customer to business: URL registration and sandbox simulation.

use serde_json::{Map, Value};

use super::{Endpoint, Transactable, default_field, move_field, transaction};
use crate::{engine::Engine, error::Result, transport::Transport};

const SECTION: &str = "c2b";

transaction!(
    /// Registers the confirmation and validation URLs of a short code.
    ///
    /// Defaults from `[c2b]`: `short_code`, `confirmation_url`, `validation_url` and
    /// `response_type` (`Completed`).
    C2bRegister
);

transaction!(
    /// Simulates a customer payment to a short code. Sandbox only.
    C2bSimulate
);

impl<T: Transport> Transactable for C2bRegister<T> {
    type Transport = T;

    fn endpoint(&self) -> Endpoint {
        Endpoint::C2bRegister
    }

    fn engine(&self) -> &Engine<T> {
        &self.engine
    }

    fn prepare(&self, mut body: Map<String, Value>) -> Result<Map<String, Value>> {
        let config = self.engine.config();
        default_field(&mut body, "ShortCode", config.section_str(SECTION, "short_code"));
        default_field(
            &mut body,
            "ResponseType",
            Some(
                config
                    .section_str(SECTION, "response_type")
                    .unwrap_or_else(|| "Completed".to_owned()),
            ),
        );
        default_field(
            &mut body,
            "ConfirmationURL",
            config.section_str(SECTION, "confirmation_url"),
        );
        default_field(&mut body, "ValidationURL", config.section_str(SECTION, "validation_url"));
        Ok(body)
    }
}

impl<T: Transport> Transactable for C2bSimulate<T> {
    type Transport = T;

    fn endpoint(&self) -> Endpoint {
        Endpoint::C2bSimulate
    }

    fn engine(&self) -> &Engine<T> {
        &self.engine
    }

    fn prepare(&self, mut body: Map<String, Value>) -> Result<Map<String, Value>> {
        let config = self.engine.config();
        default_field(&mut body, "ShortCode", config.section_str(SECTION, "short_code"));
        default_field(
            &mut body,
            "CommandID",
            Some(
                config
                    .section_str(SECTION, "default_command_id")
                    .unwrap_or_else(|| "CustomerPayBillOnline".to_owned()),
            ),
        );
        move_field(&mut body, "PhoneNumber", "Msisdn");
        Ok(body)
    }
}
