//! Business to customer payments.

use serde_json::{Map, Value};

use super::{Endpoint, Transactable, default_field, initiator_defaults, move_field, transaction};
use crate::{engine::Engine, error::Result, transport::Transport};

const SECTION: &str = "b2c";

const DEFAULT_COMMAND_ID: &str = "BusinessPayment";

transaction!(
    /// Pays a customer from a business short code.
    ///
    /// Defaults from `[b2c]` (falling back to top-level keys): `initiator_name`,
    /// `short_code`, `default_command_id`, `result_url`, `timeout_url`, `remarks`, and
    /// `security_credential` or `initiator_password`. `PartyB` is taken from `PhoneNumber`
    /// when absent.
    B2c
);

impl<T: Transport> Transactable for B2c<T> {
    type Transport = T;

    fn endpoint(&self) -> Endpoint {
        Endpoint::B2c
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
        default_field(&mut body, "PartyA", config.section_str(SECTION, "short_code"));
        move_field(&mut body, "PhoneNumber", "PartyB");
        initiator_defaults(&self.engine, &mut body, SECTION, "InitiatorName")?;
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::transactions::test_support::{certificate, decrypt, engine, sent};

    #[tokio::test]
    async fn test_b2c_body_with_encrypted_credential() {
        let (_dir, cert, key) = certificate();
        let (engine, transport) = engine(json!({
            "certificate_path": cert.to_str().unwrap(),
            "b2c": {
                "short_code": "600000",
                "initiator_name": "testapi",
                "initiator_password": "Safaricom999!*!",
                "result_url": "https://example.com/result",
                "timeout_url": "https://example.com/timeout"
            }
        }));

        B2c::new(engine)
            .submit(
                json!({"amount": 500, "phone": "254712345678", "remarks": "", "occasion": ""}),
                "default",
            )
            .await
            .unwrap();

        let body = sent(&transport);
        assert_eq!(body["InitiatorName"], "testapi");
        assert_eq!(body["CommandID"], "BusinessPayment");
        assert_eq!(body["PartyA"], "600000");
        assert_eq!(body["PartyB"], "254712345678");
        assert_eq!(body["Remarks"], "None");
        assert!(!body.contains_key("PhoneNumber"));
        assert!(!body.contains_key("Occasion"));
        assert_eq!(decrypt(&key, body["SecurityCredential"].as_str().unwrap()), "Safaricom999!*!");
        assert_eq!(transport.last_request().unwrap().path, Endpoint::B2c.path());
    }

    #[tokio::test]
    async fn test_missing_certificate_fails_before_network() {
        let (engine, transport) = engine(json!({
            "certificate_path": "/nowhere/cert.cer",
            "initiator_password": "pw"
        }));
        let err = B2c::new(engine)
            .submit(json!({"amount": 500, "phone": "254712345678"}), "default")
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 422);
        assert!(err.to_string().contains("certificate file not found"));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_command_rejected() {
        let (engine, transport) = engine(json!({"security_credential": "precomputed"}));
        let err = B2c::new(engine)
            .submit(json!({"amount": 500, "phone": "254712345678", "command": "Refund"}), "default")
            .await
            .unwrap_err();
        assert!(err.messages().iter().any(|m| m.starts_with("CommandID must be one of")));
        assert_eq!(transport.calls(), 0);
    }
}
