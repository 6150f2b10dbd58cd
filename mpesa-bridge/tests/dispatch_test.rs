//! End-to-end tests of the request pipeline over a recording transport.

use std::sync::Arc;

use mpesa_bridge::{
    Config, Endpoint, Engine, EngineBuilder, Mpesa, MpesaError,
    auth::TOKEN_PATH,
    cache::FileStore,
    clock::ManualClock,
    transactions::stk_password,
    transport::RecordingTransport,
};
use serde_json::{Map, Value, json};

const NOW: i64 = 1_700_000_000;

fn config() -> Config {
    Config::from_value(json!({
        "apps": { "default": { "consumer_key": "key", "consumer_secret": "secret" } },
        "lnmo": {
            "short_code": "174379",
            "passkey": "passkey",
            "callback": "https://example.com/callback",
            "account_reference": "Invoice",
            "transaction_desc": "Payment"
        },
        "b2c": {
            "short_code": "600000",
            "initiator_name": "testapi",
            "security_credential": "precomputed",
            "result_url": "https://example.com/result",
            "timeout_url": "https://example.com/timeout"
        }
    }))
    .expect("valid config")
}

fn token(transport: &RecordingTransport) {
    transport.push_json(200, &json!({"access_token": "tok", "expires_in": "3599"}));
}

fn build(clock: &Arc<ManualClock>) -> (Mpesa<RecordingTransport>, Arc<RecordingTransport>) {
    let transport = Arc::new(RecordingTransport::new());
    let engine = EngineBuilder::new(config())
        .clock(clock.clone())
        .build(Arc::clone(&transport))
        .expect("engine builds");
    (Mpesa::new(engine), transport)
}

fn posted(transport: &RecordingTransport) -> Map<String, Value> {
    let request = transport.last_request().expect("a request was sent");
    assert_eq!(request.method, "POST");
    match request.json() {
        Some(Value::Object(body)) => body,
        other => panic!("body is not a JSON object: {other:?}"),
    }
}

#[tokio::test]
async fn test_stk_push_body() {
    let clock = Arc::new(ManualClock::from_timestamp(NOW));
    let (mpesa, transport) = build(&clock);
    token(&transport);
    transport.push_json(200, &json!({"ResponseCode": "0", "CheckoutRequestID": "ws_CO_1"}));

    let response = mpesa
        .stk_push(json!({"amount": 100, "phone": "254712345678"}), "default")
        .await
        .expect("push accepted");
    assert_eq!(response["CheckoutRequestID"], "ws_CO_1");

    let body = posted(&transport);
    assert_eq!(body["Amount"], 100);
    assert_eq!(body["PhoneNumber"], "254712345678");
    assert_eq!(body["PartyA"], "254712345678");
    assert_eq!(body["Timestamp"], "20231114221320");
    assert_eq!(body["Password"], stk_password("174379", "passkey", "20231114221320"));

    let request = transport.last_request().expect("request");
    assert_eq!(request.url, "https://sandbox.safaricom.co.ke/mpesa/stkpush/v1/processrequest");
    assert_eq!(request.authorization.as_deref(), Some("Bearer tok"));
    assert_eq!(request.content_type.as_deref(), Some("application/json"));
}

#[tokio::test]
async fn test_provider_error_keeps_status_and_body() {
    let clock = Arc::new(ManualClock::from_timestamp(NOW));
    let (mpesa, transport) = build(&clock);
    token(&transport);
    transport.push_response(500, "Internal Error");

    let err = mpesa
        .stk_push(json!({"amount": 100, "phone": "254712345678"}), "default")
        .await
        .unwrap_err();
    match err {
        MpesaError::Provider { code, body } => {
            assert_eq!(code, 500);
            assert_eq!(body, "Internal Error");
        }
        other => panic!("expected provider error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_null_fields_are_not_transmitted() {
    let clock = Arc::new(ManualClock::from_timestamp(NOW));
    let (mpesa, transport) = build(&clock);
    token(&transport);

    mpesa
        .b2c(
            json!({"amount": 10, "phone": "254712345678", "remarks": "x", "Occasion": null}),
            "default",
        )
        .await
        .expect("b2c accepted");
    assert!(!posted(&transport).contains_key("Occasion"));

    let Value::Object(body) = json!({
        "BusinessShortCode": "174379",
        "Password": "pw",
        "Timestamp": "20231114221320",
        "CheckoutRequestID": "ws_CO_1",
        "Extra": null
    }) else {
        unreachable!()
    };
    mpesa.engine().dispatch(Endpoint::StkStatusQuery, body, "default").await.expect("query");
    let body = posted(&transport);
    assert!(!body.contains_key("Extra"));
    assert_eq!(body.len(), 4);
}

#[tokio::test]
async fn test_invalid_request_makes_no_network_call() {
    let clock = Arc::new(ManualClock::from_timestamp(NOW));
    let (mpesa, transport) = build(&clock);

    let err = mpesa
        .stk_push(json!({"amount": -5, "phone": "0712345678"}), "default")
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 422);
    assert_eq!(
        err.messages(),
        [
            "Amount must be greater than 0",
            "PartyA must be a 254XXXXXXXXX number",
            "PhoneNumber must be a 254XXXXXXXXX number",
        ]
    );
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn test_token_fetched_once_until_expiry() {
    let clock = Arc::new(ManualClock::from_timestamp(NOW));
    let (mpesa, transport) = build(&clock);
    let params = json!({"amount": 1, "phone": "254712345678"});

    token(&transport);
    transport.push_json(200, &json!({"ResponseCode": "0"}));
    transport.push_json(200, &json!({"ResponseCode": "0"}));
    mpesa.stk_push(params.clone(), "default").await.expect("first");
    mpesa.stk_push(params.clone(), "default").await.expect("second");
    assert_eq!(transport.calls_to(TOKEN_PATH), 1);

    // Cached for expires_in minus the safety margin.
    clock.advance_secs(3599 - 60);
    token(&transport);
    mpesa.stk_push(params, "default").await.expect("third");
    assert_eq!(transport.calls_to(TOKEN_PATH), 2);
    assert_eq!(transport.calls(), 5);
}

#[tokio::test]
async fn test_bad_credentials_abort_dispatch() {
    let clock = Arc::new(ManualClock::from_timestamp(NOW));
    let (mpesa, transport) = build(&clock);
    transport.push_response(400, r#"{"errorMessage": "Invalid Credentials"}"#);

    let err = mpesa
        .stk_push(json!({"amount": 1, "phone": "254712345678"}), "default")
        .await
        .unwrap_err();
    assert!(matches!(err, MpesaError::Configuration { .. }), "{err:?}");
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn test_transport_failure_is_reported() {
    let clock = Arc::new(ManualClock::from_timestamp(NOW));
    let (mpesa, transport) = build(&clock);
    token(&transport);
    transport.push_error("connection refused");

    let err = mpesa
        .stk_push(json!({"amount": 1, "phone": "254712345678"}), "default")
        .await
        .unwrap_err();
    assert!(matches!(err, MpesaError::Transport(_)), "{err:?}");
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_file_cache_shares_tokens_between_engines() {
    let dir = tempfile::tempdir().expect("tempdir");
    let clock = Arc::new(ManualClock::from_timestamp(NOW));
    let params = json!({"amount": 1, "phone": "254712345678"});

    let engine = |transport: &Arc<RecordingTransport>| -> Engine<RecordingTransport> {
        EngineBuilder::new(config())
            .clock(clock.clone())
            .cache_store(Arc::new(FileStore::in_dir(dir.path())))
            .build(Arc::clone(transport))
            .expect("engine builds")
    };

    let first = Arc::new(RecordingTransport::new());
    token(&first);
    Mpesa::new(engine(&first)).stk_push(params.clone(), "default").await.expect("first");
    assert_eq!(first.calls_to(TOKEN_PATH), 1);

    let second = Arc::new(RecordingTransport::new());
    Mpesa::new(engine(&second)).stk_push(params, "default").await.expect("second");
    assert_eq!(second.calls_to(TOKEN_PATH), 0);
    assert_eq!(second.last_request().expect("post").authorization.as_deref(), Some("Bearer tok"));
}

#[tokio::test]
async fn test_cache_location_selects_file_store() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut values = json!({
        "apps": { "default": { "consumer_key": "key", "consumer_secret": "secret" } },
        "c2b": { "short_code": "600000" }
    });
    values["cache_location"] = json!(dir.path().to_str().expect("utf-8 path"));

    let transport = Arc::new(RecordingTransport::new());
    token(&transport);
    let engine = EngineBuilder::new(Config::from_value(values).expect("config"))
        .build(Arc::clone(&transport))
        .expect("engine builds");
    Mpesa::new(engine)
        .c2b_simulate(json!({"amount": 1, "phone": "254712345678"}), "default")
        .await
        .expect("simulate");

    let cache = std::fs::read_to_string(dir.path().join(mpesa_bridge::cache::CACHE_FILE_NAME))
        .expect("cache file written");
    assert!(cache.contains("mpesa_access_token:default"));
}
