#[path = "common/mod.rs"]
mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, StatusCode};
use axum::{routing::get, Router};
use botgate::store::memory::MemorySigner;
use botgate::{app, attach, AppConfig, ClientCredentials};
use common::{body_json, default_state, gated_request, seeded_store, state_with, test_config, CountingStore};
use tower::ServiceExt;

#[tokio::test]
async fn blank_credentials_rejected_before_validation() {
    let calls = Arc::new(AtomicUsize::new(0));
    let store = CountingStore {
        inner: seeded_store(),
        calls: calls.clone(),
    };
    let state = state_with(&test_config(None), store, MemorySigner::new("http://objects.test"));
    let app = app(state);

    let cases = [
        ("/api/metadata/texts", None),
        ("/api/metadata/texts?clientid=acme", None),
        ("/api/metadata/texts?clientid=acme", Some("   ")),
        ("/api/metadata/texts?clientid=%20%20", Some("k1")),
        ("/anything?clientid=", Some("k1")),
    ];
    for (uri, key) in cases {
        let response = app
            .clone()
            .oneshot(gated_request(Method::GET, uri, key, Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "uri {}", uri);
        let json = body_json(response).await;
        assert_eq!(json, serde_json::json!({"message": "Clientid and apikey are required."}));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0, "validator must not run");
}

#[tokio::test]
async fn wrong_or_unknown_credentials_are_forbidden() {
    let app = app(default_state(None));
    for (uri, key) in [
        ("/api/metadata/texts?clientid=acme", "wrong"),
        ("/api/metadata/texts?clientid=acme", "K1"),
        ("/api/metadata/texts?clientid=ghost", "k1"),
    ] {
        let response = app
            .clone()
            .oneshot(gated_request(Method::GET, uri, Some(key), Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let json = body_json(response).await;
        assert_eq!(json, serde_json::json!({"message": "Invalid clientid or apikey."}));
    }
}

#[tokio::test]
async fn repeated_clientid_uses_first_value() {
    let app = app(default_state(None));
    let response = app
        .clone()
        .oneshot(gated_request(
            Method::GET,
            "/api/metadata/texts?clientid=acme&clientid=ghost",
            Some("k1"),
            Body::empty(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(gated_request(
            Method::GET,
            "/api/metadata/texts?clientid=ghost&clientid=acme",
            Some("k1"),
            Body::empty(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unconfigured_secrets_table_denies_everyone() {
    let config = AppConfig {
        client_secrets_table: None,
        ..test_config(None)
    };
    let state = state_with(&config, seeded_store(), MemorySigner::new("http://objects.test"));
    let response = app(state)
        .oneshot(gated_request(
            Method::GET,
            "/api/metadata/texts?clientid=acme",
            Some("k1"),
            Body::empty(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn valid_credentials_fall_through_to_next_handler() {
    let response = app(default_state(None))
        .oneshot(gated_request(
            Method::GET,
            "/not-owned?clientid=acme",
            Some("k1"),
            Body::empty(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn host_routes_run_after_gate_and_extension_credentials_win() {
    let host = Router::new().route("/hello", get(|| async { "hi" }));
    let gated = attach(host, default_state(None));

    // Inject credentials the way a host's own auth layer would.
    let app = gated.layer(axum::middleware::from_fn(
        |mut req: axum::extract::Request, next: axum::middleware::Next| async move {
            req.extensions_mut()
                .insert(ClientCredentials::new("acme", "k1"));
            next.run(req).await
        },
    ));

    // Query/header credentials are ignored when the extension is present.
    let response = app
        .oneshot(gated_request(
            Method::GET,
            "/hello?clientid=ghost",
            Some("nope"),
            Body::empty(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"hi");
}

#[tokio::test]
async fn configured_default_credentials_apply_when_request_has_none() {
    let config = AppConfig {
        default_credentials: Some(ClientCredentials::new("acme", "k1")),
        ..test_config(None)
    };
    let state = state_with(&config, seeded_store(), MemorySigner::new("http://objects.test"));
    let response = app(state)
        .oneshot(gated_request(Method::GET, "/api/metadata/texts", None, Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn healthz_is_outside_the_gate() {
    let response = app(default_state(None))
        .oneshot(gated_request(Method::GET, "/healthz", None, Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json.get("status").and_then(|v| v.as_str()), Some("ok"));
}
