//! Submission and challenge pulls over real HTTP against a local fake
//! authorization server.

#![cfg(feature = "network")]

mod common;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use common::{claims, enrollment, mint, KID, SECRET};
use devicebind_core::{
    Collaborators, DeviceBindError, EngineConfig, EnrollmentStore, FlowOptions,
    HttpClientConfig, HttpRestClient, KeyType, MemoryEnrollmentStore, Progress, SoftwareKeyStore,
    StaticKeyResolver, TransportError, VerificationEngine,
};
use serde_json::{json, Value};
use url::Url;

#[derive(Default)]
struct FakeServer {
    verify_hits: AtomicUsize,
    pending_hits: AtomicUsize,
    last_query: Mutex<HashMap<String, String>>,
    last_body: Mutex<Option<Value>>,
    pending: Mutex<Vec<Value>>,
}

async fn verify(
    State(server): State<Arc<FakeServer>>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    server.verify_hits.fetch_add(1, Ordering::SeqCst);
    *server.last_query.lock().unwrap() = query;
    *server.last_body.lock().unwrap() = serde_json::from_slice(&body).ok();
    (StatusCode::OK, Json(json!({"status": "SUCCESS"})))
}

async fn verify_rejected(State(server): State<Arc<FakeServer>>) -> (StatusCode, Json<Value>) {
    server.verify_hits.fetch_add(1, Ordering::SeqCst);
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({"errorCode": "E0000047", "errorSummary": "Try again later"})),
    )
}

/// Fails the first pull with 503 so the client has to retry.
async fn pending(State(server): State<Arc<FakeServer>>) -> (StatusCode, Json<Value>) {
    if server.pending_hits.fetch_add(1, Ordering::SeqCst) == 0 {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({})));
    }
    let items = server.pending.lock().unwrap().clone();
    (StatusCode::OK, Json(Value::Array(items)))
}

async fn spawn_server(server: Arc<FakeServer>) -> SocketAddr {
    let app = Router::new()
        .route("/idp/authenticators/verify", post(verify))
        .route("/idp/authenticators/busy", post(verify_rejected))
        .route("/api/v1/pending", get(pending))
        .with_state(server);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn engine(addr: SocketAddr) -> (VerificationEngine, Arc<SoftwareKeyStore>) {
    let keys = Arc::new(SoftwareKeyStore::new());
    common::add_keys(&keys, "enr-1");

    let mut enrolled = enrollment("enr-1");
    enrolled.factors[1].pending_challenge_link =
        Some(Url::parse(&format!("http://{addr}/api/v1/pending")).unwrap());
    let enrollments = Arc::new(MemoryEnrollmentStore::new());
    enrollments.insert(enrolled);

    let rest = HttpRestClient::new(HttpClientConfig {
        timeout: Duration::from_secs(5),
        initial_interval: Duration::from_millis(10),
        max_interval: Duration::from_millis(50),
        https_only: false,
        ..Default::default()
    })
    .unwrap();

    let collaborators = Collaborators::new(
        keys.clone(),
        enrollments,
        Arc::new(rest),
        Arc::new(StaticKeyResolver::new().with_hmac_secret(KID, SECRET)),
    );
    (
        VerificationEngine::new(EngineConfig::default(), collaborators),
        keys,
    )
}

fn local_claims(addr: SocketAddr, transaction_id: &str, path: &str) -> Value {
    let mut c = claims(transaction_id);
    c["verificationUri"] = json!(format!("http://{addr}{path}"));
    c
}

#[tokio::test]
async fn test_body_mode_submission_over_http() {
    let server = Arc::new(FakeServer::default());
    let addr = spawn_server(server.clone()).await;
    let (engine, _keys) = engine(addr);

    let raw = mint(&local_claims(addr, "tx-http", "/idp/authenticators/verify"));
    let mut flow = engine.verify(&raw, FlowOptions::default()).await.unwrap();

    let outcome = match flow.next().await.unwrap() {
        Progress::Completed(outcome) => outcome,
        other => panic!("Expected completion, got: {:?}", other),
    };
    assert_eq!(outcome.status, 200);
    assert_eq!(outcome.key_type, KeyType::UserVerification);
    assert_eq!(outcome.body, json!({"status": "SUCCESS"}));

    let body = server.last_body.lock().unwrap().clone().unwrap();
    assert_eq!(body["method"], "signed_nonce");
    assert_eq!(body["challengeResponse"].as_str().unwrap().split('.').count(), 3);
    assert!(server.last_query.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_query_mode_submission_over_http() {
    let server = Arc::new(FakeServer::default());
    let addr = spawn_server(server.clone()).await;
    let (engine, _keys) = engine(addr);

    let raw = mint(&local_claims(addr, "tx-query", "/idp/authenticators/verify"));
    let options = FlowOptions {
        state_handle: Some("02.handle".into()),
        ..Default::default()
    };
    let mut flow = engine.verify(&raw, options).await.unwrap();
    assert!(matches!(
        flow.next().await.unwrap(),
        Progress::Completed(_)
    ));

    let query = server.last_query.lock().unwrap().clone();
    assert_eq!(query.get("stateHandle").map(String::as_str), Some("02.handle"));
    assert!(query.contains_key("challengeResponse"));
    assert!(server.last_body.lock().unwrap().is_none());
}

#[tokio::test]
async fn test_submission_is_not_retried() {
    let server = Arc::new(FakeServer::default());
    let addr = spawn_server(server.clone()).await;
    let (engine, _keys) = engine(addr);

    let raw = mint(&local_claims(addr, "tx-busy", "/idp/authenticators/busy"));
    let mut flow = engine.verify(&raw, FlowOptions::default()).await.unwrap();

    match flow.next().await.unwrap_err() {
        DeviceBindError::Transport(TransportError::Status {
            status,
            server_error,
        }) => {
            assert_eq!(status, 503);
            assert_eq!(
                server_error.and_then(|e| e.error_code).as_deref(),
                Some("E0000047")
            );
        }
        other => panic!("Expected status error, got: {:?}", other),
    }
    assert_eq!(server.verify_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_pull_retries_transient_status() {
    let server = Arc::new(FakeServer::default());
    let addr = spawn_server(server.clone()).await;
    let (engine, _keys) = engine(addr);

    let mut push = claims("tx-pulled");
    push["method"] = json!("push");
    *server.pending.lock().unwrap() = vec![
        json!({"payloadVersion": "IDXv1", "challenge": mint(&push)}),
        json!({"payloadVersion": "IDXv0", "challenge": mint(&claims("tx-old-version"))}),
    ];

    let enrolled = engine
        .collaborators()
        .enrollments
        .get("enr-1")
        .await
        .unwrap()
        .unwrap();
    let challenges = engine
        .pull_push_challenges(&enrolled, Some("Bearer t"))
        .await
        .unwrap();

    assert_eq!(challenges.len(), 1);
    assert_eq!(challenges[0].transaction_id(), "tx-pulled");
    assert_eq!(server.pending_hits.load(Ordering::SeqCst), 2);
}
