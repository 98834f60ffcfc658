//! Shared helpers: a scriptable mock of the remote license API and
//! orchestrator builders.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    routing::post,
    Form, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use license_gateway::config::ForceMode;
use license_gateway::crypto::InstanceCipher;
use license_gateway::orchestrator::LicenseOrchestrator;
use license_gateway::remote::RemoteLicenseClient;
use license_gateway::store::{InstanceStore, MemoryStore};

pub const TEST_SECRET: &str = "test-machine-secret";

/// One request received by the mock.
#[derive(Debug, Clone)]
pub struct RemoteCall {
    pub op: String,
    pub form: HashMap<String, String>,
}

#[derive(Default)]
struct MockState {
    responses: HashMap<String, (StatusCode, String)>,
    calls: Vec<RemoteCall>,
}

/// Mock remote license API. Responses are set per operation; every request
/// is recorded.
#[derive(Clone, Default)]
pub struct MockRemote {
    state: Arc<Mutex<MockState>>,
}

impl MockRemote {
    pub fn respond(&self, op: &str, status: StatusCode, body: impl Into<String>) {
        self.state
            .lock()
            .unwrap()
            .responses
            .insert(op.to_string(), (status, body.into()));
    }

    pub fn respond_json(&self, op: &str, status: StatusCode, body: Value) {
        self.respond(op, status, body.to_string());
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn ops(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.op).collect()
    }

    pub fn last_call(&self, op: &str) -> Option<RemoteCall> {
        self.calls().into_iter().rev().find(|c| c.op == op)
    }
}

async fn handle(
    State(mock): State<MockRemote>,
    Path(op): Path<String>,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, [(header::HeaderName, &'static str); 1], String) {
    let mut state = mock.state.lock().unwrap();
    state.calls.push(RemoteCall {
        op: op.clone(),
        form,
    });
    let (status, body) = state.responses.get(&op).cloned().unwrap_or((
        StatusCode::NOT_FOUND,
        json!({ "error": format!("no mock response for {op}") }).to_string(),
    ));
    (status, [(header::CONTENT_TYPE, "application/json")], body)
}

/// Spin up the mock on an ephemeral port and return its base URL.
pub async fn spawn_mock_remote(mock: MockRemote) -> String {
    let router = Router::new()
        .route("/v1/licenses/:op", post(handle))
        .with_state(mock);

    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .expect("failed to bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, router.into_make_service())
            .await
            .expect("mock server failed");
    });

    format!("http://{}/v1/licenses", addr)
}

pub fn test_cipher() -> InstanceCipher {
    InstanceCipher::from_secret(TEST_SECRET)
}

pub fn memory_store() -> InstanceStore {
    InstanceStore::Memory(MemoryStore::default())
}

pub fn orchestrator(base_url: &str, store: InstanceStore) -> LicenseOrchestrator {
    let remote =
        RemoteLicenseClient::new(base_url, Duration::from_secs(5)).expect("client should build");
    LicenseOrchestrator::new(store, test_cipher(), remote)
}

pub fn orchestrator_with_force(
    base_url: &str,
    store: InstanceStore,
    mode: ForceMode,
) -> LicenseOrchestrator {
    orchestrator(base_url, store).with_force_mode(mode, "invalid-instance-id")
}

// === Remote response bodies ===

pub fn license_key_json(key: &str, status: &str, expires_at: Option<&str>) -> Value {
    json!({
        "id": 1,
        "status": status,
        "key": key,
        "activation_limit": 1,
        "activation_usage": 1,
        "created_at": "2024-01-24T14:15:07.000000Z",
        "expires_at": expires_at,
    })
}

pub fn activate_ok(key: &str, instance_id: &str, status: &str, expires_at: Option<&str>) -> Value {
    json!({
        "activated": true,
        "error": null,
        "license_key": license_key_json(key, status, expires_at),
        "instance": {
            "id": instance_id,
            "name": "test-host",
            "created_at": "2024-04-06T14:16:55.000000Z"
        },
        "meta": { "store_id": 1, "product_name": "Premium" }
    })
}

pub fn validate_ok(
    key: &str,
    instance_id: Option<&str>,
    status: &str,
    expires_at: Option<&str>,
) -> Value {
    json!({
        "valid": true,
        "error": null,
        "license_key": license_key_json(key, status, expires_at),
        "instance": instance_id.map(|id| json!({
            "id": id,
            "name": "test-host",
            "created_at": "2024-04-06T14:16:55.000000Z"
        })),
        "meta": null
    })
}

pub fn validate_invalid(error: &str) -> Value {
    json!({
        "valid": false,
        "error": error,
        "license_key": null,
        "instance": null,
        "meta": null
    })
}
