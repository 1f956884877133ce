//! Common test utilities for sigflow-connector-exchange integration tests.

#![allow(dead_code)]

use secrecy::SecretString;
use serde_json::{json, Value};
use sigflow_connector_exchange::{
    ConnectorFactory, ExchangeConfig, ExchangeConfigBuilder, ExchangeConnector,
    InMemoryDeploymentStore, TenantCredential,
};
use sigflow_core::TenantId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Once};
use wiremock::matchers::{header, method, path, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

static INIT: Once = Once::new();

/// Initialize test logging once (only when `RUST_LOG` is set).
pub fn init_test_logging() {
    INIT.call_once(|| {
        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::fmt()
                .with_test_writer()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .try_init()
                .ok();
        }
    });
}

/// Config builder pointing every surface at the mock server.
pub fn config_for(server: &MockServer) -> ExchangeConfigBuilder {
    ExchangeConfig::builder()
        .login_endpoint(server.uri())
        .directory_base_url(format!("{}/graph/v1.0", server.uri()))
        .management_base_url(format!("{}/adminapi/beta/{{tenant_id}}", server.uri()))
}

/// Credential for a directory tenant.
pub fn credential(directory_tenant_id: &str, secret: &str) -> TenantCredential {
    TenantCredential {
        tenant_id: TenantId::new(),
        directory_tenant_id: directory_tenant_id.to_string(),
        client_id: format!("client-{directory_tenant_id}"),
        client_secret: SecretString::from(secret.to_string()),
        connection_enabled: true,
    }
}

/// A mock server, an in-memory store and a factory wired to both.
pub struct TestContext {
    pub server: MockServer,
    pub store: Arc<InMemoryDeploymentStore>,
    pub factory: ConnectorFactory,
}

impl TestContext {
    pub async fn new() -> Self {
        let server = MockServer::start().await;
        let config = config_for(&server).build().unwrap();
        Self::with_config(server, config)
    }

    pub fn with_config(server: MockServer, config: ExchangeConfig) -> Self {
        init_test_logging();
        let store = Arc::new(InMemoryDeploymentStore::new());
        let factory = ConnectorFactory::with_store(config, store.clone()).unwrap();
        Self {
            server,
            store,
            factory,
        }
    }

    pub fn connector(&self, directory_tenant_id: &str) -> ExchangeConnector {
        self.factory
            .for_tenant(credential(directory_tenant_id, "good-secret"))
            .unwrap()
    }

    /// Number of requests received on paths starting with `prefix`.
    pub async fn requests_to(&self, prefix: &str) -> Vec<Request> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.url.path().starts_with(prefix))
            .collect()
    }
}

/// Token endpoint that issues `token` for a directory tenant.
pub async fn mount_token(server: &MockServer, directory_tenant_id: &str, token: &str) {
    Mock::given(method("POST"))
        .and(path(format!("/{directory_tenant_id}/oauth2/v2.0/token")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "Bearer",
            "expires_in": 3600,
            "access_token": token
        })))
        .mount(server)
        .await;
}

/// Token endpoint that rejects the client secret.
pub async fn mount_token_rejection(server: &MockServer, directory_tenant_id: &str) {
    Mock::given(method("POST"))
        .and(path(format!("/{directory_tenant_id}/oauth2/v2.0/token")))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_client",
            "error_description": "AADSTS7000215: Invalid client secret provided."
        })))
        .mount(server)
        .await;
}

/// Organization metadata readable with `token`.
pub async fn mount_organization(server: &MockServer, token: &str, display_name: &str) {
    Mock::given(method("GET"))
        .and(path("/graph/v1.0/organization"))
        .and(header("authorization", format!("Bearer {token}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{ "id": "org-1", "displayName": display_name }]
        })))
        .mount(server)
        .await;
}

/// Wraps a management-surface error in the `OData` error format.
pub fn odata_error(code: &str, message: &str) -> Value {
    json!({ "error": { "code": code, "message": message } })
}

#[derive(Debug, Clone)]
struct StoredRule {
    id: String,
    body: Value,
}

#[derive(Debug, Default)]
struct FakeState {
    rules: Vec<StoredRule>,
    creates: usize,
    updates: usize,
    deletes: usize,
}

/// Stateful transport-rule surface for one directory tenant.
#[derive(Debug, Clone)]
pub struct FakeTransportRules {
    state: Arc<Mutex<FakeState>>,
    next_id: Arc<AtomicU64>,
    unsupported_mutations: bool,
}

impl FakeTransportRules {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState::default())),
            next_id: Arc::new(AtomicU64::new(1)),
            unsupported_mutations: false,
        }
    }

    /// A surface that lists rules but refuses every mutation.
    pub fn unsupported() -> Self {
        Self {
            unsupported_mutations: true,
            ..Self::new()
        }
    }

    /// Mounts the surface for `directory_tenant_id`, answering only `token`.
    pub async fn mount(&self, server: &MockServer, directory_tenant_id: &str, token: &str) {
        Mock::given(path_regex(format!(
            r"^/adminapi/beta/{directory_tenant_id}/TransportRule(/.*)?$"
        )))
        .and(header("authorization", format!("Bearer {token}").as_str()))
        .respond_with(self.clone())
        .mount(server)
        .await;
    }

    /// Seeds a rule as if an administrator had created it.
    pub fn seed(&self, name: &str, html: &str) -> String {
        let id = self.allocate_id();
        self.state.lock().unwrap().rules.push(StoredRule {
            id: id.clone(),
            body: json!({ "Name": name, "ApplyHtmlDisclaimerText": html }),
        });
        id
    }

    pub fn rule_count(&self) -> usize {
        self.state.lock().unwrap().rules.len()
    }

    pub fn rules_named(&self, name: &str) -> Vec<Value> {
        self.state
            .lock()
            .unwrap()
            .rules
            .iter()
            .filter(|r| r.body["Name"] == name)
            .map(|r| r.body.clone())
            .collect()
    }

    pub fn creates(&self) -> usize {
        self.state.lock().unwrap().creates
    }

    pub fn updates(&self) -> usize {
        self.state.lock().unwrap().updates
    }

    pub fn deletes(&self) -> usize {
        self.state.lock().unwrap().deletes
    }

    fn allocate_id(&self) -> String {
        format!(
            "00000000-0000-0000-0000-{:012}",
            self.next_id.fetch_add(1, Ordering::SeqCst)
        )
    }

    fn listed(rule: &StoredRule) -> Value {
        let mut value = rule.body.clone();
        value["Id"] = json!(rule.id);
        value
    }
}

impl Respond for FakeTransportRules {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let segments: Vec<&str> = request
            .url
            .path_segments()
            .map(Iterator::collect)
            .unwrap_or_default();
        // adminapi / beta / {tenant} / TransportRule [/ {id}]
        let rule_id = segments.get(4).copied();
        let method = request.method.as_str();

        if method != "GET" && self.unsupported_mutations {
            return ResponseTemplate::new(400).set_body_json(odata_error(
                "NotSupported",
                "Transport rules cannot be changed through this API",
            ));
        }

        let mut state = self.state.lock().unwrap();
        match (method, rule_id) {
            ("GET", None) => {
                let value: Vec<Value> = state.rules.iter().map(Self::listed).collect();
                ResponseTemplate::new(200).set_body_json(json!({ "value": value }))
            }
            ("POST", None) => {
                let body: Value = match request.body_json() {
                    Ok(body) => body,
                    Err(_) => return ResponseTemplate::new(400),
                };
                let rule = StoredRule {
                    id: self.allocate_id(),
                    body,
                };
                let listed = Self::listed(&rule);
                state.rules.push(rule);
                state.creates += 1;
                ResponseTemplate::new(201).set_body_json(listed)
            }
            ("PUT", Some(id)) => {
                let body: Value = match request.body_json() {
                    Ok(body) => body,
                    Err(_) => return ResponseTemplate::new(400),
                };
                match state.rules.iter_mut().find(|r| r.id == id) {
                    Some(rule) => {
                        rule.body = body;
                        state.updates += 1;
                        ResponseTemplate::new(204)
                    }
                    None => ResponseTemplate::new(404)
                        .set_body_json(odata_error("NotFound", "rule not found")),
                }
            }
            ("DELETE", Some(id)) => {
                let before = state.rules.len();
                state.rules.retain(|r| r.id != id);
                if state.rules.len() < before {
                    state.deletes += 1;
                    ResponseTemplate::new(204)
                } else {
                    ResponseTemplate::new(404)
                        .set_body_json(odata_error("NotFound", "rule not found"))
                }
            }
            _ => ResponseTemplate::new(405),
        }
    }
}
