//! In-memory identity, network and compute services for integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::Notify;

use horizon::api::{
    Attachment, ComputeApi, IdentityApi, NetworkApi, NetworkDetails, NetworkRef, PortDetails, PortRef, PortState, Role,
    ServiceCatalog, ServiceScope, Tenant, TenantRef, Token, TokenUser, Vif,
};
use horizon::config::Settings;
use horizon::error::{ApiError, ApiResult};
use horizon::identity::{SessionData, User};
use horizon::server::{AppState, SESSION_COOKIE};

pub const USERNAME: &str = "alice";
pub const PASSWORD: &str = "secret";

pub fn tenant(id: &str) -> Tenant {
    Tenant { id: id.to_string(), name: format!("{}-name", id), enabled: true, description: None }
}

pub fn catalog() -> ServiceCatalog {
    ServiceCatalog(json!([
        {"type": "network", "name": "quantum", "endpoints": [{"region": "RegionOne", "publicURL": "http://quantum.test:9696/v1.0"}]},
        {"type": "compute", "name": "nova", "endpoints": [{"region": "RegionOne", "publicURL": "http://nova.test:8774/v1.1/t1"}]}
    ]))
}

pub fn token(id: &str, tenant: Option<&str>, roles: &[&str]) -> Token {
    Token {
        id: id.to_string(),
        tenant: tenant.map(|t| TenantRef { id: t.to_string(), name: format!("{}-name", t) }),
        user: TokenUser {
            id: "u1".to_string(),
            name: USERNAME.to_string(),
            roles: roles.iter().map(|r| Role { id: None, name: r.to_string() }).collect(),
        },
        service_catalog: catalog(),
    }
}

/// Identity service that knows one user and a configurable tenant list.
pub struct FakeIdentity {
    pub tenants: Mutex<ApiResult<Vec<Tenant>>>,
    /// Error returned by the password (unscoped or tenant) token request.
    pub password_error: Mutex<Option<ApiError>>,
    /// Tenants that refuse a scoped token, and with what.
    pub scoped_errors: Mutex<HashMap<String, ApiError>>,
    pub scoped_attempts: Mutex<Vec<String>>,
    pub tenant_list_calls: AtomicUsize,
}

impl Default for FakeIdentity {
    fn default() -> Self {
        Self {
            tenants: Mutex::new(Ok(vec![tenant("t1")])),
            password_error: Mutex::new(None),
            scoped_errors: Mutex::new(HashMap::new()),
            scoped_attempts: Mutex::new(Vec::new()),
            tenant_list_calls: AtomicUsize::new(0),
        }
    }
}

impl FakeIdentity {
    pub fn with_tenants(tenants: Vec<Tenant>) -> Self {
        let f = Self::default();
        *f.tenants.lock() = Ok(tenants);
        f
    }

    pub fn refuse(&self, tenant_id: &str, err: ApiError) {
        self.scoped_errors.lock().insert(tenant_id.to_string(), err);
    }

    pub fn tenant_list_calls(&self) -> usize {
        self.tenant_list_calls.load(Ordering::SeqCst)
    }

    fn check_password(&self, username: &str, password: &str) -> ApiResult<()> {
        if let Some(e) = self.password_error.lock().clone() {
            return Err(e);
        }
        if username != USERNAME || password != PASSWORD {
            return Err(ApiError::Unauthorized("Invalid user / password".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityApi for FakeIdentity {
    async fn create_unscoped_token(&self, _endpoint: &str, username: &str, password: &str) -> ApiResult<Token> {
        self.check_password(username, password)?;
        Ok(token("unscoped-tok", None, &[]))
    }

    async fn create_scoped_token(&self, _endpoint: &str, tenant_id: &str, unscoped_token: &str) -> ApiResult<Token> {
        self.scoped_attempts.lock().push(tenant_id.to_string());
        assert_eq!(unscoped_token, "unscoped-tok");
        if let Some(e) = self.scoped_errors.lock().get(tenant_id) {
            return Err(e.clone());
        }
        Ok(token(&format!("scoped-{}", tenant_id), Some(tenant_id), &["Member"]))
    }

    async fn create_token(&self, _endpoint: &str, tenant_id: &str, username: &str, password: &str) -> ApiResult<Token> {
        self.check_password(username, password)?;
        if let Some(e) = self.scoped_errors.lock().get(tenant_id) {
            return Err(e.clone());
        }
        Ok(token(&format!("scoped-{}", tenant_id), Some(tenant_id), &["Member"]))
    }

    async fn list_tenants_for_token(&self, _endpoint: &str, _token_id: &str) -> ApiResult<Vec<Tenant>> {
        self.tenant_list_calls.fetch_add(1, Ordering::SeqCst);
        self.tenants.lock().clone()
    }
}

#[derive(Debug, Clone)]
pub struct FakePort {
    pub id: String,
    pub state: PortState,
    pub attachment: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FakeNetwork {
    pub id: String,
    pub name: String,
    pub ports: Vec<FakePort>,
}

/// Holds a call until the test lets it go.
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

impl Gate {
    async fn pass(&self) {
        self.entered.notify_one();
        self.release.notified().await;
    }
}

/// Network service over a list of networks. `fail` makes every call error out.
#[derive(Default)]
pub struct FakeQuantum {
    pub networks: Mutex<Vec<FakeNetwork>>,
    pub fail: Mutex<Option<ApiError>>,
    /// Network ids whose delete is refused.
    pub undeletable: Mutex<HashSet<String>>,
    pub seen_tenants: Mutex<Vec<String>>,
    /// When set, `list_networks` waits on it.
    pub list_gate: Mutex<Option<Arc<Gate>>>,
}

impl FakeQuantum {
    pub fn with_networks(networks: Vec<FakeNetwork>) -> Self {
        let f = Self::default();
        *f.networks.lock() = networks;
        f
    }

    fn check(&self, scope: &ServiceScope) -> ApiResult<()> {
        self.seen_tenants.lock().push(scope.tenant_id.clone());
        match self.fail.lock().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn with_port<T>(&self, network_id: &str, port_id: &str, f: impl FnOnce(&mut FakePort) -> T) -> ApiResult<T> {
        let mut nets = self.networks.lock();
        let net = nets.iter_mut().find(|n| n.id == network_id).ok_or_else(|| ApiError::NotFound(network_id.into()))?;
        let port = net.ports.iter_mut().find(|p| p.id == port_id).ok_or_else(|| ApiError::NotFound(port_id.into()))?;
        Ok(f(port))
    }
}

pub fn network(id: &str, name: &str, ports: Vec<FakePort>) -> FakeNetwork {
    FakeNetwork { id: id.to_string(), name: name.to_string(), ports }
}

pub fn port(id: &str, attachment: Option<&str>) -> FakePort {
    FakePort { id: id.to_string(), state: PortState::Active, attachment: attachment.map(str::to_string) }
}

#[async_trait]
impl NetworkApi for FakeQuantum {
    async fn list_networks(&self, scope: &ServiceScope) -> ApiResult<Vec<NetworkRef>> {
        let gate = self.list_gate.lock().clone();
        if let Some(gate) = gate {
            gate.pass().await;
        }
        self.check(scope)?;
        Ok(self.networks.lock().iter().map(|n| NetworkRef { id: n.id.clone() }).collect())
    }

    async fn get_network_details(&self, scope: &ServiceScope, network_id: &str) -> ApiResult<NetworkDetails> {
        self.check(scope)?;
        self.networks
            .lock()
            .iter()
            .find(|n| n.id == network_id)
            .map(|n| NetworkDetails { id: n.id.clone(), name: n.name.clone() })
            .ok_or_else(|| ApiError::NotFound(format!("network {}", network_id)))
    }

    async fn create_network(&self, scope: &ServiceScope, name: &str) -> ApiResult<NetworkRef> {
        self.check(scope)?;
        let mut nets = self.networks.lock();
        let id = format!("net-{}", nets.len() + 1);
        nets.push(network(&id, name, Vec::new()));
        Ok(NetworkRef { id })
    }

    async fn rename_network(&self, scope: &ServiceScope, network_id: &str, new_name: &str) -> ApiResult<()> {
        self.check(scope)?;
        let mut nets = self.networks.lock();
        let net = nets.iter_mut().find(|n| n.id == network_id).ok_or_else(|| ApiError::NotFound(network_id.into()))?;
        net.name = new_name.to_string();
        Ok(())
    }

    async fn delete_network(&self, scope: &ServiceScope, network_id: &str) -> ApiResult<()> {
        self.check(scope)?;
        if self.undeletable.lock().contains(network_id) {
            return Err(ApiError::Unexpected("network in use".into()));
        }
        self.networks.lock().retain(|n| n.id != network_id);
        Ok(())
    }

    async fn list_ports(&self, scope: &ServiceScope, network_id: &str) -> ApiResult<Vec<PortRef>> {
        self.check(scope)?;
        let nets = self.networks.lock();
        let net = nets.iter().find(|n| n.id == network_id).ok_or_else(|| ApiError::NotFound(network_id.into()))?;
        Ok(net.ports.iter().map(|p| PortRef { id: p.id.clone() }).collect())
    }

    async fn get_port_details(&self, scope: &ServiceScope, network_id: &str, port_id: &str) -> ApiResult<PortDetails> {
        self.check(scope)?;
        self.with_port(network_id, port_id, |p| PortDetails { id: p.id.clone(), state: p.state.as_str().to_string() })
    }

    async fn get_port_attachment(&self, scope: &ServiceScope, network_id: &str, port_id: &str) -> ApiResult<Attachment> {
        self.check(scope)?;
        self.with_port(network_id, port_id, |p| Attachment { id: p.attachment.clone() })
    }

    async fn create_port(&self, scope: &ServiceScope, network_id: &str, state: PortState) -> ApiResult<PortRef> {
        self.check(scope)?;
        let mut nets = self.networks.lock();
        let net = nets.iter_mut().find(|n| n.id == network_id).ok_or_else(|| ApiError::NotFound(network_id.into()))?;
        let id = format!("{}-port-{}", network_id, net.ports.len() + 1);
        net.ports.push(FakePort { id: id.clone(), state, attachment: None });
        Ok(PortRef { id })
    }

    async fn set_port_state(&self, scope: &ServiceScope, network_id: &str, port_id: &str, state: PortState) -> ApiResult<()> {
        self.check(scope)?;
        self.with_port(network_id, port_id, |p| p.state = state)
    }

    async fn delete_port(&self, scope: &ServiceScope, network_id: &str, port_id: &str) -> ApiResult<()> {
        self.check(scope)?;
        let mut nets = self.networks.lock();
        let net = nets.iter_mut().find(|n| n.id == network_id).ok_or_else(|| ApiError::NotFound(network_id.into()))?;
        net.ports.retain(|p| p.id != port_id);
        Ok(())
    }

    async fn attach_port(&self, scope: &ServiceScope, network_id: &str, port_id: &str, vif_id: &str) -> ApiResult<()> {
        self.check(scope)?;
        self.with_port(network_id, port_id, |p| p.attachment = Some(vif_id.to_string()))
    }

    async fn detach_port(&self, scope: &ServiceScope, network_id: &str, port_id: &str) -> ApiResult<()> {
        self.check(scope)?;
        self.with_port(network_id, port_id, |p| p.attachment = None)
    }
}

#[derive(Default)]
pub struct FakeNova {
    pub vifs: Mutex<Vec<Vif>>,
    pub fail: Mutex<Option<ApiError>>,
}

impl FakeNova {
    pub fn with_vifs(vifs: Vec<Vif>) -> Self {
        let f = Self::default();
        *f.vifs.lock() = vifs;
        f
    }
}

pub fn vif(id: &str, instance_id: &str, instance_name: &str) -> Vif {
    Vif { id: id.to_string(), instance_id: instance_id.to_string(), instance_name: instance_name.to_string() }
}

#[async_trait]
impl ComputeApi for FakeNova {
    async fn list_vifs(&self, _scope: &ServiceScope) -> ApiResult<Vec<Vif>> {
        match self.fail.lock().clone() {
            Some(e) => Err(e),
            None => Ok(self.vifs.lock().clone()),
        }
    }
}

pub fn scope() -> ServiceScope {
    ServiceScope { endpoint: "http://quantum.test:9696/v1.0".into(), token: "scoped-t1".into(), tenant_id: "t1".into() }
}

pub struct Harness {
    pub state: AppState,
    pub identity: Arc<FakeIdentity>,
    pub quantum: Arc<FakeQuantum>,
    pub nova: Arc<FakeNova>,
}

pub fn harness(identity: FakeIdentity, quantum: FakeQuantum, nova: FakeNova) -> Harness {
    harness_with_settings(Settings { secure_cookies: false, ..Settings::default() }, identity, quantum, nova)
}

pub fn harness_with_settings(settings: Settings, identity: FakeIdentity, quantum: FakeQuantum, nova: FakeNova) -> Harness {
    let identity = Arc::new(identity);
    let quantum = Arc::new(quantum);
    let nova = Arc::new(nova);
    let state = AppState::new(settings, identity.clone(), quantum.clone(), nova.clone()).unwrap();
    Harness { state, identity, quantum, nova }
}

impl Harness {
    /// Plant a logged-in session for tenant t1 and return its cookie header value.
    pub fn login(&self) -> (String, String) {
        let (sid, mut data): (String, SessionData) = self.state.sessions.create().unwrap();
        let user = User::from_token(&token("scoped-t1", Some("t1"), &["Member"]));
        data.user = Some(user.to_record());
        data.unscoped_token = Some("unscoped-tok".into());
        let csrf = data.csrf_token.clone();
        assert!(self.state.sessions.save(&sid, data));
        (format!("{}={}", SESSION_COOKIE, sid), csrf)
    }
}
