//! Clients for the remote services the console projects: identity (tokens and
//! tenants), network (networks, ports, attachments) and compute (virtual interfaces).
//!
//! Views only see the traits below; `keystone`, `quantum` and `nova` hold the
//! reqwest implementations. Every call is a single blocking round trip from the
//! handler's point of view; there is no retry or caching at this layer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;

pub mod keystone;
pub mod nova;
pub mod quantum;

pub use keystone::KeystoneClient;
pub use nova::NovaClient;
pub use quantum::QuantumClient;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Role {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_enabled() -> bool { true }

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TenantRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUser {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub roles: Vec<Role>,
}

/// A token issued by the identity service. Unscoped tokens carry no tenant.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Token {
    pub id: String,
    #[serde(default)]
    pub tenant: Option<TenantRef>,
    pub user: TokenUser,
    #[serde(default)]
    pub service_catalog: ServiceCatalog,
}

/// Opaque endpoint catalog returned with a token.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ServiceCatalog(pub serde_json::Value);

impl ServiceCatalog {
    /// Public URL for the first service of `service_type`, preferring an
    /// endpoint in `region` when one is given and present.
    pub fn url_for(&self, service_type: &str, region: Option<&str>) -> Option<String> {
        let services = self.0.as_array()?;
        let service = services
            .iter()
            .find(|s| s.get("type").and_then(|t| t.as_str()) == Some(service_type))?;
        let endpoints = service.get("endpoints")?.as_array()?;
        let in_region = region.and_then(|r| {
            endpoints.iter().find(|e| e.get("region").and_then(|v| v.as_str()) == Some(r))
        });
        let endpoint = in_region.or_else(|| endpoints.first())?;
        endpoint.get("publicURL").and_then(|u| u.as_str()).map(|s| s.to_string())
    }
}

/// Where and as whom to call a tenant-scoped service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceScope {
    pub endpoint: String,
    pub token: String,
    pub tenant_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkRef {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkDetails {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortRef {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortDetails {
    pub id: String,
    pub state: String,
}

/// What a port is plugged into. `id` is the interface id; `None` means free.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    #[serde(default)]
    pub id: Option<String>,
}

impl Attachment {
    pub fn is_attached(&self) -> bool {
        self.id.as_deref().map(|s| !s.is_empty()).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum PortState {
    Active,
    Down,
}

impl PortState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PortState::Active => "ACTIVE",
            PortState::Down => "DOWN",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => Some(PortState::Active),
            "DOWN" => Some(PortState::Down),
            _ => None,
        }
    }

    pub fn toggled(&self) -> Self {
        match self {
            PortState::Active => PortState::Down,
            PortState::Down => PortState::Active,
        }
    }
}

/// A virtual interface of a compute instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Vif {
    pub id: String,
    pub instance_id: String,
    pub instance_name: String,
}

#[async_trait]
pub trait IdentityApi: Send + Sync {
    async fn create_unscoped_token(&self, endpoint: &str, username: &str, password: &str) -> ApiResult<Token>;

    async fn create_scoped_token(&self, endpoint: &str, tenant_id: &str, unscoped_token: &str) -> ApiResult<Token>;

    /// Password authentication; an empty `tenant_id` yields an unscoped token.
    async fn create_token(&self, endpoint: &str, tenant_id: &str, username: &str, password: &str) -> ApiResult<Token>;

    async fn list_tenants_for_token(&self, endpoint: &str, token_id: &str) -> ApiResult<Vec<Tenant>>;
}

#[async_trait]
pub trait NetworkApi: Send + Sync {
    async fn list_networks(&self, scope: &ServiceScope) -> ApiResult<Vec<NetworkRef>>;
    async fn get_network_details(&self, scope: &ServiceScope, network_id: &str) -> ApiResult<NetworkDetails>;
    async fn create_network(&self, scope: &ServiceScope, name: &str) -> ApiResult<NetworkRef>;
    async fn rename_network(&self, scope: &ServiceScope, network_id: &str, new_name: &str) -> ApiResult<()>;
    async fn delete_network(&self, scope: &ServiceScope, network_id: &str) -> ApiResult<()>;

    async fn list_ports(&self, scope: &ServiceScope, network_id: &str) -> ApiResult<Vec<PortRef>>;
    async fn get_port_details(&self, scope: &ServiceScope, network_id: &str, port_id: &str) -> ApiResult<PortDetails>;
    async fn get_port_attachment(&self, scope: &ServiceScope, network_id: &str, port_id: &str) -> ApiResult<Attachment>;
    async fn create_port(&self, scope: &ServiceScope, network_id: &str, state: PortState) -> ApiResult<PortRef>;
    async fn set_port_state(&self, scope: &ServiceScope, network_id: &str, port_id: &str, state: PortState) -> ApiResult<()>;
    async fn delete_port(&self, scope: &ServiceScope, network_id: &str, port_id: &str) -> ApiResult<()>;
    async fn attach_port(&self, scope: &ServiceScope, network_id: &str, port_id: &str, vif_id: &str) -> ApiResult<()>;
    async fn detach_port(&self, scope: &ServiceScope, network_id: &str, port_id: &str) -> ApiResult<()>;
}

#[async_trait]
pub trait ComputeApi: Send + Sync {
    /// Virtual interfaces of every instance visible to the tenant.
    async fn list_vifs(&self, scope: &ServiceScope) -> ApiResult<Vec<Vif>>;
}

/// Shared reqwest client with the configured timeout.
pub fn http_client(timeout: std::time::Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Join a base endpoint and a path without doubling or dropping slashes.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Read a non-2xx response into an `ApiError`.
pub(crate) async fn error_from_response(resp: reqwest::Response) -> crate::error::ApiError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    crate::error::ApiError::from_status(status, body)
}
