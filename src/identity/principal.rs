use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::error;

use crate::api::{IdentityApi, Role, ServiceCatalog, Tenant, Token};

/// The authenticated identity for one request.
///
/// Built from a scoped token at login, or from the [`UserRecord`] kept in the
/// session on every later request. The list of tenants the user may switch to is
/// only fetched when something asks for it, and at most once per instance.
#[derive(Debug, Default)]
pub struct User {
    pub id: String,
    /// Id of the tenant-scoped token; empty means anonymous.
    pub token: String,
    pub username: String,
    pub tenant_id: String,
    pub tenant_name: String,
    pub service_catalog: ServiceCatalog,
    pub roles: Vec<Role>,
    authorized_tenants: OnceCell<Vec<Tenant>>,
}

/// Serializable part of a [`User`], stored in the session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserRecord {
    pub id: String,
    pub token: String,
    pub username: String,
    pub tenant_id: String,
    pub tenant_name: String,
    #[serde(default)]
    pub service_catalog: ServiceCatalog,
    #[serde(default)]
    pub roles: Vec<Role>,
}

impl User {
    pub fn from_token(token: &Token) -> Self {
        let (tenant_id, tenant_name) = token
            .tenant
            .as_ref()
            .map(|t| (t.id.clone(), t.name.clone()))
            .unwrap_or_default();
        Self {
            id: token.user.id.clone(),
            token: token.id.clone(),
            username: token.user.name.clone(),
            tenant_id,
            tenant_name,
            service_catalog: token.service_catalog.clone(),
            roles: token.user.roles.clone(),
            authorized_tenants: OnceCell::new(),
        }
    }

    pub fn from_record(rec: UserRecord) -> Self {
        Self {
            id: rec.id,
            token: rec.token,
            username: rec.username,
            tenant_id: rec.tenant_id,
            tenant_name: rec.tenant_name,
            service_catalog: rec.service_catalog,
            roles: rec.roles,
            authorized_tenants: OnceCell::new(),
        }
    }

    pub fn to_record(&self) -> UserRecord {
        UserRecord {
            id: self.id.clone(),
            token: self.token.clone(),
            username: self.username.clone(),
            tenant_id: self.tenant_id.clone(),
            tenant_name: self.tenant_name.clone(),
            service_catalog: self.service_catalog.clone(),
            roles: self.roles.clone(),
        }
    }

    // TODO: take token expiry into account once the session keeps the token's expires field
    pub fn is_authenticated(&self) -> bool {
        !self.token.is_empty()
    }

    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|r| r.name.eq_ignore_ascii_case("admin"))
    }

    /// Tenants this user may scope into.
    ///
    /// Uses the session's unscoped token when there is one, otherwise the user's own
    /// token. A failed lookup is logged and remembered as an empty list.
    pub async fn authorized_tenants(
        &self,
        api: &dyn IdentityApi,
        endpoint: &str,
        unscoped_token: Option<&str>,
    ) -> &[Tenant] {
        if !self.is_authenticated() {
            return &[];
        }
        let tenants = self
            .authorized_tenants
            .get_or_init(|| async {
                let token = unscoped_token.unwrap_or(self.token.as_str());
                match api.list_tenants_for_token(endpoint, token).await {
                    Ok(list) => list,
                    Err(e) => {
                        error!(target: "auth", user = %self.username, "Could not retrieve tenant list: {}", e);
                        Vec::new()
                    }
                }
            })
            .await;
        tenants.as_slice()
    }

    /// Seed the tenant cache. Returns false if it was already resolved.
    pub fn set_authorized_tenants(&self, tenants: Vec<Tenant>) -> bool {
        self.authorized_tenants.set(tenants).is_ok()
    }
}
