//! Identity service client (Keystone v2.0 token API).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{error_from_response, join_url, IdentityApi, ServiceCatalog, Tenant, TenantRef, Token, TokenUser};
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Deserialize)]
struct AccessEnvelope {
    access: Access,
}

#[derive(Debug, Deserialize)]
struct Access {
    token: AccessToken,
    user: TokenUser,
    #[serde(default, rename = "serviceCatalog")]
    service_catalog: ServiceCatalog,
}

#[derive(Debug, Deserialize)]
struct AccessToken {
    id: String,
    #[serde(default)]
    tenant: Option<TenantRef>,
}

#[derive(Debug, Deserialize)]
struct TenantsEnvelope {
    #[serde(default)]
    tenants: Vec<Tenant>,
}

impl From<Access> for Token {
    fn from(a: Access) -> Self {
        Token { id: a.token.id, tenant: a.token.tenant, user: a.user, service_catalog: a.service_catalog }
    }
}

#[derive(Clone)]
pub struct KeystoneClient {
    client: reqwest::Client,
}

impl KeystoneClient {
    pub fn new(client: reqwest::Client) -> Self { Self { client } }

    async fn post_tokens(&self, endpoint: &str, body: serde_json::Value) -> ApiResult<Token> {
        let url = join_url(endpoint, "tokens");
        let resp = self.client.post(&url).json(&body).send().await?;
        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }
        let env: AccessEnvelope = resp
            .json()
            .await
            .map_err(|e| ApiError::Unexpected(format!("invalid token response: {}", e)))?;
        debug!(target: "keystone", user = %env.access.user.name, scoped = env.access.token.tenant.is_some(), "token issued");
        Ok(env.access.into())
    }
}

#[async_trait]
impl IdentityApi for KeystoneClient {
    async fn create_unscoped_token(&self, endpoint: &str, username: &str, password: &str) -> ApiResult<Token> {
        self.create_token(endpoint, "", username, password).await
    }

    async fn create_scoped_token(&self, endpoint: &str, tenant_id: &str, unscoped_token: &str) -> ApiResult<Token> {
        let body = json!({"auth": {"token": {"id": unscoped_token}, "tenantId": tenant_id}});
        self.post_tokens(endpoint, body).await
    }

    async fn create_token(&self, endpoint: &str, tenant_id: &str, username: &str, password: &str) -> ApiResult<Token> {
        let mut auth = json!({"passwordCredentials": {"username": username, "password": password}});
        if !tenant_id.is_empty() {
            auth["tenantId"] = json!(tenant_id);
        }
        self.post_tokens(endpoint, json!({ "auth": auth })).await
    }

    async fn list_tenants_for_token(&self, endpoint: &str, token_id: &str) -> ApiResult<Vec<Tenant>> {
        let url = join_url(endpoint, "tenants");
        let resp = self.client.get(&url).header("X-Auth-Token", token_id).send().await?;
        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }
        let env: TenantsEnvelope = resp
            .json()
            .await
            .map_err(|e| ApiError::Unexpected(format!("invalid tenant list: {}", e)))?;
        Ok(env.tenants)
    }
}
