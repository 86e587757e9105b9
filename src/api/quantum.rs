//! Network service client (Quantum v1.0, tenant-scoped resources).

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use super::{
    error_from_response, join_url, Attachment, NetworkApi, NetworkDetails, NetworkRef, PortDetails, PortRef, PortState,
    ServiceScope,
};
use crate::error::{ApiError, ApiResult};

#[derive(Deserialize)]
struct Networks { networks: Vec<NetworkRef> }
#[derive(Deserialize)]
struct NetworkBody<T> { network: T }
#[derive(Deserialize)]
struct Ports { ports: Vec<PortRef> }
#[derive(Deserialize)]
struct PortBody<T> { port: T }
#[derive(Deserialize)]
struct AttachmentBody {
    #[serde(default)]
    attachment: Option<Attachment>,
}

#[derive(Clone)]
pub struct QuantumClient {
    client: reqwest::Client,
}

fn tenant_path(scope: &ServiceScope, rest: &str) -> String {
    join_url(&scope.endpoint, &format!("tenants/{}/{}", scope.tenant_id, rest))
}

impl QuantumClient {
    pub fn new(client: reqwest::Client) -> Self { Self { client } }

    async fn send(
        &self,
        method: Method,
        scope: &ServiceScope,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> ApiResult<reqwest::Response> {
        let url = tenant_path(scope, path);
        let mut req = self.client.request(method, &url).header("X-Auth-Token", &scope.token);
        if let Some(b) = body {
            req = req.json(&b);
        }
        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }
        Ok(resp)
    }

    async fn get_json<T: DeserializeOwned>(&self, scope: &ServiceScope, path: &str) -> ApiResult<T> {
        let resp = self.send(Method::GET, scope, path, None).await?;
        resp.json::<T>().await.map_err(|e| ApiError::Unexpected(format!("{}: {}", path, e)))
    }
}

#[async_trait]
impl NetworkApi for QuantumClient {
    async fn list_networks(&self, scope: &ServiceScope) -> ApiResult<Vec<NetworkRef>> {
        Ok(self.get_json::<Networks>(scope, "networks").await?.networks)
    }

    async fn get_network_details(&self, scope: &ServiceScope, network_id: &str) -> ApiResult<NetworkDetails> {
        let path = format!("networks/{}", network_id);
        Ok(self.get_json::<NetworkBody<NetworkDetails>>(scope, &path).await?.network)
    }

    async fn create_network(&self, scope: &ServiceScope, name: &str) -> ApiResult<NetworkRef> {
        let body = json!({"network": {"name": name}});
        let resp = self.send(Method::POST, scope, "networks", Some(body)).await?;
        let created: NetworkBody<NetworkRef> = resp
            .json()
            .await
            .map_err(|e| ApiError::Unexpected(format!("create network: {}", e)))?;
        Ok(created.network)
    }

    async fn rename_network(&self, scope: &ServiceScope, network_id: &str, new_name: &str) -> ApiResult<()> {
        let body = json!({"network": {"name": new_name}});
        self.send(Method::PUT, scope, &format!("networks/{}", network_id), Some(body)).await?;
        Ok(())
    }

    async fn delete_network(&self, scope: &ServiceScope, network_id: &str) -> ApiResult<()> {
        self.send(Method::DELETE, scope, &format!("networks/{}", network_id), None).await?;
        Ok(())
    }

    async fn list_ports(&self, scope: &ServiceScope, network_id: &str) -> ApiResult<Vec<PortRef>> {
        let path = format!("networks/{}/ports", network_id);
        Ok(self.get_json::<Ports>(scope, &path).await?.ports)
    }

    async fn get_port_details(&self, scope: &ServiceScope, network_id: &str, port_id: &str) -> ApiResult<PortDetails> {
        let path = format!("networks/{}/ports/{}", network_id, port_id);
        Ok(self.get_json::<PortBody<PortDetails>>(scope, &path).await?.port)
    }

    async fn get_port_attachment(&self, scope: &ServiceScope, network_id: &str, port_id: &str) -> ApiResult<Attachment> {
        let path = format!("networks/{}/ports/{}/attachment", network_id, port_id);
        Ok(self.get_json::<AttachmentBody>(scope, &path).await?.attachment.unwrap_or_default())
    }

    async fn create_port(&self, scope: &ServiceScope, network_id: &str, state: PortState) -> ApiResult<PortRef> {
        let body = json!({"port": {"state": state.as_str()}});
        let resp = self.send(Method::POST, scope, &format!("networks/{}/ports", network_id), Some(body)).await?;
        let created: PortBody<PortRef> = resp
            .json()
            .await
            .map_err(|e| ApiError::Unexpected(format!("create port: {}", e)))?;
        Ok(created.port)
    }

    async fn set_port_state(&self, scope: &ServiceScope, network_id: &str, port_id: &str, state: PortState) -> ApiResult<()> {
        let body = json!({"port": {"state": state.as_str()}});
        self.send(Method::PUT, scope, &format!("networks/{}/ports/{}", network_id, port_id), Some(body)).await?;
        Ok(())
    }

    async fn delete_port(&self, scope: &ServiceScope, network_id: &str, port_id: &str) -> ApiResult<()> {
        self.send(Method::DELETE, scope, &format!("networks/{}/ports/{}", network_id, port_id), None).await?;
        Ok(())
    }

    async fn attach_port(&self, scope: &ServiceScope, network_id: &str, port_id: &str, vif_id: &str) -> ApiResult<()> {
        let body = json!({"attachment": {"id": vif_id}});
        let path = format!("networks/{}/ports/{}/attachment", network_id, port_id);
        self.send(Method::PUT, scope, &path, Some(body)).await?;
        Ok(())
    }

    async fn detach_port(&self, scope: &ServiceScope, network_id: &str, port_id: &str) -> ApiResult<()> {
        let path = format!("networks/{}/ports/{}/attachment", network_id, port_id);
        self.send(Method::DELETE, scope, &path, None).await?;
        Ok(())
    }
}
