//! Compute service client, limited to what the port views need: the virtual
//! interfaces of the tenant's instances.

use async_trait::async_trait;
use serde::Deserialize;

use super::{error_from_response, join_url, ComputeApi, ServiceScope, Vif};
use crate::error::{ApiError, ApiResult};

#[derive(Deserialize)]
struct Servers {
    #[serde(default)]
    servers: Vec<Server>,
}

#[derive(Deserialize)]
struct Server {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
struct VirtualInterfaces {
    #[serde(default)]
    virtual_interfaces: Vec<VirtualInterface>,
}

#[derive(Deserialize)]
struct VirtualInterface {
    id: String,
}

#[derive(Clone)]
pub struct NovaClient {
    client: reqwest::Client,
}

impl NovaClient {
    pub fn new(client: reqwest::Client) -> Self { Self { client } }

    async fn get(&self, scope: &ServiceScope, path: &str) -> ApiResult<reqwest::Response> {
        // compute endpoints already embed the tenant
        let url = join_url(&scope.endpoint, path);
        let resp = self.client.get(&url).header("X-Auth-Token", &scope.token).send().await?;
        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }
        Ok(resp)
    }
}

#[async_trait]
impl ComputeApi for NovaClient {
    async fn list_vifs(&self, scope: &ServiceScope) -> ApiResult<Vec<Vif>> {
        let servers: Servers = self
            .get(scope, "servers/detail")
            .await?
            .json()
            .await
            .map_err(|e| ApiError::Unexpected(format!("server list: {}", e)))?;
        let mut vifs = Vec::new();
        for server in servers.servers {
            let path = format!("servers/{}/os-virtual-interfaces", server.id);
            let ifaces: VirtualInterfaces = self
                .get(scope, &path)
                .await?
                .json()
                .await
                .map_err(|e| ApiError::Unexpected(format!("virtual interfaces: {}", e)))?;
            for vi in ifaces.virtual_interfaces {
                vifs.push(Vif { id: vi.id, instance_id: server.id.clone(), instance_name: server.name.clone() });
            }
        }
        Ok(vifs)
    }
}
