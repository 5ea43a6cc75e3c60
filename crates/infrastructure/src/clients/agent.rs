//! Agent credential client. Query-then-register: an existing
//! credential is reused, a missing one is created on the spot.

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use clusterops_domain::{AgentCredential, AgentRegistry, OpsResult};

use super::{build_http_client, get_envelope, optional_data, post_envelope};

pub struct HttpAgentRegistry {
    base_url: String,
    http: reqwest::Client,
}

impl HttpAgentRegistry {
    pub fn new(base_url: &str, timeout_seconds: u64) -> OpsResult<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: build_http_client(timeout_seconds)?,
        })
    }
}

#[async_trait]
impl AgentRegistry for HttpAgentRegistry {
    async fn get_or_register(
        &self,
        project_id: &str,
        cluster_id: &str,
    ) -> OpsResult<AgentCredential> {
        let url = format!(
            "{}/api/v1/projects/{project_id}/clusters/{cluster_id}/credentials",
            self.base_url
        );

        let envelope = get_envelope(&self.http, &url, "查询Agent凭证").await?;
        if let Some(credential) = optional_data(envelope, "查询Agent凭证")? {
            return Ok(credential);
        }

        debug!(cluster_id, "no existing agent credential, registering");
        post_envelope(&self.http, &url, &json!({}), "注册Agent凭证")
            .await?
            .into_data("注册Agent凭证")
    }
}
