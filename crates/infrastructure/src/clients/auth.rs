//! Auth subsystem registration client. Callers treat failures as
//! fire-and-forget; this client still reports them faithfully.

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use clusterops_domain::{AuthRegistry, OpsResult};

use super::{build_http_client, check_ack, post_envelope};

pub struct HttpAuthRegistry {
    base_url: String,
    http: reqwest::Client,
}

impl HttpAuthRegistry {
    pub fn new(base_url: &str, timeout_seconds: u64) -> OpsResult<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: build_http_client(timeout_seconds)?,
        })
    }
}

#[async_trait]
impl AuthRegistry for HttpAuthRegistry {
    async fn register(&self, cluster_id: &str, name: &str, environment: &str) -> OpsResult<()> {
        let url = format!("{}/api/v1/auth/clusters", self.base_url);
        let envelope = post_envelope(
            &self.http,
            &url,
            &json!({
                "cluster_id": cluster_id,
                "name": name,
                "environment": environment,
            }),
            "权限注册",
        )
        .await?;
        check_ack(envelope, "权限注册")?;
        info!(cluster_id, "cluster registered with auth subsystem");
        Ok(())
    }
}
