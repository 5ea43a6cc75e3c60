//! Workload query client, used to confirm nodes are empty before
//! deletion.

use async_trait::async_trait;
use serde_json::json;

use clusterops_domain::{OpsResult, WorkloadQuery};

use super::{build_http_client, optional_data, post_envelope};

pub struct HttpWorkloadQuery {
    base_url: String,
    http: reqwest::Client,
}

impl HttpWorkloadQuery {
    pub fn new(base_url: &str, timeout_seconds: u64) -> OpsResult<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: build_http_client(timeout_seconds)?,
        })
    }
}

#[async_trait]
impl WorkloadQuery for HttpWorkloadQuery {
    async fn list_pods(&self, host_ips: &[String]) -> OpsResult<Vec<serde_json::Value>> {
        let url = format!("{}/api/v1/pods/query", self.base_url);
        let envelope = post_envelope(
            &self.http,
            &url,
            &json!({ "host_ips": host_ips }),
            "工作负载查询",
        )
        .await?;
        Ok(optional_data(envelope, "工作负载查询")?.unwrap_or_default())
    }
}
