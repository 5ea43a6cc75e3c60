//! Workflow engine client. The engine is a black box: four typed
//! submissions returning a task handle, plus status polling by id.

use async_trait::async_trait;
use tracing::debug;

use clusterops_domain::{EngineTaskStatus, OpsResult, TaskHandle, WorkflowEngine};

use super::{build_http_client, get_envelope, post_envelope};

pub struct HttpWorkflowEngine {
    base_url: String,
    http: reqwest::Client,
}

impl HttpWorkflowEngine {
    pub fn new(base_url: &str, timeout_seconds: u64) -> OpsResult<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: build_http_client(timeout_seconds)?,
        })
    }

    async fn submit(&self, action: &str, params: &serde_json::Value) -> OpsResult<TaskHandle> {
        let url = format!("{}/api/v1/tasks/{action}", self.base_url);
        let handle: TaskHandle = post_envelope(&self.http, &url, params, "任务提交")
            .await?
            .into_data("任务提交")?;
        debug!(action, task_id = ?handle.task_id, "workflow task submitted");
        Ok(handle)
    }
}

#[async_trait]
impl WorkflowEngine for HttpWorkflowEngine {
    async fn create_cluster(&self, params: &serde_json::Value) -> OpsResult<TaskHandle> {
        self.submit("create_cluster", params).await
    }

    async fn delete_cluster(&self, params: &serde_json::Value) -> OpsResult<TaskHandle> {
        self.submit("delete_cluster", params).await
    }

    async fn add_cluster_node(&self, params: &serde_json::Value) -> OpsResult<TaskHandle> {
        self.submit("add_cluster_node", params).await
    }

    async fn delete_cluster_node(&self, params: &serde_json::Value) -> OpsResult<TaskHandle> {
        self.submit("delete_cluster_node", params).await
    }

    async fn query_task(&self, task_id: &str) -> OpsResult<EngineTaskStatus> {
        let url = format!("{}/api/v1/tasks/{task_id}", self.base_url);
        get_envelope(&self.http, &url, "任务状态查询")
            .await?
            .into_data("任务状态查询")
    }
}
