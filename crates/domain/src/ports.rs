//! 协作方端口抽象
//!
//! 注册中心、工作流引擎、Agent注册、权限注册与负载查询都是
//! 网络对端，这里只定义编排核心消费的接口。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::entities::{ClusterRecord, ClusterStatus, NodeRecord, NodeStatus};
use crate::errors::{OpsError, OpsResult};
use crate::snapshot::ConfigSnapshot;

/// 协作方统一响应信封，code==0 为唯一的无错误哨兵
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub code: i32,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    /// 非零code或data缺失统一归一化为协作方错误
    pub fn into_data(self, what: &str) -> OpsResult<T> {
        if self.code != 0 {
            return Err(OpsError::collaborator_error(format!(
                "{what} 返回错误码 {}: {}",
                self.code, self.message
            )));
        }
        self.data
            .ok_or_else(|| OpsError::collaborator_error(format!("{what} 响应缺少 data")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStatusUpdate {
    pub inner_ip: String,
    pub status: NodeStatus,
}

/// 集群/节点资源注册中心（CRUD存储，网络对端）
#[async_trait]
pub trait ClusterRegistry: Send + Sync {
    async fn create_cluster(&self, cluster: &ClusterRecord) -> OpsResult<ClusterRecord>;
    async fn get_cluster(&self, cluster_id: &str) -> OpsResult<Option<ClusterRecord>>;
    /// 带预期状态的条件更新，预期不满足时返回 false（显式CAS，消除并发竞态）
    async fn update_cluster_status(
        &self,
        cluster_id: &str,
        expect: Option<ClusterStatus>,
        next: ClusterStatus,
    ) -> OpsResult<bool>;
    /// 硬删除集群记录，仅用于删除流程的提交失败兜底
    async fn delete_cluster(&self, cluster_id: &str) -> OpsResult<()>;

    async fn get_master_nodes(&self, cluster_id: &str) -> OpsResult<Vec<NodeRecord>>;
    async fn get_cluster_nodes(&self, cluster_id: &str) -> OpsResult<Vec<NodeRecord>>;
    /// 全平台按IP检索节点，用于建节点时的占用校验
    async fn find_nodes_by_ips(&self, ips: &[String]) -> OpsResult<Vec<NodeRecord>>;
    async fn create_nodes(
        &self,
        cluster_id: &str,
        ips: &[String],
        status: NodeStatus,
    ) -> OpsResult<Vec<NodeRecord>>;
    async fn update_node_list(
        &self,
        cluster_id: &str,
        updates: &[NodeStatusUpdate],
    ) -> OpsResult<()>;
    async fn delete_node_labels(&self, cluster_id: &str, ips: &[String]) -> OpsResult<()>;

    async fn get_cluster_namespaces(&self, cluster_id: &str) -> OpsResult<Vec<String>>;
    async fn delete_cluster_namespaces(&self, cluster_id: &str) -> OpsResult<()>;

    async fn save_snapshot(&self, snapshot: &ConfigSnapshot) -> OpsResult<()>;
    async fn get_snapshot(&self, cluster_id: &str) -> OpsResult<Option<ConfigSnapshot>>;
}

/// 工作流引擎的一次提交结果
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskHandle {
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub task_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EngineTaskState {
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "FAILURE")]
    Failure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineTaskStatus {
    pub state: EngineTaskState,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub task_url: Option<String>,
}

/// 外部工作流引擎：黑盒任务队列，submit + poll
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    async fn create_cluster(&self, params: &serde_json::Value) -> OpsResult<TaskHandle>;
    async fn delete_cluster(&self, params: &serde_json::Value) -> OpsResult<TaskHandle>;
    async fn add_cluster_node(&self, params: &serde_json::Value) -> OpsResult<TaskHandle>;
    async fn delete_cluster_node(&self, params: &serde_json::Value) -> OpsResult<TaskHandle>;
    async fn query_task(&self, task_id: &str) -> OpsResult<EngineTaskStatus>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCredential {
    pub token: String,
    pub bcs_cluster_id: String,
}

/// Agent注册协作方，导入集群纳管与加节点时换取join token
#[async_trait]
pub trait AgentRegistry: Send + Sync {
    async fn get_or_register(
        &self,
        project_id: &str,
        cluster_id: &str,
    ) -> OpsResult<AgentCredential>;
}

/// 权限子系统注册，fire-and-forget，失败不向上传播
#[async_trait]
pub trait AuthRegistry: Send + Sync {
    async fn register(&self, cluster_id: &str, name: &str, environment: &str) -> OpsResult<()>;
}

/// 工作负载查询，用于删节点前确认无运行中的容器
#[async_trait]
pub trait WorkloadQuery: Send + Sync {
    async fn list_pods(&self, host_ips: &[String]) -> OpsResult<Vec<serde_json::Value>>;
}
