//! 领域仓储抽象
//!
//! 任务记录由生命周期子系统独占读写，按集群维度最近优先排序。

use async_trait::async_trait;

use crate::entities::TaskLogEntry;
use crate::errors::OpsResult;

/// 任务记录仓储抽象
#[async_trait]
pub trait TaskLogRepository: Send + Sync {
    async fn create(&self, entry: &TaskLogEntry) -> OpsResult<TaskLogEntry>;
    async fn get_by_id(&self, id: i64) -> OpsResult<Option<TaskLogEntry>>;
    /// 重装流程按最近一条记录回放参数
    async fn latest_for_cluster(&self, cluster_id: &str) -> OpsResult<Option<TaskLogEntry>>;
    async fn find_by_cluster(&self, cluster_id: &str) -> OpsResult<Vec<TaskLogEntry>>;
    async fn update(&self, entry: &TaskLogEntry) -> OpsResult<()>;
}
