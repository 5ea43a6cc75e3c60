//! 任务轮询
//!
//! 每条成功下发的记录由一个后台任务驱动到终态：同一条记录的
//! 状态查询严格串行（单循环内顺序执行），不同记录之间完全并行，
//! 不持有任何会阻塞无关资源的锁。外部引擎不可信、可能永不结束，
//! 因此轮询受限次数约束，超限按失败收敛并带可区分的超时诊断。

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use clusterops_domain::{
    ClusterRegistry, ClusterStatus, EngineTaskState, NodeStatus, NodeStatusUpdate, OperationKind,
    OpsError, OpsResult, ReplayPayload, TaskLogEntry, TaskLogRepository, WorkflowEngine,
    POLL_TIMEOUT_DIAGNOSTIC,
};

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 360, // 上限约30分钟
        }
    }
}

pub struct TaskPoller {
    engine: Arc<dyn WorkflowEngine>,
    registry: Arc<dyn ClusterRegistry>,
    task_logs: Arc<dyn TaskLogRepository>,
    config: PollerConfig,
}

impl TaskPoller {
    pub fn new(
        engine: Arc<dyn WorkflowEngine>,
        registry: Arc<dyn ClusterRegistry>,
        task_logs: Arc<dyn TaskLogRepository>,
        config: PollerConfig,
    ) -> Self {
        Self {
            engine,
            registry,
            task_logs,
            config,
        }
    }

    /// 由下发完成触发的后台轮询，调用方在 is_polling 持久化后即可返回
    pub fn spawn(self: &Arc<Self>, entry_id: i64) {
        let poller = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = poller.poll_entry(entry_id).await {
                error!("任务记录 {} 轮询出错: {}", entry_id, e);
            }
        });
    }

    /// 驱动单条记录到终态
    pub async fn poll_entry(&self, entry_id: i64) -> OpsResult<()> {
        let mut entry = self
            .task_logs
            .get_by_id(entry_id)
            .await?
            .ok_or_else(|| OpsError::task_log_not_found(entry_id))?;

        if entry.is_finished || !entry.is_polling {
            debug!("任务记录 {} 无需轮询，跳过", entry_id);
            return Ok(());
        }
        let task_id = entry.task_id.clone().ok_or_else(|| {
            OpsError::InvalidTransition(format!("任务记录 {entry_id} 缺少 task_id，无法轮询"))
        })?;
        // params 自足，终态的资源收敛不依赖当前可变状态
        let payload = ReplayPayload::from_value(&entry.params)?;

        for attempt in 1..=self.config.max_attempts {
            match self.engine.query_task(&task_id).await {
                Ok(status) => match status.state {
                    EngineTaskState::Success => {
                        info!(task_id = %task_id, "后台任务执行成功");
                        return self.finalize(&mut entry, &payload, true, None).await;
                    }
                    EngineTaskState::Failure => {
                        let diagnostic = status
                            .message
                            .unwrap_or_else(|| "后台任务执行失败".to_string());
                        warn!(task_id = %task_id, "后台任务执行失败: {}", diagnostic);
                        return self
                            .finalize(&mut entry, &payload, false, Some(diagnostic))
                            .await;
                    }
                    EngineTaskState::Running => {
                        debug!(task_id = %task_id, attempt, "后台任务仍在执行");
                    }
                },
                Err(e) => {
                    // 单次查询失败不终止轮询，计入尝试次数
                    warn!(task_id = %task_id, attempt, "查询任务状态失败: {}", e);
                }
            }
            tokio::time::sleep(self.config.interval).await;
        }

        warn!(task_id = %task_id, "轮询超出次数上限，按失败收敛");
        self.finalize(
            &mut entry,
            &payload,
            false,
            Some(POLL_TIMEOUT_DIAGNOSTIC.to_string()),
        )
        .await
    }

    /// 终态收敛：任务记录翻转终态后，资源必须离开 Initializing/Removing
    async fn finalize(
        &self,
        entry: &mut TaskLogEntry,
        payload: &ReplayPayload,
        success: bool,
        diagnostic: Option<String>,
    ) -> OpsResult<()> {
        entry.mark_finished(success, diagnostic)?;
        self.task_logs.update(entry).await?;

        match payload.kind {
            OperationKind::CreateCluster => {
                let next = if success {
                    ClusterStatus::Running
                } else {
                    ClusterStatus::InitialFailed
                };
                self.converge_cluster(&entry.cluster_id, ClusterStatus::Initializing, next)
                    .await?;
            }
            OperationKind::DeleteCluster => {
                let next = if success {
                    ClusterStatus::Removed
                } else {
                    ClusterStatus::RemoveFailed
                };
                self.converge_cluster(&entry.cluster_id, ClusterStatus::Removing, next)
                    .await?;
            }
            OperationKind::AddNode => {
                let next = if success {
                    NodeStatus::Running
                } else {
                    NodeStatus::InitialFailed
                };
                self.push_node_statuses(entry, payload, next).await?;
            }
            OperationKind::DeleteNode => {
                let next = if success {
                    NodeStatus::Removed
                } else {
                    NodeStatus::RemoveFailed
                };
                self.push_node_statuses(entry, payload, next).await?;
            }
        }
        Ok(())
    }

    /// 以进行中状态为期望做条件更新，换失败说明已有并发操作接管
    async fn converge_cluster(
        &self,
        cluster_id: &str,
        expect: ClusterStatus,
        next: ClusterStatus,
    ) -> OpsResult<()> {
        let swapped = self
            .registry
            .update_cluster_status(cluster_id, Some(expect), next)
            .await?;
        if !swapped {
            warn!(cluster_id, "集群状态已被并发变更，跳过终态收敛");
        }
        Ok(())
    }

    async fn push_node_statuses(
        &self,
        entry: &TaskLogEntry,
        payload: &ReplayPayload,
        status: NodeStatus,
    ) -> OpsResult<()> {
        let updates: Vec<NodeStatusUpdate> = payload
            .node_ips
            .iter()
            .map(|ip| NodeStatusUpdate {
                inner_ip: ip.clone(),
                status,
            })
            .collect();
        self.registry
            .update_node_list(&entry.cluster_id, &updates)
            .await
    }
}
