//! 任务下发
//!
//! 把装配好的回放载荷提交给工作流引擎，并负责任务记录与
//! 资源状态在提交结果上的收敛。提交失败时写入固定的通用
//! 诊断信息——协作方的原始错误对用户往往不可操作，只进日志。

use std::sync::Arc;

use tracing::{error, info, warn};

use clusterops_domain::{
    ClusterRegistry, ClusterStatus, NodeStatus, NodeStatusUpdate, OperationKind, OpsResult,
    ReplayPayload, TaskLogEntry, TaskLogRepository, WorkflowEngine, GENERIC_DISPATCH_FAILURE,
};

/// 一次提交的去向
///
/// 提交失败与"成功但缺task_id"都会把记录收敛为 Failed 并按
/// fallback 处置资源，但调用方对两者的向上传播策略不同：前者
/// 被吸收进任务状态（操作对外报接受），后者同步抛错。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Dispatched,
    SubmissionFailed,
    MissingTaskId,
}

impl DispatchOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, DispatchOutcome::Dispatched)
    }
}

/// 提交失败时对资源侧的处置，按流程以数据形式传入
#[derive(Debug, Clone)]
pub enum DispatchFallback {
    /// 安装/重装类流程：把集群从进行中状态推到失败态，留待重试。
    /// 条件更新，集群已被并发操作改走时不覆盖
    MarkCluster {
        from: ClusterStatus,
        to: ClusterStatus,
    },
    /// 节点类流程：把受影响节点推到失败态
    MarkNodes(Vec<String>, NodeStatus),
    /// 集群删除流程特有：直接硬删资源记录，避免卡死在 Removing
    HardDeleteCluster,
}

pub struct TaskDispatcher {
    engine: Arc<dyn WorkflowEngine>,
    registry: Arc<dyn ClusterRegistry>,
    task_logs: Arc<dyn TaskLogRepository>,
}

impl TaskDispatcher {
    pub fn new(
        engine: Arc<dyn WorkflowEngine>,
        registry: Arc<dyn ClusterRegistry>,
        task_logs: Arc<dyn TaskLogRepository>,
    ) -> Self {
        Self {
            engine,
            registry,
            task_logs,
        }
    }

    /// 提交一次操作
    ///
    /// Dispatched 表示记录已进入轮询态；其余两种出参下记录已
    /// 收敛为 Failed、资源侧已按 fallback 处置。只有持久化本身
    /// 出错才返回 Err。
    pub async fn dispatch(
        &self,
        entry: &mut TaskLogEntry,
        payload: &ReplayPayload,
        fallback: DispatchFallback,
    ) -> OpsResult<DispatchOutcome> {
        let params = payload.engine_params();
        // 封闭集合按变体匹配引擎接口，不做方法名拼接
        let submitted = match payload.kind {
            OperationKind::CreateCluster => self.engine.create_cluster(&params).await,
            OperationKind::DeleteCluster => self.engine.delete_cluster(&params).await,
            OperationKind::AddNode => self.engine.add_cluster_node(&params).await,
            OperationKind::DeleteNode => self.engine.delete_cluster_node(&params).await,
        };

        match submitted {
            Ok(handle) if handle.task_id.as_deref().map_or(false, |t| !t.is_empty()) => {
                let task_id = handle.task_id.unwrap();
                entry.mark_dispatched(task_id.clone())?;
                // task_url 尽力保存供UI展示，缺失不算错误
                if let Some(url) = handle.task_url {
                    entry.params["task_url"] = serde_json::Value::String(url);
                }
                self.task_logs.update(entry).await?;
                info!(
                    cluster_id = %entry.cluster_id,
                    task_id = %task_id,
                    "任务已提交工作流引擎，开始轮询"
                );
                Ok(DispatchOutcome::Dispatched)
            }
            Ok(_) => {
                warn!(
                    cluster_id = %entry.cluster_id,
                    "工作流引擎返回成功但缺少task_id，按提交失败处理"
                );
                self.absorb_failure(entry, fallback).await?;
                Ok(DispatchOutcome::MissingTaskId)
            }
            Err(e) => {
                error!(cluster_id = %entry.cluster_id, "提交工作流引擎失败: {}", e);
                self.absorb_failure(entry, fallback).await?;
                Ok(DispatchOutcome::SubmissionFailed)
            }
        }
    }

    async fn absorb_failure(
        &self,
        entry: &mut TaskLogEntry,
        fallback: DispatchFallback,
    ) -> OpsResult<()> {
        entry.mark_finished(false, Some(GENERIC_DISPATCH_FAILURE.to_string()))?;
        self.task_logs.update(entry).await?;

        match fallback {
            DispatchFallback::MarkCluster { from, to } => {
                let swapped = self
                    .registry
                    .update_cluster_status(&entry.cluster_id, Some(from), to)
                    .await?;
                if !swapped {
                    warn!(
                        cluster_id = %entry.cluster_id,
                        "集群状态已被并发变更，跳过失败态标记"
                    );
                }
            }
            DispatchFallback::MarkNodes(ips, status) => {
                let updates: Vec<NodeStatusUpdate> = ips
                    .into_iter()
                    .map(|inner_ip| NodeStatusUpdate {
                        inner_ip,
                        status,
                    })
                    .collect();
                self.registry
                    .update_node_list(&entry.cluster_id, &updates)
                    .await?;
            }
            DispatchFallback::HardDeleteCluster => {
                warn!(
                    cluster_id = %entry.cluster_id,
                    "删除任务提交失败，回退为硬删除集群记录"
                );
                self.registry.delete_cluster(&entry.cluster_id).await?;
            }
        }
        Ok(())
    }
}
