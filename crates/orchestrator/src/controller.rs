//! 生命周期编排
//!
//! 每个操作按 校验 -> 限流 -> 装配 -> 下发 -> 轮询 -> 收敛 的
//! 顺序推进。下发成功后立即返回调用方（is_polling 已持久化），
//! 进度经由 operation_status 从任务记录读取；轮询在后台进行。

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, instrument, warn};

use clusterops_domain::{
    ClusterRecord, ClusterRegistry, ClusterStatus, ConfigSnapshot, NodeStatus, NodeStatusUpdate,
    OperationKind, OpsError, OpsResult, ReplayPayload, TaskLogEntry, TaskLogRepository,
    TaskLogStatus, AuthRegistry, WorkloadQuery, GENERIC_DISPATCH_FAILURE,
};

use crate::config_assembler::{AssemblerContext, ConfigAssembler};
use crate::dispatcher::{DispatchFallback, DispatchOutcome, TaskDispatcher};
use crate::poller::TaskPoller;
use crate::rate_limiter::{RateLimitRule, RateLimiter};

#[derive(Debug, Clone)]
pub struct CreateClusterCommand {
    pub operator: String,
    pub cluster: ClusterRecord,
    pub context: AssemblerContext,
}

#[derive(Debug, Clone)]
pub struct ReinstallClusterCommand {
    pub operator: String,
    pub cluster_id: String,
}

#[derive(Debug, Clone)]
pub struct DeleteClusterCommand {
    pub operator: String,
    pub cluster_id: String,
}

#[derive(Debug, Clone)]
pub struct CreateNodeCommand {
    pub operator: String,
    pub cluster_id: String,
    pub node_ips: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DeleteNodeCommand {
    pub operator: String,
    pub cluster_id: String,
    pub node_ips: Vec<String>,
    /// 强制删除跳过排水与容器检查，导入集群限制不可跳过
    pub force: bool,
}

/// 状态读取路径返回的视图，由持久化的任务记录字段直接填充
#[derive(Debug, Clone)]
pub struct OperationStatus {
    pub task_log_id: i64,
    pub status: TaskLogStatus,
    pub is_polling: bool,
    pub is_finished: bool,
    pub task_id: Option<String>,
    pub task_url: Option<String>,
    pub diagnostic: Option<String>,
}

pub struct LifecycleController {
    registry: Arc<dyn ClusterRegistry>,
    task_logs: Arc<dyn TaskLogRepository>,
    auth: Arc<dyn AuthRegistry>,
    workload: Arc<dyn WorkloadQuery>,
    assembler: ConfigAssembler,
    dispatcher: TaskDispatcher,
    poller: Arc<TaskPoller>,
    rate_limiter: Arc<dyn RateLimiter>,
    reinstall_rule: RateLimitRule,
}

impl LifecycleController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<dyn ClusterRegistry>,
        task_logs: Arc<dyn TaskLogRepository>,
        auth: Arc<dyn AuthRegistry>,
        workload: Arc<dyn WorkloadQuery>,
        assembler: ConfigAssembler,
        dispatcher: TaskDispatcher,
        poller: Arc<TaskPoller>,
        rate_limiter: Arc<dyn RateLimiter>,
        reinstall_rule: RateLimitRule,
    ) -> Self {
        Self {
            registry,
            task_logs,
            auth,
            workload,
            assembler,
            dispatcher,
            poller,
            rate_limiter,
            reinstall_rule,
        }
    }

    /// 集群安装
    ///
    /// 无论任务成败都向权限子系统注册集群，安装失败后运维仍
    /// 可以被授权进入重试。
    #[instrument(skip(self, cmd), fields(cluster_id = %cmd.cluster.id))]
    pub async fn create_cluster(&self, cmd: CreateClusterCommand) -> OpsResult<TaskLogEntry> {
        self.validate_create_cluster(&cmd).await?;

        let mut cluster = cmd.cluster.clone();
        cluster.status = ClusterStatus::Initializing;
        let cluster = self.registry.create_cluster(&cluster).await?;

        // 装配失败先推失败态再向上抛，此时尚无任务记录
        let configure = match self.assembler.assemble_install(&cmd.context, &cluster).await {
            Ok(configure) => configure,
            Err(e) => {
                let swapped = self
                    .registry
                    .update_cluster_status(
                        &cluster.id,
                        Some(ClusterStatus::Initializing),
                        ClusterStatus::InitialFailed,
                    )
                    .await?;
                if !swapped {
                    warn!(cluster_id = %cluster.id, "集群状态已被并发变更，跳过失败态标记");
                }
                return Err(e);
            }
        };

        // 安装期一次性落盘快照，后续节点操作只读复用
        self.registry
            .save_snapshot(&ConfigSnapshot {
                cluster_id: cluster.id.clone(),
                version: cmd.context.area.version.clone(),
                configure: configure.clone(),
            })
            .await?;

        let payload = ReplayPayload::new(
            OperationKind::CreateCluster,
            cluster.project_id.clone(),
            cluster.id.clone(),
            cluster.master_ips.clone(),
            vec![],
            configure,
        );
        let entry = self
            .dispatch_and_poll(
                &cluster,
                None,
                &payload,
                &cmd.operator,
                DispatchFallback::MarkCluster {
                    from: ClusterStatus::Initializing,
                    to: ClusterStatus::InitialFailed,
                },
            )
            .await;

        // fire-and-forget，注册失败只留日志
        if let Err(e) = self
            .auth
            .register(&cluster.id, &cluster.name, &cluster.environment)
            .await
        {
            warn!(cluster_id = %cluster.id, "权限子系统注册失败: {}", e);
        }

        entry
    }

    /// 集群重装：回放最近一条任务记录的参数，不重新派生配置
    #[instrument(skip(self, cmd), fields(cluster_id = %cmd.cluster_id))]
    pub async fn reinstall_cluster(&self, cmd: ReinstallClusterCommand) -> OpsResult<TaskLogEntry> {
        self.acquire_or_reject(&cmd.cluster_id).await?;

        let cluster = self.get_cluster_or_fail(&cmd.cluster_id).await?;
        if cluster.state.is_imported() {
            return Err(OpsError::validation_error("导入集群不支持重装"));
        }
        let latest = self
            .task_logs
            .latest_for_cluster(&cmd.cluster_id)
            .await?
            .ok_or_else(|| OpsError::validation_error("没有可回放的安装记录"))?;
        // 回放要么完整通过要么在schema漂移时快速失败
        let mut payload = ReplayPayload::from_value(&latest.params)?;
        // 上一轮提交留下的任务链接不属于本次操作
        payload.task_url = None;

        self.transition_cluster(&cluster, ClusterStatus::Initializing)
            .await?;
        self.dispatch_and_poll(
            &cluster,
            None,
            &payload,
            &cmd.operator,
            DispatchFallback::MarkCluster {
                from: ClusterStatus::Initializing,
                to: ClusterStatus::InitialFailed,
            },
        )
        .await
    }

    /// 集群删除
    ///
    /// 提交失败不让集群卡死在 Removing：兜底硬删资源记录，这是
    /// 删除流程对安装流程"标失败留重试"的刻意偏离。没有产生任务
    /// 记录（快照缺失）时同样走硬删兜底。
    #[instrument(skip(self, cmd), fields(cluster_id = %cmd.cluster_id))]
    pub async fn delete_cluster(
        &self,
        cmd: DeleteClusterCommand,
    ) -> OpsResult<Option<TaskLogEntry>> {
        let cluster = self.get_cluster_or_fail(&cmd.cluster_id).await?;

        // 导入集群先把名下节点在注册中心标记移除
        if cluster.state.is_imported() {
            let nodes = self.registry.get_cluster_nodes(&cluster.id).await?;
            if !nodes.is_empty() {
                let updates: Vec<NodeStatusUpdate> = nodes
                    .iter()
                    .map(|n| NodeStatusUpdate {
                        inner_ip: n.inner_ip.clone(),
                        status: NodeStatus::Removed,
                    })
                    .collect();
                self.registry.update_node_list(&cluster.id, &updates).await?;
            }
        }

        self.transition_cluster(&cluster, ClusterStatus::Removing)
            .await?;

        // 级联清理本地记账
        let namespaces = self.registry.get_cluster_namespaces(&cluster.id).await?;
        if !namespaces.is_empty() {
            info!(cluster_id = %cluster.id, count = namespaces.len(), "级联删除集群命名空间");
            self.registry.delete_cluster_namespaces(&cluster.id).await?;
        }

        let Some(snapshot) = self.registry.get_snapshot(&cluster.id).await? else {
            warn!(cluster_id = %cluster.id, "缺少配置快照，无法下发删除任务，直接硬删集群记录");
            self.registry.delete_cluster(&cluster.id).await?;
            return Ok(None);
        };

        let payload = ReplayPayload::new(
            OperationKind::DeleteCluster,
            cluster.project_id.clone(),
            cluster.id.clone(),
            cluster.master_ips.clone(),
            vec![],
            snapshot.stripped_configure(),
        );
        let mut entry = self.new_entry(&cluster, None, &payload, &cmd.operator)?;
        entry = self.task_logs.create(&entry).await?;
        let outcome = self
            .dispatcher
            .dispatch(&mut entry, &payload, DispatchFallback::HardDeleteCluster)
            .await?;
        if outcome.is_dispatched() {
            self.poller.spawn(entry.id);
        }
        // 删除流程容忍提交失败，不向上抛
        Ok(Some(entry))
    }

    /// 增加节点：曾被移除的IP复用原记录，全新IP插入新记录
    #[instrument(skip(self, cmd), fields(cluster_id = %cmd.cluster_id))]
    pub async fn create_node(&self, cmd: CreateNodeCommand) -> OpsResult<TaskLogEntry> {
        if cmd.node_ips.is_empty() {
            return Err(OpsError::validation_error("节点IP列表不能为空"));
        }
        let cluster = self.get_cluster_or_fail(&cmd.cluster_id).await?;

        let existing = self.registry.find_nodes_by_ips(&cmd.node_ips).await?;
        let claimed: Vec<&str> = existing
            .iter()
            .filter(|n| n.status != NodeStatus::Removed)
            .map(|n| n.inner_ip.as_str())
            .collect();
        if !claimed.is_empty() {
            return Err(OpsError::validation_error(format!(
                "IP已被占用: {}",
                claimed.join(",")
            )));
        }
        let reused: Vec<String> = existing.iter().map(|n| n.inner_ip.clone()).collect();
        let fresh: Vec<String> = cmd
            .node_ips
            .iter()
            .filter(|ip| !reused.contains(ip))
            .cloned()
            .collect();

        if !reused.is_empty() {
            let updates: Vec<NodeStatusUpdate> = reused
                .iter()
                .map(|ip| NodeStatusUpdate {
                    inner_ip: ip.clone(),
                    status: NodeStatus::Initializing,
                })
                .collect();
            self.registry.update_node_list(&cluster.id, &updates).await?;
        }
        if !fresh.is_empty() {
            self.registry
                .create_nodes(&cluster.id, &fresh, NodeStatus::Initializing)
                .await?;
        }

        let (snapshot, master_ips) = self.load_snapshot_and_masters(&cluster).await?;
        let configure = match self
            .assembler
            .assemble_node_operation(
                snapshot.stripped_configure(),
                OperationKind::AddNode,
                &cluster,
                &cmd.node_ips,
                &master_ips,
            )
            .await
        {
            Ok(configure) => configure,
            Err(e) => {
                self.mark_nodes(&cluster.id, &cmd.node_ips, NodeStatus::InitialFailed)
                    .await?;
                return Err(e);
            }
        };

        let payload = ReplayPayload::new(
            OperationKind::AddNode,
            cluster.project_id.clone(),
            cluster.id.clone(),
            master_ips,
            cmd.node_ips.clone(),
            configure,
        );
        self.dispatch_and_poll(
            &cluster,
            Some(cmd.node_ips.join(",")),
            &payload,
            &cmd.operator,
            DispatchFallback::MarkNodes(cmd.node_ips.clone(), NodeStatus::InitialFailed),
        )
        .await
    }

    /// 删除节点（批量共享一条任务记录）
    ///
    /// 常规路径要求节点已排水且无运行容器；强制删除跳过这两项。
    /// 导入集群的节点必须在来源平台删除，任何路径都不放行。
    #[instrument(skip(self, cmd), fields(cluster_id = %cmd.cluster_id, force = cmd.force))]
    pub async fn delete_node(&self, cmd: DeleteNodeCommand) -> OpsResult<TaskLogEntry> {
        if cmd.node_ips.is_empty() {
            return Err(OpsError::validation_error("节点IP列表不能为空"));
        }
        let cluster = self.get_cluster_or_fail(&cmd.cluster_id).await?;
        if cluster.state.is_imported() {
            return Err(OpsError::validation_error(
                "导入集群的节点需在来源平台删除",
            ));
        }

        let nodes = self.registry.get_cluster_nodes(&cluster.id).await?;
        for ip in &cmd.node_ips {
            let node = nodes
                .iter()
                .find(|n| &n.inner_ip == ip)
                .ok_or_else(|| OpsError::NodeNotFound { ip: ip.clone() })?;
            if node.status.is_busy() {
                return Err(OpsError::validation_error(format!(
                    "节点 {ip} 正在操作中，不能删除"
                )));
            }
            if !cmd.force && !node.status.is_drained() {
                return Err(OpsError::validation_error(format!(
                    "节点 {ip} 尚未排水，不能删除"
                )));
            }
        }
        if !cmd.force {
            let pods = self.workload.list_pods(&cmd.node_ips).await?;
            if !pods.is_empty() {
                return Err(OpsError::validation_error(format!(
                    "节点上仍有 {} 个运行中的容器",
                    pods.len()
                )));
            }
        }

        self.mark_nodes(&cluster.id, &cmd.node_ips, NodeStatus::Removing)
            .await?;
        self.registry
            .delete_node_labels(&cluster.id, &cmd.node_ips)
            .await?;

        let (snapshot, master_ips) = self.load_snapshot_and_masters(&cluster).await?;
        let configure = match self
            .assembler
            .assemble_node_operation(
                snapshot.stripped_configure(),
                OperationKind::DeleteNode,
                &cluster,
                &cmd.node_ips,
                &master_ips,
            )
            .await
        {
            Ok(configure) => configure,
            Err(e) => {
                self.mark_nodes(&cluster.id, &cmd.node_ips, NodeStatus::RemoveFailed)
                    .await?;
                return Err(e);
            }
        };

        let payload = ReplayPayload::new(
            OperationKind::DeleteNode,
            cluster.project_id.clone(),
            cluster.id.clone(),
            master_ips,
            cmd.node_ips.clone(),
            configure,
        );
        self.dispatch_and_poll(
            &cluster,
            Some(cmd.node_ips.join(",")),
            &payload,
            &cmd.operator,
            DispatchFallback::MarkNodes(cmd.node_ips.clone(), NodeStatus::RemoveFailed),
        )
        .await
    }

    /// 节点重装限流键为 cluster_id:node_id 组合
    pub async fn acquire_node_reinstall(&self, cluster_id: &str, node_ip: &str) -> OpsResult<()> {
        self.acquire_or_reject(&format!("{cluster_id}:{node_ip}")).await
    }

    /// 状态读取路径：由持久化任务记录直接服务，不触达工作流引擎
    pub async fn operation_status(&self, task_log_id: i64) -> OpsResult<OperationStatus> {
        let entry = self
            .task_logs
            .get_by_id(task_log_id)
            .await?
            .ok_or_else(|| OpsError::task_log_not_found(task_log_id))?;
        let task_url = entry
            .params
            .get("task_url")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(OperationStatus {
            task_log_id: entry.id,
            status: entry.status,
            is_polling: entry.is_polling,
            is_finished: entry.is_finished,
            task_id: entry.task_id,
            task_url,
            diagnostic: entry.log,
        })
    }

    async fn validate_create_cluster(&self, cmd: &CreateClusterCommand) -> OpsResult<()> {
        if cmd.cluster.project_id.is_empty() {
            return Err(OpsError::validation_error("集群未绑定业务"));
        }
        if cmd.cluster.master_ips.is_empty() {
            return Err(OpsError::validation_error("master IP列表不能为空"));
        }
        if cmd.context.area.version.is_empty() || cmd.context.area.zk_hosts.is_empty() {
            return Err(OpsError::validation_error("区域配置不可用"));
        }
        let occupied = self
            .registry
            .find_nodes_by_ips(&cmd.cluster.master_ips)
            .await?;
        let claimed: Vec<&str> = occupied
            .iter()
            .filter(|n| n.status != NodeStatus::Removed)
            .map(|n| n.inner_ip.as_str())
            .collect();
        if !claimed.is_empty() {
            return Err(OpsError::validation_error(format!(
                "IP已被其他集群占用: {}",
                claimed.join(",")
            )));
        }
        Ok(())
    }

    async fn acquire_or_reject(&self, key: &str) -> OpsResult<()> {
        // fail-closed：限流后端出错时按拒绝处理
        match self.rate_limiter.acquire(key, self.reinstall_rule).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(OpsError::validation_error("重复操作，请稍后再试")),
            Err(e) => {
                warn!("限流检查失败，按拒绝处理: {}", e);
                Err(OpsError::validation_error("重复操作，请稍后再试"))
            }
        }
    }

    /// 状态闸门：进行中的集群直接拒绝，其余以读取到的状态为期望
    /// 做条件更新，换失败说明有并发操作插队
    async fn transition_cluster(
        &self,
        cluster: &ClusterRecord,
        next: ClusterStatus,
    ) -> OpsResult<()> {
        if matches!(
            cluster.status,
            ClusterStatus::Initializing | ClusterStatus::Removing
        ) {
            return Err(OpsError::validation_error("集群正在操作中，请稍后再试"));
        }
        let swapped = self
            .registry
            .update_cluster_status(&cluster.id, Some(cluster.status), next)
            .await?;
        if !swapped {
            return Err(OpsError::validation_error("集群状态已变更，请刷新后重试"));
        }
        Ok(())
    }

    async fn get_cluster_or_fail(&self, cluster_id: &str) -> OpsResult<ClusterRecord> {
        self.registry
            .get_cluster(cluster_id)
            .await?
            .ok_or_else(|| OpsError::cluster_not_found(cluster_id))
    }

    async fn load_snapshot_and_masters(
        &self,
        cluster: &ClusterRecord,
    ) -> OpsResult<(ConfigSnapshot, Vec<String>)> {
        let snapshot = self
            .registry
            .get_snapshot(&cluster.id)
            .await?
            .ok_or_else(|| OpsError::validation_error("集群配置快照缺失"))?;
        let masters = self.registry.get_master_nodes(&cluster.id).await?;
        let master_ips = if masters.is_empty() {
            cluster.master_ips.clone()
        } else {
            masters.into_iter().map(|n| n.inner_ip).collect()
        };
        Ok((snapshot, master_ips))
    }

    async fn mark_nodes(
        &self,
        cluster_id: &str,
        ips: &[String],
        status: NodeStatus,
    ) -> OpsResult<()> {
        let updates: Vec<NodeStatusUpdate> = ips
            .iter()
            .map(|ip| NodeStatusUpdate {
                inner_ip: ip.clone(),
                status,
            })
            .collect();
        self.registry.update_node_list(cluster_id, &updates).await
    }

    fn new_entry(
        &self,
        cluster: &ClusterRecord,
        node_id: Option<String>,
        payload: &ReplayPayload,
        operator: &str,
    ) -> OpsResult<TaskLogEntry> {
        Ok(TaskLogEntry::new(
            cluster.project_id.clone(),
            cluster.id.clone(),
            node_id,
            payload.to_value()?,
            operator.to_string(),
            payload.kind.oper_type(),
        ))
    }

    /// 下发并触发后台轮询
    ///
    /// 提交失败被吸收进任务状态（对外报接受）；成功响应缺
    /// task_id 属于协作方契约破坏，同步抛错。
    async fn dispatch_and_poll(
        &self,
        cluster: &ClusterRecord,
        node_id: Option<String>,
        payload: &ReplayPayload,
        operator: &str,
        fallback: DispatchFallback,
    ) -> OpsResult<TaskLogEntry> {
        let mut entry = self.new_entry(cluster, node_id, payload, operator)?;
        entry = self.task_logs.create(&entry).await?;
        let outcome = self.dispatcher.dispatch(&mut entry, payload, fallback).await?;
        match outcome {
            DispatchOutcome::Dispatched => {
                self.poller.spawn(entry.id);
                Ok(entry)
            }
            DispatchOutcome::SubmissionFailed => Ok(entry),
            DispatchOutcome::MissingTaskId => Err(OpsError::collaborator_error(
                GENERIC_DISPATCH_FAILURE,
            )),
        }
    }
}
