//! 生命周期流程集成测试：真实装配/下发/轮询组件 + 内存协作方

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use clusterops_domain::{
    AreaConfig, ClusterRegistry, ClusterState, ClusterStatus, NodeStatus, OperationKind, OpsError,
    OpsResult, PlatformConfig, ReplayPayload, TaskHandle, TaskLogEntry, TaskLogRepository,
    TaskLogStatus,
};
use clusterops_orchestrator::{
    AssemblerContext, ConfigAssembler, CreateClusterCommand, CreateNodeCommand,
    DeleteClusterCommand, DeleteNodeCommand, InMemoryRateLimiter, LifecycleController,
    PollerConfig, RateLimitRule, RateLimiter, ReinstallClusterCommand, TaskDispatcher, TaskPoller,
};
use clusterops_testing_utils::{
    ClusterBuilder, MockAgentRegistry, MockAuthRegistry, MockClusterRegistry,
    MockTaskLogRepository, MockWorkflowEngine, MockWorkloadQuery, TaskLogBuilder,
};

struct Harness {
    registry: Arc<MockClusterRegistry>,
    task_logs: Arc<MockTaskLogRepository>,
    engine: Arc<MockWorkflowEngine>,
    agent: Arc<MockAgentRegistry>,
    auth: Arc<MockAuthRegistry>,
    workload: Arc<MockWorkloadQuery>,
    controller: LifecycleController,
}

fn build_harness(
    engine: MockWorkflowEngine,
    agent: MockAgentRegistry,
    workload: MockWorkloadQuery,
    rule: RateLimitRule,
) -> Harness {
    let registry = Arc::new(MockClusterRegistry::new());
    let task_logs = Arc::new(MockTaskLogRepository::new());
    let engine = Arc::new(engine);
    let agent = Arc::new(agent);
    let auth = Arc::new(MockAuthRegistry::new());
    let workload = Arc::new(workload);

    let assembler = ConfigAssembler::new(agent.clone());
    let dispatcher = TaskDispatcher::new(engine.clone(), registry.clone(), task_logs.clone());
    let poller = Arc::new(TaskPoller::new(
        engine.clone(),
        registry.clone(),
        task_logs.clone(),
        PollerConfig {
            interval: Duration::from_millis(1),
            max_attempts: 10,
        },
    ));
    let controller = LifecycleController::new(
        registry.clone(),
        task_logs.clone(),
        auth.clone(),
        workload.clone(),
        assembler,
        dispatcher,
        poller,
        Arc::new(InMemoryRateLimiter::new()),
        rule,
    );
    Harness {
        registry,
        task_logs,
        engine,
        agent,
        auth,
        workload,
        controller,
    }
}

fn default_harness() -> Harness {
    build_harness(
        MockWorkflowEngine::new(),
        MockAgentRegistry::new(),
        MockWorkloadQuery::new(),
        RateLimitRule::default(),
    )
}

fn assembler_context() -> AssemblerContext {
    AssemblerContext {
        area: AreaConfig {
            area_id: 1,
            version: "1.12.3".to_string(),
            dns_hosts: vec!["10.1.0.1".to_string()],
            zk_hosts: vec!["10.1.0.2".to_string()],
            registry_domain: "registry.example.com".to_string(),
        },
        platform: PlatformConfig {
            websvr: "https://console.example.com".to_string(),
            control_ip: vec!["10.9.0.1".to_string()],
            run_env: "prod".to_string(),
        },
        base_template: json!({}),
    }
}

fn create_command(state: ClusterState) -> CreateClusterCommand {
    CreateClusterCommand {
        operator: "admin".to_string(),
        cluster: ClusterBuilder::new().with_state(state).build(),
        context: assembler_context(),
    }
}

fn install_payload() -> ReplayPayload {
    ReplayPayload::new(
        OperationKind::CreateCluster,
        "proj-1".to_string(),
        "BCS-K8S-40000".to_string(),
        vec!["10.0.0.1".to_string()],
        vec![],
        json!({"common": {}}),
    )
}

/// 等待后台轮询把记录推到终态
async fn wait_finished(task_logs: &MockTaskLogRepository, id: i64) {
    for _ in 0..200 {
        if let Some(entry) = task_logs.get_by_id(id).await.unwrap() {
            if entry.is_finished {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("任务记录 {id} 未在预期时间内收敛");
}

#[tokio::test]
async fn test_create_cluster_happy_path() {
    let h = default_harness();
    let entry = h
        .controller
        .create_cluster(create_command(ClusterState::BcsNew))
        .await
        .unwrap();

    assert_eq!(entry.status, TaskLogStatus::Dispatched);
    assert!(entry.is_polling);
    // 快照在安装期落盘
    assert!(h
        .registry
        .get_snapshot("BCS-K8S-40000")
        .await
        .unwrap()
        .is_some());
    // 原生集群不触发Agent注册
    assert_eq!(h.agent.call_count(), 0);
    // 权限注册与任务成败无关
    assert_eq!(h.auth.call_count(), 1);

    wait_finished(&h.task_logs, entry.id).await;
    let finished = h.task_logs.get_by_id(entry.id).await.unwrap().unwrap();
    assert_eq!(finished.status, TaskLogStatus::Succeeded);
    assert_eq!(
        h.registry.cluster_status("BCS-K8S-40000"),
        Some(ClusterStatus::Running)
    );
}

#[tokio::test]
async fn test_create_cluster_assembly_failure_creates_no_log() {
    // 导入集群 + Agent注册失败
    let h = build_harness(
        MockWorkflowEngine::new(),
        MockAgentRegistry::failing(),
        MockWorkloadQuery::new(),
        RateLimitRule::default(),
    );
    let err = h
        .controller
        .create_cluster(create_command(ClusterState::Existing))
        .await
        .unwrap_err();

    assert!(matches!(err, OpsError::ConfigAssembly(_)));
    assert_eq!(h.task_logs.count(), 0);
    assert_eq!(h.engine.submit_count(), 0);
    assert_eq!(
        h.registry.cluster_status("BCS-K8S-40000"),
        Some(ClusterStatus::InitialFailed)
    );
}

#[tokio::test]
async fn test_create_cluster_missing_project_binding() {
    let h = default_harness();
    let mut cmd = create_command(ClusterState::BcsNew);
    cmd.cluster.project_id = String::new();
    let err = h.controller.create_cluster(cmd).await.unwrap_err();
    assert!(matches!(err, OpsError::Validation(_)));
    assert_eq!(h.task_logs.count(), 0);
}

#[tokio::test]
async fn test_create_cluster_claimed_master_ip_rejected() {
    let h = default_harness();
    h.registry
        .put_node("BCS-K8S-OTHER", "10.0.0.1", NodeStatus::Running);
    let err = h
        .controller
        .create_cluster(create_command(ClusterState::BcsNew))
        .await
        .unwrap_err();
    assert!(matches!(err, OpsError::Validation(_)));
    // 校验失败时不持久化任何记录
    assert!(h.registry.cluster_status("BCS-K8S-40000").is_none());
}

#[tokio::test]
async fn test_create_cluster_missing_task_id_raises() {
    // 成功响应但缺task_id
    let h = build_harness(
        MockWorkflowEngine::with_submit_handle(TaskHandle::default()),
        MockAgentRegistry::new(),
        MockWorkloadQuery::new(),
        RateLimitRule::default(),
    );
    let err = h
        .controller
        .create_cluster(create_command(ClusterState::BcsNew))
        .await
        .unwrap_err();
    assert!(matches!(err, OpsError::Collaborator(_)));
    assert_eq!(h.task_logs.count(), 1);
    let entry = h.task_logs.get_by_id(1).await.unwrap().unwrap();
    assert_eq!(entry.status, TaskLogStatus::Failed);
    assert!(entry.task_id.is_none());
    assert!(!entry.is_polling);
    assert_eq!(
        h.registry.cluster_status("BCS-K8S-40000"),
        Some(ClusterStatus::InitialFailed)
    );
    assert_eq!(h.engine.query_count(), 0);
    // 安装失败仍然注册权限，运维可被授权后重试
    assert_eq!(h.auth.call_count(), 1);
}

#[tokio::test]
async fn test_reinstall_replays_persisted_params() {
    let h = build_harness(
        MockWorkflowEngine::new(),
        MockAgentRegistry::new(),
        MockWorkloadQuery::new(),
        RateLimitRule {
            count: 1,
            window_seconds: 0,
        },
    );
    let entry = h
        .controller
        .create_cluster(create_command(ClusterState::BcsNew))
        .await
        .unwrap();
    wait_finished(&h.task_logs, entry.id).await;

    let replayed = h
        .controller
        .reinstall_cluster(ReinstallClusterCommand {
            operator: "admin".to_string(),
            cluster_id: "BCS-K8S-40000".to_string(),
        })
        .await
        .unwrap();
    wait_finished(&h.task_logs, replayed.id).await;

    // 两条记录 params 等价，仅 task_id/时间戳不同
    let first = h.task_logs.get_by_id(entry.id).await.unwrap().unwrap();
    let second = h.task_logs.get_by_id(replayed.id).await.unwrap().unwrap();
    let p1 = ReplayPayload::from_value(&first.params).unwrap();
    let p2 = ReplayPayload::from_value(&second.params).unwrap();
    assert_eq!(p1.kind, OperationKind::CreateCluster);
    assert_eq!(p1.configure, p2.configure);
    assert_eq!(p1.master_ips, p2.master_ips);
    assert_ne!(first.token, second.token);
}

#[tokio::test]
async fn test_reinstall_rate_limited_within_window() {
    // 1次/窗口：窗口内第二次拒绝，过窗后放行
    let h = build_harness(
        MockWorkflowEngine::new(),
        MockAgentRegistry::new(),
        MockWorkloadQuery::new(),
        RateLimitRule {
            count: 1,
            window_seconds: 1,
        },
    );
    let entry = h
        .controller
        .create_cluster(create_command(ClusterState::BcsNew))
        .await
        .unwrap();
    wait_finished(&h.task_logs, entry.id).await;

    let cmd = ReinstallClusterCommand {
        operator: "admin".to_string(),
        cluster_id: "BCS-K8S-40000".to_string(),
    };
    h.controller.reinstall_cluster(cmd.clone()).await.unwrap();
    let err = h.controller.reinstall_cluster(cmd.clone()).await.unwrap_err();
    assert!(matches!(err, OpsError::Validation(_)));
    assert!(err.to_string().contains("重复操作"));

    tokio::time::sleep(Duration::from_millis(1100)).await;
    h.controller.reinstall_cluster(cmd).await.unwrap();
}

#[tokio::test]
async fn test_reinstall_fails_closed_on_limiter_error() {
    struct BrokenRateLimiter;

    #[async_trait::async_trait]
    impl RateLimiter for BrokenRateLimiter {
        async fn acquire(&self, _key: &str, _rule: RateLimitRule) -> OpsResult<bool> {
            Err(OpsError::Internal("redis connection lost".to_string()))
        }
    }

    let h = default_harness();
    let registry = h.registry.clone();
    registry.put_cluster(ClusterBuilder::new().build());
    // 用后端损坏的限流器重建控制器
    let engine = Arc::new(MockWorkflowEngine::new());
    let agent = Arc::new(MockAgentRegistry::new());
    let controller = LifecycleController::new(
        registry,
        h.task_logs.clone(),
        Arc::new(MockAuthRegistry::new()),
        Arc::new(MockWorkloadQuery::new()),
        ConfigAssembler::new(agent),
        TaskDispatcher::new(engine.clone(), h.registry.clone(), h.task_logs.clone()),
        Arc::new(TaskPoller::new(
            engine,
            h.registry.clone(),
            h.task_logs.clone(),
            PollerConfig::default(),
        )),
        Arc::new(BrokenRateLimiter),
        RateLimitRule::default(),
    );

    let err = controller
        .reinstall_cluster(ReinstallClusterCommand {
            operator: "admin".to_string(),
            cluster_id: "BCS-K8S-40000".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, OpsError::Validation(_)));
}

#[tokio::test]
async fn test_reinstall_imported_cluster_rejected() {
    let h = default_harness();
    h.registry.put_cluster(
        ClusterBuilder::new()
            .with_state(ClusterState::Existing)
            .build(),
    );
    let err = h
        .controller
        .reinstall_cluster(ReinstallClusterCommand {
            operator: "admin".to_string(),
            cluster_id: "BCS-K8S-40000".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, OpsError::Validation(_)));
}

#[tokio::test]
async fn test_reinstall_without_history_rejected() {
    let h = default_harness();
    h.registry.put_cluster(ClusterBuilder::new().build());
    let err = h
        .controller
        .reinstall_cluster(ReinstallClusterCommand {
            operator: "admin".to_string(),
            cluster_id: "BCS-K8S-40000".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, OpsError::Validation(_)));
}

#[tokio::test]
async fn test_delete_cluster_happy_path() {
    let h = default_harness();
    let entry = h
        .controller
        .create_cluster(create_command(ClusterState::BcsNew))
        .await
        .unwrap();
    wait_finished(&h.task_logs, entry.id).await;
    h.registry.put_namespaces("BCS-K8S-40000", vec!["ns-a", "ns-b"]);

    let deleted = h
        .controller
        .delete_cluster(DeleteClusterCommand {
            operator: "admin".to_string(),
            cluster_id: "BCS-K8S-40000".to_string(),
        })
        .await
        .unwrap()
        .expect("快照存在时应产生任务记录");
    wait_finished(&h.task_logs, deleted.id).await;

    assert_eq!(
        h.registry.cluster_status("BCS-K8S-40000"),
        Some(ClusterStatus::Removed)
    );
    // 级联清理本地记账
    assert!(h
        .registry
        .get_cluster_namespaces("BCS-K8S-40000")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_delete_cluster_dispatch_failure_falls_back_to_hard_delete() {
    let h = build_harness(
        MockWorkflowEngine::with_submit_error(OpsError::collaborator_error("engine down")),
        MockAgentRegistry::new(),
        MockWorkloadQuery::new(),
        RateLimitRule::default(),
    );
    h.registry.put_cluster(ClusterBuilder::new().build());
    h.registry
        .save_snapshot(&clusterops_domain::ConfigSnapshot {
            cluster_id: "BCS-K8S-40000".to_string(),
            version: "1.12.3".to_string(),
            configure: json!({"common": {}}),
        })
        .await
        .unwrap();

    // 提交失败不向上抛，回退为硬删
    let entry = h
        .controller
        .delete_cluster(DeleteClusterCommand {
            operator: "admin".to_string(),
            cluster_id: "BCS-K8S-40000".to_string(),
        })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.status, TaskLogStatus::Failed);
    assert_eq!(h.registry.hard_deleted(), vec!["BCS-K8S-40000".to_string()]);
}

#[tokio::test]
async fn test_delete_cluster_without_snapshot_hard_deletes() {
    let h = default_harness();
    h.registry.put_cluster(ClusterBuilder::new().build());
    let result = h
        .controller
        .delete_cluster(DeleteClusterCommand {
            operator: "admin".to_string(),
            cluster_id: "BCS-K8S-40000".to_string(),
        })
        .await
        .unwrap();
    assert!(result.is_none());
    assert_eq!(h.registry.hard_deleted(), vec!["BCS-K8S-40000".to_string()]);
}

#[tokio::test]
async fn test_delete_imported_cluster_marks_nodes_removed_first() {
    let h = default_harness();
    h.registry.put_cluster(
        ClusterBuilder::new()
            .with_state(ClusterState::Existing)
            .build(),
    );
    h.registry
        .put_node("BCS-K8S-40000", "10.0.0.5", NodeStatus::Running);
    h.controller
        .delete_cluster(DeleteClusterCommand {
            operator: "admin".to_string(),
            cluster_id: "BCS-K8S-40000".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(
        h.registry.node_status("BCS-K8S-40000", "10.0.0.5"),
        Some(NodeStatus::Removed)
    );
}

#[tokio::test]
async fn test_create_node_reuses_removed_and_inserts_fresh() {
    let h = default_harness();
    let entry = h
        .controller
        .create_cluster(create_command(ClusterState::BcsNew))
        .await
        .unwrap();
    wait_finished(&h.task_logs, entry.id).await;
    // 10.0.0.5 曾被移除，10.0.0.6 为全新IP
    h.registry
        .put_node("BCS-K8S-40000", "10.0.0.5", NodeStatus::Removed);

    let node_entry = h
        .controller
        .create_node(CreateNodeCommand {
            operator: "admin".to_string(),
            cluster_id: "BCS-K8S-40000".to_string(),
            node_ips: vec!["10.0.0.5".to_string(), "10.0.0.6".to_string()],
        })
        .await
        .unwrap();
    // 批量操作共享一条记录，节点键为拼接串
    assert_eq!(node_entry.node_id.as_deref(), Some("10.0.0.5,10.0.0.6"));

    wait_finished(&h.task_logs, node_entry.id).await;
    assert_eq!(
        h.registry.node_status("BCS-K8S-40000", "10.0.0.5"),
        Some(NodeStatus::Running)
    );
    assert_eq!(
        h.registry.node_status("BCS-K8S-40000", "10.0.0.6"),
        Some(NodeStatus::Running)
    );
}

#[tokio::test]
async fn test_create_node_claimed_ip_rejected() {
    let h = default_harness();
    h.registry.put_cluster(ClusterBuilder::new().build());
    h.registry
        .put_node("BCS-K8S-OTHER", "10.0.0.5", NodeStatus::Running);
    let err = h
        .controller
        .create_node(CreateNodeCommand {
            operator: "admin".to_string(),
            cluster_id: "BCS-K8S-40000".to_string(),
            node_ips: vec!["10.0.0.5".to_string()],
        })
        .await
        .unwrap_err();
    assert!(matches!(err, OpsError::Validation(_)));
    assert_eq!(h.task_logs.count(), 0);
}

async fn delete_ready_harness(node_status: NodeStatus) -> Harness {
    let h = default_harness();
    let entry = h
        .controller
        .create_cluster(create_command(ClusterState::BcsNew))
        .await
        .unwrap();
    wait_finished(&h.task_logs, entry.id).await;
    h.registry
        .put_node("BCS-K8S-40000", "10.0.0.5", node_status);
    h
}

#[tokio::test]
async fn test_delete_node_mid_operation_rejected_before_collaborators() {
    // Removing 状态的节点直接校验失败
    let h = delete_ready_harness(NodeStatus::Removing).await;
    let submits_before = h.engine.submit_count();
    let err = h
        .controller
        .delete_node(DeleteNodeCommand {
            operator: "admin".to_string(),
            cluster_id: "BCS-K8S-40000".to_string(),
            node_ips: vec!["10.0.0.5".to_string()],
            force: false,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, OpsError::Validation(_)));
    assert_eq!(h.workload.call_count(), 0);
    assert_eq!(h.engine.submit_count(), submits_before);
    assert!(h.registry.label_deletions().is_empty());
}

#[tokio::test]
async fn test_delete_node_undrained_rejected() {
    let h = delete_ready_harness(NodeStatus::Running).await;
    let err = h
        .controller
        .delete_node(DeleteNodeCommand {
            operator: "admin".to_string(),
            cluster_id: "BCS-K8S-40000".to_string(),
            node_ips: vec!["10.0.0.5".to_string()],
            force: false,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, OpsError::Validation(_)));
}

#[tokio::test]
async fn test_delete_node_with_running_pods_rejected() {
    let h = build_harness(
        MockWorkflowEngine::new(),
        MockAgentRegistry::new(),
        MockWorkloadQuery::with_pods(vec![json!({"name": "pod-1"})]),
        RateLimitRule::default(),
    );
    h.registry.put_cluster(ClusterBuilder::new().build());
    h.registry
        .put_node("BCS-K8S-40000", "10.0.0.5", NodeStatus::Removable);
    let err = h
        .controller
        .delete_node(DeleteNodeCommand {
            operator: "admin".to_string(),
            cluster_id: "BCS-K8S-40000".to_string(),
            node_ips: vec!["10.0.0.5".to_string()],
            force: false,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, OpsError::Validation(_)));
}

#[tokio::test]
async fn test_force_delete_skips_drain_and_pod_checks() {
    let h = build_harness(
        MockWorkflowEngine::new(),
        MockAgentRegistry::new(),
        MockWorkloadQuery::with_pods(vec![json!({"name": "pod-1"})]),
        RateLimitRule::default(),
    );
    let entry = h
        .controller
        .create_cluster(create_command(ClusterState::BcsNew))
        .await
        .unwrap();
    wait_finished(&h.task_logs, entry.id).await;
    h.registry
        .put_node("BCS-K8S-40000", "10.0.0.5", NodeStatus::Running);

    let node_entry = h
        .controller
        .delete_node(DeleteNodeCommand {
            operator: "admin".to_string(),
            cluster_id: "BCS-K8S-40000".to_string(),
            node_ips: vec!["10.0.0.5".to_string()],
            force: true,
        })
        .await
        .unwrap();
    // 强制删除不查询工作负载
    assert_eq!(h.workload.call_count(), 0);
    wait_finished(&h.task_logs, node_entry.id).await;
    assert_eq!(
        h.registry.node_status("BCS-K8S-40000", "10.0.0.5"),
        Some(NodeStatus::Removed)
    );
}

#[tokio::test]
async fn test_delete_node_on_imported_cluster_rejected() {
    let h = default_harness();
    h.registry.put_cluster(
        ClusterBuilder::new()
            .with_state(ClusterState::Existing)
            .build(),
    );
    h.registry
        .put_node("BCS-K8S-40000", "10.0.0.5", NodeStatus::Removable);
    let err = h
        .controller
        .delete_node(DeleteNodeCommand {
            operator: "admin".to_string(),
            cluster_id: "BCS-K8S-40000".to_string(),
            node_ips: vec!["10.0.0.5".to_string()],
            force: true,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, OpsError::Validation(_)));
}

#[tokio::test]
async fn test_delete_node_happy_path_deletes_labels() {
    let h = delete_ready_harness(NodeStatus::Removable).await;
    let node_entry = h
        .controller
        .delete_node(DeleteNodeCommand {
            operator: "admin".to_string(),
            cluster_id: "BCS-K8S-40000".to_string(),
            node_ips: vec!["10.0.0.5".to_string()],
            force: false,
        })
        .await
        .unwrap();
    assert_eq!(
        h.registry.label_deletions(),
        vec![("BCS-K8S-40000".to_string(), vec!["10.0.0.5".to_string()])]
    );
    wait_finished(&h.task_logs, node_entry.id).await;
    assert_eq!(
        h.registry.node_status("BCS-K8S-40000", "10.0.0.5"),
        Some(NodeStatus::Removed)
    );
}

#[tokio::test]
async fn test_operation_status_served_from_task_log() {
    let h = default_harness();
    let entry = h
        .controller
        .create_cluster(create_command(ClusterState::BcsNew))
        .await
        .unwrap();

    let status = h.controller.operation_status(entry.id).await.unwrap();
    assert_eq!(status.task_log_id, entry.id);
    assert_eq!(status.task_id.as_deref(), Some("task-1"));
    assert_eq!(
        status.task_url.as_deref(),
        Some("https://engine.example.com/tasks/task-1")
    );

    wait_finished(&h.task_logs, entry.id).await;
    let status = h.controller.operation_status(entry.id).await.unwrap();
    assert!(status.is_finished);
    assert!(!status.is_polling);
    assert_eq!(status.status, TaskLogStatus::Succeeded);
    assert!(status.diagnostic.is_none());
}

#[tokio::test]
async fn test_operation_status_unknown_id() {
    let h = default_harness();
    let err = h.controller.operation_status(999).await.unwrap_err();
    assert!(matches!(err, OpsError::TaskLogNotFound { .. }));
}

#[tokio::test]
async fn test_reinstall_rejects_when_status_changes_mid_flight() {
    // 读取历史记录期间另一操作改掉了集群状态，条件更新必须拒绝
    struct StatusFlippingRepo {
        inner: Arc<MockTaskLogRepository>,
        registry: Arc<MockClusterRegistry>,
    }

    #[async_trait::async_trait]
    impl TaskLogRepository for StatusFlippingRepo {
        async fn create(&self, entry: &TaskLogEntry) -> OpsResult<TaskLogEntry> {
            self.inner.create(entry).await
        }

        async fn get_by_id(&self, id: i64) -> OpsResult<Option<TaskLogEntry>> {
            self.inner.get_by_id(id).await
        }

        async fn latest_for_cluster(&self, cluster_id: &str) -> OpsResult<Option<TaskLogEntry>> {
            self.registry.put_cluster(
                ClusterBuilder::new()
                    .with_status(ClusterStatus::InitialFailed)
                    .build(),
            );
            self.inner.latest_for_cluster(cluster_id).await
        }

        async fn find_by_cluster(&self, cluster_id: &str) -> OpsResult<Vec<TaskLogEntry>> {
            self.inner.find_by_cluster(cluster_id).await
        }

        async fn update(&self, entry: &TaskLogEntry) -> OpsResult<()> {
            self.inner.update(entry).await
        }
    }

    let registry = Arc::new(MockClusterRegistry::new());
    registry.put_cluster(ClusterBuilder::new().build());
    let inner = Arc::new(MockTaskLogRepository::new());
    let seeded = TaskLogBuilder::new()
        .with_params(install_payload().to_value().unwrap())
        .build();
    inner.create(&seeded).await.unwrap();
    let task_logs = Arc::new(StatusFlippingRepo {
        inner: inner.clone(),
        registry: registry.clone(),
    });
    let engine = Arc::new(MockWorkflowEngine::new());
    let agent = Arc::new(MockAgentRegistry::new());
    let controller = LifecycleController::new(
        registry.clone(),
        task_logs.clone(),
        Arc::new(MockAuthRegistry::new()),
        Arc::new(MockWorkloadQuery::new()),
        ConfigAssembler::new(agent),
        TaskDispatcher::new(engine.clone(), registry.clone(), task_logs.clone()),
        Arc::new(TaskPoller::new(
            engine.clone(),
            registry.clone(),
            task_logs,
            PollerConfig::default(),
        )),
        Arc::new(InMemoryRateLimiter::new()),
        RateLimitRule::default(),
    );

    let err = controller
        .reinstall_cluster(ReinstallClusterCommand {
            operator: "admin".to_string(),
            cluster_id: "BCS-K8S-40000".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, OpsError::Validation(_)));
    assert!(err.to_string().contains("状态已变更"));
    // 既没有下发，也没有覆盖并发写入的状态
    assert_eq!(engine.submit_count(), 0);
    assert_eq!(inner.count(), 1);
    assert_eq!(
        registry.cluster_status("BCS-K8S-40000"),
        Some(ClusterStatus::InitialFailed)
    );
}

#[tokio::test]
async fn test_reinstall_clears_previous_task_url() {
    let h = build_harness(
        MockWorkflowEngine::with_submit_error(OpsError::collaborator_error("engine down")),
        MockAgentRegistry::new(),
        MockWorkloadQuery::new(),
        RateLimitRule::default(),
    );
    h.registry.put_cluster(ClusterBuilder::new().build());
    let mut payload = install_payload();
    payload.task_url = Some("https://engine.example.com/tasks/task-0".to_string());
    let seeded = TaskLogBuilder::new()
        .with_params(payload.to_value().unwrap())
        .build();
    h.task_logs.create(&seeded).await.unwrap();

    // 重新提交失败，新记录不得带上上一轮的任务链接
    let entry = h
        .controller
        .reinstall_cluster(ReinstallClusterCommand {
            operator: "admin".to_string(),
            cluster_id: "BCS-K8S-40000".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(entry.status, TaskLogStatus::Failed);
    assert!(entry.params.get("task_url").is_none());
    let status = h.controller.operation_status(entry.id).await.unwrap();
    assert!(status.task_url.is_none());
}

#[tokio::test]
async fn test_node_reinstall_rate_limited_per_node_key() {
    let h = default_harness();
    h.controller
        .acquire_node_reinstall("BCS-K8S-40000", "10.0.0.5")
        .await
        .unwrap();
    let err = h
        .controller
        .acquire_node_reinstall("BCS-K8S-40000", "10.0.0.5")
        .await
        .unwrap_err();
    assert!(matches!(err, OpsError::Validation(_)));
    // 组合键限流，另一节点不受影响
    h.controller
        .acquire_node_reinstall("BCS-K8S-40000", "10.0.0.6")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_delete_cluster_rejected_mid_operation() {
    let h = default_harness();
    h.registry.put_cluster(
        ClusterBuilder::new()
            .with_status(ClusterStatus::Initializing)
            .build(),
    );
    let err = h
        .controller
        .delete_cluster(DeleteClusterCommand {
            operator: "admin".to_string(),
            cluster_id: "BCS-K8S-40000".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, OpsError::Validation(_)));
    assert!(h.registry.hard_deleted().is_empty());
    assert_eq!(h.task_logs.count(), 0);
    assert_eq!(
        h.registry.cluster_status("BCS-K8S-40000"),
        Some(ClusterStatus::Initializing)
    );
}

#[tokio::test]
async fn test_reinstall_rejects_drifted_params() {
    let h = build_harness(
        MockWorkflowEngine::new(),
        MockAgentRegistry::new(),
        MockWorkloadQuery::new(),
        RateLimitRule {
            count: 10,
            window_seconds: 60,
        },
    );
    h.registry.put_cluster(ClusterBuilder::new().build());
    // 历史记录里的参数已经不符合当前schema
    let stale = TaskLogBuilder::new()
        .with_params(json!({"version": 99, "kind": "create_cluster"}))
        .build();
    h.task_logs.create(&stale).await.unwrap();

    let err = h
        .controller
        .reinstall_cluster(ReinstallClusterCommand {
            operator: "admin".to_string(),
            cluster_id: "BCS-K8S-40000".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, OpsError::Serialization(_)));
}
