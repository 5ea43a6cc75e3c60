//! 配置装配
//!
//! 从基础模板、区域元数据与按角色划分的主机列表生成嵌套配置树。
//! 两个变体共享同一形状：集群安装变体从零生成完整配置并附带
//! 安装期瞬态键；节点操作变体在已剥离瞬态键的快照之上合并
//! 节点相关的段。每个段通过 legal_hosts 限定其生效的主机集合。

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::{debug, info};

use clusterops_domain::{
    AgentRegistry, AreaConfig, ClusterRecord, OperationKind, OpsError, OpsResult, PlatformConfig,
};

use crate::host_namer::name_hosts;

/// 装配上下文，区域与平台配置显式传入，便于脱离全局环境测试
#[derive(Debug, Clone)]
pub struct AssemblerContext {
    pub area: AreaConfig,
    pub platform: PlatformConfig,
    pub base_template: Value,
}

pub struct ConfigAssembler {
    agent_registry: Arc<dyn AgentRegistry>,
}

fn host_map(pairs: &[(String, String)]) -> Value {
    let mut map = Map::new();
    for (host, ip) in pairs {
        map.insert(host.clone(), Value::String(ip.clone()));
    }
    Value::Object(map)
}

fn hosts_of(pairs: &[(String, String)]) -> Vec<String> {
    pairs.iter().map(|(host, _)| host.clone()).collect()
}

/// 在配置树的嵌套路径上写入一个段，沿途的中间对象按需创建
fn set_section(configure: &mut Value, path: &[&str], section: Value) {
    let mut cursor = configure;
    for key in &path[..path.len() - 1] {
        if !cursor.get(*key).map(Value::is_object).unwrap_or(false) {
            cursor[*key] = json!({});
        }
        cursor = cursor.get_mut(*key).unwrap();
    }
    cursor[path[path.len() - 1]] = section;
}

impl ConfigAssembler {
    pub fn new(agent_registry: Arc<dyn AgentRegistry>) -> Self {
        Self { agent_registry }
    }

    /// 集群安装变体
    ///
    /// master IP 集合同时生成 masters 与 etcd peers 两份映射，
    /// 当前两者相同，拆开是为将来二者分化预留。导入集群额外
    /// 调用Agent注册换取join token，注册失败视为装配失败。
    pub async fn assemble_install(
        &self,
        ctx: &AssemblerContext,
        cluster: &ClusterRecord,
    ) -> OpsResult<Value> {
        if cluster.master_ips.is_empty() {
            return Err(OpsError::assembly_error(format!(
                "集群 {} 缺少 master IP，无法装配配置",
                cluster.id
            )));
        }
        debug!(cluster_id = %cluster.id, "开始装配集群安装配置");

        let masters = name_hosts(&cluster.master_ips, &cluster.id, true);
        let etcd_peers = name_hosts(&cluster.master_ips, &cluster.id, true);
        let master_hosts = hosts_of(&masters);

        let mut configure = ctx.base_template.clone();
        configure["version"] = json!(ctx.area.version);
        configure["control_ip"] = json!(ctx.platform.control_ip);
        configure["websvr"] = json!(ctx.platform.websvr);
        configure["platform"] = json!(ctx.platform.run_env);

        set_section(
            &mut configure,
            &["common"],
            json!({
                "cluster_id": cluster.id,
                "etcd_peers": host_map(&etcd_peers),
                "cluster_masters": host_map(&masters),
                "cluster_hosts": host_map(&masters),
                "need_nat": cluster.need_nat,
                "registry_domain": ctx.area.registry_domain,
                "dns_host": ctx.area.dns_hosts,
                "zk_hosts": ctx.area.zk_endpoints(),
            }),
        );
        set_section(
            &mut configure,
            &["kubernetes", "master"],
            json!({"legal_hosts": master_hosts}),
        );
        set_section(
            &mut configure,
            &["kubernetes", "node"],
            json!({"legal_hosts": []}),
        );
        set_section(
            &mut configure,
            &["docker"],
            json!({"legal_hosts": master_hosts}),
        );
        set_section(
            &mut configure,
            &["bcs", "driver"],
            json!({"legal_hosts": master_hosts}),
        );
        set_section(
            &mut configure,
            &["bcs", "datawatch"],
            json!({"legal_hosts": master_hosts}),
        );
        set_section(
            &mut configure,
            &["etcd"],
            json!({"legal_hosts": master_hosts}),
        );

        if cluster.state.is_imported() {
            let credential = self
                .agent_registry
                .get_or_register(&cluster.project_id, &cluster.id)
                .await
                .map_err(|e| {
                    OpsError::assembly_error(format!(
                        "集群 {} Agent注册失败: {e}",
                        cluster.id
                    ))
                })?;
            set_section(
                &mut configure,
                &["bcs", "kube_agent"],
                json!({
                    "legal_hosts": master_hosts,
                    "token": credential.token,
                    "bcs_cluster_id": credential.bcs_cluster_id,
                }),
            );
        }

        info!(cluster_id = %cluster.id, masters = masters.len(), "集群安装配置装配完成");
        Ok(configure)
    }

    /// 节点操作变体（ADD_NODE | DELETE_NODE）
    ///
    /// 在安装快照（已剥离瞬态键）之上合并节点相关的段。加节点
    /// 需要Agent注册，且 kubeapps 段限定在 master 主机上执行——
    /// join 动作从控制面发起。secrets.kubernetes 重置为空主机集，
    /// dashboard/prometheus 只保留 master 主机。
    pub async fn assemble_node_operation(
        &self,
        snapshot_configure: Value,
        op: OperationKind,
        cluster: &ClusterRecord,
        node_ips: &[String],
        master_ips: &[String],
    ) -> OpsResult<Value> {
        if !matches!(op, OperationKind::AddNode | OperationKind::DeleteNode) {
            return Err(OpsError::Internal(format!(
                "节点操作装配不支持 {op:?}"
            )));
        }
        if node_ips.is_empty() {
            return Err(OpsError::assembly_error(format!(
                "集群 {} 节点操作缺少节点IP",
                cluster.id
            )));
        }
        debug!(cluster_id = %cluster.id, ?op, nodes = node_ips.len(), "开始装配节点操作配置");

        let nodes = name_hosts(node_ips, &cluster.id, false);
        let masters = name_hosts(master_ips, &cluster.id, true);
        let node_hosts = hosts_of(&nodes);
        let master_hosts = hosts_of(&masters);

        let mut configure = snapshot_configure;
        set_section(
            &mut configure,
            &["common", "cluster_nodes"],
            host_map(&nodes),
        );
        set_section(
            &mut configure,
            &["kubernetes", "node"],
            json!({"legal_hosts": node_hosts}),
        );
        set_section(
            &mut configure,
            &["docker"],
            json!({"legal_hosts": node_hosts}),
        );
        set_section(
            &mut configure,
            &["bcs", "agent"],
            json!({"legal_hosts": node_hosts}),
        );
        set_section(
            &mut configure,
            &["log", "collector"],
            json!({"legal_hosts": node_hosts}),
        );

        match op {
            OperationKind::AddNode => {
                let credential = self
                    .agent_registry
                    .get_or_register(&cluster.project_id, &cluster.id)
                    .await
                    .map_err(|e| {
                        OpsError::assembly_error(format!(
                            "集群 {} 加节点Agent注册失败: {e}",
                            cluster.id
                        ))
                    })?;
                set_section(
                    &mut configure,
                    &["kubeapps", "kube_agent"],
                    json!({
                        "legal_hosts": master_hosts,
                        "token": credential.token,
                        "bcs_cluster_id": credential.bcs_cluster_id,
                    }),
                );
                set_section(
                    &mut configure,
                    &["kubeapps", "node"],
                    json!({
                        "legal_hosts": master_hosts,
                        "node_list": node_ips,
                        "action": "add",
                    }),
                );
            }
            OperationKind::DeleteNode => {
                set_section(
                    &mut configure,
                    &["kubeapps", "node"],
                    json!({
                        "legal_hosts": master_hosts,
                        "node_list": node_ips,
                        "action": "delete",
                    }),
                );
            }
            _ => unreachable!(),
        }

        set_section(
            &mut configure,
            &["secrets", "kubernetes"],
            json!({"legal_hosts": []}),
        );
        set_section(
            &mut configure,
            &["dashboard"],
            json!({"legal_hosts": master_hosts}),
        );
        set_section(
            &mut configure,
            &["prometheus"],
            json!({"legal_hosts": master_hosts}),
        );

        info!(cluster_id = %cluster.id, ?op, "节点操作配置装配完成");
        Ok(configure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clusterops_domain::{ClusterState, ConfigSnapshot};
    use clusterops_testing_utils::{ClusterBuilder, MockAgentRegistry};

    fn context() -> AssemblerContext {
        AssemblerContext {
            area: AreaConfig {
                area_id: 1,
                version: "1.12.3".to_string(),
                dns_hosts: vec!["10.1.0.1".to_string()],
                zk_hosts: vec!["10.1.0.2".to_string(), "10.1.0.3".to_string()],
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

    #[tokio::test]
    async fn test_native_cluster_never_calls_agent_registry() {
        let agent = Arc::new(MockAgentRegistry::new());
        let assembler = ConfigAssembler::new(agent.clone());
        let cluster = ClusterBuilder::new()
            .with_id("BCS-K8S-40000")
            .with_master_ips(vec!["10.0.0.1"])
            .with_state(ClusterState::BcsNew)
            .build();

        let configure = assembler
            .assemble_install(&context(), &cluster)
            .await
            .unwrap();

        assert_eq!(agent.call_count(), 0);
        let masters = &configure["common"]["cluster_masters"];
        assert_eq!(
            masters["master-10-0-0-1-bcs-k8s-40000"],
            json!("10.0.0.1")
        );
        assert_eq!(masters.as_object().unwrap().len(), 1);
        assert!(configure.get("bcs").and_then(|b| b.get("kube_agent")).is_none());
    }

    #[tokio::test]
    async fn test_imported_cluster_failing_agent_registration_aborts() {
        let agent = Arc::new(MockAgentRegistry::failing());
        let assembler = ConfigAssembler::new(agent);
        let cluster = ClusterBuilder::new()
            .with_state(ClusterState::Existing)
            .build();

        let err = assembler
            .assemble_install(&context(), &cluster)
            .await
            .unwrap_err();
        assert!(matches!(err, OpsError::ConfigAssembly(_)));
    }

    #[tokio::test]
    async fn test_imported_cluster_gets_kube_agent_section() {
        let agent = Arc::new(MockAgentRegistry::new());
        let assembler = ConfigAssembler::new(agent.clone());
        let cluster = ClusterBuilder::new()
            .with_state(ClusterState::Existing)
            .build();

        let configure = assembler
            .assemble_install(&context(), &cluster)
            .await
            .unwrap();
        assert_eq!(agent.call_count(), 1);
        assert!(configure["bcs"]["kube_agent"]["token"].is_string());
    }

    #[tokio::test]
    async fn test_install_sections_scoped_to_masters() {
        let assembler = ConfigAssembler::new(Arc::new(MockAgentRegistry::new()));
        let cluster = ClusterBuilder::new()
            .with_master_ips(vec!["10.0.0.1", "10.0.0.2"])
            .build();

        let configure = assembler
            .assemble_install(&context(), &cluster)
            .await
            .unwrap();
        for path in [
            &configure["kubernetes"]["master"],
            &configure["etcd"],
            &configure["bcs"]["driver"],
            &configure["bcs"]["datawatch"],
        ] {
            assert_eq!(path["legal_hosts"].as_array().unwrap().len(), 2);
        }
        // 安装时尚无普通节点
        assert!(configure["kubernetes"]["node"]["legal_hosts"]
            .as_array()
            .unwrap()
            .is_empty());
        assert_eq!(
            configure["common"]["zk_hosts"],
            json!("10.1.0.2:2181,10.1.0.3:2181")
        );
    }

    #[tokio::test]
    async fn test_snapshot_round_trip_into_both_node_operations() {
        // 安装快照剥离瞬态键后，两种节点操作都必须无错接受
        let assembler = ConfigAssembler::new(Arc::new(MockAgentRegistry::new()));
        let cluster = ClusterBuilder::new().build();
        let installed = assembler
            .assemble_install(&context(), &cluster)
            .await
            .unwrap();
        let snapshot = ConfigSnapshot {
            cluster_id: cluster.id.clone(),
            version: "1.12.3".to_string(),
            configure: installed,
        };

        let node_ips = vec!["10.0.0.5".to_string()];
        for op in [OperationKind::AddNode, OperationKind::DeleteNode] {
            let configure = assembler
                .assemble_node_operation(
                    snapshot.stripped_configure(),
                    op,
                    &cluster,
                    &node_ips,
                    &cluster.master_ips,
                )
                .await
                .unwrap();
            assert!(configure.get("control_ip").is_none());
            assert!(configure.get("websvr").is_none());
            assert_eq!(
                configure["kubernetes"]["node"]["legal_hosts"],
                json!([format!("node-10-0-0-5-{}", cluster.id.to_lowercase())])
            );
            assert!(configure["secrets"]["kubernetes"]["legal_hosts"]
                .as_array()
                .unwrap()
                .is_empty());
        }
    }

    #[tokio::test]
    async fn test_delete_node_kubeapps_scoped_to_masters() {
        let assembler = ConfigAssembler::new(Arc::new(MockAgentRegistry::new()));
        let cluster = ClusterBuilder::new()
            .with_id("BCS-K8S-40000")
            .with_master_ips(vec!["10.0.0.1"])
            .build();

        let configure = assembler
            .assemble_node_operation(
                json!({}),
                OperationKind::DeleteNode,
                &cluster,
                &["10.0.0.5".to_string()],
                &cluster.master_ips,
            )
            .await
            .unwrap();
        assert_eq!(
            configure["kubeapps"]["node"]["legal_hosts"],
            json!(["master-10-0-0-1-bcs-k8s-40000"])
        );
        assert_eq!(
            configure["kubeapps"]["node"]["node_list"],
            json!(["10.0.0.5"])
        );
        assert_eq!(configure["kubeapps"]["node"]["action"], json!("delete"));
    }

    #[tokio::test]
    async fn test_add_node_requires_agent_registration() {
        let agent = Arc::new(MockAgentRegistry::failing());
        let assembler = ConfigAssembler::new(agent);
        let cluster = ClusterBuilder::new().build();
        let err = assembler
            .assemble_node_operation(
                json!({}),
                OperationKind::AddNode,
                &cluster,
                &["10.0.0.5".to_string()],
                &cluster.master_ips,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OpsError::ConfigAssembly(_)));
    }
}
