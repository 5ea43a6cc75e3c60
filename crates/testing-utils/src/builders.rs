//! Test data builders with sensible defaults and easy customization.

use clusterops_domain::{
    ClusterRecord, ClusterState, ClusterStatus, NodeRecord, NodeStatus, OperType, TaskLogEntry,
};

/// Builder for creating test ClusterRecord entities
pub struct ClusterBuilder {
    cluster: ClusterRecord,
}

impl ClusterBuilder {
    pub fn new() -> Self {
        Self {
            cluster: ClusterRecord {
                id: "BCS-K8S-40000".to_string(),
                project_id: "proj-1".to_string(),
                name: "test-cluster".to_string(),
                environment: "prod".to_string(),
                state: ClusterState::BcsNew,
                status: ClusterStatus::Running,
                master_ips: vec!["10.0.0.1".to_string()],
                need_nat: false,
                area_id: 1,
            },
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.cluster.id = id.to_string();
        self
    }

    pub fn with_project_id(mut self, project_id: &str) -> Self {
        self.cluster.project_id = project_id.to_string();
        self
    }

    pub fn with_master_ips(mut self, ips: Vec<&str>) -> Self {
        self.cluster.master_ips = ips.into_iter().map(str::to_string).collect();
        self
    }

    pub fn with_state(mut self, state: ClusterState) -> Self {
        self.cluster.state = state;
        self
    }

    pub fn with_status(mut self, status: ClusterStatus) -> Self {
        self.cluster.status = status;
        self
    }

    pub fn with_need_nat(mut self, need_nat: bool) -> Self {
        self.cluster.need_nat = need_nat;
        self
    }

    pub fn build(self) -> ClusterRecord {
        self.cluster
    }
}

impl Default for ClusterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating test NodeRecord entities
pub struct NodeBuilder {
    node: NodeRecord,
}

impl NodeBuilder {
    pub fn new() -> Self {
        Self {
            node: NodeRecord {
                id: 1,
                cluster_id: "BCS-K8S-40000".to_string(),
                inner_ip: "10.0.0.5".to_string(),
                status: NodeStatus::Running,
            },
        }
    }

    pub fn with_cluster_id(mut self, cluster_id: &str) -> Self {
        self.node.cluster_id = cluster_id.to_string();
        self
    }

    pub fn with_inner_ip(mut self, ip: &str) -> Self {
        self.node.inner_ip = ip.to_string();
        self
    }

    pub fn with_status(mut self, status: NodeStatus) -> Self {
        self.node.status = status;
        self
    }

    pub fn build(self) -> NodeRecord {
        self.node
    }
}

impl Default for NodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating test TaskLogEntry rows
pub struct TaskLogBuilder {
    entry: TaskLogEntry,
}

impl TaskLogBuilder {
    pub fn new() -> Self {
        Self {
            entry: TaskLogEntry::new(
                "proj-1".to_string(),
                "BCS-K8S-40000".to_string(),
                None,
                serde_json::json!({}),
                "admin".to_string(),
                OperType::Install,
            ),
        }
    }

    pub fn with_cluster_id(mut self, cluster_id: &str) -> Self {
        self.entry.cluster_id = cluster_id.to_string();
        self
    }

    pub fn with_node_id(mut self, node_id: &str) -> Self {
        self.entry.node_id = Some(node_id.to_string());
        self
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.entry.params = params;
        self
    }

    pub fn with_operator(mut self, operator: &str) -> Self {
        self.entry.operator = operator.to_string();
        self
    }

    pub fn with_oper_type(mut self, oper_type: OperType) -> Self {
        self.entry.oper_type = oper_type;
        self
    }

    pub fn build(self) -> TaskLogEntry {
        self.entry
    }
}

impl Default for TaskLogBuilder {
    fn default() -> Self {
        Self::new()
    }
}
