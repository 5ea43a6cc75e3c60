//! In-memory mock implementations of the collaborator ports and the
//! task log repository, for unit testing without network or database.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::builders::NodeBuilder;
use clusterops_domain::{
    AgentCredential, AgentRegistry, AuthRegistry, ClusterRecord, ClusterRegistry, ClusterStatus,
    ConfigSnapshot, EngineTaskState, EngineTaskStatus, NodeRecord, NodeStatus, NodeStatusUpdate,
    OpsError, OpsResult, TaskHandle, TaskLogEntry, TaskLogRepository, WorkflowEngine,
    WorkloadQuery,
};

/// Mock agent registration collaborator with a call counter
pub struct MockAgentRegistry {
    fail: bool,
    calls: Arc<Mutex<u32>>,
}

impl MockAgentRegistry {
    pub fn new() -> Self {
        Self {
            fail: false,
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn call_count(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

impl Default for MockAgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentRegistry for MockAgentRegistry {
    async fn get_or_register(
        &self,
        _project_id: &str,
        cluster_id: &str,
    ) -> OpsResult<AgentCredential> {
        *self.calls.lock().unwrap() += 1;
        if self.fail {
            return Err(OpsError::collaborator_error("agent registry unavailable"));
        }
        Ok(AgentCredential {
            token: "agent-token-1".to_string(),
            bcs_cluster_id: format!("bcs-{}", cluster_id.to_lowercase()),
        })
    }
}

/// Mock workflow engine with a configurable submit result and a
/// scripted queue of poll responses (defaults to Success when empty)
pub struct MockWorkflowEngine {
    submit_result: Mutex<Result<TaskHandle, OpsError>>,
    queries: Mutex<VecDeque<OpsResult<EngineTaskStatus>>>,
    submit_calls: Mutex<u32>,
    query_calls: Mutex<u32>,
}

impl MockWorkflowEngine {
    pub fn new() -> Self {
        Self::with_submit_handle(TaskHandle {
            task_id: Some("task-1".to_string()),
            task_url: Some("https://engine.example.com/tasks/task-1".to_string()),
        })
    }

    pub fn with_submit_handle(handle: TaskHandle) -> Self {
        Self {
            submit_result: Mutex::new(Ok(handle)),
            queries: Mutex::new(VecDeque::new()),
            submit_calls: Mutex::new(0),
            query_calls: Mutex::new(0),
        }
    }

    pub fn with_submit_error(err: OpsError) -> Self {
        Self {
            submit_result: Mutex::new(Err(err)),
            queries: Mutex::new(VecDeque::new()),
            submit_calls: Mutex::new(0),
            query_calls: Mutex::new(0),
        }
    }

    /// Push one scripted response for `query_task`; responses are
    /// consumed in FIFO order
    pub fn script_query(&self, response: OpsResult<EngineTaskStatus>) {
        self.queries.lock().unwrap().push_back(response);
    }

    pub fn submit_count(&self) -> u32 {
        *self.submit_calls.lock().unwrap()
    }

    pub fn query_count(&self) -> u32 {
        *self.query_calls.lock().unwrap()
    }

    fn submit(&self) -> OpsResult<TaskHandle> {
        *self.submit_calls.lock().unwrap() += 1;
        self.submit_result.lock().unwrap().clone()
    }
}

impl Default for MockWorkflowEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkflowEngine for MockWorkflowEngine {
    async fn create_cluster(&self, _params: &serde_json::Value) -> OpsResult<TaskHandle> {
        self.submit()
    }

    async fn delete_cluster(&self, _params: &serde_json::Value) -> OpsResult<TaskHandle> {
        self.submit()
    }

    async fn add_cluster_node(&self, _params: &serde_json::Value) -> OpsResult<TaskHandle> {
        self.submit()
    }

    async fn delete_cluster_node(&self, _params: &serde_json::Value) -> OpsResult<TaskHandle> {
        self.submit()
    }

    async fn query_task(&self, _task_id: &str) -> OpsResult<EngineTaskStatus> {
        *self.query_calls.lock().unwrap() += 1;
        self.queries.lock().unwrap().pop_front().unwrap_or(Ok(
            EngineTaskStatus {
                state: EngineTaskState::Success,
                message: None,
                task_url: None,
            },
        ))
    }
}

#[derive(Default)]
struct RegistryState {
    clusters: HashMap<String, ClusterRecord>,
    nodes: HashMap<(String, String), NodeRecord>,
    namespaces: HashMap<String, Vec<String>>,
    snapshots: HashMap<String, ConfigSnapshot>,
    next_node_id: i64,
    hard_deleted: Vec<String>,
    label_deletions: Vec<(String, Vec<String>)>,
}

/// In-memory cluster/node registry
pub struct MockClusterRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl MockClusterRegistry {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RegistryState {
                next_node_id: 1,
                ..Default::default()
            })),
        }
    }

    pub fn put_cluster(&self, cluster: ClusterRecord) {
        self.state
            .lock()
            .unwrap()
            .clusters
            .insert(cluster.id.clone(), cluster);
    }

    pub fn put_node(&self, cluster_id: &str, ip: &str, status: NodeStatus) {
        let mut state = self.state.lock().unwrap();
        let id = state.next_node_id;
        state.next_node_id += 1;
        let node = NodeRecord {
            id,
            ..NodeBuilder::new()
                .with_cluster_id(cluster_id)
                .with_inner_ip(ip)
                .with_status(status)
                .build()
        };
        state
            .nodes
            .insert((cluster_id.to_string(), ip.to_string()), node);
    }

    pub fn put_namespaces(&self, cluster_id: &str, namespaces: Vec<&str>) {
        self.state.lock().unwrap().namespaces.insert(
            cluster_id.to_string(),
            namespaces.into_iter().map(str::to_string).collect(),
        );
    }

    pub fn node_status(&self, cluster_id: &str, ip: &str) -> Option<NodeStatus> {
        self.state
            .lock()
            .unwrap()
            .nodes
            .get(&(cluster_id.to_string(), ip.to_string()))
            .map(|n| n.status)
    }

    pub fn cluster_status(&self, cluster_id: &str) -> Option<ClusterStatus> {
        self.state
            .lock()
            .unwrap()
            .clusters
            .get(cluster_id)
            .map(|c| c.status)
    }

    pub fn hard_deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().hard_deleted.clone()
    }

    pub fn label_deletions(&self) -> Vec<(String, Vec<String>)> {
        self.state.lock().unwrap().label_deletions.clone()
    }
}

impl Default for MockClusterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClusterRegistry for MockClusterRegistry {
    async fn create_cluster(&self, cluster: &ClusterRecord) -> OpsResult<ClusterRecord> {
        self.put_cluster(cluster.clone());
        Ok(cluster.clone())
    }

    async fn get_cluster(&self, cluster_id: &str) -> OpsResult<Option<ClusterRecord>> {
        Ok(self.state.lock().unwrap().clusters.get(cluster_id).cloned())
    }

    async fn update_cluster_status(
        &self,
        cluster_id: &str,
        expect: Option<ClusterStatus>,
        next: ClusterStatus,
    ) -> OpsResult<bool> {
        let mut state = self.state.lock().unwrap();
        match state.clusters.get_mut(cluster_id) {
            Some(cluster) => {
                if let Some(expected) = expect {
                    if cluster.status != expected {
                        return Ok(false);
                    }
                }
                cluster.status = next;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_cluster(&self, cluster_id: &str) -> OpsResult<()> {
        let mut state = self.state.lock().unwrap();
        state.clusters.remove(cluster_id);
        state.hard_deleted.push(cluster_id.to_string());
        Ok(())
    }

    async fn get_master_nodes(&self, cluster_id: &str) -> OpsResult<Vec<NodeRecord>> {
        let state = self.state.lock().unwrap();
        let master_ips = state
            .clusters
            .get(cluster_id)
            .map(|c| c.master_ips.clone())
            .unwrap_or_default();
        Ok(state
            .nodes
            .values()
            .filter(|n| n.cluster_id == cluster_id && master_ips.contains(&n.inner_ip))
            .cloned()
            .collect())
    }

    async fn get_cluster_nodes(&self, cluster_id: &str) -> OpsResult<Vec<NodeRecord>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .nodes
            .values()
            .filter(|n| n.cluster_id == cluster_id)
            .cloned()
            .collect())
    }

    async fn find_nodes_by_ips(&self, ips: &[String]) -> OpsResult<Vec<NodeRecord>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .nodes
            .values()
            .filter(|n| ips.contains(&n.inner_ip))
            .cloned()
            .collect())
    }

    async fn create_nodes(
        &self,
        cluster_id: &str,
        ips: &[String],
        status: NodeStatus,
    ) -> OpsResult<Vec<NodeRecord>> {
        let mut created = Vec::new();
        for ip in ips {
            self.put_node(cluster_id, ip, status);
            created.push(
                self.state.lock().unwrap().nodes[&(cluster_id.to_string(), ip.clone())].clone(),
            );
        }
        Ok(created)
    }

    async fn update_node_list(
        &self,
        cluster_id: &str,
        updates: &[NodeStatusUpdate],
    ) -> OpsResult<()> {
        let mut state = self.state.lock().unwrap();
        for update in updates {
            if let Some(node) = state
                .nodes
                .get_mut(&(cluster_id.to_string(), update.inner_ip.clone()))
            {
                node.status = update.status;
            }
        }
        Ok(())
    }

    async fn delete_node_labels(&self, cluster_id: &str, ips: &[String]) -> OpsResult<()> {
        self.state
            .lock()
            .unwrap()
            .label_deletions
            .push((cluster_id.to_string(), ips.to_vec()));
        Ok(())
    }

    async fn get_cluster_namespaces(&self, cluster_id: &str) -> OpsResult<Vec<String>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .namespaces
            .get(cluster_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_cluster_namespaces(&self, cluster_id: &str) -> OpsResult<()> {
        self.state.lock().unwrap().namespaces.remove(cluster_id);
        Ok(())
    }

    async fn save_snapshot(&self, snapshot: &ConfigSnapshot) -> OpsResult<()> {
        self.state
            .lock()
            .unwrap()
            .snapshots
            .insert(snapshot.cluster_id.clone(), snapshot.clone());
        Ok(())
    }

    async fn get_snapshot(&self, cluster_id: &str) -> OpsResult<Option<ConfigSnapshot>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .snapshots
            .get(cluster_id)
            .cloned())
    }
}

/// In-memory task log repository
pub struct MockTaskLogRepository {
    entries: Arc<Mutex<HashMap<i64, TaskLogEntry>>>,
    next_id: Arc<Mutex<i64>>,
}

impl MockTaskLogRepository {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(Mutex::new(1)),
        }
    }

    pub fn count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

impl Default for MockTaskLogRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskLogRepository for MockTaskLogRepository {
    async fn create(&self, entry: &TaskLogEntry) -> OpsResult<TaskLogEntry> {
        let mut entries = self.entries.lock().unwrap();
        let mut next_id = self.next_id.lock().unwrap();
        let mut created = entry.clone();
        created.id = *next_id;
        *next_id += 1;
        entries.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> OpsResult<Option<TaskLogEntry>> {
        Ok(self.entries.lock().unwrap().get(&id).cloned())
    }

    async fn latest_for_cluster(&self, cluster_id: &str) -> OpsResult<Option<TaskLogEntry>> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.cluster_id == cluster_id)
            .max_by_key(|e| e.id)
            .cloned())
    }

    async fn find_by_cluster(&self, cluster_id: &str) -> OpsResult<Vec<TaskLogEntry>> {
        let mut found: Vec<TaskLogEntry> = self
            .entries
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.cluster_id == cluster_id)
            .cloned()
            .collect();
        found.sort_by_key(|e| std::cmp::Reverse(e.id));
        Ok(found)
    }

    async fn update(&self, entry: &TaskLogEntry) -> OpsResult<()> {
        let mut entries = self.entries.lock().unwrap();
        if !entries.contains_key(&entry.id) {
            return Err(OpsError::task_log_not_found(entry.id));
        }
        entries.insert(entry.id, entry.clone());
        Ok(())
    }
}

/// Mock authorization registration with a call counter
pub struct MockAuthRegistry {
    fail: bool,
    calls: Arc<Mutex<u32>>,
}

impl MockAuthRegistry {
    pub fn new() -> Self {
        Self {
            fail: false,
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn call_count(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

impl Default for MockAuthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthRegistry for MockAuthRegistry {
    async fn register(&self, _cluster_id: &str, _name: &str, _environment: &str) -> OpsResult<()> {
        *self.calls.lock().unwrap() += 1;
        if self.fail {
            return Err(OpsError::collaborator_error("auth center unavailable"));
        }
        Ok(())
    }
}

/// Mock workload query returning a fixed pod list
pub struct MockWorkloadQuery {
    pods: Vec<serde_json::Value>,
    calls: Arc<Mutex<u32>>,
}

impl MockWorkloadQuery {
    pub fn new() -> Self {
        Self {
            pods: Vec::new(),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn with_pods(pods: Vec<serde_json::Value>) -> Self {
        Self {
            pods,
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn call_count(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

impl Default for MockWorkloadQuery {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkloadQuery for MockWorkloadQuery {
    async fn list_pods(&self, _host_ips: &[String]) -> OpsResult<Vec<serde_json::Value>> {
        *self.calls.lock().unwrap() += 1;
        Ok(self.pods.clone())
    }
}
