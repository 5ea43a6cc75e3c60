use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{OpsError, OpsResult};

/// 集群来源：平台原生安装 or 外部导入托管
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClusterState {
    /// 平台原生创建的集群
    #[serde(rename = "bcs_new")]
    BcsNew,
    /// 导入的存量集群，生命周期操作受限
    #[serde(rename = "existing")]
    Existing,
}

impl ClusterState {
    pub fn is_imported(&self) -> bool {
        matches!(self, ClusterState::Existing)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClusterStatus {
    #[serde(rename = "initializing")]
    Initializing,
    #[serde(rename = "normal")]
    Running,
    #[serde(rename = "initial_failed")]
    InitialFailed,
    #[serde(rename = "removing")]
    Removing,
    #[serde(rename = "removed")]
    Removed,
    #[serde(rename = "remove_failed")]
    RemoveFailed,
}

/// 节点状态在集群状态集合上增加可调度/待移除的中间态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeStatus {
    #[serde(rename = "initializing")]
    Initializing,
    #[serde(rename = "normal")]
    Running,
    #[serde(rename = "initial_failed")]
    InitialFailed,
    #[serde(rename = "removing")]
    Removing,
    #[serde(rename = "removed")]
    Removed,
    #[serde(rename = "remove_failed")]
    RemoveFailed,
    #[serde(rename = "removable")]
    Removable,
    #[serde(rename = "to_removed")]
    ToRemoved,
    #[serde(rename = "scheduling")]
    Scheduling,
}

impl NodeStatus {
    /// 是否处于生命周期操作中，此时不接受新的删除请求
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            NodeStatus::Initializing | NodeStatus::Removing | NodeStatus::Scheduling
        )
    }
    /// 是否已完成排水，允许正常删除
    pub fn is_drained(&self) -> bool {
        matches!(self, NodeStatus::Removable | NodeStatus::ToRemoved)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub environment: String,
    pub state: ClusterState,
    pub status: ClusterStatus,
    pub master_ips: Vec<String>,
    pub need_nat: bool,
    pub area_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: i64,
    pub cluster_id: String,
    pub inner_ip: String,
    pub status: NodeStatus,
}

/// 区域元数据，装配配置时显式传入（不读取全局配置）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AreaConfig {
    pub area_id: i64,
    pub version: String,
    pub dns_hosts: Vec<String>,
    pub zk_hosts: Vec<String>,
    pub registry_domain: String,
}

impl AreaConfig {
    /// zk地址拼接为 "ip:2181,ip:2181" 形式的端点串
    pub fn zk_endpoints(&self) -> String {
        self.zk_hosts
            .iter()
            .map(|ip| format!("{ip}:2181"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// 平台级上下文，替代参考系统中的环境全局变量
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub websvr: String,
    pub control_ip: Vec<String>,
    pub run_env: String,
}

/// 操作大类，持久化为历史沿用的标记串
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OperType {
    #[serde(rename = "initialize")]
    Install,
    #[serde(rename = "removing")]
    Remove,
}

impl sqlx::Type<sqlx::Sqlite> for OperType {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for OperType {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        match s {
            "initialize" => Ok(OperType::Install),
            "removing" => Ok(OperType::Remove),
            _ => Err(format!("Invalid oper type: {s}").into()),
        }
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for OperType {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        let s = match self {
            OperType::Install => "initialize",
            OperType::Remove => "removing",
        };
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(s, buf)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskLogStatus {
    #[serde(rename = "CREATED")]
    Created,
    #[serde(rename = "DISPATCHED")]
    Dispatched,
    #[serde(rename = "SUCCEEDED")]
    Succeeded,
    #[serde(rename = "FAILED")]
    Failed,
}

impl sqlx::Type<sqlx::Sqlite> for TaskLogStatus {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for TaskLogStatus {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        match s {
            "CREATED" => Ok(TaskLogStatus::Created),
            "DISPATCHED" => Ok(TaskLogStatus::Dispatched),
            "SUCCEEDED" => Ok(TaskLogStatus::Succeeded),
            "FAILED" => Ok(TaskLogStatus::Failed),
            _ => Err(format!("Invalid task log status: {s}").into()),
        }
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for TaskLogStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        let s = match self {
            TaskLogStatus::Created => "CREATED",
            TaskLogStatus::Dispatched => "DISPATCHED",
            TaskLogStatus::Succeeded => "SUCCEEDED",
            TaskLogStatus::Failed => "FAILED",
        };
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(s, buf)
    }
}

/// 一次下发-轮询周期的持久化审计记录
///
/// 状态机: Created -> Dispatched -> Succeeded | Failed。
/// 不变式: task_id 至多设置一次；is_finished 置位后不再回退，
/// 且此后 is_polling 必为 false。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskLogEntry {
    pub id: i64,
    pub project_id: String,
    pub cluster_id: String,
    /// 节点操作时为逗号拼接的节点IP串，集群操作为空
    pub node_id: Option<String>,
    pub token: String,
    pub status: TaskLogStatus,
    /// 完整回放参数，重放时不得依赖任何当前可变状态
    pub params: serde_json::Value,
    pub operator: String,
    pub oper_type: OperType,
    pub task_id: Option<String>,
    pub is_polling: bool,
    pub is_finished: bool,
    pub log: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskLogEntry {
    pub fn new(
        project_id: String,
        cluster_id: String,
        node_id: Option<String>,
        params: serde_json::Value,
        operator: String,
        oper_type: OperType,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // 将由数据库生成
            project_id,
            cluster_id,
            node_id,
            token: Uuid::new_v4().to_string(),
            status: TaskLogStatus::Created,
            params,
            operator,
            oper_type,
            task_id: None,
            is_polling: false,
            is_finished: false,
            log: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            TaskLogStatus::Succeeded | TaskLogStatus::Failed
        )
    }

    /// 仅在提交成功且拿到非空task_id时进入Dispatched
    pub fn mark_dispatched(&mut self, task_id: String) -> OpsResult<()> {
        if self.status != TaskLogStatus::Created {
            return Err(OpsError::InvalidTransition(format!(
                "记录 {} 当前状态 {:?}，不能进入 Dispatched",
                self.id, self.status
            )));
        }
        if task_id.is_empty() {
            return Err(OpsError::InvalidTransition(
                "task_id 为空，不能进入 Dispatched".to_string(),
            ));
        }
        self.status = TaskLogStatus::Dispatched;
        self.task_id = Some(task_id);
        self.is_polling = true;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// 终态收敛，置位后不可逆；成功时清空诊断信息，失败时保留
    pub fn mark_finished(&mut self, success: bool, diagnostic: Option<String>) -> OpsResult<()> {
        if self.is_finished {
            return Err(OpsError::InvalidTransition(format!(
                "记录 {} 已是终态，不能重复收敛",
                self.id
            )));
        }
        self.status = if success {
            TaskLogStatus::Succeeded
        } else {
            TaskLogStatus::Failed
        };
        self.is_finished = true;
        self.is_polling = false;
        self.log = if success { None } else { diagnostic };
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry() -> TaskLogEntry {
        TaskLogEntry::new(
            "proj-1".to_string(),
            "BCS-K8S-40000".to_string(),
            None,
            json!({}),
            "admin".to_string(),
            OperType::Install,
        )
    }

    #[test]
    fn test_dispatch_transition() {
        let mut log = entry();
        assert_eq!(log.status, TaskLogStatus::Created);
        log.mark_dispatched("task-123".to_string()).unwrap();
        assert_eq!(log.status, TaskLogStatus::Dispatched);
        assert!(log.is_polling);
        assert_eq!(log.task_id.as_deref(), Some("task-123"));

        // task_id 至多设置一次
        assert!(log.mark_dispatched("task-456".to_string()).is_err());
        assert_eq!(log.task_id.as_deref(), Some("task-123"));
    }

    #[test]
    fn test_empty_task_id_rejected() {
        let mut log = entry();
        assert!(log.mark_dispatched(String::new()).is_err());
        assert_eq!(log.status, TaskLogStatus::Created);
        assert!(log.task_id.is_none());
    }

    #[test]
    fn test_finish_is_irreversible() {
        let mut log = entry();
        log.mark_dispatched("task-123".to_string()).unwrap();
        log.mark_finished(false, Some("engine failed".to_string()))
            .unwrap();
        assert!(log.is_finished);
        assert!(!log.is_polling);
        assert_eq!(log.status, TaskLogStatus::Failed);
        assert_eq!(log.log.as_deref(), Some("engine failed"));

        // is_finished 只允许翻转一次
        assert!(log.mark_finished(true, None).is_err());
        assert_eq!(log.status, TaskLogStatus::Failed);
    }

    #[test]
    fn test_success_clears_diagnostic() {
        let mut log = entry();
        log.log = Some("pending".to_string());
        log.mark_dispatched("task-1".to_string()).unwrap();
        log.mark_finished(true, Some("ignored".to_string())).unwrap();
        assert_eq!(log.status, TaskLogStatus::Succeeded);
        assert!(log.log.is_none());
    }

    #[test]
    fn test_node_status_guards() {
        assert!(NodeStatus::Removing.is_busy());
        assert!(NodeStatus::Initializing.is_busy());
        assert!(!NodeStatus::Removable.is_busy());
        assert!(NodeStatus::Removable.is_drained());
        assert!(NodeStatus::ToRemoved.is_drained());
        assert!(!NodeStatus::Running.is_drained());
    }
}
