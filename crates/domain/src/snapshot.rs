use serde::{Deserialize, Serialize};

use crate::entities::OperType;
use crate::errors::{OpsError, OpsResult};

/// 回放参数当前版本号，schema变更时递增
pub const REPLAY_VERSION: u32 = 1;

/// 安装期一次性生成的快照中，复用前需剥离的瞬态键
pub const TRANSIENT_SNAPSHOT_KEYS: [&str; 3] = ["control_ip", "websvr", "platform"];

/// 操作种类封闭集合，引擎提交按变体匹配选择接口，不做名字拼接
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OperationKind {
    #[serde(rename = "create_cluster")]
    CreateCluster,
    #[serde(rename = "delete_cluster")]
    DeleteCluster,
    #[serde(rename = "add_node")]
    AddNode,
    #[serde(rename = "delete_node")]
    DeleteNode,
}

impl OperationKind {
    pub fn oper_type(&self) -> OperType {
        match self {
            OperationKind::CreateCluster | OperationKind::AddNode => OperType::Install,
            OperationKind::DeleteCluster | OperationKind::DeleteNode => OperType::Remove,
        }
    }
}

/// 集群安装期冻结的配置快照，后续节点操作只读复用
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub cluster_id: String,
    pub version: String,
    pub configure: serde_json::Value,
}

impl ConfigSnapshot {
    /// 剥离安装期的瞬态键（control_ip/websvr/platform）后返回可复用的配置树
    pub fn stripped_configure(&self) -> serde_json::Value {
        let mut configure = self.configure.clone();
        if let Some(map) = configure.as_object_mut() {
            for key in TRANSIENT_SNAPSHOT_KEYS {
                map.remove(key);
            }
        }
        configure
    }
}

/// 一次引擎提交的完整回放载荷
///
/// params 是重放的唯一事实来源：从历史记录重新生成提交
/// 不得依赖任何当前可变状态。带版本标记，反序列化要么完整
/// 通过要么在schema漂移时快速失败。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReplayPayload {
    pub version: u32,
    pub kind: OperationKind,
    pub project_id: String,
    pub cluster_id: String,
    pub master_ips: Vec<String>,
    pub node_ips: Vec<String>,
    pub configure: serde_json::Value,
    /// 提交响应中的任务链接，尽力保存供UI展示，缺失不算错误
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_url: Option<String>,
}

impl ReplayPayload {
    pub fn new(
        kind: OperationKind,
        project_id: String,
        cluster_id: String,
        master_ips: Vec<String>,
        node_ips: Vec<String>,
        configure: serde_json::Value,
    ) -> Self {
        Self {
            version: REPLAY_VERSION,
            kind,
            project_id,
            cluster_id,
            master_ips,
            node_ips,
            configure,
            task_url: None,
        }
    }

    pub fn to_value(&self) -> OpsResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// 从持久化参数恢复，版本不匹配或结构缺失直接报错
    pub fn from_value(value: &serde_json::Value) -> OpsResult<Self> {
        let payload: ReplayPayload = serde_json::from_value(value.clone())?;
        if payload.version != REPLAY_VERSION {
            return Err(OpsError::Serialization(format!(
                "回放参数版本不匹配: 期望 {REPLAY_VERSION}，实际 {}",
                payload.version
            )));
        }
        Ok(payload)
    }

    /// 提交给工作流引擎的参数体
    pub fn engine_params(&self) -> serde_json::Value {
        serde_json::json!({
            "project_id": self.project_id,
            "cluster_id": self.cluster_id,
            "master_ip_list": self.master_ips,
            "ip_list": self.node_ips,
            "config": self.configure,
        })
    }
}
