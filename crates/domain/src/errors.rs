use thiserror::Error;

/// 面向用户的固定提示，派发失败时不向调用方透出协作方原始错误
pub const GENERIC_DISPATCH_FAILURE: &str = "任务下发失败，请联系管理员";
/// 轮询超时诊断信息，与引擎上报的失败可区分
pub const POLL_TIMEOUT_DIAGNOSTIC: &str = "任务轮询超时，请检查后台任务状态";

#[derive(Error, Debug, Clone)]
pub enum OpsError {
    #[error("参数校验失败: {0}")]
    Validation(String),
    #[error("协作方调用失败: {0}")]
    Collaborator(String),
    #[error("配置生成失败: {0}")]
    ConfigAssembly(String),
    #[error("操作超时: {0}")]
    Timeout(String),
    #[error("集群不存在: id={id}")]
    ClusterNotFound { id: String },
    #[error("节点不存在: ip={ip}")]
    NodeNotFound { ip: String },
    #[error("任务记录不存在: id={id}")]
    TaskLogNotFound { id: i64 },
    #[error("任务状态转换无效: {0}")]
    InvalidTransition(String),
    #[error("数据库操作失败: {0}")]
    Database(String),
    #[error("数据序列化错误: {0}")]
    Serialization(String),
    #[error("系统内部错误: {0}")]
    Internal(String),
}

pub type OpsResult<T> = Result<T, OpsError>;

impl OpsError {
    pub fn validation_error<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }
    pub fn collaborator_error<S: Into<String>>(msg: S) -> Self {
        Self::Collaborator(msg.into())
    }
    pub fn assembly_error<S: Into<String>>(msg: S) -> Self {
        Self::ConfigAssembly(msg.into())
    }
    pub fn cluster_not_found<S: Into<String>>(id: S) -> Self {
        Self::ClusterNotFound { id: id.into() }
    }
    pub fn task_log_not_found(id: i64) -> Self {
        Self::TaskLogNotFound { id }
    }
    /// 校验类错误保留具体信息，其余一律替换为通用提示
    pub fn user_message(&self) -> &str {
        match self {
            OpsError::Validation(msg) => msg,
            OpsError::ClusterNotFound { .. } => "请求的集群不存在",
            OpsError::NodeNotFound { .. } => "请求的节点不存在",
            OpsError::TaskLogNotFound { .. } => "请求的任务记录不存在",
            OpsError::Timeout(_) => "操作超时，请稍后重试",
            _ => "系统繁忙，请稍后重试",
        }
    }
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OpsError::Collaborator(_) | OpsError::Database(_) | OpsError::Timeout(_)
        )
    }
}

impl From<sqlx::Error> for OpsError {
    fn from(err: sqlx::Error) -> Self {
        OpsError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for OpsError {
    fn from(err: serde_json::Error) -> Self {
        OpsError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for OpsError {
    fn from(err: anyhow::Error) -> Self {
        OpsError::Internal(err.to_string())
    }
}
