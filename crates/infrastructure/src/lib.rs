//! 基础设施层：配置加载、日志初始化、SQLite任务记录仓储与
//! 五个协作方的HTTP客户端实现。

pub mod clients;
pub mod config;
pub mod database;
pub mod observability;

pub use clients::{
    HttpAgentRegistry, HttpAuthRegistry, HttpClusterRegistry, HttpWorkflowEngine,
    HttpWorkloadQuery,
};
pub use crate::config::AppConfig;
pub use database::sqlite::SqliteTaskLogRepository;
pub use observability::init_logging;
