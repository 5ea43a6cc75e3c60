//! 集群/节点生命周期编排核心
//!
//! 组件按控制流排列：LifecycleController -> RateLimiter ->
//! ConfigAssembler -> TaskDispatcher(+TaskLog) -> TaskPoller ->
//! 资源状态收敛。

pub mod config_assembler;
pub mod controller;
pub mod dispatcher;
pub mod host_namer;
pub mod poller;
pub mod rate_limiter;

pub use config_assembler::{AssemblerContext, ConfigAssembler};
pub use controller::{
    CreateClusterCommand, CreateNodeCommand, DeleteClusterCommand, DeleteNodeCommand,
    LifecycleController, OperationStatus, ReinstallClusterCommand,
};
pub use dispatcher::{DispatchFallback, DispatchOutcome, TaskDispatcher};
pub use host_namer::{name_hosts, node_name};
pub use poller::{PollerConfig, TaskPoller};
pub use rate_limiter::{InMemoryRateLimiter, RateLimitRule, RateLimiter};
