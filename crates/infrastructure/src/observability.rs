//! 日志初始化
//!
//! env-filter 优先读取 RUST_LOG，未设置时回落到配置文件的级别。

use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// 初始化全局日志订阅器，`json` 控制输出格式（生产环境建议开启）
pub fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| anyhow::anyhow!("日志初始化失败: {e}"))
}
