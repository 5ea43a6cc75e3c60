//! 持久化层

pub mod sqlite;

use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use clusterops_domain::OpsResult;

use crate::config::DatabaseConfig;

/// 按配置创建SQLite连接池
pub async fn create_pool(config: &DatabaseConfig) -> OpsResult<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
        .connect(&config.url)
        .await?;
    Ok(pool)
}
