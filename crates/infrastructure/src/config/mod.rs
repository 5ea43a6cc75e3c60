//! 应用配置模型与加载
//!
//! 配置来源优先级：显式路径 > 默认路径 > 内置默认值，
//! 环境变量（`CLUSTEROPS__` 前缀，`__` 分段）最后覆盖。

use anyhow::{Context, Result};
use ::config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout_seconds: u64,
}

/// 协作方HTTP端点
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub base_url: String,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    pub interval_seconds: u64,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub reinstall_count: u32,
    pub reinstall_window_seconds: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    /// 集群/节点资源注册中心
    pub registry: EndpointConfig,
    /// 后台工作流引擎
    pub engine: EndpointConfig,
    /// Agent凭证服务
    pub agent: EndpointConfig,
    /// 权限子系统
    pub auth: EndpointConfig,
    /// 工作负载查询
    pub workload: EndpointConfig,
    pub poller: PollerConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://clusterops.db".to_string(),
                max_connections: 10,
                connection_timeout_seconds: 30,
            },
            registry: EndpointConfig {
                base_url: "http://localhost:8081".to_string(),
                request_timeout_seconds: 30,
            },
            engine: EndpointConfig {
                base_url: "http://localhost:8082".to_string(),
                request_timeout_seconds: 30,
            },
            agent: EndpointConfig {
                base_url: "http://localhost:8085".to_string(),
                request_timeout_seconds: 10,
            },
            auth: EndpointConfig {
                base_url: "http://localhost:8083".to_string(),
                request_timeout_seconds: 10,
            },
            workload: EndpointConfig {
                base_url: "http://localhost:8084".to_string(),
                request_timeout_seconds: 10,
            },
            poller: PollerConfig {
                interval_seconds: 5,
                max_attempts: 360,
            },
            rate_limit: RateLimitConfig {
                reinstall_count: 1,
                reinstall_window_seconds: 15,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                json: false,
            },
        }
    }
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = [
                "config/clusterops.toml",
                "clusterops.toml",
                "/etc/clusterops/config.toml",
            ];
            for path in &default_paths {
                if Path::new(path).exists() {
                    builder = builder.add_source(File::new(path, FileFormat::Toml));
                    break;
                }
            }
        }

        let defaults = AppConfig::default();
        builder = builder
            .set_default("database.url", defaults.database.url)?
            .set_default("database.max_connections", defaults.database.max_connections)?
            .set_default(
                "database.connection_timeout_seconds",
                defaults.database.connection_timeout_seconds,
            )?
            .set_default("registry.base_url", defaults.registry.base_url)?
            .set_default(
                "registry.request_timeout_seconds",
                defaults.registry.request_timeout_seconds,
            )?
            .set_default("engine.base_url", defaults.engine.base_url)?
            .set_default(
                "engine.request_timeout_seconds",
                defaults.engine.request_timeout_seconds,
            )?
            .set_default("agent.base_url", defaults.agent.base_url)?
            .set_default(
                "agent.request_timeout_seconds",
                defaults.agent.request_timeout_seconds,
            )?
            .set_default("auth.base_url", defaults.auth.base_url)?
            .set_default(
                "auth.request_timeout_seconds",
                defaults.auth.request_timeout_seconds,
            )?
            .set_default("workload.base_url", defaults.workload.base_url)?
            .set_default(
                "workload.request_timeout_seconds",
                defaults.workload.request_timeout_seconds,
            )?
            .set_default("poller.interval_seconds", defaults.poller.interval_seconds)?
            .set_default("poller.max_attempts", defaults.poller.max_attempts)?
            .set_default(
                "rate_limit.reinstall_count",
                defaults.rate_limit.reinstall_count,
            )?
            .set_default(
                "rate_limit.reinstall_window_seconds",
                defaults.rate_limit.reinstall_window_seconds,
            )?
            .set_default("logging.level", defaults.logging.level)?
            .set_default("logging.json", defaults.logging.json)?;

        let config = builder
            .add_source(
                Environment::with_prefix("CLUSTEROPS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("构建配置失败")?;

        let app_config: AppConfig = config.try_deserialize().context("解析配置失败")?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.url.is_empty() {
            return Err(anyhow::anyhow!("数据库URL不能为空"));
        }
        if self.database.max_connections == 0 {
            return Err(anyhow::anyhow!("数据库最大连接数必须大于0"));
        }
        for (name, endpoint) in [
            ("registry", &self.registry),
            ("engine", &self.engine),
            ("agent", &self.agent),
            ("auth", &self.auth),
            ("workload", &self.workload),
        ] {
            if endpoint.base_url.is_empty() {
                return Err(anyhow::anyhow!("{name} 端点地址不能为空"));
            }
        }
        if self.poller.max_attempts == 0 {
            return Err(anyhow::anyhow!("轮询次数上限必须大于0"));
        }
        if self.rate_limit.reinstall_window_seconds <= 0 {
            return Err(anyhow::anyhow!("限流窗口必须为正数"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = AppConfig::load(None).unwrap();
        assert_eq!(config.poller.max_attempts, 360);
        assert_eq!(config.rate_limit.reinstall_count, 1);
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        assert!(AppConfig::load(Some("/nonexistent/clusterops.toml")).is_err());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[poller]\ninterval_seconds = 2\nmax_attempts = 30\n\n[logging]\nlevel = \"debug\"\njson = true"
        )
        .unwrap();
        let config = AppConfig::load(Some(file.path().to_str().unwrap())).unwrap();
        assert_eq!(config.poller.interval_seconds, 2);
        assert_eq!(config.poller.max_attempts, 30);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
        // 未覆盖的段落保留默认值
        assert_eq!(config.rate_limit.reinstall_window_seconds, 15);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.poller.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.rate_limit.reinstall_window_seconds = 0;
        assert!(config.validate().is_err());
    }
}
