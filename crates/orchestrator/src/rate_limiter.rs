//! 固定窗口限流
//!
//! 按资源ID限制外部触发的重装操作，防止短时间内重复下发。
//! 后端存储出错时按拒绝处理（fail-closed）：该类操作具有破坏性
//! 且易重复触发，放行比误拒的代价高得多。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::warn;

use clusterops_domain::OpsResult;

/// 限流规则：窗口内允许的触发次数
#[derive(Debug, Clone, Copy)]
pub struct RateLimitRule {
    pub count: u32,
    pub window_seconds: i64,
}

impl Default for RateLimitRule {
    fn default() -> Self {
        // 重装入口默认 1次/15秒
        Self {
            count: 1,
            window_seconds: 15,
        }
    }
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// 返回 true 表示放行；Err 由调用方按拒绝处理
    async fn acquire(&self, key: &str, rule: RateLimitRule) -> OpsResult<bool>;
}

struct Window {
    started_at: DateTime<Utc>,
    count: u32,
}

/// 进程内固定窗口限流器，计数非持久化、窗口过期即失效
pub struct InMemoryRateLimiter {
    windows: Mutex<HashMap<String, Window>>,
}

impl InMemoryRateLimiter {
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn acquire(&self, key: &str, rule: RateLimitRule) -> OpsResult<bool> {
        let now = Utc::now();
        let mut windows = self.windows.lock().await;
        match windows.get_mut(key) {
            Some(window)
                if now - window.started_at < Duration::seconds(rule.window_seconds) =>
            {
                if window.count >= rule.count {
                    warn!("资源 {} 在限流窗口内重复触发，已拒绝", key);
                    return Ok(false);
                }
                window.count += 1;
                Ok(true)
            }
            _ => {
                windows.insert(
                    key.to_string(),
                    Window {
                        started_at: now,
                        count: 1,
                    },
                );
                Ok(true)
            }
        }
    }
}
