//! # 日志安装
//!
//! 以 `tracing-subscriber` 组装 `EnvFilter + fmt` 层并设置为全局 Subscriber。
//! 输出走 libtest 的捕获通道（`with_test_writer`），失败测试的日志会随失败信息一起打印。

use tracing::dispatcher;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{HarnessConfig, LOG_FILTER_ENV};
use crate::error::LoggingError;

/// 构造过滤器：优先读取 `TESTBED_LOG`，解析失败时回退到配置中的指令。
pub fn build_env_filter(config: &HarnessConfig) -> EnvFilter {
    EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new(&config.log_filter))
}

/// 安装全局日志 Subscriber。
///
/// # 教案式说明
/// - **契约 (What)**：外部已设置全局 Subscriber 时返回 [`LoggingError::SubscriberAlreadySet`]，
///   不会覆盖；成功后本进程内的 `tracing` 事件按过滤器输出。
pub fn try_init_logging(config: &HarnessConfig) -> Result<(), LoggingError> {
    if dispatcher::has_been_set() {
        return Err(LoggingError::SubscriberAlreadySet);
    }
    tracing_subscriber::registry()
        .with(build_env_filter(config))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init()?;
    Ok(())
}

/// 尽力安装日志；已安装时静默返回。
pub fn init_logging(config: &HarnessConfig) {
    let _ = try_init_logging(config);
}
