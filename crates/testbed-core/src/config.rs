//! # 配置模块
//!
//! ## 设计目的（Why）
//! - 测试进程启动时一次性读取回收批处理阈值、登录开关与日志过滤指令，之后在整个进程生命周期内保持不变；
//! - 同时支持环境变量（CI 常用）与 TOML 文本（本地调试可提交到仓库）两种来源。
//!
//! ## 契约定义（What）
//! - `TESTBED_DEFER_RECLAIM`：浮点秒数；缺省或无法解析为数字时取 `1.0`，`<= 0` 表示关闭批处理；
//! - `TESTBED_LOGIN`：`0`/`false`/`off`/`no` 关闭登录，其余值或缺省视为开启；
//! - `TESTBED_LOG`：`tracing` 的 `EnvFilter` 指令，缺省为 `info`；
//! - `TESTBED_CONFIG`：可选的 TOML 文件路径。文件先于环境变量生效，上面三个变量出现时覆盖文件中的对应字段。

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// 回收批处理阈值的环境变量名。
pub const DEFER_RECLAIM_ENV: &str = "TESTBED_DEFER_RECLAIM";
/// 登录开关的环境变量名。
pub const LOGIN_ENV: &str = "TESTBED_LOGIN";
/// 日志过滤指令的环境变量名。
pub const LOG_FILTER_ENV: &str = "TESTBED_LOG";
/// TOML 配置文件路径的环境变量名。
pub const CONFIG_PATH_ENV: &str = "TESTBED_CONFIG";
/// 阈值缺省值（秒）。
pub const DEFAULT_DEFER_RECLAIM_SECS: f64 = 1.0;
/// 日志过滤缺省值。
pub const DEFAULT_LOG_FILTER: &str = "info";

/// 测试底座的进程级配置。
///
/// # 教案式说明
/// - **意图 (Why)**：把散落的环境读取集中到一个值对象，调度器与会话辅助函数都从这里取参数，
///   测试则可以直接构造任意配置而不触碰进程环境；
/// - **契约 (What)**：
///   - `defer_reclaim_secs` 可以为任意有限数，非正数表示关闭批处理；
///   - 通过 TOML 解析时缺失字段取缺省值（`#[serde(default)]`）；
/// - **权衡 (Trade-offs)**：阈值保留为 `f64` 而非 `Duration`，以便原样表达“负数即关闭”的输入语义。
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub defer_reclaim_secs: f64,
    pub login_enabled: bool,
    pub log_filter: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            defer_reclaim_secs: DEFAULT_DEFER_RECLAIM_SECS,
            login_enabled: true,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl HarnessConfig {
    /// 从进程环境读取配置。
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 通过任意查找函数读取配置，便于测试注入假环境。
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self::default().overridden_by(&lookup)
    }

    /// 读取 `TESTBED_CONFIG` 指向的文件（若设置），再叠加环境变量。
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|name| std::env::var(name).ok(), |path| std::fs::read_to_string(path))
    }

    /// [`load`](Self::load) 的可注入形式：`lookup` 代替进程环境，`read` 代替文件系统。
    ///
    /// - **契约 (What)**：未设置 `TESTBED_CONFIG` 时等同于 [`from_lookup`](Self::from_lookup)；
    ///   文件读取或解析失败时返回 [`ConfigError`]，不回退。
    pub fn load_with(
        lookup: impl Fn(&str) -> Option<String>,
        read: impl FnOnce(&Path) -> io::Result<String>,
    ) -> Result<Self, ConfigError> {
        let base = match lookup(CONFIG_PATH_ENV) {
            Some(path) => {
                let path = PathBuf::from(path);
                let source = read(&path).map_err(|source| ConfigError::Read { path, source })?;
                Self::from_toml_str(&source)?
            }
            None => Self::default(),
        };
        Ok(base.overridden_by(&lookup))
    }

    fn overridden_by(mut self, lookup: &impl Fn(&str) -> Option<String>) -> Self {
        if let Some(raw) = lookup(DEFER_RECLAIM_ENV) {
            self.defer_reclaim_secs = parse_threshold_secs(Some(&raw));
        }
        if let Some(raw) = lookup(LOGIN_ENV) {
            self.login_enabled = parse_switch(&raw);
        }
        if let Some(filter) = lookup(LOG_FILTER_ENV) {
            self.log_filter = filter;
        }
        self
    }

    /// 解析 TOML 文本。
    ///
    /// - **契约 (What)**：未知字段被忽略；`defer_reclaim_secs` 为 `nan`/`inf` 时返回
    ///   [`ConfigError::NonFiniteThreshold`]。
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        if !config.defer_reclaim_secs.is_finite() {
            return Err(ConfigError::NonFiniteThreshold(config.defer_reclaim_secs));
        }
        Ok(config)
    }

    /// 返回回收批处理阈值；非正数折算为零，即关闭批处理。
    pub fn reclaim_threshold(&self) -> Duration {
        threshold_from_secs(self.defer_reclaim_secs)
    }
}

/// 解析阈值原始文本：缺省、非数字或 `NaN` 时回退到 [`DEFAULT_DEFER_RECLAIM_SECS`]。
pub fn parse_threshold_secs(raw: Option<&str>) -> f64 {
    raw.and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|secs| !secs.is_nan())
        .unwrap_or(DEFAULT_DEFER_RECLAIM_SECS)
}

/// 把秒数换算为阈值时长；非正数为零，正无穷为 `Duration::MAX`。
pub fn threshold_from_secs(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

fn parse_switch(raw: &str) -> bool {
    !matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "off" | "no"
    )
}
