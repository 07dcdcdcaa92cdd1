//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 集中定义测试底座对外暴露的错误语义：夹具合成失败、断言失败、配置解析失败与日志安装失败；
//! - 区分“致命”与“预期”两类失败：[`FixtureError`] 代表测试无法继续的前置条件缺失，
//!   [`AssertionFailure`] 则是测试主体有意触发、可被捕获检查的唯一失败种类。
//!
//! ## 设计要求（What）
//! - 所有错误类型派生 `thiserror::Error`，与 `std::error::Error` 生态兼容；
//! - 错误文本使用英文并携带定位上下文（夹具名、记录种类），便于在测试日志中检索。

use thiserror::Error;

/// 夹具查找与授权夹具合成过程中的错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：授权夹具是被测代码的前置条件，任何持久化失败都意味着测试无法继续，
///   因此以独立枚举承载，并通过 `?` 一路传播到测试主体，由调用方 `expect` 成致命错误。
/// - **契约 (What)**：
///   - 所有变体均为 `Clone + Send + Sync + 'static`，可在断言中直接比较；
///   - `record` 字段使用静态字符串描述记录种类（`"permission"`、`"role"` 等）。
/// - **权衡 (Trade-offs)**：上下文以 `String` 保存，牺牲少量分配换取可读性。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum FixtureError {
    /// 夹具仓库中不存在指定名称的记录。
    #[error("fixture `{name}` is not defined")]
    UnknownFixture { name: String },

    /// 当前身份没有写入授权记录的权限。
    ///
    /// - **意图 (Why)**：授权记录只能由管理员身份写入，合成器必须在管理员覆盖作用域内工作；
    /// - **契约 (What)**：`actor` 为当时的登录名，无身份时为 `"anonymous"`。
    #[error("`{actor}` is not permitted to write {record} records")]
    Unauthorized { actor: String, record: &'static str },

    /// 唯一键冲突：同名记录已以不同标识存在。
    #[error("{record} named `{name}` already exists with a different id")]
    DuplicateName { record: &'static str, name: String },

    /// 引用的记录不存在。
    #[error("{record} `{key}` does not exist")]
    Missing { record: &'static str, key: String },
}

/// 校验类断言失败，携带完整的人类可读诊断文本。
///
/// # 教案式说明
/// - **意图 (Why)**：校验失败是测试误报的常见来源，把全部错误信息嵌入失败文本，
///   可以在不重跑调试器的情况下直接定位原因；
/// - **逻辑 (How)**：`check_*` 系列函数返回 `Result<(), AssertionFailure>` 供调用方捕获检查，
///   `assert_*` 系列在失败时调用 [`AssertionFailure::raise`] 以 panic 形式报告；
/// - **契约 (What)**：`Display` 输出即为诊断文本本身，不附加前缀。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{message}")]
pub struct AssertionFailure {
    message: String,
}

impl AssertionFailure {
    /// 以诊断文本构造断言失败。
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// 返回诊断文本。
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 以 panic 形式报告失败，payload 为诊断文本 `String`。
    #[track_caller]
    pub fn raise(self) -> ! {
        panic!("{}", self.message)
    }
}

/// 配置解析错误。
#[derive(Debug, Error)]
pub enum ConfigError {
    /// TOML 文本无法解析为 [`HarnessConfig`](crate::config::HarnessConfig)。
    #[error("invalid harness configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// `TESTBED_CONFIG` 指向的文件无法读取。
    #[error("failed to read harness configuration from {}: {source}", path.display())]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 回收阈值不是有限数。
    #[error("defer_reclaim_secs must be a finite number, got {0}")]
    NonFiniteThreshold(f64),
}

/// 日志安装错误。
///
/// - **契约 (What)**：重复安装或外部已设置全局 Subscriber 时返回，调用方通常可以忽略。
#[derive(Debug, Error)]
pub enum LoggingError {
    /// 进程内已存在全局 `tracing` Subscriber。
    #[error("a global tracing subscriber is already installed")]
    SubscriberAlreadySet,

    /// `tracing-subscriber` 安装失败的底层错误。
    #[error("failed to install tracing subscriber: {0}")]
    Install(#[from] tracing_subscriber::util::TryInitError),
}
