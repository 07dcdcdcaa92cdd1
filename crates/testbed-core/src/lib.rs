//! testbed 测试运行期底座。
//!
//! # 教案式综述（Why / How / What）
//! - **为什么存在**：应用的测试套件依赖一组横切的运行期行为：跨测试批量执行内存回收、
//!   在作用域内临时替换当前身份/租户/设置开关/环境变量、幂等地合成授权夹具，以及对
//!   模型校验结果的断言。本 crate 把这些行为收敛为可注入、可单测的 Rust 组件。
//! - **如何集成**：在测试函数上标注 `#[harness_test]`（或直接调用 [`Harness::run_test`]），
//!   生命周期钩子即会包裹测试主体；测试主体内部按需调用 `overrides`、`authorization`、
//!   `validation` 中的辅助函数。
//! - **测试对象**：所有外部协作方（时钟、回收器、环境变量、设置存储、夹具仓库、授权存储）
//!   均以 trait 抽象，默认实现之外另提供内存/录制版本，便于确定性断言。
//!
//! # 契约说明（What）
//! - 覆盖类操作无论主体正常返回、提前返回还是 panic，都会恢复进入前的值，且按后进先出顺序恢复；
//! - 回收调度器在连续测试之间保持状态，只有距上次强制回收超过阈值时才触发新的完整回收；
//! - 授权夹具以“查找或创建”的方式写入，重复调用不产生重复记录。
//!
//! # 风险提示（Trade-offs）
//! - 当前身份、当前租户与设置开关覆盖为线程局部状态；跨线程的测试需要在目标线程上重新建立覆盖。
//! - 进程环境变量的覆盖修改的是全进程共享状态，并行测试应使用互不相同的变量名或
//!   改用 [`env::MemoryEnvironment`]。
//!
//! # 模块结构
//! - `config`、`logging`、`error`：配置读取、日志安装与错误类型；
//! - `clock`、`reclamation`：可注入时钟与延迟回收调度器；
//! - `overrides`、`env`、`settings`、`fixtures`：作用域覆盖栈及其协作方；
//! - `authorization`、`model`：授权夹具合成与领域记录；
//! - `validation`、`assertions`：校验断言与断言词汇适配；
//! - `lifecycle`、`skip`、`session`：测试生命周期钩子、跳过指令与会话辅助。

pub mod assertions;
pub mod authorization;
pub mod clock;
pub mod config;
pub mod env;
pub mod error;
pub mod fixtures;
pub mod lifecycle;
pub mod logging;
pub mod model;
pub mod overrides;
pub mod reclamation;
pub mod session;
pub mod settings;
pub mod skip;
pub mod validation;

pub use authorization::{AuthorizationFixtureSynthesizer, AuthorizationStore, InMemoryAuthorizationStore};
pub use config::HarnessConfig;
pub use error::{AssertionFailure, ConfigError, FixtureError, LoggingError};
pub use lifecycle::{Harness, HarnessBuilder, TestName, TestOutcome, current_test};
pub use overrides::{
    as_admin, as_identity, as_user, current_identity, current_tenant, disable_tenancy, in_tenant,
    in_tenant_named, with_env, with_flags_disabled,
};
pub use reclamation::{DeferredReclamationScheduler, Reclaimer};
pub use testbed_macros::harness_test;
pub use validation::{assert_not_valid, assert_valid, refute_valid};
