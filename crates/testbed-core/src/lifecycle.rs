//! # 测试生命周期宿主
//!
//! ## 核心意图（Why）
//! - 运行器在每个测试前后需要执行一组固定钩子：开始回收延迟、清空设置缓存、检查插件跳过指令；
//!   结束后重新评估回收窗口、清除当前身份、再次清空设置缓存；
//! - [`Harness`] 把这些钩子与它们依赖的状态（调度器、设置、跳过指令）聚合在一起，
//!   `#[harness_test]` 属性宏通过 [`Harness::global`] 使用进程级默认实例。
//!
//! ## 行为契约（What）
//! - `run_test`：先执行 setup；命中跳过指令时不运行主体，执行 teardown 后返回
//!   [`TestOutcome::Skipped`]；否则运行主体，无论主体是否 panic 都执行 teardown，
//!   随后把原始 panic 原样继续抛出；
//! - 测试运行期间 [`current_test`] 返回其限定名，供跳过指令等协作方查询。
//!
//! ## 风险提示（Trade-offs）
//! - 默认实例的调度器在进程内共享并以互斥锁保护，只在测试边界短暂持有；
//!   当前身份、当前租户、开关覆盖值与设置缓存都是线程局部的，与 libtest 每测试一线程的模型一致，
//!   因此 setup/teardown 清空缓存只影响本线程上的测试。

use std::cell::RefCell;
use std::fmt;
use std::panic;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::HarnessConfig;
use crate::logging::init_logging;
use crate::overrides::clear_current_identity;
use crate::reclamation::{
    DeferredReclamationScheduler, NoopReclaimer, ReclamationState, Reclaimer, ReconsiderOutcome,
};
use crate::settings::Settings;
use crate::skip::{SKIP_REASON, SkipDirectiveRegistry, StaticSkipDirectives, should_skip};

static GLOBAL: OnceLock<Harness> = OnceLock::new();

thread_local! {
    static CURRENT_TEST: RefCell<Option<TestName>> = const { RefCell::new(None) };
}

/// 测试的限定名：测试类（或模块）名加测试名。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestName {
    class: String,
    name: String,
}

impl TestName {
    pub fn new(class: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            name: name.into(),
        }
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for TestName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.class, self.name)
    }
}

/// 当前线程上正在运行的测试。
pub fn current_test() -> Option<TestName> {
    CURRENT_TEST.with(|current| current.borrow().clone())
}

struct CurrentTestGuard {
    previous: Option<TestName>,
}

impl CurrentTestGuard {
    fn enter(test: TestName) -> Self {
        let previous = CURRENT_TEST.with(|current| current.replace(Some(test)));
        Self { previous }
    }
}

impl Drop for CurrentTestGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT_TEST.with(|current| *current.borrow_mut() = previous);
    }
}

/// 单个测试的运行结果；失败以 panic 形式继续传播，不出现在这里。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TestOutcome {
    Passed,
    Skipped { reason: String },
}

/// 生命周期钩子及其状态的聚合。
///
/// # 教案式注释
/// - **意图 (Why)**：把分散的 setup/teardown 钩子收敛到一个可注入的值，
///   既能作为进程级默认实例被属性宏使用，也能在单元测试中以虚拟时钟独立构造；
/// - **契约 (What)**：`Harness` 为 `Send + Sync`，可以放入 `static`。
pub struct Harness {
    config: HarnessConfig,
    scheduler: Mutex<DeferredReclamationScheduler>,
    settings: Settings,
    skips: Box<dyn SkipDirectiveRegistry>,
}

impl fmt::Debug for Harness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Harness")
            .field("config", &self.config)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// [`Harness`] 构建器；未指定的协作方取缺省实现。
pub struct HarnessBuilder {
    config: HarnessConfig,
    clock: Arc<dyn Clock>,
    reclaimer: Box<dyn Reclaimer>,
    settings: Settings,
    skips: Box<dyn SkipDirectiveRegistry>,
}

impl HarnessBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn reclaimer(mut self, reclaimer: impl Reclaimer + 'static) -> Self {
        self.reclaimer = Box::new(reclaimer);
        self
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn skip_directives(mut self, skips: impl SkipDirectiveRegistry + 'static) -> Self {
        self.skips = Box::new(skips);
        self
    }

    pub fn build(self) -> Harness {
        let scheduler = DeferredReclamationScheduler::new(
            self.config.reclaim_threshold(),
            self.clock,
            self.reclaimer,
        );
        Harness {
            config: self.config,
            scheduler: Mutex::new(scheduler),
            settings: self.settings,
            skips: self.skips,
        }
    }
}

impl Harness {
    pub fn builder(config: HarnessConfig) -> HarnessBuilder {
        HarnessBuilder {
            config,
            clock: Arc::new(SystemClock),
            reclaimer: Box::new(NoopReclaimer),
            settings: Settings::new(),
            skips: Box::new(StaticSkipDirectives::new()),
        }
    }

    /// 进程级默认实例：首次访问时读取配置（可选文件叠加环境变量）并安装日志。
    ///
    /// - **契约 (What)**：配置文件无法读取或解析时退回纯环境变量配置，并以告警记录原因。
    pub fn global() -> &'static Harness {
        GLOBAL.get_or_init(|| {
            let (config, load_error) = match HarnessConfig::load() {
                Ok(config) => (config, None),
                Err(err) => (HarnessConfig::from_env(), Some(err)),
            };
            init_logging(&config);
            if let Some(err) = load_error {
                warn!(error = %err, "harness configuration file ignored");
            }
            Harness::builder(config).build()
        })
    }

    /// 在首次使用前注入自定义的默认实例；已初始化时原样退回参数。
    pub fn install_global(harness: Harness) -> Result<&'static Harness, Harness> {
        GLOBAL.set(harness)?;
        Ok(Self::global())
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// 调度器状态快照。
    pub fn reclamation_state(&self) -> ReclamationState {
        self.scheduler.lock().state()
    }

    /// 测试前钩子；命中跳过指令时返回跳过原因。
    pub fn setup(&self, test: &TestName) -> Option<String> {
        self.scheduler.lock().begin();
        self.settings.reset_cache();
        if should_skip(self.skips.as_ref(), test.class(), test.name()) {
            return Some(SKIP_REASON.to_string());
        }
        None
    }

    /// 测试后钩子。
    pub fn teardown(&self) -> ReconsiderOutcome {
        let outcome = self.scheduler.lock().reconsider();
        clear_current_identity();
        self.settings.reset_cache();
        outcome
    }

    /// 在完整生命周期内运行一个测试主体。
    pub fn run_test(&self, class: &str, name: &str, body: impl FnOnce()) -> TestOutcome {
        let test = TestName::new(class, name);
        let _current = CurrentTestGuard::enter(test.clone());

        if let Some(reason) = self.setup(&test) {
            info!(test = %test, reason = %reason, "test skipped");
            self.teardown();
            return TestOutcome::Skipped { reason };
        }

        let result = panic::catch_unwind(panic::AssertUnwindSafe(body));
        let reclamation = self.teardown();
        debug!(test = %test, passed = result.is_ok(), ?reclamation, "test finished");

        match result {
            Ok(()) => TestOutcome::Passed,
            Err(payload) => panic::resume_unwind(payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::model::Identity;
    use crate::overrides::{current_identity, set_current_identity};
    use crate::reclamation::RecordingReclaimer;
    use std::cell::Cell;
    use std::time::Duration;

    fn harness(skips: StaticSkipDirectives) -> (Harness, MockClock, RecordingReclaimer) {
        let clock = MockClock::new();
        let reclaimer = RecordingReclaimer::new();
        let config = HarnessConfig {
            defer_reclaim_secs: 2.0,
            ..HarnessConfig::default()
        };
        let harness = Harness::builder(config)
            .clock(Arc::new(clock.clone()))
            .reclaimer(reclaimer.clone())
            .skip_directives(skips)
            .build();
        (harness, clock, reclaimer)
    }

    #[test]
    fn teardown_clears_identity_and_cache_even_after_panic() {
        let (harness, _clock, _reclaimer) = harness(StaticSkipDirectives::new());
        let result = panic::catch_unwind(panic::AssertUnwindSafe(|| {
            harness.run_test("HostTest", "test_panics", || {
                set_current_identity(Some(Identity::new(2, "one")));
                harness.settings().cache("base_url", "https://example.test");
                panic!("body failed");
            })
        }));

        let payload = result.expect_err("panic should propagate");
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"body failed"));
        assert_eq!(current_identity(), None);
        assert_eq!(harness.settings().cache_len(), 0);
        assert_eq!(current_test(), None);
    }

    #[test]
    fn skipped_test_never_runs_body() {
        let skips = StaticSkipDirectives::new().skip("HostTest", "can be destroyed");
        let (harness, _clock, reclaimer) = harness(skips);
        let ran = Cell::new(false);

        let outcome = harness.run_test("HostTest", "test_0001_can be destroyed", || ran.set(true));

        assert_eq!(
            outcome,
            TestOutcome::Skipped {
                reason: SKIP_REASON.to_string()
            }
        );
        assert!(!ran.get());
        assert!(!reclaimer.automatic_enabled());
    }

    #[test]
    fn current_test_is_visible_inside_body() {
        let (harness, _clock, _reclaimer) = harness(StaticSkipDirectives::new());
        let outcome = harness.run_test("SubnetTest", "test_ranges", || {
            let test = current_test().expect("running test");
            assert_eq!(test.to_string(), "SubnetTest#test_ranges");
        });
        assert_eq!(outcome, TestOutcome::Passed);
        assert_eq!(current_test(), None);
    }

    #[test]
    fn run_test_batches_reclamation_across_tests() {
        let (harness, clock, reclaimer) = harness(StaticSkipDirectives::new());

        harness.run_test("BatchTest", "a", || clock.advance(Duration::from_millis(300)));
        harness.run_test("BatchTest", "b", || clock.advance(Duration::from_millis(200)));
        assert_eq!(reclaimer.cycles(), 0);

        harness.run_test("BatchTest", "c", || clock.advance(Duration::from_millis(1_600)));
        assert_eq!(reclaimer.cycles(), 1);
        assert_eq!(harness.reclamation_state().last_forced_at(), clock.now());
        assert!(!harness.reclamation_state().automatic_enabled());
    }
}
