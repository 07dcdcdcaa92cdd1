//! # 回收批处理调度器
//!
//! ## 核心意图（Why）
//! - 每个测试结束后都执行一次完整回收代价高昂；在测试之间关闭自动回收可以避免停顿，
//!   再以固定时间窗口强制执行一次完整回收，约束长时间测试运行的峰值内存；
//! - 阈值是性能取舍旋钮而非正确性参数：任何非负值都合法，`0` 表示完全关闭批处理，回收保持原生行为。
//!
//! ## 行为契约（What）
//! - [`DeferredReclamationScheduler::begin`]：阈值大于零时关闭自动回收，可重复调用；
//! - [`DeferredReclamationScheduler::reconsider`]：距上次强制回收已满阈值时，依次
//!   “开启自动回收 → 同步强制一次完整回收 → 再次关闭 → 记录时间”，否则不做任何修改；
//! - 两个操作都不会返回错误；回收实现自身的失败被视为进程级致命错误，由 [`Reclaimer`] 实现决定如何终止。
//!
//! ## 风险提示（Trade-offs）
//! - 调度器是显式值而非隐藏全局，时钟与回收器均可注入，便于用虚拟时钟验证窗口边界；
//! - 默认宿主（见 [`Harness`](crate::lifecycle::Harness)）在进程内只保留一份调度器，以互斥锁保护。

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::clock::Clock;

/// 底层回收能力的抽象。
///
/// # 教案式注释
/// - **意图 (Why)**：Rust 进程本身没有垃圾回收器，但被测系统可能持有需要周期性整理的资源
///   （对象池、arena、嵌入式运行时的堆）；把“开关自动回收”与“强制一次完整回收”抽象为 trait，
///   调度器即可与具体运行时解耦；
/// - **契约 (What)**：
///   - `set_automatic` 必须幂等；
///   - `force_full_cycle` 同步执行并在返回前完成；失败时实现应直接 panic 或终止进程，调度器不做恢复。
pub trait Reclaimer: Send {
    /// 开启或关闭自动（后台）回收。
    fn set_automatic(&mut self, enabled: bool);

    /// 同步执行一次完整回收。
    fn force_full_cycle(&mut self);
}

/// 没有回收器的原生运行时：所有操作均为空。
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopReclaimer;

impl Reclaimer for NoopReclaimer {
    fn set_automatic(&mut self, _enabled: bool) {}

    fn force_full_cycle(&mut self) {}
}

/// 记录每一次调用的回收器，克隆体共享同一份记录。
///
/// # 教案式注释
/// - **意图 (Why)**：测试需要断言“恰好一次强制回收”“回收时自动回收处于开启状态”等细节；
/// - **契约 (What)**：初始状态为“自动回收开启”（与原生运行时一致）；
///   `transitions` 按调用顺序记录 `set_automatic` 的参数，`enabled_during_cycles` 记录每次强制回收时的开关状态。
#[derive(Clone, Debug, Default)]
pub struct RecordingReclaimer {
    log: Arc<Mutex<ReclaimerLog>>,
}

#[derive(Debug)]
struct ReclaimerLog {
    automatic: bool,
    transitions: Vec<bool>,
    enabled_during_cycles: Vec<bool>,
}

impl Default for ReclaimerLog {
    fn default() -> Self {
        Self {
            automatic: true,
            transitions: Vec::new(),
            enabled_during_cycles: Vec::new(),
        }
    }
}

impl RecordingReclaimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已执行的强制回收次数。
    pub fn cycles(&self) -> usize {
        self.log.lock().enabled_during_cycles.len()
    }

    /// 当前自动回收是否开启。
    pub fn automatic_enabled(&self) -> bool {
        self.log.lock().automatic
    }

    /// `set_automatic` 的调用序列。
    pub fn transitions(&self) -> Vec<bool> {
        self.log.lock().transitions.clone()
    }

    /// 每次强制回收发生时自动回收的开关状态。
    pub fn enabled_during_cycles(&self) -> Vec<bool> {
        self.log.lock().enabled_during_cycles.clone()
    }
}

impl Reclaimer for RecordingReclaimer {
    fn set_automatic(&mut self, enabled: bool) {
        let mut log = self.log.lock();
        log.automatic = enabled;
        log.transitions.push(enabled);
    }

    fn force_full_cycle(&mut self) {
        let mut log = self.log.lock();
        let enabled = log.automatic;
        log.enabled_during_cycles.push(enabled);
    }
}

/// 调度器状态快照。
///
/// - **契约 (What)**：`threshold` 在构造后不再变化；阈值大于零时，除强制回收的瞬间外
///   `automatic_enabled` 在 `begin` 之后恒为 `false`。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReclamationState {
    last_forced_at: Instant,
    threshold: Duration,
    automatic_enabled: bool,
}

impl ReclamationState {
    /// 上次强制回收（或调度器创建）的时间点。
    pub fn last_forced_at(&self) -> Instant {
        self.last_forced_at
    }

    /// 批处理阈值，零表示关闭批处理。
    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// 调度器视角下自动回收是否开启。
    pub fn automatic_enabled(&self) -> bool {
        self.automatic_enabled
    }
}

/// `reconsider` 的判定结果，调用方可以忽略。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconsiderOutcome {
    /// 阈值为零，批处理关闭。
    Disabled,
    /// 窗口未满，保持状态不变。
    Deferred { elapsed: Duration },
    /// 已执行一次强制回收并重置窗口。
    Forced { elapsed: Duration },
}

/// 跨测试批处理回收的调度器。
///
/// # 教案式注释
/// - **意图 (Why)**：运行器在每个测试前调用 `begin`、测试后调用 `reconsider`，
///   在“避免每测试停顿”与“约束内存增长”之间取得平衡；
/// - **逻辑 (How)**：窗口起点在构造时取自注入时钟；`reconsider` 用
///   `now - last_forced_at >= threshold` 判定是否强制回收；
/// - **契约 (What)**：所有方法不返回错误；只在测试边界被调用，不要求内部加锁。
pub struct DeferredReclamationScheduler {
    state: ReclamationState,
    clock: Arc<dyn Clock>,
    reclaimer: Box<dyn Reclaimer>,
}

impl std::fmt::Debug for DeferredReclamationScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredReclamationScheduler")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl DeferredReclamationScheduler {
    /// 以阈值、时钟与回收器构造调度器；窗口起点为构造时刻，自动回收视为开启。
    pub fn new(threshold: Duration, clock: Arc<dyn Clock>, reclaimer: Box<dyn Reclaimer>) -> Self {
        let state = ReclamationState {
            last_forced_at: clock.now(),
            threshold,
            automatic_enabled: true,
        };
        Self {
            state,
            clock,
            reclaimer,
        }
    }

    /// 返回状态快照。
    pub fn state(&self) -> ReclamationState {
        self.state
    }

    /// 阈值大于零即处于批处理模式。
    pub fn is_batching(&self) -> bool {
        !self.state.threshold.is_zero()
    }

    /// 测试开始前调用：批处理模式下关闭自动回收。
    pub fn begin(&mut self) {
        if !self.is_batching() {
            return;
        }
        self.reclaimer.set_automatic(false);
        self.state.automatic_enabled = false;
    }

    /// 测试结束后调用：窗口已满时执行一次强制回收并重置窗口。
    ///
    /// # 教案式注释
    /// - **逻辑 (How)**：
    ///   1. 开启自动回收；
    ///   2. 同步强制一次完整回收；
    ///   3. 再次关闭自动回收；
    ///   4. 把 `last_forced_at` 更新为本次判定所用的 `now`。
    /// - **契约 (What)**：窗口未满或批处理关闭时，状态与回收器均不被触碰。
    pub fn reconsider(&mut self) -> ReconsiderOutcome {
        if !self.is_batching() {
            return ReconsiderOutcome::Disabled;
        }

        let now = self.clock.now();
        let elapsed = now.saturating_duration_since(self.state.last_forced_at);
        if elapsed < self.state.threshold {
            debug!(
                elapsed_secs = elapsed.as_secs_f64(),
                threshold_secs = self.state.threshold.as_secs_f64(),
                "reclamation deferred"
            );
            return ReconsiderOutcome::Deferred { elapsed };
        }

        self.reclaimer.set_automatic(true);
        self.state.automatic_enabled = true;
        self.reclaimer.force_full_cycle();
        self.reclaimer.set_automatic(false);
        self.state.automatic_enabled = false;
        self.state.last_forced_at = now;

        info!(
            elapsed_secs = elapsed.as_secs_f64(),
            threshold_secs = self.state.threshold.as_secs_f64(),
            "forced reclamation cycle"
        );
        ReconsiderOutcome::Forced { elapsed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use tracing_test::traced_test;

    fn scheduler(threshold: Duration) -> (DeferredReclamationScheduler, MockClock, RecordingReclaimer) {
        let clock = MockClock::new();
        let reclaimer = RecordingReclaimer::new();
        let scheduler = DeferredReclamationScheduler::new(
            threshold,
            Arc::new(clock.clone()),
            Box::new(reclaimer.clone()),
        );
        (scheduler, clock, reclaimer)
    }

    #[test]
    fn begin_is_idempotent() {
        let (mut scheduler, _clock, reclaimer) = scheduler(Duration::from_secs(1));
        scheduler.begin();
        scheduler.begin();
        assert!(!scheduler.state().automatic_enabled());
        assert!(!reclaimer.automatic_enabled());
        assert_eq!(reclaimer.transitions(), vec![false, false]);
    }

    #[test]
    fn zero_threshold_leaves_reclaimer_untouched() {
        let (mut scheduler, clock, reclaimer) = scheduler(Duration::ZERO);
        scheduler.begin();
        clock.advance(Duration::from_secs(60));
        assert_eq!(scheduler.reconsider(), ReconsiderOutcome::Disabled);
        assert!(reclaimer.transitions().is_empty());
        assert_eq!(reclaimer.cycles(), 0);
        assert!(scheduler.state().automatic_enabled());
    }

    #[test]
    fn forced_cycle_runs_with_automatic_reclamation_enabled() {
        let (mut scheduler, clock, reclaimer) = scheduler(Duration::from_secs(1));
        scheduler.begin();
        clock.advance(Duration::from_secs(1));
        assert!(matches!(scheduler.reconsider(), ReconsiderOutcome::Forced { .. }));
        assert_eq!(reclaimer.enabled_during_cycles(), vec![true]);
        assert_eq!(reclaimer.transitions(), vec![false, true, false]);
        assert_eq!(scheduler.state().last_forced_at(), clock.now());
    }

    #[traced_test]
    #[test]
    fn forced_cycle_is_logged() {
        let (mut scheduler, clock, _reclaimer) = scheduler(Duration::from_millis(500));
        scheduler.begin();
        clock.advance(Duration::from_millis(200));
        scheduler.reconsider();
        assert!(logs_contain("reclamation deferred"));
        clock.advance(Duration::from_millis(300));
        scheduler.reconsider();
        assert!(logs_contain("forced reclamation cycle"));
    }
}
