// 教案级说明：
//
// - **意图 (Why)**：回收批处理策略依赖“距上次强制回收过了多久”，若直接读取系统时间，
//   测试只能靠真实睡眠验证窗口逻辑；因此抽象出可注入的 [`Clock`]，并提供系统 / 虚拟两种实现。
// - **契约 (What)**：`SystemClock` 读取真实单调时间；`MockClock` 提供完全确定性的虚拟时间轴，
//   只在显式调用 `advance` 时前进。
// - **实现提示 (How)**：`MockClock` 以 `Arc<Mutex<ClockState>>` 聚合状态，克隆体共享同一时间轴，
//   测试可以把一份交给调度器、另一份留在手中推进。

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// 抽象可注入的时钟，提供统一的“获取当前时间”能力。
///
/// # 教案式注释
/// - **意图 (Why)**：通过 trait 限定统一契约，便于在测试中替换为虚拟时钟；
/// - **契约 (What)**：`now` 返回单调时间点，连续调用不得倒退。
pub trait Clock: Send + Sync + 'static {
    /// 返回当前的单调时间点。
    fn now(&self) -> Instant;
}

/// 读取进程单调时钟的生产实现。
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// `MockClock` 提供基于手动推进的虚拟时钟，服务于单元与契约测试的确定性需求。
///
/// # 教案式注释
/// - **意图 (Why)**：批处理窗口的边界（恰好等于阈值、略小于阈值）需要精确构造，
///   `MockClock` 通过显式 `advance` 模拟时间流逝，避免真实计时器带来的非确定性；
/// - **契约 (What)**：
///   - `new`/`with_start` 构造起始时间与内部偏移；
///   - `advance` 推进虚拟时间；
///   - `elapsed`/`now` 返回自起点以来的偏移与绝对时间；
/// - **注意 (Trade-offs)**：内部使用互斥锁，牺牲并发度换取语义清晰。
#[derive(Clone, Debug)]
pub struct MockClock {
    inner: Arc<Mutex<ClockState>>,
}

#[derive(Debug)]
struct ClockState {
    origin: Instant,
    elapsed: Duration,
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClock {
    /// 创建起始时间为当前系统时间的虚拟时钟。
    pub fn new() -> Self {
        Self::with_start(Instant::now())
    }

    /// 以指定起始时间构造虚拟时钟，初始偏移恒为零。
    pub fn with_start(origin: Instant) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ClockState {
                origin,
                elapsed: Duration::ZERO,
            })),
        }
    }

    /// 手动推进虚拟时钟。
    pub fn advance(&self, delta: Duration) {
        let mut state = self.inner.lock();
        state.elapsed = state.elapsed.saturating_add(delta);
    }

    /// 以秒（浮点）推进虚拟时钟，便于直接书写 `0.5`、`2.1` 等场景数值。
    pub fn advance_secs(&self, secs: f64) {
        self.advance(Duration::from_secs_f64(secs));
    }

    /// 返回自起始时间以来的虚拟偏移。
    pub fn elapsed(&self) -> Duration {
        self.inner.lock().elapsed
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        let state = self.inner.lock();
        state.origin + state.elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_clock_only_moves_on_advance() {
        let clock = MockClock::new();
        let start = clock.now();
        assert_eq!(clock.now(), start);

        clock.advance(Duration::from_millis(250));
        clock.advance_secs(0.25);
        assert_eq!(clock.elapsed(), Duration::from_millis(500));
        assert_eq!(clock.now(), start + Duration::from_millis(500));
    }

    #[test]
    fn clones_share_the_same_timeline() {
        let clock = MockClock::new();
        let handle = clock.clone();
        handle.advance(Duration::from_secs(3));
        assert_eq!(clock.elapsed(), Duration::from_secs(3));
    }

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock;
        let first = clock.now();
        assert!(clock.now() >= first);
    }
}
