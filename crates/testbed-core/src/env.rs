//! 环境变量读写的协作方抽象，仅在环境变量覆盖作用域内被使用。

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

/// 具名环境条目的读写能力。
///
/// # 教案式注释
/// - **意图 (Why)**：覆盖作用域需要区分“变量原本不存在”与“变量为空字符串”，
///   抽象后既可作用于真实进程环境，也可作用于测试内的隔离副本；
/// - **契约 (What)**：`get` 返回 `None` 表示变量不存在；`remove` 对不存在的变量无副作用。
pub trait EnvironmentProvider {
    fn get(&self, name: &str) -> Option<String>;
    fn set(&self, name: &str, value: &str);
    fn remove(&self, name: &str);
}

/// 作用于真实进程环境的实现。
///
/// # 教案式注释
/// - **契约 (What)**：进程环境是全局状态，只有在“同一时刻仅有一个测试主体修改环境”的前提下才是安全的；
///   并行运行的测试应改用 [`MemoryEnvironment`]，或保证各自修改的变量名互不相交。
/// - **注意 (Trade-offs)**：非 UTF-8 的变量值被视为不存在。
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessEnvironment;

impl EnvironmentProvider for ProcessEnvironment {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    fn set(&self, name: &str, value: &str) {
        // SAFETY: 环境覆盖只在测试边界内由单个测试主体执行，调用方承诺此期间没有其他线程读写同名变量。
        unsafe { std::env::set_var(name, value) }
    }

    fn remove(&self, name: &str) {
        // SAFETY: 同 `set`。
        unsafe { std::env::remove_var(name) }
    }
}

/// 进程内隔离的环境副本，克隆体共享同一份数据。
#[derive(Clone, Debug, Default)]
pub struct MemoryEnvironment {
    vars: Arc<RwLock<BTreeMap<String, String>>>,
}

impl MemoryEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以初始变量构造。
    pub fn with_vars<'a>(vars: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let env = Self::new();
        for (name, value) in vars {
            env.set(name, value);
        }
        env
    }

    /// 返回全部变量的快照。
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.vars.read().clone()
    }
}

impl EnvironmentProvider for MemoryEnvironment {
    fn get(&self, name: &str) -> Option<String> {
        self.vars.read().get(name).cloned()
    }

    fn set(&self, name: &str, value: &str) {
        self.vars.write().insert(name.to_string(), value.to_string());
    }

    fn remove(&self, name: &str) {
        self.vars.write().remove(name);
    }
}
