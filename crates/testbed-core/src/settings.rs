//! # 设置存储
//!
//! 被测系统的具名布尔开关（如“启用组织”“启用位置”）与设置值缓存。
//!
//! ## 分层（How）
//! - 共享层：`with_flags`/`set_flag` 写入的开关，所有线程可见；
//! - 线程层：批量开关覆盖写入的临时值与设置缓存，只对当前线程可见。
//!   libtest 以线程并行运行测试，覆盖与缓存清理因此不会跨测试互相干扰。

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

/// “启用组织维度”开关名。
pub const ORGANIZATIONS_ENABLED: &str = "organizations_enabled";
/// “启用位置维度”开关名。
pub const LOCATIONS_ENABLED: &str = "locations_enabled";
/// “无人值守供给”开关名，未设置时视为开启。
pub const UNATTENDED: &str = "unattended";

static NEXT_SETTINGS_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static LOCAL_LAYERS: RefCell<HashMap<u64, LocalLayer>> = RefCell::new(HashMap::new());
}

#[derive(Debug, Default)]
struct LocalLayer {
    flags: BTreeMap<String, bool>,
    cache: BTreeMap<String, String>,
}

impl LocalLayer {
    fn is_empty(&self) -> bool {
        self.flags.is_empty() && self.cache.is_empty()
    }
}

/// 设置存储，克隆体共享同一个共享层，线程层按线程隔离。
///
/// # 教案式说明
/// - **意图 (Why)**：开关覆盖需要精确还原“原值”，其中包括“从未设置”这一状态，
///   因此开关以 `Option<bool>` 读写，`None` 表示条目不存在；
/// - **契约 (What)**：
///   - `flag` 先读当前线程的覆盖值，没有时读共享层；
///   - `set_flag` 写共享层，`replace_local_flag` 写线程层，二者都返回写入前同一层的旧值；
///   - 缓存只存在于线程层，`reset_cache` 只清空当前线程的缓存且不影响开关。
/// - **权衡 (Trade-offs)**：共享层以 `parking_lot::RwLock` 保护；线程层在本线程首次写入时创建，
///   清空后立即回收。
#[derive(Clone, Debug)]
pub struct Settings {
    id: u64,
    shared: Arc<RwLock<BTreeMap<String, bool>>>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            id: NEXT_SETTINGS_ID.fetch_add(1, Ordering::Relaxed),
            shared: Arc::default(),
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以初始开关构造。
    pub fn with_flags<'a>(flags: impl IntoIterator<Item = (&'a str, bool)>) -> Self {
        let settings = Self::new();
        for (name, value) in flags {
            settings.set_flag(name, Some(value));
        }
        settings
    }

    fn with_local<R>(&self, f: impl FnOnce(&mut LocalLayer) -> R) -> R {
        LOCAL_LAYERS.with(|layers| {
            let mut layers = layers.borrow_mut();
            let layer = layers.entry(self.id).or_default();
            let result = f(layer);
            if layer.is_empty() {
                layers.remove(&self.id);
            }
            result
        })
    }

    fn read_local<R>(&self, f: impl FnOnce(Option<&LocalLayer>) -> R) -> R {
        LOCAL_LAYERS.with(|layers| f(layers.borrow().get(&self.id)))
    }

    /// 读取开关；`None` 表示未设置。
    pub fn flag(&self, name: &str) -> Option<bool> {
        self.read_local(|layer| layer.and_then(|layer| layer.flags.get(name).copied()))
            .or_else(|| self.shared.read().get(name).copied())
    }

    /// 写入共享开关并返回旧值；传入 `None` 删除条目。
    pub fn set_flag(&self, name: &str, value: Option<bool>) -> Option<bool> {
        let mut shared = self.shared.write();
        match value {
            Some(value) => shared.insert(name.to_string(), value),
            None => shared.remove(name),
        }
    }

    /// 写入当前线程的开关覆盖值并返回旧的覆盖值；`None` 表示撤销覆盖、回到共享层。
    pub fn replace_local_flag(&self, name: &str, value: Option<bool>) -> Option<bool> {
        self.with_local(|layer| match value {
            Some(value) => layer.flags.insert(name.to_string(), value),
            None => layer.flags.remove(name),
        })
    }

    /// 读取缓存值。
    pub fn cached(&self, key: &str) -> Option<String> {
        self.read_local(|layer| layer.and_then(|layer| layer.cache.get(key).cloned()))
    }

    /// 写入缓存值。
    pub fn cache(&self, key: impl Into<String>, value: impl Into<String>) {
        let (key, value) = (key.into(), value.into());
        self.with_local(|layer| {
            layer.cache.insert(key, value);
        });
    }

    /// 缓存条目数。
    pub fn cache_len(&self) -> usize {
        self.read_local(|layer| layer.map_or(0, |layer| layer.cache.len()))
    }

    /// 清空当前线程的缓存。
    pub fn reset_cache(&self) {
        self.with_local(|layer| layer.cache.clear());
    }
}
