//! 插件跳过指令：按测试类名登记需要跳过的测试名后缀。

use std::collections::BTreeMap;

/// 被跳过测试的原因文本。
pub const SKIP_REASON: &str = "Test was disabled by plugin";

/// 跳过指令的来源。
///
/// - **契约 (What)**：返回 `class` 下登记的全部后缀；测试名以任一后缀结尾即被跳过。
pub trait SkipDirectiveRegistry: Send + Sync {
    fn suffixes_for(&self, class: &str) -> Vec<String>;
}

/// 静态登记的跳过指令。
#[derive(Clone, Debug, Default)]
pub struct StaticSkipDirectives {
    by_class: BTreeMap<String, Vec<String>>,
}

impl StaticSkipDirectives {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一条跳过指令。
    pub fn skip(mut self, class: impl Into<String>, suffix: impl Into<String>) -> Self {
        self.by_class
            .entry(class.into())
            .or_default()
            .push(suffix.into());
        self
    }
}

impl SkipDirectiveRegistry for StaticSkipDirectives {
    fn suffixes_for(&self, class: &str) -> Vec<String> {
        self.by_class.get(class).cloned().unwrap_or_default()
    }
}

/// 判断 `class` 下名为 `test_name` 的测试是否应被跳过。
pub fn should_skip<R>(registry: &R, class: &str, test_name: &str) -> bool
where
    R: SkipDirectiveRegistry + ?Sized,
{
    registry
        .suffixes_for(class)
        .iter()
        .any(|suffix| test_name.ends_with(suffix.as_str()))
}
