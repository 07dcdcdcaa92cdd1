//! # 断言词汇适配
//!
//! 测试代码沿用两套断言词汇（`assert_not` 与 `refute` 并存）。这里以固定映射表与一组宏
//! 把本底座的断言名称对应到 Rust 原生断言，不依赖任何运行期反射。

use std::any::Any;

/// 一条“底座断言名 → 原生断言”映射。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AssertionAlias {
    pub harness: &'static str,
    pub native: &'static str,
}

/// 完整映射表；宏的实现与此表一一对应。
pub const ASSERTION_ALIASES: &[AssertionAlias] = &[
    AssertionAlias { harness: "assert_not", native: "assert!(!cond)" },
    AssertionAlias { harness: "assert_no_match", native: "assert!(!regex.is_match(text))" },
    AssertionAlias { harness: "assert_not_nil", native: "assert!(option.is_some())" },
    AssertionAlias { harness: "assert_not_equal", native: "assert_ne!" },
    AssertionAlias { harness: "assert_raise", native: "std::panic::catch_unwind" },
    AssertionAlias { harness: "assert_include", native: "assert!(collection.contains(item))" },
    AssertionAlias { harness: "assert_not_include", native: "assert!(!collection.contains(item))" },
    AssertionAlias { harness: "assert_not_valid", native: "validation::refute_valid" },
];

/// 查找底座断言名对应的原生断言。
pub fn native_assertion(harness: &str) -> Option<&'static str> {
    ASSERTION_ALIASES
        .iter()
        .find(|alias| alias.harness == harness)
        .map(|alias| alias.native)
}

/// 把 panic payload 解析为文本。
///
/// # 教案式说明
/// - **意图 (Why)**：`assert_raise!` 需要把捕获到的 panic 交给调用方检查，
///   而 payload 可能是 `&str`、`String` 或任意类型；
/// - **契约 (What)**：无法识别的类型返回 `"<non-string panic payload>"`。
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

/// 断言条件为假。
#[macro_export]
macro_rules! assert_not {
    ($cond:expr $(,)?) => {
        assert!(!$cond, "expected `{}` to be false", stringify!($cond))
    };
    ($cond:expr, $($arg:tt)+) => {
        assert!(!$cond, $($arg)+)
    };
}

/// 断言正则不匹配文本。
#[macro_export]
macro_rules! assert_no_match {
    ($regex:expr, $text:expr $(,)?) => {{
        let regex = &$regex;
        let text: &str = &$text;
        assert!(
            !regex.is_match(text),
            "expected {:?} not to match {}",
            text,
            regex
        )
    }};
}

/// 断言 `Option` 为 `Some`。
#[macro_export]
macro_rules! assert_not_nil {
    ($option:expr $(,)?) => {
        assert!(($option).is_some(), "expected `{}` to be Some", stringify!($option))
    };
}

/// 断言集合包含元素。
#[macro_export]
macro_rules! assert_include {
    ($collection:expr, $item:expr $(,)?) => {{
        let item = &$item;
        assert!(
            $collection.contains(item),
            "expected `{}` to include {:?}",
            stringify!($collection),
            item
        )
    }};
}

/// 断言集合不包含元素。
#[macro_export]
macro_rules! assert_not_include {
    ($collection:expr, $item:expr $(,)?) => {{
        let item = &$item;
        assert!(
            !$collection.contains(item),
            "expected `{}` not to include {:?}",
            stringify!($collection),
            item
        )
    }};
}

/// 断言表达式 panic，并返回 panic 文本。
#[macro_export]
macro_rules! assert_raise {
    ($body:expr $(,)?) => {
        match ::std::panic::catch_unwind(::std::panic::AssertUnwindSafe(|| {
            let _ = $body;
        })) {
            Ok(()) => panic!("expected `{}` to panic", stringify!($body)),
            Err(payload) => $crate::assertions::panic_message(payload.as_ref()),
        }
    };
}
