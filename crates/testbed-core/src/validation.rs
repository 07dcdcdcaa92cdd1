//! # 校验断言辅助
//!
//! 校验失败是测试误报的常见来源：断言“有效”失败时，若失败文本里只有 `false`，
//! 排查者只能重跑调试。本模块的断言把模型的全部校验错误嵌入失败文本，使失败自解释。
//!
//! - `check_*`：返回 `Result<(), AssertionFailure>`，供需要捕获检查的调用方使用；
//! - `assert_*` / `refute_*`：失败时以 panic 报告，panic 文本即诊断文本。

use std::fmt::Debug;

use regex::Regex;

use crate::error::AssertionFailure;

/// 与具体字段无关的错误所使用的字段名。
pub const BASE_FIELD: &str = "base";

/// 按字段组织的校验错误，保持添加顺序。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    entries: Vec<(String, String)>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为 `field` 添加一条错误。
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.entries.push((field.into(), message.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `field` 上的全部错误消息。
    pub fn on(&self, field: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(name, _)| name == field)
            .map(|(_, message)| message.as_str())
            .collect()
    }

    /// `(字段, 消息)` 迭代器。
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(field, message)| (field.as_str(), message.as_str()))
    }

    /// 全部错误的完整消息，如 `"Name can't be blank"`。
    pub fn full_messages(&self) -> Vec<String> {
        self.iter()
            .map(|(field, message)| full_message(field, message))
            .collect()
    }
}

/// 渲染单条完整消息：字段名人性化后与消息拼接；`base` 错误只输出消息本身。
pub fn full_message(field: &str, message: &str) -> String {
    if field == BASE_FIELD {
        return message.to_string();
    }
    format!("{} {message}", humanize(field))
}

fn humanize(field: &str) -> String {
    let spaced = field.strip_suffix("_id").unwrap_or(field).replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// 可校验的领域模型。
pub trait Validate {
    /// 执行全部校验规则并返回错误集合；集合为空即有效。
    fn validate(&self) -> ValidationErrors;

    fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}

fn describe<M: Debug + ?Sized>(model: &M, errors: &ValidationErrors) -> String {
    format!("{model:?} errors: {}", errors.full_messages().join(";"))
}

/// 断言模型有效；失败文本包含模型的全部错误消息。
pub fn check_valid<M>(model: &M) -> Result<(), AssertionFailure>
where
    M: Validate + Debug + ?Sized,
{
    let errors = model.validate();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AssertionFailure::new(describe(model, &errors)))
    }
}

/// 断言模型无效。
///
/// # 教案式说明
/// - **意图 (Why)**：只断言“无效”容易被无关字段的意外错误骗过，因此允许把错误限定在 `field` 上；
/// - **契约 (What)**：
///   - 模型必须无效；
///   - 给定 `field` 时，其他字段不得有任何错误；
///   - 同时给定 `pattern` 时，`field` 上至少一条消息匹配该正则；
///   - 未给定 `field` 时忽略 `pattern`。
pub fn check_refute_valid<M>(
    model: &M,
    field: Option<&str>,
    pattern: Option<&Regex>,
) -> Result<(), AssertionFailure>
where
    M: Validate + Debug + ?Sized,
{
    let errors = model.validate();
    if errors.is_empty() {
        return Err(AssertionFailure::new(describe(model, &errors)));
    }

    let Some(field) = field else {
        return Ok(());
    };

    let unrelated: Vec<String> = errors
        .iter()
        .filter(|(name, _)| *name != field)
        .map(|(name, message)| full_message(name, message))
        .collect();
    if !unrelated.is_empty() {
        return Err(AssertionFailure::new(format!(
            "{model:?} contains {unrelated:?}, it should not contain any"
        )));
    }

    if let Some(pattern) = pattern {
        let messages = errors.on(field);
        if !messages.iter().any(|message| pattern.is_match(message)) {
            return Err(AssertionFailure::new(format!(
                "{field} error matching {pattern} not found: {messages:?}"
            )));
        }
    }
    Ok(())
}

/// [`check_valid`] 的 panic 形式。
#[track_caller]
pub fn assert_valid<M>(model: &M)
where
    M: Validate + Debug + ?Sized,
{
    if let Err(failure) = check_valid(model) {
        failure.raise();
    }
}

/// [`check_refute_valid`] 的 panic 形式。
#[track_caller]
pub fn refute_valid<M>(model: &M, field: Option<&str>, pattern: Option<&Regex>)
where
    M: Validate + Debug + ?Sized,
{
    if let Err(failure) = check_refute_valid(model, field, pattern) {
        failure.raise();
    }
}

pub use self::refute_valid as assert_not_valid;

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic;

    #[derive(Debug)]
    struct Host {
        name: String,
        mac: String,
    }

    impl Validate for Host {
        fn validate(&self) -> ValidationErrors {
            let mut errors = ValidationErrors::new();
            if self.name.is_empty() {
                errors.add("name", "can't be blank");
            }
            if self.mac.len() != 17 {
                errors.add("mac", "is invalid");
            }
            errors
        }
    }

    fn host(name: &str, mac: &str) -> Host {
        Host {
            name: name.to_string(),
            mac: mac.to_string(),
        }
    }

    #[test]
    fn full_messages_humanize_field_names() {
        let mut errors = ValidationErrors::new();
        errors.add("operatingsystem_id", "must be set");
        errors.add("ip_address", "is taken");
        errors.add(BASE_FIELD, "Host is locked");
        assert_eq!(
            errors.full_messages(),
            vec!["Operatingsystem must be set", "Ip address is taken", "Host is locked"]
        );
    }

    #[test]
    fn valid_model_passes() {
        assert!(check_valid(&host("web01", "aa:bb:cc:dd:ee:ff")).is_ok());
        assert_valid(&host("web01", "aa:bb:cc:dd:ee:ff"));
    }

    #[test]
    fn invalid_model_failure_lists_every_error() {
        let failure = check_valid(&host("", "bogus")).expect_err("invalid");
        assert!(failure.message().contains("Name can't be blank"));
        assert!(failure.message().contains("Mac is invalid"));
        assert!(failure.message().contains("Name can't be blank;Mac is invalid"));
    }

    #[test]
    fn assert_valid_panics_with_diagnostic_text() {
        let payload = panic::catch_unwind(|| assert_valid(&host("", "aa:bb:cc:dd:ee:ff")))
            .expect_err("should panic");
        let text = payload.downcast_ref::<String>().expect("string payload");
        assert!(text.contains("errors: Name can't be blank"), "{text}");
    }

    #[test]
    fn refute_rejects_valid_model() {
        let failure = check_refute_valid(&host("web01", "aa:bb:cc:dd:ee:ff"), None, None)
            .expect_err("valid model");
        assert!(failure.message().ends_with("errors: "));
    }

    #[test]
    fn refute_scopes_errors_to_field() {
        let blank = Regex::new("blank").expect("regex");
        assert!(check_refute_valid(&host("", "aa:bb:cc:dd:ee:ff"), Some("name"), Some(&blank)).is_ok());

        let failure = check_refute_valid(&host("", "bogus"), Some("name"), Some(&blank))
            .expect_err("unrelated mac error");
        assert!(failure.message().contains("Mac is invalid"));
        assert!(failure.message().ends_with("it should not contain any"));
    }

    #[test]
    fn refute_requires_matching_message_on_field() {
        let taken = Regex::new("taken").expect("regex");
        let failure = check_refute_valid(&host("", "aa:bb:cc:dd:ee:ff"), Some("name"), Some(&taken))
            .expect_err("no matching message");
        assert_eq!(
            failure.message(),
            "name error matching taken not found: [\"can't be blank\"]"
        );
    }

    #[test]
    fn pattern_without_field_is_ignored() {
        let taken = Regex::new("taken").expect("regex");
        refute_valid(&host("", "bogus"), None, Some(&taken));
        assert_not_valid(&host("", "bogus"), None, None);
    }
}
