//! # 作用域覆盖栈
//!
//! ## 核心意图（Why）
//! - 测试常需临时改变“当前上下文”：以某个身份执行、切入某个组织或位置、关闭一组开关、
//!   改写若干环境变量；离开作用域后必须恢复原值，否则状态会泄漏到后续测试；
//! - 四类覆盖统一建模为“读取旧值 → 写入新值 → 执行主体 → 恢复旧值”的单一原语，
//!   恢复动作放在 [`OverrideFrame`] 的 `Drop` 中，因此无论主体正常返回还是 panic 都会执行。
//!
//! ## 行为契约（What）
//! - [`with_override`]：返回主体的结果；主体 panic 时先恢复，再原样继续 unwind（不吞掉、不包装）；
//! - 嵌套遵循 LIFO：内层对同一槽位的覆盖恢复到外层设置的值，而非最初的值；
//! - 不同槽位相互独立，例如组织与位置两个维度可同时覆盖、分别恢复；
//! - 当前身份、当前租户与开关覆盖值都是线程局部状态，对应“每个工作线程一份”的并发模型。
//!
//! ## 风险提示（Trade-offs）
//! - 主体挂起不返回时恢复不会发生；这里没有超时语义；
//! - 若调用方手动持有多个 [`OverrideFrame`] 并以非 LIFO 顺序释放，值仍会被恢复，
//!   但 [`active_scopes`] 记录的栈会与实际嵌套不一致，此时会输出告警日志。

use std::cell::RefCell;
use std::collections::BTreeMap;

use tracing::warn;

use crate::env::EnvironmentProvider;
use crate::error::FixtureError;
use crate::fixtures::{ADMIN_FIXTURE, FixtureRepository};
use crate::model::{Identity, Tenant, TenantDimension};
use crate::settings::{LOCATIONS_ENABLED, ORGANIZATIONS_ENABLED, Settings};

thread_local! {
    static ACTIVE_SCOPES: RefCell<Vec<ScopeKind>> = const { RefCell::new(Vec::new()) };
    static CURRENT_IDENTITY: RefCell<Option<Identity>> = const { RefCell::new(None) };
    static CURRENT_TENANTS: RefCell<BTreeMap<TenantDimension, Tenant>> =
        const { RefCell::new(BTreeMap::new()) };
}

/// 覆盖作用域的种类。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    /// 当前已认证身份。
    Identity,
    /// 某一租户维度的当前租户。
    Tenant(TenantDimension),
    /// 一组具名布尔开关。
    Flags,
    /// 一组环境变量。
    EnvVar,
}

/// 可被覆盖的“当前值”槽位。
///
/// # 教案式注释
/// - **意图 (Why)**：把“读取并替换当前值”抽象成单个方法，覆盖原语即可对任意上下文复用；
/// - **契约 (What)**：`replace` 写入新值并返回写入前的值，二者必须是同一槽位的完整快照，
///   这样把返回值再次 `replace` 回去即可精确恢复。
pub trait ContextSlot {
    type Value;

    /// 槽位所属的作用域种类。
    fn kind(&self) -> ScopeKind;

    /// 写入新值并返回旧值。
    fn replace(&self, value: Self::Value) -> Self::Value;
}

/// 一次覆盖的栈帧：持有旧值，离开作用域时无条件恢复。
///
/// # 教案式注释
/// - **意图 (Why)**：以 RAII 表达“作用域获取、保证释放”，恢复逻辑不依赖主体是否正常返回；
/// - **逻辑 (How)**：`push` 先替换槽位值，再把种类压入线程局部的活动栈；`Drop` 把旧值写回并弹栈；
/// - **契约 (What)**：帧由压入它的调用帧独占，不可共享；`Drop` 中不会 panic。
#[must_use = "覆盖在帧被释放时立即恢复"]
pub struct OverrideFrame<S: ContextSlot> {
    slot: S,
    previous: Option<S::Value>,
    kind: ScopeKind,
}

impl<S: ContextSlot> OverrideFrame<S> {
    /// 读取旧值、写入新值并登记到活动栈。
    pub fn push(slot: S, value: S::Value) -> Self {
        let kind = slot.kind();
        let previous = slot.replace(value);
        ACTIVE_SCOPES.with(|scopes| scopes.borrow_mut().push(kind));
        Self {
            slot,
            previous: Some(previous),
            kind,
        }
    }

    /// 帧的作用域种类。
    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    /// 被覆盖前的值。
    pub fn previous(&self) -> Option<&S::Value> {
        self.previous.as_ref()
    }
}

impl<S: ContextSlot> Drop for OverrideFrame<S> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            let _ = self.slot.replace(previous);
        }
        let popped = ACTIVE_SCOPES.with(|scopes| scopes.borrow_mut().pop());
        if popped != Some(self.kind) {
            warn!(expected = ?self.kind, popped = ?popped, "override frames released out of order");
        }
    }
}

/// 在覆盖作用域内执行 `body`，返回其结果；恢复无条件发生。
pub fn with_override<S, R>(slot: S, value: S::Value, body: impl FnOnce() -> R) -> R
where
    S: ContextSlot,
{
    let _frame = OverrideFrame::push(slot, value);
    body()
}

/// 当前线程上仍然有效的覆盖种类，按压入顺序排列（栈顶在末尾）。
pub fn active_scopes() -> Vec<ScopeKind> {
    ACTIVE_SCOPES.with(|scopes| scopes.borrow().clone())
}

// ─── 身份 ────────────────────────────────────────────────────────────────

/// 当前身份槽位。
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentitySlot;

impl ContextSlot for IdentitySlot {
    type Value = Option<Identity>;

    fn kind(&self) -> ScopeKind {
        ScopeKind::Identity
    }

    fn replace(&self, value: Self::Value) -> Self::Value {
        CURRENT_IDENTITY.with(|current| current.replace(value))
    }
}

/// 返回当前线程的已认证身份。
pub fn current_identity() -> Option<Identity> {
    CURRENT_IDENTITY.with(|current| current.borrow().clone())
}

/// 直接设置当前身份（不恢复），返回旧值。
pub fn set_current_identity(identity: Option<Identity>) -> Option<Identity> {
    IdentitySlot.replace(identity)
}

/// 清除当前身份；宿主在每个测试结束时调用。
pub fn clear_current_identity() {
    set_current_identity(None);
}

/// 以指定身份执行 `body`。
pub fn as_identity<R>(identity: Identity, body: impl FnOnce() -> R) -> R {
    with_override(IdentitySlot, Some(identity), body)
}

/// 以夹具仓库中名为 `name` 的身份执行 `body`。
///
/// - **契约 (What)**：夹具不存在时不执行主体，直接返回 [`FixtureError::UnknownFixture`]。
pub fn as_user<F, R>(fixtures: &F, name: &str, body: impl FnOnce() -> R) -> Result<R, FixtureError>
where
    F: FixtureRepository + ?Sized,
{
    let identity = fixtures.identity(name)?;
    Ok(as_identity(identity, body))
}

/// 以管理员夹具身份执行 `body`。
pub fn as_admin<F, R>(fixtures: &F, body: impl FnOnce() -> R) -> Result<R, FixtureError>
where
    F: FixtureRepository + ?Sized,
{
    as_user(fixtures, ADMIN_FIXTURE, body)
}

// ─── 租户 ────────────────────────────────────────────────────────────────

/// 某一租户维度的当前租户槽位；每个维度是独立槽位。
#[derive(Clone, Copy, Debug)]
pub struct TenantSlot(pub TenantDimension);

impl ContextSlot for TenantSlot {
    type Value = Option<Tenant>;

    fn kind(&self) -> ScopeKind {
        ScopeKind::Tenant(self.0)
    }

    fn replace(&self, value: Self::Value) -> Self::Value {
        CURRENT_TENANTS.with(|tenants| {
            let mut tenants = tenants.borrow_mut();
            match value {
                Some(tenant) => tenants.insert(self.0, tenant),
                None => tenants.remove(&self.0),
            }
        })
    }
}

/// 返回指定维度的当前租户。
pub fn current_tenant(dimension: TenantDimension) -> Option<Tenant> {
    CURRENT_TENANTS.with(|tenants| tenants.borrow().get(&dimension).cloned())
}

/// 在租户所属维度上切入该租户并执行 `body`。
pub fn in_tenant<R>(tenant: Tenant, body: impl FnOnce() -> R) -> R {
    with_override(TenantSlot(tenant.dimension), Some(tenant), body)
}

/// 切入夹具仓库中名为 `name` 的租户并执行 `body`。
///
/// - **契约 (What)**：夹具不存在时不执行主体，直接返回 [`FixtureError::UnknownFixture`]。
pub fn in_tenant_named<F, R>(
    fixtures: &F,
    name: &str,
    body: impl FnOnce() -> R,
) -> Result<R, FixtureError>
where
    F: FixtureRepository + ?Sized,
{
    let tenant = fixtures.tenant(name)?;
    Ok(in_tenant(tenant, body))
}

// ─── 批量开关 ────────────────────────────────────────────────────────────

/// 一组具名开关在当前线程上的覆盖值构成的槽位，值与 `names` 一一对应，
/// `None` 表示没有覆盖、读取回落到共享开关。
#[derive(Debug)]
pub struct FlagsSlot<'a> {
    settings: &'a Settings,
    names: Vec<String>,
}

impl<'a> FlagsSlot<'a> {
    /// 重复的名称只保留一次，保证恢复顺序无关。
    pub fn new<I, N>(settings: &'a Settings, names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        let mut names: Vec<String> = names.into_iter().map(Into::into).collect();
        names.sort();
        names.dedup();
        Self { settings, names }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl ContextSlot for FlagsSlot<'_> {
    type Value = Vec<Option<bool>>;

    fn kind(&self) -> ScopeKind {
        ScopeKind::Flags
    }

    fn replace(&self, values: Self::Value) -> Self::Value {
        self.names
            .iter()
            .zip(values)
            .map(|(name, value)| self.settings.replace_local_flag(name, value))
            .collect()
    }
}

/// 把 `names` 中的每个开关强制为 `false` 后执行 `body`，结束后逐一恢复原值（包括“未设置”）。
pub fn with_flags_disabled<R>(settings: &Settings, names: &[&str], body: impl FnOnce() -> R) -> R {
    let slot = FlagsSlot::new(settings, names.iter().copied());
    let forced = vec![Some(false); slot.names().len()];
    with_override(slot, forced, body)
}

/// 临时关闭组织与位置两个租户维度。
pub fn disable_tenancy<R>(settings: &Settings, body: impl FnOnce() -> R) -> R {
    with_flags_disabled(settings, &[ORGANIZATIONS_ENABLED, LOCATIONS_ENABLED], body)
}

// ─── 环境变量 ────────────────────────────────────────────────────────────

/// 一组环境变量构成的槽位，值与 `names` 一一对应，`None` 表示变量不存在。
pub struct EnvSlot<'a, E: EnvironmentProvider + ?Sized> {
    env: &'a E,
    names: Vec<String>,
}

impl<'a, E: EnvironmentProvider + ?Sized> EnvSlot<'a, E> {
    pub fn new(env: &'a E, names: Vec<String>) -> Self {
        Self { env, names }
    }
}

impl<E: EnvironmentProvider + ?Sized> ContextSlot for EnvSlot<'_, E> {
    type Value = Vec<Option<String>>;

    fn kind(&self) -> ScopeKind {
        ScopeKind::EnvVar
    }

    fn replace(&self, values: Self::Value) -> Self::Value {
        self.names
            .iter()
            .zip(values)
            .map(|(name, value)| {
                let previous = self.env.get(name);
                match value {
                    Some(value) => self.env.set(name, &value),
                    None => self.env.remove(name),
                }
                previous
            })
            .collect()
    }
}

/// 改写一组环境变量后执行 `body`，结束后精确恢复：原本不存在的变量被删除，而不是置为空串。
///
/// - **契约 (What)**：同名变量出现多次时以最后一次为准。
pub fn with_env<E, R>(env: &E, values: &[(&str, &str)], body: impl FnOnce() -> R) -> R
where
    E: EnvironmentProvider + ?Sized,
{
    let merged: BTreeMap<&str, &str> = values.iter().copied().collect();
    let names = merged.keys().map(|name| name.to_string()).collect();
    let new_values = merged.values().map(|value| Some(value.to_string())).collect();
    with_override(EnvSlot::new(env, names), new_values, body)
}
