//! # 授权夹具合成器
//!
//! ## 核心意图（Why）
//! - 访问控制相关的代码路径需要“身份 → 角色 → 过滤器 → 权限”完整的授权图才能触发；
//!   手写这些夹具既冗长又容易重复插入唯一键冲突的记录；
//! - 合成器按 `(操作, 资源类型)` 按需构建授权图，并把结果挂到测试身份上。
//!
//! ## 行为契约（What）
//! - 权限与角色以 `"{operation}_{resource_type}"` 为唯一键执行幂等 upsert，重复调用复用同一条记录；
//! - 过滤器不去重：每次调用都新建一条，因为搜索表达式可能逐次不同；角色只保留最新的一条，
//!   旧过滤器解除对角色的回指；
//! - 写入在管理员身份的覆盖作用域内完成；结束后被授权的身份成为当前身份；
//! - 持久化失败以 [`FixtureError`] 原样传播，测试无法在缺少授权夹具的情况下继续。
//!
//! ## 架构定位（Where）
//! - [`AuthorizationStore`] 是持久化接缝；[`InMemoryAuthorizationStore`] 基于 `DashMap`，
//!   并且拒绝非管理员身份的写入，使“以管理员身份合成”这一步可被观测。

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use crate::error::FixtureError;
use crate::fixtures::{ADMIN_FIXTURE, DEFAULT_USER_FIXTURE, FixtureRepository};
use crate::model::{Filter, FilterId, Identity, IdentityId, Permission, PermissionId, Role, RoleId};
use crate::overrides::{as_identity, current_identity, set_current_identity};

/// 组合权限 / 角色的唯一键。
pub fn authorization_key(operation: &str, resource_type: &str) -> String {
    format!("{operation}_{resource_type}")
}

/// 授权记录的持久化接缝。
///
/// # 教案式注释
/// - **意图 (Why)**：合成器只描述“建什么、怎么连”，落盘方式交给实现方（内存表、真实数据库）；
/// - **契约 (What)**：
///   - `upsert_*` 按名称查找或创建，重复调用返回同一标识；
///   - `allocate_filter_id` 只分配标识，不写入记录；
///   - `save_*` 以记录标识为准覆盖写入；
///   - 任何失败都以 [`FixtureError`] 返回，不得 panic。
pub trait AuthorizationStore {
    fn upsert_permission(&self, name: &str) -> Result<Permission, FixtureError>;
    fn upsert_role(&self, name: &str) -> Result<Role, FixtureError>;
    fn allocate_filter_id(&self) -> FilterId;
    fn save_filter(&self, filter: &Filter) -> Result<(), FixtureError>;
    fn save_role(&self, role: &Role) -> Result<(), FixtureError>;
    fn save_identity(&self, identity: &Identity) -> Result<(), FixtureError>;
    fn role_by_name(&self, name: &str) -> Option<Role>;
    fn filter(&self, id: FilterId) -> Option<Filter>;
}

/// 基于 `DashMap` 的进程内授权存储。
///
/// # 教案式注释
/// - **意图 (Why)**：为测试提供零依赖的存储，同时保留真实存储的两条关键约束：唯一键与写权限；
/// - **逻辑 (How)**：权限与角色以名称（`Arc<str>`）为键，upsert 借助 `entry` API 原子完成；
///   所有标识来自同一个自增计数器；
/// - **契约 (What)**：写操作要求当前身份为管理员，否则返回 [`FixtureError::Unauthorized`]。
#[derive(Debug)]
pub struct InMemoryAuthorizationStore {
    permissions: DashMap<Arc<str>, Permission>,
    roles: DashMap<Arc<str>, Role>,
    filters: DashMap<FilterId, Filter>,
    identities: DashMap<IdentityId, Identity>,
    next_id: AtomicU64,
}

impl Default for InMemoryAuthorizationStore {
    fn default() -> Self {
        Self {
            permissions: DashMap::new(),
            roles: DashMap::new(),
            filters: DashMap::new(),
            identities: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }
}

impl InMemoryAuthorizationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn permission(&self, name: &str) -> Option<Permission> {
        self.permissions.get(name).map(|entry| entry.value().clone())
    }

    pub fn identity(&self, id: IdentityId) -> Option<Identity> {
        self.identities.get(&id).map(|entry| entry.value().clone())
    }

    /// 回指到指定角色的全部过滤器，按标识升序。
    pub fn filters_for_role(&self, role: RoleId) -> Vec<Filter> {
        let mut filters: Vec<Filter> = self
            .filters
            .iter()
            .filter(|entry| entry.value().role == Some(role))
            .map(|entry| entry.value().clone())
            .collect();
        filters.sort_by_key(|filter| filter.id);
        filters
    }

    pub fn permission_count(&self) -> usize {
        self.permissions.len()
    }

    pub fn role_count(&self) -> usize {
        self.roles.len()
    }

    pub fn filter_count(&self) -> usize {
        self.filters.len()
    }
}

fn ensure_admin(record: &'static str) -> Result<(), FixtureError> {
    match current_identity() {
        Some(identity) if identity.admin => Ok(()),
        Some(identity) => Err(FixtureError::Unauthorized {
            actor: identity.login,
            record,
        }),
        None => Err(FixtureError::Unauthorized {
            actor: "anonymous".to_string(),
            record,
        }),
    }
}

impl AuthorizationStore for InMemoryAuthorizationStore {
    fn upsert_permission(&self, name: &str) -> Result<Permission, FixtureError> {
        ensure_admin("permission")?;
        let permission = match self.permissions.entry(Arc::from(name)) {
            Entry::Occupied(occupied) => occupied.get().clone(),
            Entry::Vacant(vacant) => {
                let permission = Permission {
                    id: PermissionId(self.next_id()),
                    name: name.to_string(),
                };
                vacant.insert(permission.clone());
                permission
            }
        };
        Ok(permission)
    }

    fn upsert_role(&self, name: &str) -> Result<Role, FixtureError> {
        ensure_admin("role")?;
        let role = match self.roles.entry(Arc::from(name)) {
            Entry::Occupied(occupied) => occupied.get().clone(),
            Entry::Vacant(vacant) => {
                let role = Role::new(RoleId(self.next_id()), name);
                vacant.insert(role.clone());
                role
            }
        };
        Ok(role)
    }

    fn allocate_filter_id(&self) -> FilterId {
        FilterId(self.next_id())
    }

    fn save_filter(&self, filter: &Filter) -> Result<(), FixtureError> {
        ensure_admin("filter")?;
        if let Some(role) = filter.role {
            if !self.roles.iter().any(|entry| entry.value().id == role) {
                return Err(FixtureError::Missing {
                    record: "role",
                    key: role.to_string(),
                });
            }
        }
        self.filters.insert(filter.id, filter.clone());
        Ok(())
    }

    fn save_role(&self, role: &Role) -> Result<(), FixtureError> {
        ensure_admin("role")?;
        match self.roles.entry(Arc::from(role.name.as_str())) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().id != role.id {
                    return Err(FixtureError::DuplicateName {
                        record: "role",
                        name: role.name.clone(),
                    });
                }
                occupied.insert(role.clone());
            }
            Entry::Vacant(vacant) => {
                vacant.insert(role.clone());
            }
        }
        Ok(())
    }

    fn save_identity(&self, identity: &Identity) -> Result<(), FixtureError> {
        ensure_admin("identity")?;
        self.identities.insert(identity.id, identity.clone());
        Ok(())
    }

    fn role_by_name(&self, name: &str) -> Option<Role> {
        self.roles.get(name).map(|entry| entry.value().clone())
    }

    fn filter(&self, id: FilterId) -> Option<Filter> {
        self.filters.get(&id).map(|entry| entry.value().clone())
    }
}

/// 按需构建授权图并挂到测试身份上的合成器。
///
/// # 教案式注释
/// - **意图 (Why)**：把“以管理员身份 upsert 权限与角色、新建过滤器、授予身份、设为当前身份”
///   的固定流程收敛为一次调用；
/// - **契约 (What)**：合成器只借用存储与夹具仓库，不持有状态，可在同一测试中多次构造。
pub struct AuthorizationFixtureSynthesizer<'a, S: ?Sized, F: ?Sized> {
    store: &'a S,
    fixtures: &'a F,
}

impl<'a, S, F> AuthorizationFixtureSynthesizer<'a, S, F>
where
    S: AuthorizationStore + ?Sized,
    F: FixtureRepository + ?Sized,
{
    pub fn new(store: &'a S, fixtures: &'a F) -> Self {
        Self { store, fixtures }
    }

    /// 为 `identity` 授予 `(operation, resource_type)` 的访问能力。
    pub fn setup_authorization(
        &self,
        operation: &str,
        resource_type: &str,
        search: Option<&str>,
        identity: Identity,
    ) -> Result<Identity, FixtureError> {
        self.setup_authorization_with(operation, resource_type, search, identity, |_| {})
    }

    /// 同 [`setup_authorization`](Self::setup_authorization)，并在最终保存身份前调用 `customize`。
    ///
    /// # 教案式注释
    /// - **逻辑 (How)**：在管理员身份的覆盖作用域内依次：
    ///   1. upsert 权限 `"{operation}_{resource_type}"`；
    ///   2. 新建过滤器（携带 `search`）并挂上该权限；
    ///   3. upsert 同名角色，以新过滤器替换角色原有的过滤器（旧过滤器解除回指），
    ///      并让新过滤器回指角色；
    ///   4. 保存过滤器与角色；
    ///   5. 把角色追加到身份（已持有时不重复追加），调用 `customize`，保存身份；
    ///
    ///   离开管理员作用域后，把身份设为当前身份。
    /// - **契约 (What)**：任一步骤失败即返回错误，当前身份保持调用前的值。
    pub fn setup_authorization_with(
        &self,
        operation: &str,
        resource_type: &str,
        search: Option<&str>,
        identity: Identity,
        customize: impl FnOnce(&mut Identity),
    ) -> Result<Identity, FixtureError> {
        let admin = self.fixtures.identity(ADMIN_FIXTURE)?;
        let key = authorization_key(operation, resource_type);

        let identity = as_identity(admin, || -> Result<Identity, FixtureError> {
            let permission = self.store.upsert_permission(&key)?;

            let mut filter = Filter::new(self.store.allocate_filter_id(), search.map(str::to_owned));
            filter.permissions.insert(permission.id);

            let mut role = self.store.upsert_role(&key)?;
            for stale in std::mem::take(&mut role.filters) {
                if let Some(mut detached) = self.store.filter(stale) {
                    detached.role = None;
                    self.store.save_filter(&detached)?;
                }
            }
            role.filters.insert(filter.id);
            filter.role = Some(role.id);

            self.store.save_filter(&filter)?;
            self.store.save_role(&role)?;

            let mut identity = identity;
            identity.grant(role.id);
            customize(&mut identity);
            self.store.save_identity(&identity)?;

            debug!(
                key = %key,
                login = %identity.login,
                filter = %filter.id,
                "authorization fixture attached"
            );
            Ok(identity)
        })?;

        set_current_identity(Some(identity.clone()));
        Ok(identity)
    }

    /// 以夹具名查找身份后授权；`fixture` 缺省时使用 `"one"`。
    pub fn setup_user(
        &self,
        operation: &str,
        resource_type: &str,
        search: Option<&str>,
        fixture: Option<&str>,
    ) -> Result<Identity, FixtureError> {
        let identity = self
            .fixtures
            .identity(fixture.unwrap_or(DEFAULT_USER_FIXTURE))?;
        self.setup_authorization(operation, resource_type, search, identity)
    }

    /// 以管理员为当前身份，把 `"one"` 身份的角色替换为 `role_names` 指定的既有角色并保存。
    ///
    /// - **契约 (What)**：任一角色不存在时返回 [`FixtureError::Missing`]；
    ///   成功后当前身份保持为管理员。
    pub fn setup_users(&self, role_names: &[&str]) -> Result<Identity, FixtureError> {
        let admin = self.fixtures.identity(ADMIN_FIXTURE)?;
        set_current_identity(Some(admin));

        let mut user = self.fixtures.identity(DEFAULT_USER_FIXTURE)?;
        user.roles.clear();
        for name in role_names {
            let role = self
                .store
                .role_by_name(name)
                .ok_or_else(|| FixtureError::Missing {
                    record: "role",
                    key: (*name).to_string(),
                })?;
            user.grant(role.id);
        }
        self.store.save_identity(&user)?;
        Ok(user)
    }
}
