//! 具名夹具的查找能力。
//!
//! 夹具的加载（文件解析、数据库装载与重置）由外部协作方负责；本模块只消费
//! “按名称查找记录”这一能力，并提供一个进程内实现供测试与示例使用。

use std::collections::BTreeMap;

use crate::error::FixtureError;
use crate::model::{Identity, Tenant};

/// 管理员身份的夹具名。
pub const ADMIN_FIXTURE: &str = "admin";
/// 授权合成默认使用的普通身份夹具名。
pub const DEFAULT_USER_FIXTURE: &str = "one";

/// 按符号名称查找预定义记录。
///
/// # 教案式注释
/// - **契约 (What)**：查找不到时返回 [`FixtureError::UnknownFixture`]；返回值为记录副本，
///   调用方修改后需通过对应仓储持久化。
pub trait FixtureRepository {
    fn identity(&self, name: &str) -> Result<Identity, FixtureError>;
    fn tenant(&self, name: &str) -> Result<Tenant, FixtureError>;
}

/// 进程内夹具集合。
#[derive(Clone, Debug, Default)]
pub struct InMemoryFixtures {
    identities: BTreeMap<String, Identity>,
    tenants: BTreeMap<String, Tenant>,
}

impl InMemoryFixtures {
    pub fn new() -> Self {
        Self::default()
    }

    /// 常用夹具：`admin`（管理员）、`one`/`two`（普通身份）、`organization1`、`location1`。
    pub fn standard() -> Self {
        Self::new()
            .with_identity(ADMIN_FIXTURE, Identity::administrator(1, "admin"))
            .with_identity(DEFAULT_USER_FIXTURE, Identity::new(2, "one"))
            .with_identity("two", Identity::new(3, "two"))
            .with_tenant("organization1", Tenant::organization(10, "Organization 1"))
            .with_tenant("location1", Tenant::location(20, "Location 1"))
    }

    pub fn with_identity(mut self, name: impl Into<String>, identity: Identity) -> Self {
        self.identities.insert(name.into(), identity);
        self
    }

    pub fn with_tenant(mut self, name: impl Into<String>, tenant: Tenant) -> Self {
        self.tenants.insert(name.into(), tenant);
        self
    }
}

impl FixtureRepository for InMemoryFixtures {
    fn identity(&self, name: &str) -> Result<Identity, FixtureError> {
        self.identities
            .get(name)
            .cloned()
            .ok_or_else(|| FixtureError::UnknownFixture {
                name: name.to_string(),
            })
    }

    fn tenant(&self, name: &str) -> Result<Tenant, FixtureError> {
        self.tenants
            .get(name)
            .cloned()
            .ok_or_else(|| FixtureError::UnknownFixture {
                name: name.to_string(),
            })
    }
}
