//! 测试上下文中流转的领域记录：身份、租户与授权图（权限 / 过滤器 / 角色）。
//!
//! 这些类型只承载数据，不包含持久化逻辑；持久化由
//! [`AuthorizationStore`](crate::authorization::AuthorizationStore) 等协作方负责。

use std::collections::BTreeSet;
use std::fmt;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

record_id!(
    /// 身份记录标识。
    IdentityId
);
record_id!(
    /// 租户记录标识。
    TenantId
);
record_id!(
    /// 权限记录标识。
    PermissionId
);
record_id!(
    /// 过滤器记录标识。
    FilterId
);
record_id!(
    /// 角色记录标识。
    RoleId
);

/// 已认证身份（“当前用户”）。
///
/// # 教案式说明
/// - **意图 (Why)**：测试通过覆盖“当前身份”模拟不同用户触发的访问控制路径；
/// - **契约 (What)**：`admin` 为真时拥有全部写权限；`roles` 按追加顺序保存且不重复。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub id: IdentityId,
    pub login: String,
    pub admin: bool,
    pub roles: Vec<RoleId>,
}

impl Identity {
    /// 构造不含角色的普通身份。
    pub fn new(id: u64, login: impl Into<String>) -> Self {
        Self {
            id: IdentityId(id),
            login: login.into(),
            admin: false,
            roles: Vec::new(),
        }
    }

    /// 构造管理员身份。
    pub fn administrator(id: u64, login: impl Into<String>) -> Self {
        Self {
            admin: true,
            ..Self::new(id, login)
        }
    }

    /// 追加角色；已存在时保持原状并返回 `false`。
    pub fn grant(&mut self, role: RoleId) -> bool {
        if self.roles.contains(&role) {
            return false;
        }
        self.roles.push(role);
        true
    }

    /// 判断是否持有指定角色。
    pub fn has_role(&self, role: RoleId) -> bool {
        self.roles.contains(&role)
    }
}

/// 多租户作用域的维度，每个维度拥有独立的“当前租户”指针。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TenantDimension {
    Organization,
    Location,
}

impl TenantDimension {
    /// 返回维度的稳定字符串描述。
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Organization => "organization",
            Self::Location => "location",
        }
    }
}

impl fmt::Display for TenantDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 租户记录（组织或位置）。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub dimension: TenantDimension,
}

impl Tenant {
    pub fn new(id: u64, name: impl Into<String>, dimension: TenantDimension) -> Self {
        Self {
            id: TenantId(id),
            name: name.into(),
            dimension,
        }
    }

    pub fn organization(id: u64, name: impl Into<String>) -> Self {
        Self::new(id, name, TenantDimension::Organization)
    }

    pub fn location(id: u64, name: impl Into<String>) -> Self {
        Self::new(id, name, TenantDimension::Location)
    }
}

/// 权限记录，`name` 为唯一键（形如 `view_hosts`）。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Permission {
    pub id: PermissionId,
    pub name: String,
}

/// 过滤器：把一组权限限定在可选的搜索表达式范围内，并回指所属角色。
///
/// - **契约 (What)**：过滤器不按内容去重，每次合成都会新建一条记录。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Filter {
    pub id: FilterId,
    pub search: Option<String>,
    pub permissions: BTreeSet<PermissionId>,
    pub role: Option<RoleId>,
}

impl Filter {
    pub fn new(id: FilterId, search: Option<String>) -> Self {
        Self {
            id,
            search,
            permissions: BTreeSet::new(),
            role: None,
        }
    }
}

/// 角色记录，`name` 为唯一键。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub filters: BTreeSet<FilterId>,
}

impl Role {
    pub fn new(id: RoleId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            filters: BTreeSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_keeps_roles_unique_and_ordered() {
        let mut identity = Identity::new(7, "one");
        assert!(identity.grant(RoleId(3)));
        assert!(identity.grant(RoleId(1)));
        assert!(!identity.grant(RoleId(3)));
        assert_eq!(identity.roles, vec![RoleId(3), RoleId(1)]);
        assert!(identity.has_role(RoleId(1)));
        assert!(!identity.admin);
    }

    #[test]
    fn administrator_sets_admin_flag() {
        let admin = Identity::administrator(1, "admin");
        assert!(admin.admin);
        assert_eq!(admin.login, "admin");
        assert_eq!(admin.id, IdentityId(1));
    }
}
