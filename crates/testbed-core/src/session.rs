//! 会话与杂项测试辅助：登录会话令牌、MAC 地址递增、无人值守开关。

use std::time::{Duration, Instant};

use crate::clock::Clock;
use crate::config::HarnessConfig;
use crate::model::{Identity, IdentityId};
use crate::settings::{Settings, UNATTENDED};

/// 测试会话的有效期。
pub const SESSION_TTL: Duration = Duration::from_secs(5 * 60);

/// 控制器测试使用的会话令牌。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionToken {
    pub user_id: IdentityId,
    pub expires_at: Instant,
}

/// 为 `identity` 生成会话令牌；登录关闭时返回 `None`（无需会话）。
pub fn session_for<C>(identity: &Identity, config: &HarnessConfig, clock: &C) -> Option<SessionToken>
where
    C: Clock + ?Sized,
{
    config.login_enabled.then(|| SessionToken {
        user_id: identity.id,
        expires_at: clock.now() + SESSION_TTL,
    })
}

/// 返回下一个 MAC 地址（48 位整数加一，补零、冒号分隔、小写）。
///
/// # 教案式说明
/// - **意图 (Why)**：批量构造网卡夹具时需要一串互不冲突的地址；
/// - **契约 (What)**：输入去掉冒号后必须是 1 到 12 位十六进制数；非法输入或
///   `ff:ff:ff:ff:ff:ff` 溢出时返回 `None`。
pub fn next_mac(mac: &str) -> Option<String> {
    let digits: String = mac.chars().filter(|c| *c != ':').collect();
    if digits.is_empty() || digits.len() > 12 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let value = u64::from_str_radix(&digits, 16).ok()?;
    let next = value.checked_add(1).filter(|next| *next < (1_u64 << 48))?;
    let hex = format!("{next:012x}");
    let octets: Vec<&str> = (0..hex.len())
        .step_by(2)
        .map(|start| &hex[start..start + 2])
        .collect();
    Some(octets.join(":"))
}

/// 无人值守供给是否开启；未设置视为开启。
pub fn unattended(settings: &Settings) -> bool {
    settings.flag(UNATTENDED).unwrap_or(true)
}
