/*!
LanRoom授权模块

决定用户能否执行特权操作（创建房间、变更管理员角色）。
*/

use crate::credentials::CredentialStore;
use crate::error::ControlError;

/// 特权操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    CreateRoom,
    ManageRoles,
}

impl Privilege {
    fn describe(&self) -> &'static str {
        match self {
            Privilege::CreateRoom => "create rooms",
            Privilege::ManageRoles => "manage roles",
        }
    }
}

/// 当前所有特权操作都只要求管理员标记
pub fn permits(credentials: &CredentialStore, username: &str, privilege: Privilege) -> bool {
    match privilege {
        Privilege::CreateRoom | Privilege::ManageRoles => credentials.is_admin(username),
    }
}

/// 不满足权限时返回 Forbidden
pub fn require(
    credentials: &CredentialStore,
    username: &str,
    privilege: Privilege,
) -> Result<(), ControlError> {
    if permits(credentials, username, privilege) {
        Ok(())
    } else {
        log::warn!("User {} denied: cannot {}", username, privilege.describe());
        Err(ControlError::Forbidden(format!(
            "admin role required to {}",
            privilege.describe()
        )))
    }
}

/// 授予或撤销管理员角色，返回目标用户的新标记
pub fn grant_or_revoke(
    credentials: &mut CredentialStore,
    acting: &str,
    target: &str,
    grant: bool,
) -> Result<bool, ControlError> {
    require(credentials, acting, Privilege::ManageRoles)?;
    let is_admin = credentials.set_admin(target, grant)?;
    log::info!(
        "{} {} admin role for {}",
        acting,
        if grant { "granted" } else { "revoked" },
        target
    );
    Ok(is_admin)
}
