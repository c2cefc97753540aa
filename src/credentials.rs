/*!
LanRoom凭据模块

管理用户名到凭据记录的映射：
- 注册与输入校验
- 密码校验
- 管理员标记
*/

use crate::crypto;
use crate::error::ControlError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn default_iterations() -> u32 {
    crypto::DEFAULT_PBKDF2_ITERATIONS
}

/// 用户记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRecord {
    pub username: String,
    pub salt: String,
    pub hash: String,
    pub device: String,
    #[serde(default)]
    pub is_admin: bool,
    /// 启动时自动创建的演示账号
    #[serde(default)]
    pub seeded: bool,
    #[serde(default = "default_iterations")]
    pub iterations: u32,
}

/// 凭据存储
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    users: HashMap<String, UserRecord>,
}

/// 校验注册输入
pub fn validate_registration(username: &str, password: &str) -> Result<(), ControlError> {
    if username.trim().is_empty() || password.trim().is_empty() {
        return Err(ControlError::InvalidInput(
            "username and password required".to_string(),
        ));
    }
    if username.chars().any(char::is_whitespace) {
        return Err(ControlError::InvalidInput(
            "username may not contain whitespace".to_string(),
        ));
    }
    Ok(())
}

impl CredentialStore {
    pub fn from_users(users: HashMap<String, UserRecord>) -> Self {
        Self { users }
    }

    pub fn users(&self) -> &HashMap<String, UserRecord> {
        &self.users
    }

    pub fn get(&self, username: &str) -> Option<&UserRecord> {
        self.users.get(username)
    }

    pub fn contains(&self, username: &str) -> bool {
        self.users.contains_key(username)
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// 是否已有真实注册的用户（不计演示账号）
    pub fn has_registered_users(&self) -> bool {
        self.users.values().any(|u| !u.seeded)
    }

    /// 注册新用户
    ///
    /// 第一个注册的用户自动成为管理员。
    pub fn register(
        &mut self,
        username: &str,
        password: &str,
        device_id: &str,
        iterations: u32,
    ) -> Result<&UserRecord, ControlError> {
        validate_registration(username, password)?;
        if self.contains(username) {
            return Err(ControlError::Conflict("user already exists".to_string()));
        }

        let salt = crypto::new_salt()?;
        let hash = crypto::hash_password(password, &salt, iterations)?;
        let record = UserRecord {
            username: username.to_string(),
            salt,
            hash,
            device: device_id.to_string(),
            is_admin: !self.has_registered_users(),
            seeded: false,
            iterations,
        };

        log::info!(
            "Registered user {} (admin: {})",
            record.username,
            record.is_admin
        );
        Ok(self.users.entry(username.to_string()).or_insert(record))
    }

    /// 创建演示账号，演示账号没有管理员权限
    pub fn seed(
        &mut self,
        username: &str,
        password: &str,
        device_id: &str,
        iterations: u32,
    ) -> Result<(), ControlError> {
        let salt = crypto::new_salt()?;
        let hash = crypto::hash_password(password, &salt, iterations)?;
        self.users.insert(
            username.to_string(),
            UserRecord {
                username: username.to_string(),
                salt,
                hash,
                device: device_id.to_string(),
                is_admin: false,
                seeded: true,
                iterations,
            },
        );
        Ok(())
    }

    /// 校验用户名和密码
    pub fn verify(&self, username: &str, password: &str) -> Result<(), ControlError> {
        let record = self
            .users
            .get(username)
            .ok_or_else(|| ControlError::Unauthorized("invalid credentials".to_string()))?;

        if crypto::verify_password(password, &record.salt, &record.hash, record.iterations) {
            Ok(())
        } else {
            Err(ControlError::Unauthorized("invalid credentials".to_string()))
        }
    }

    pub fn is_admin(&self, username: &str) -> bool {
        self.users.get(username).map(|u| u.is_admin).unwrap_or(false)
    }

    /// 设置管理员标记，返回新值
    pub fn set_admin(&mut self, username: &str, grant: bool) -> Result<bool, ControlError> {
        let record = self
            .users
            .get_mut(username)
            .ok_or_else(|| ControlError::NotFound(format!("user {} not found", username)))?;
        record.is_admin = grant;
        Ok(record.is_admin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ITER: u32 = crypto::MIN_PBKDF2_ITERATIONS;

    #[test]
    fn test_first_registered_user_is_admin() {
        let mut store = CredentialStore::default();
        assert!(store.register("nova", "warp123", "rig", ITER).unwrap().is_admin);
        assert!(!store.register("orbit", "pw", "pad", ITER).unwrap().is_admin);
    }

    #[test]
    fn test_seeded_user_does_not_block_admin_bootstrap() {
        let mut store = CredentialStore::default();
        store.seed("gamer", "password123", "demo-device", ITER).unwrap();
        assert!(!store.is_admin("gamer"));
        assert!(store.register("leader", "secret", "d1", ITER).unwrap().is_admin);
    }

    #[test]
    fn test_duplicate_username_conflicts() {
        let mut store = CredentialStore::default();
        store.register("nova", "warp123", "rig", ITER).unwrap();
        let err = store.register("nova", "other", "rig2", ITER).unwrap_err();
        assert!(matches!(err, ControlError::Conflict(_)));
        assert!(store.verify("nova", "warp123").is_ok());
    }

    #[test]
    fn test_invalid_registration_input() {
        let mut store = CredentialStore::default();
        for (user, pass) in [("", "pw"), ("nova", ""), ("  ", "pw"), ("no va", "pw"), ("no\tva", "pw")] {
            let err = store.register(user, pass, "d", ITER).unwrap_err();
            assert!(matches!(err, ControlError::InvalidInput(_)), "{:?}", (user, pass));
        }
        assert!(store.is_empty());
    }

    #[test]
    fn test_verify_rejects_unknown_and_wrong_password() {
        let mut store = CredentialStore::default();
        store.register("nova", "warp123", "rig", ITER).unwrap();
        assert!(matches!(
            store.verify("ghost", "warp123"),
            Err(ControlError::Unauthorized(_))
        ));
        assert!(matches!(
            store.verify("nova", "warp12"),
            Err(ControlError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_set_admin() {
        let mut store = CredentialStore::default();
        store.register("nova", "warp123", "rig", ITER).unwrap();
        store.register("orbit", "pw", "pad", ITER).unwrap();
        assert!(store.set_admin("orbit", true).unwrap());
        assert!(store.is_admin("orbit"));
        assert!(!store.set_admin("orbit", false).unwrap());
        assert!(matches!(
            store.set_admin("ghost", true),
            Err(ControlError::NotFound(_))
        ));
    }
}
