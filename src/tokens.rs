/*!
LanRoom令牌模块

维护两个相互独立的令牌空间：
- 会话令牌：短期，仅保存在内存中
- 设备令牌：长期，随状态持久化，用于换取新的会话令牌
*/

use crate::crypto;
use crate::error::ControlError;
use std::collections::HashMap;

/// 令牌注册表
#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    sessions: HashMap<String, String>,
    devices: HashMap<String, String>,
}

impl TokenRegistry {
    /// 从持久化的设备令牌恢复，会话令牌为空
    pub fn from_devices(devices: HashMap<String, String>) -> Self {
        Self {
            sessions: HashMap::new(),
            devices,
        }
    }

    pub fn devices(&self) -> &HashMap<String, String> {
        &self.devices
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// 签发会话令牌
    pub fn issue_session(&mut self, username: &str) -> Result<String, ControlError> {
        let token = crypto::new_token()?;
        self.sessions.insert(token.clone(), username.to_string());
        Ok(token)
    }

    /// 签发设备令牌
    pub fn issue_device(&mut self, username: &str) -> Result<String, ControlError> {
        let token = crypto::new_token()?;
        self.devices.insert(token.clone(), username.to_string());
        Ok(token)
    }

    pub fn resolve_session(&self, token: &str) -> Result<&str, ControlError> {
        self.sessions
            .get(token)
            .map(String::as_str)
            .ok_or_else(|| ControlError::Unauthorized("session invalid".to_string()))
    }

    pub fn resolve_device(&self, token: &str) -> Result<&str, ControlError> {
        self.devices
            .get(token)
            .map(String::as_str)
            .ok_or_else(|| ControlError::Unauthorized("device token invalid".to_string()))
    }

    /// 用设备令牌换取新的会话令牌
    pub fn refresh(&mut self, device_token: &str) -> Result<String, ControlError> {
        let username = self.resolve_device(device_token)?.to_string();
        self.issue_session(&username)
    }
}
