/*!
LanRoom协议模块

定义控制面的请求/响应协议，包括：
- 传输方式和加密套件
- 认证、房间、隧道协商的消息结构
- 协议常量
*/

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// 传输方式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Udp,
    Tcp,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Udp => write!(f, "udp"),
            Transport::Tcp => write!(f, "tcp"),
        }
    }
}

impl FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "udp" => Ok(Transport::Udp),
            "tcp" => Ok(Transport::Tcp),
            other => Err(format!("unknown transport: {}", other)),
        }
    }
}

/// 加密套件
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum CipherSuite {
    #[default]
    #[serde(rename = "aes-256-gcm")]
    Aes256Gcm,
    #[serde(rename = "chacha20-poly1305")]
    ChaCha20Poly1305,
}

impl fmt::Display for CipherSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CipherSuite::Aes256Gcm => write!(f, "aes-256-gcm"),
            CipherSuite::ChaCha20Poly1305 => write!(f, "chacha20-poly1305"),
        }
    }
}

impl FromStr for CipherSuite {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aes-256-gcm" => Ok(CipherSuite::Aes256Gcm),
            "chacha20-poly1305" => Ok(CipherSuite::ChaCha20Poly1305),
            other => Err(format!("unknown cipher suite: {}", other)),
        }
    }
}

/// 可选字段：缺省或空字符串视为未提供
fn empty_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// 注册请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub device_id: Option<String>,
}

/// 注册响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub session_token: String,
    pub device_token: String,
}

/// 登录请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// 登录响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub session_token: String,
    pub device_token: String,
}

/// 令牌刷新请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenRequest {
    pub device_token: String,
}

/// 令牌刷新响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenResponse {
    pub session_token: String,
}

/// 创建房间请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRoomRequest {
    pub name: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub preferred_transport: Option<Transport>,
    #[serde(default)]
    pub mtu: Option<u32>,
    pub session_token: String,
}

/// 创建房间响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRoomResponse {
    pub room_id: String,
    pub overlay_subnet: String,
    pub preferred_transport: Transport,
    pub mtu: u32,
}

/// 加入房间请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRoomRequest {
    pub room_id: String,
    pub device_id: String,
    pub session_token: String,
}

/// 加入房间响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRoomResponse {
    pub virtual_ip: String,
    pub session_key: String,
    pub transport: Transport,
    pub keepalive_interval_seconds: u32,
    pub overlay_subnet: String,
}

/// 心跳包
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keepalive {
    pub sequence: u64,
}

/// 心跳应答
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeepaliveAck {
    pub sequence: u64,
    pub server_time_unix_sec: i64,
    pub recommended_delay_ms: u64,
}

/// 隧道协商请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelOffer {
    pub room_id: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub transport: Option<Transport>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub cipher_suite: Option<CipherSuite>,
    #[serde(rename = "ephemeral_pub_key", default)]
    pub ephemeral_key: String,
}

/// 隧道协商应答
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelAnswer {
    pub transport: Transport,
    pub cipher_suite: CipherSuite,
    #[serde(rename = "ephemeral_pub_key")]
    pub ephemeral_key: String,
}

/// 管理员角色变更请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminRoleUpdateRequest {
    pub session_token: String,
    pub target_user: String,
    pub grant: bool,
}

/// 管理员角色变更响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminRoleUpdateResponse {
    pub target_user: String,
    pub is_admin: bool,
}

/// 错误应答
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

/// 错误详情，`code` 是稳定的错误代码
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

/// 协议常量
pub mod constants {
    /// 心跳建议间隔（毫秒）
    pub const RECOMMENDED_KEEPALIVE_DELAY_MS: u64 = 5000;

    /// 演示账号
    pub const DEMO_USERNAME: &str = "gamer";
    pub const DEMO_PASSWORD: &str = "password123";
    pub const DEMO_DEVICE_ID: &str = "demo-device";

    /// 房间覆盖网络前缀
    pub const OVERLAY_PREFIX: &str = "10.0";
}
