/*!
LanRoom Server 配置模块

定义和加载服务器配置，包括：
- 监听配置
- 状态存储配置
- 认证配置
- TLS配置
*/

use lanroom::crypto::{DEFAULT_PBKDF2_ITERATIONS, MIN_PBKDF2_ITERATIONS};
use lanroom::ControlConfig;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Toml parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Toml serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Missing required configuration: {0}")]
    Missing(String),
}

/// 服务器配置
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub storage: Storage,
    #[serde(default)]
    pub auth: Auth,
    #[serde(default)]
    pub tls: Tls,
}

/// 监听配置
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Server {
    pub bind: String,
    pub port: u16,
    /// 单个请求超时（秒）
    pub request_timeout: u64,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: lanroom::DEFAULT_PORT,
            request_timeout: 30,
        }
    }
}

/// 状态存储配置
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Storage {
    pub data_path: Option<String>,
    pub seed_demo_user: bool,
}

impl Default for Storage {
    fn default() -> Self {
        Self {
            data_path: None,
            seed_demo_user: true,
        }
    }
}

/// 认证配置
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Auth {
    pub pbkdf2_iterations: u32,
}

impl Default for Auth {
    fn default() -> Self {
        Self {
            pbkdf2_iterations: DEFAULT_PBKDF2_ITERATIONS,
        }
    }
}

/// TLS配置
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Tls {
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
    pub server_name: String,
}

impl Default for Tls {
    fn default() -> Self {
        Self {
            cert_path: None,
            key_path: None,
            server_name: "localhost".to_string(),
        }
    }
}

impl ServerConfig {
    /// 状态服务配置
    pub fn control_config(&self) -> ControlConfig {
        ControlConfig {
            data_path: self.storage.data_path.as_deref().map(resolve_data_path),
            seed_demo_user: self.storage.seed_demo_user,
            pbkdf2_iterations: self.auth.pbkdf2_iterations,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.bind, self.server.port)
    }
}

/// 相对路径按当前工作目录解析
pub fn resolve_data_path(raw: &str) -> PathBuf {
    let path = Path::new(raw);
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

/// 保存配置到文件
pub fn save_config(config: &ServerConfig, path: &Path) -> Result<(), ConfigError> {
    let toml_str = toml::to_string_pretty(config)?;
    let mut file = File::create(path)?;
    file.write_all(toml_str.as_bytes())?;
    Ok(())
}

/// 加载或生成配置
pub fn load_or_generate_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    if path.exists() {
        let content = fs::read_to_string(path)?;
        let config: ServerConfig = toml::from_str(&content)?;
        Ok(config)
    } else {
        log::info!("No config at {}, writing defaults", path.display());
        let config = ServerConfig::default();
        save_config(&config, path)?;
        Ok(config)
    }
}

/// 验证配置
pub fn validate_config(config: &ServerConfig) -> Result<(), ConfigError> {
    if config.server.bind.is_empty() {
        return Err(ConfigError::Missing("server.bind".to_string()));
    }

    if config.server.port == 0 {
        return Err(ConfigError::Invalid(
            "server.port must be greater than 0".to_string(),
        ));
    }

    if config.server.request_timeout == 0 {
        return Err(ConfigError::Invalid(
            "server.request_timeout must be greater than 0".to_string(),
        ));
    }

    if config.auth.pbkdf2_iterations < MIN_PBKDF2_ITERATIONS {
        return Err(ConfigError::Invalid(format!(
            "auth.pbkdf2_iterations must be at least {}",
            MIN_PBKDF2_ITERATIONS
        )));
    }

    if matches!(config.storage.data_path.as_deref(), Some("")) {
        return Err(ConfigError::Invalid(
            "storage.data_path must not be empty when set".to_string(),
        ));
    }

    match (&config.tls.cert_path, &config.tls.key_path) {
        (Some(_), None) => return Err(ConfigError::Missing("tls.key_path".to_string())),
        (None, Some(_)) => return Err(ConfigError::Missing("tls.cert_path".to_string())),
        _ => {}
    }

    if config.tls.server_name.is_empty() {
        return Err(ConfigError::Missing("tls.server_name".to_string()));
    }

    Ok(())
}
