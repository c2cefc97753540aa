/*!
LanRoom错误模块

控制面所有操作共享的错误分类：
- 调用方可恢复的错误（输入、认证、权限、资源、冲突）
- 服务端错误（持久化失败、状态文件损坏、内部错误）
*/

use thiserror::Error;

/// 控制面错误
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt state: {0}")]
    CorruptState(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ControlError {
    /// 稳定的错误代码，供外部调度层使用
    pub fn code(&self) -> &'static str {
        match self {
            ControlError::InvalidInput(_) => "INVALID_INPUT",
            ControlError::Unauthorized(_) => "UNAUTHORIZED",
            ControlError::Forbidden(_) => "FORBIDDEN",
            ControlError::NotFound(_) => "NOT_FOUND",
            ControlError::Conflict(_) => "CONFLICT",
            ControlError::Io(_) => "IO_FAILURE",
            ControlError::CorruptState(_) => "CORRUPT_STATE",
            ControlError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 是否为服务端错误（调用方可重试）
    pub fn is_server_side(&self) -> bool {
        matches!(
            self,
            ControlError::Io(_) | ControlError::CorruptState(_) | ControlError::Internal(_)
        )
    }
}
