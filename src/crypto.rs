/*!
LanRoom加密模块

提供控制面使用的密码学原语，包括：
- 会话令牌和设备令牌生成
- 密码加盐哈希与校验
- 房间会话密钥生成
*/

use crate::error::ControlError;
use crate::protocol::CipherSuite;
use base64::Engine;
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use std::num::NonZeroU32;

/// 令牌熵长度（字节）
pub const TOKEN_LEN: usize = 16;

/// 盐长度（字节）
pub const SALT_LEN: usize = 16;

/// 密码哈希输出长度（字节）
pub const HASH_LEN: usize = 32;

/// 默认PBKDF2迭代次数
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 100_000;

/// 允许配置的最小迭代次数
pub const MIN_PBKDF2_ITERATIONS: u32 = 1_000;

static PBKDF2_ALG: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;

/// 加密套件的密钥长度（字节）
pub fn key_len(cipher: CipherSuite) -> usize {
    match cipher {
        CipherSuite::Aes256Gcm => 32,
        CipherSuite::ChaCha20Poly1305 => 32,
    }
}

/// 从系统CSPRNG获取随机字节
pub fn random_bytes(len: usize) -> Result<Vec<u8>, ControlError> {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes)
        .map_err(|_| ControlError::Internal("random generation failed".to_string()))?;
    Ok(bytes)
}

/// 生成令牌（32位十六进制字符串）
pub fn new_token() -> Result<String, ControlError> {
    Ok(hex::encode(random_bytes(TOKEN_LEN)?))
}

/// 生成随机盐（Base64）
pub fn new_salt() -> Result<String, ControlError> {
    Ok(base64::engine::general_purpose::STANDARD.encode(random_bytes(SALT_LEN)?))
}

/// 生成房间会话密钥（Base64）
pub fn generate_session_key(cipher: CipherSuite) -> Result<String, ControlError> {
    let key = random_bytes(key_len(cipher))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(key))
}

/// 为未提供设备ID的注册生成一个
pub fn generate_device_id() -> Result<String, ControlError> {
    let suffix = hex::encode(random_bytes(3)?);
    Ok(format!("device-{}", suffix))
}

fn iterations_of(iterations: u32) -> Result<NonZeroU32, ControlError> {
    NonZeroU32::new(iterations)
        .ok_or_else(|| ControlError::Internal("pbkdf2 iterations must be non-zero".to_string()))
}

/// 计算密码的加盐哈希
pub fn hash_password(password: &str, salt: &str, iterations: u32) -> Result<String, ControlError> {
    let salt = base64::engine::general_purpose::STANDARD
        .decode(salt)
        .map_err(|e| ControlError::Internal(format!("invalid salt encoding: {}", e)))?;

    let mut out = [0u8; HASH_LEN];
    pbkdf2::derive(
        PBKDF2_ALG,
        iterations_of(iterations)?,
        &salt,
        password.as_bytes(),
        &mut out,
    );
    Ok(base64::engine::general_purpose::STANDARD.encode(out))
}

/// 校验密码（常量时间比较）
pub fn verify_password(password: &str, salt: &str, hash: &str, iterations: u32) -> bool {
    let engine = base64::engine::general_purpose::STANDARD;
    let (Ok(salt), Ok(expected), Ok(iterations)) = (
        engine.decode(salt),
        engine.decode(hash),
        iterations_of(iterations),
    ) else {
        return false;
    };

    pbkdf2::verify(PBKDF2_ALG, iterations, &salt, password.as_bytes(), &expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_is_fixed_length_hex() {
        let token = new_token().unwrap();
        assert_eq!(token.len(), TOKEN_LEN * 2);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, new_token().unwrap());
    }

    #[test]
    fn test_password_round_trip() {
        let salt = new_salt().unwrap();
        let hash = hash_password("warp123", &salt, MIN_PBKDF2_ITERATIONS).unwrap();
        assert!(verify_password("warp123", &salt, &hash, MIN_PBKDF2_ITERATIONS));
        assert!(!verify_password("warp124", &salt, &hash, MIN_PBKDF2_ITERATIONS));
    }

    #[test]
    fn test_same_password_different_salt_differs() {
        let a = hash_password("pw", &new_salt().unwrap(), MIN_PBKDF2_ITERATIONS).unwrap();
        let b = hash_password("pw", &new_salt().unwrap(), MIN_PBKDF2_ITERATIONS).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_verify_rejects_garbage_encodings() {
        assert!(!verify_password("pw", "not base64!", "also not", MIN_PBKDF2_ITERATIONS));
        let salt = new_salt().unwrap();
        let hash = hash_password("pw", &salt, MIN_PBKDF2_ITERATIONS).unwrap();
        assert!(!verify_password("pw", &salt, &hash, 0));
    }

    #[test]
    fn test_session_key_matches_cipher_key_length() {
        for cipher in [CipherSuite::Aes256Gcm, CipherSuite::ChaCha20Poly1305] {
            let key = generate_session_key(cipher).unwrap();
            let raw = base64::engine::general_purpose::STANDARD.decode(key).unwrap();
            assert_eq!(raw.len(), key_len(cipher));
            assert_eq!(raw.len(), 32);
        }
    }

    #[test]
    fn test_generated_device_id_shape() {
        let id = generate_device_id().unwrap();
        assert!(id.starts_with("device-"));
        assert_eq!(id.len(), "device-".len() + 6);
    }
}
