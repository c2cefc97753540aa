/*!
LanRoom TLS模块

生成或加载控制面使用的证书材料：
- 开发环境下生成自签名证书，证书本身即客户端的信任锚
- 生产环境从PEM文件加载受信任CA签发的证书
*/

use rustls::crypto::ring::default_provider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::ServerConfig;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// TLS错误
#[derive(Error, Debug)]
pub enum TlsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Certificate generation error: {0}")]
    Rcgen(#[from] rcgen::Error),

    #[error("TLS configuration error: {0}")]
    Rustls(#[from] rustls::Error),

    #[error("No certificates found in {0}")]
    NoCertificates(String),

    #[error("No private key found in {0}")]
    MissingKey(String),
}

/// 证书链与私钥
pub struct TlsMaterial {
    cert_chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
    certificate_pem: Option<String>,
}

impl TlsMaterial {
    /// 为指定主机名生成自签名证书
    pub fn self_signed(server_name: &str) -> Result<Self, TlsError> {
        let certified = rcgen::generate_simple_self_signed(vec![server_name.to_string()])?;
        let key = PrivatePkcs8KeyDer::from(certified.key_pair.serialize_der());

        log::info!("Generated self-signed certificate for {}", server_name);
        Ok(Self {
            cert_chain: vec![certified.cert.der().clone()],
            key: PrivateKeyDer::Pkcs8(key),
            certificate_pem: Some(certified.cert.pem()),
        })
    }

    /// 从PEM文件加载证书链和私钥
    pub fn from_pem_files(cert_path: &Path, key_path: &Path) -> Result<Self, TlsError> {
        let mut reader = BufReader::new(File::open(cert_path)?);
        let cert_chain = rustls_pemfile::certs(&mut reader).collect::<Result<Vec<_>, _>>()?;
        if cert_chain.is_empty() {
            return Err(TlsError::NoCertificates(cert_path.display().to_string()));
        }

        let mut reader = BufReader::new(File::open(key_path)?);
        let key = rustls_pemfile::private_key(&mut reader)?
            .ok_or_else(|| TlsError::MissingKey(key_path.display().to_string()))?;

        log::info!("Loaded certificate from {}", cert_path.display());
        Ok(Self {
            cert_chain,
            key,
            certificate_pem: None,
        })
    }

    /// 自签名证书的PEM，供客户端作为信任锚
    pub fn certificate_pem(&self) -> Option<&str> {
        self.certificate_pem.as_deref()
    }

    pub fn server_config(&self) -> Result<Arc<ServerConfig>, TlsError> {
        let mut config = ServerConfig::builder_with_provider(Arc::new(default_provider()))
            .with_safe_default_protocol_versions()?
            .with_no_client_auth()
            .with_single_cert(self.cert_chain.clone(), self.key.clone_key())?;
        config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
        Ok(Arc::new(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_signed_material_builds_configs() {
        let material = TlsMaterial::self_signed("localhost").unwrap();
        assert!(material
            .certificate_pem()
            .unwrap()
            .starts_with("-----BEGIN CERTIFICATE-----"));

        let server = material.server_config().unwrap();
        assert!(server.alpn_protocols.contains(&b"http/1.1".to_vec()));
    }

    #[test]
    fn test_pem_files_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let cert_path = dir.path().join("server.pem");
        let key_path = dir.path().join("server.key");
        std::fs::write(&cert_path, certified.cert.pem()).unwrap();
        std::fs::write(&key_path, certified.key_pair.serialize_pem()).unwrap();

        let material = TlsMaterial::from_pem_files(&cert_path, &key_path).unwrap();
        assert!(material.certificate_pem().is_none());
        material.server_config().unwrap();
    }

    #[test]
    fn test_missing_key_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let cert_path = dir.path().join("server.pem");
        let key_path = dir.path().join("empty.key");
        std::fs::write(&cert_path, certified.cert.pem()).unwrap();
        std::fs::write(&key_path, "").unwrap();

        assert!(matches!(
            TlsMaterial::from_pem_files(&cert_path, &key_path),
            Err(TlsError::MissingKey(_))
        ));
    }
}
