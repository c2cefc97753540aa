/*!
LanRoom控制面API客户端

每个控制面操作对应一个异步方法：
- 请求体和应答体直接使用 `lanroom::protocol` 中的类型
- 服务端错误应答解码为带稳定错误代码的 `ClientError::Api`
*/

use lanroom::protocol::*;
use reqwest::{Certificate, Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// 默认请求超时
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// 服务端未返回可识别错误体时使用的代码
pub const UNKNOWN_ERROR_CODE: &str = "UNKNOWN";

/// 客户端错误
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid server url: {0}")]
    Url(String),

    #[error("Invalid CA certificate: {0}")]
    Certificate(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned {status} {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },
}

impl ClientError {
    /// 服务端错误代码，如 `UNAUTHORIZED`、`FORBIDDEN`
    pub fn code(&self) -> Option<&str> {
        match self {
            ClientError::Api { code, .. } => Some(code),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// 构建访问控制面的HTTP客户端
///
/// `ca_pem` 为额外信任的证书（例如服务端的自签名证书）；`insecure` 跳过证书校验，仅用于开发环境。
pub fn default_http_client(ca_pem: Option<&[u8]>, insecure: bool) -> Result<Client, ClientError> {
    let mut builder = Client::builder().timeout(DEFAULT_TIMEOUT);
    if let Some(pem) = ca_pem {
        let certificate =
            Certificate::from_pem(pem).map_err(|e| ClientError::Certificate(e.to_string()))?;
        builder = builder.add_root_certificate(certificate);
    }
    if insecure {
        log::warn!("TLS certificate verification disabled");
        builder = builder.danger_accept_invalid_certs(true);
    }
    Ok(builder.build()?)
}

/// 控制面客户端
#[derive(Clone)]
pub struct ControlClient {
    base: String,
    http: Client,
}

impl ControlClient {
    /// 创建客户端；未提供HTTP客户端时使用校验证书的默认配置
    pub fn new(base_url: &str, http: Option<Client>) -> Result<Self, ClientError> {
        let parsed = Url::parse(base_url).map_err(|e| ClientError::Url(e.to_string()))?;
        if parsed.cannot_be_a_base() {
            return Err(ClientError::Url(format!("{} cannot be a base url", base_url)));
        }

        let http = match http {
            Some(http) => http,
            None => default_http_client(None, false)?,
        };

        Ok(Self {
            base: parsed.as_str().trim_end_matches('/').to_string(),
            http,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    async fn post_json<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, ClientError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = self.endpoint(path);
        log::debug!("POST {}", url);

        let response = self.http.post(&url).json(body).send().await?;
        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let text = response.text().await?;
            return Err(decode_error(status, &text));
        }

        Ok(response.json::<Resp>().await?)
    }

    pub async fn register(&self, req: &RegisterRequest) -> Result<RegisterResponse, ClientError> {
        self.post_json("/auth/register", req).await
    }

    pub async fn login(&self, req: &LoginRequest) -> Result<LoginResponse, ClientError> {
        self.post_json("/auth/login", req).await
    }

    pub async fn refresh(
        &self,
        req: &RefreshTokenRequest,
    ) -> Result<RefreshTokenResponse, ClientError> {
        self.post_json("/auth/refresh", req).await
    }

    pub async fn create_room(
        &self,
        req: &CreateRoomRequest,
    ) -> Result<CreateRoomResponse, ClientError> {
        self.post_json("/rooms", req).await
    }

    pub async fn join_room(&self, req: &JoinRoomRequest) -> Result<JoinRoomResponse, ClientError> {
        self.post_json("/rooms/join", req).await
    }

    pub async fn keepalive(&self, req: &Keepalive) -> Result<KeepaliveAck, ClientError> {
        self.post_json("/rooms/keepalive", req).await
    }

    pub async fn bootstrap_tunnel(&self, offer: &TunnelOffer) -> Result<TunnelAnswer, ClientError> {
        self.post_json("/tunnel/bootstrap", offer).await
    }

    pub async fn update_admin_role(
        &self,
        req: &AdminRoleUpdateRequest,
    ) -> Result<AdminRoleUpdateResponse, ClientError> {
        self.post_json("/admin/role", req).await
    }
}

/// 解码错误应答，无法识别时保留原始内容
fn decode_error(status: StatusCode, body: &str) -> ClientError {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(ErrorResponse { error }) => ClientError::Api {
            status: status.as_u16(),
            code: error.code,
            message: error.message,
        },
        Err(_) => ClientError::Api {
            status: status.as_u16(),
            code: UNKNOWN_ERROR_CODE.to_string(),
            message: body.to_string(),
        },
    }
}
