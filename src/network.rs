/*!
LanRoom网络模块

控制面的HTTPS请求接口，包括：
- 路由：解码请求、调用状态服务、编码结果
- 错误到HTTP状态码的映射
- TLS监听循环
*/

use crate::error::ControlError;
use crate::protocol::*;
use crate::service::StateService;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use hyper::body::Incoming;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tower::Service;
use tower_http::timeout::TimeoutLayer;

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let status = match &self {
            ControlError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ControlError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ControlError::Forbidden(_) => StatusCode::FORBIDDEN,
            ControlError::NotFound(_) => StatusCode::NOT_FOUND,
            ControlError::Conflict(_) => StatusCode::CONFLICT,
            ControlError::Io(_) | ControlError::CorruptState(_) | ControlError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let message = if self.is_server_side() {
            log::error!("Request failed: {}", self);
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.code().to_string(),
                message,
            },
        };
        (status, Json(body)).into_response()
    }
}

fn decode<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ControlError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ControlError::InvalidInput(rejection.body_text()))
}

async fn register(
    State(service): State<StateService>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<RegisterResponse>, ControlError> {
    Ok(Json(service.register(decode(payload)?).await?))
}

async fn login(
    State(service): State<StateService>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ControlError> {
    Ok(Json(service.login(decode(payload)?).await?))
}

async fn refresh(
    State(service): State<StateService>,
    payload: Result<Json<RefreshTokenRequest>, JsonRejection>,
) -> Result<Json<RefreshTokenResponse>, ControlError> {
    Ok(Json(service.refresh(decode(payload)?).await?))
}

async fn create_room(
    State(service): State<StateService>,
    payload: Result<Json<CreateRoomRequest>, JsonRejection>,
) -> Result<Json<CreateRoomResponse>, ControlError> {
    Ok(Json(service.create_room(decode(payload)?).await?))
}

async fn join_room(
    State(service): State<StateService>,
    payload: Result<Json<JoinRoomRequest>, JsonRejection>,
) -> Result<Json<JoinRoomResponse>, ControlError> {
    Ok(Json(service.join_room(decode(payload)?).await?))
}

async fn keepalive(
    State(service): State<StateService>,
    payload: Result<Json<Keepalive>, JsonRejection>,
) -> Result<Json<KeepaliveAck>, ControlError> {
    Ok(Json(service.keepalive(decode(payload)?)))
}

async fn bootstrap_tunnel(
    State(service): State<StateService>,
    payload: Result<Json<TunnelOffer>, JsonRejection>,
) -> Result<Json<TunnelAnswer>, ControlError> {
    Ok(Json(service.bootstrap_tunnel(decode(payload)?).await?))
}

async fn update_admin_role(
    State(service): State<StateService>,
    payload: Result<Json<AdminRoleUpdateRequest>, JsonRejection>,
) -> Result<Json<AdminRoleUpdateResponse>, ControlError> {
    Ok(Json(service.update_admin_role(decode(payload)?).await?))
}

/// 关闭时等待已有连接结束的最长时间
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// 构建控制面路由
pub fn router(service: StateService, request_timeout: Duration) -> Router {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/rooms", post(create_room))
        .route("/rooms/join", post(join_room))
        .route("/rooms/keepalive", post(keepalive))
        .route("/tunnel/bootstrap", post(bootstrap_tunnel))
        .route("/admin/role", post(update_admin_role))
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(service)
}

/// 在TLS之上提供路由服务，直到 `shutdown` 完成
///
/// 停止接受新连接后通知已有连接优雅关闭，最多等待 `SHUTDOWN_GRACE`，超时的连接被中止。
pub async fn serve<F>(
    listener: TcpListener,
    tls: Arc<rustls::ServerConfig>,
    app: Router,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send,
{
    let acceptor = TlsAcceptor::from(tls);
    log::info!("Control plane listening on https://{}", listener.local_addr()?);

    let (drain_tx, drain_rx) = watch::channel(false);
    let mut connections = JoinSet::new();

    tokio::pin!(shutdown);
    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    log::warn!("TCP accept error: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    continue;
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => continue,
            _ = &mut shutdown => {
                log::info!("Shutdown requested, no longer accepting connections");
                break;
            }
        };

        let acceptor = acceptor.clone();
        let app = app.clone();
        let drain = drain_rx.clone();
        connections.spawn(serve_connection(acceptor, stream, peer, app, drain));
    }
    drop(listener);

    let _ = drain_tx.send(true);
    let open = connections.len();
    if open > 0 {
        log::info!("Waiting for {} open connections to finish", open);
    }

    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while connections.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        log::warn!(
            "{} connections still open after {:?}, aborting",
            connections.len(),
            SHUTDOWN_GRACE
        );
        connections.shutdown().await;
    }

    Ok(())
}

async fn serve_connection(
    acceptor: TlsAcceptor,
    stream: TcpStream,
    peer: SocketAddr,
    app: Router,
    mut drain: watch::Receiver<bool>,
) {
    let stream = match acceptor.accept(stream).await {
        Ok(stream) => stream,
        Err(e) => {
            log::warn!("TLS handshake with {} failed: {}", peer, e);
            return;
        }
    };

    let service = hyper::service::service_fn(move |request: Request<Incoming>| {
        app.clone().call(request)
    });

    let builder = Builder::new(TokioExecutor::new());
    let conn = builder.serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let mut draining = false;
    loop {
        tokio::select! {
            result = conn.as_mut() => {
                if let Err(e) = result {
                    log::debug!("Connection with {} ended with error: {}", peer, e);
                }
                break;
            }
            _ = drain.changed(), if !draining => {
                // 处理完进行中的请求后关闭
                draining = true;
                conn.as_mut().graceful_shutdown();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::ControlConfig;
    use axum::body::Body;
    use tower::ServiceExt;

    async fn app() -> Router {
        let service = StateService::start(ControlConfig {
            pbkdf2_iterations: crate::crypto::MIN_PBKDF2_ITERATIONS,
            ..ControlConfig::default()
        })
        .await
        .unwrap();
        router(service, Duration::from_secs(5))
    }

    fn post_json(uri: &str, body: &str) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let response = app()
            .await
            .oneshot(post_json("/auth/login", "{\"username\":"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_wrong_method_is_rejected() {
        let request = axum::http::Request::builder()
            .method("GET")
            .uri("/rooms")
            .body(Body::empty())
            .unwrap();
        let response = app().await.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_error_status_mapping() {
        let app = app().await;
        let response = app
            .clone()
            .oneshot(post_json(
                "/auth/login",
                r#"{"username":"gamer","password":"nope"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .clone()
            .oneshot(post_json(
                "/auth/register",
                r#"{"username":"gamer","password":"pw"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app
            .oneshot(post_json(
                "/tunnel/bootstrap",
                r#"{"room_id":"room-3","ephemeral_pub_key":"k"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_server_errors_hide_detail() {
        let response = ControlError::Io(std::io::Error::other("/secret/path")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["error"]["code"], "IO_FAILURE");
        assert!(!body.to_string().contains("/secret/path"));
    }
}
