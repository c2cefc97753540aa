/*!
LanRoom Server - 自托管虚拟局域网房间控制面

服务端主要功能：
- 用户注册、登录和令牌刷新
- 房间创建、加入和隧道参数协商
- 管理员角色管理
- 状态持久化
- HTTPS接口
*/

use clap::Parser;
use env_logger::Builder;
use lanroom::{router, serve, StateService, TlsMaterial};
use log::LevelFilter;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::TcpListener;

mod config;

/// 命令行参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 配置文件路径
    #[arg(short, long, default_value = "lanroom-server.toml")]
    config: PathBuf,

    /// 启用调试日志
    #[arg(short, long, action = clap::ArgAction::SetTrue)]
    debug: bool,

    /// 绑定地址
    #[arg(short, long)]
    bind: Option<String>,

    /// 端口
    #[arg(short, long)]
    port: Option<u16>,

    /// 状态文件路径（JSON）
    #[arg(long, env = "LANROOM_DATA")]
    data: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 解析命令行参数
    let args = Args::parse();

    // 初始化日志
    let mut logger = Builder::new();
    logger.filter(
        None,
        if args.debug {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        },
    );
    logger.parse_default_env();
    logger.init();

    log::info!("LanRoom Server {} starting...", lanroom::VERSION);

    // 加载配置
    let mut config = config::load_or_generate_config(&args.config)?;

    // 从命令行参数覆盖配置
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(data) = args.data {
        config.storage.data_path = Some(data);
    }

    config::validate_config(&config)?;
    log::debug!("Config loaded: {:?}", config);

    // 状态文件损坏时直接退出，不以部分可信的状态提供服务
    let service = StateService::start(config.control_config()).await?;

    let tls = match (&config.tls.cert_path, &config.tls.key_path) {
        (Some(cert), Some(key)) => TlsMaterial::from_pem_files(Path::new(cert), Path::new(key))?,
        _ => {
            log::warn!("No TLS certificate configured, using a self-signed one (development only)");
            TlsMaterial::self_signed(&config.tls.server_name)?
        }
    };

    let app = router(
        service,
        Duration::from_secs(config.server.request_timeout),
    );
    let listener = TcpListener::bind(config.bind_address()).await?;

    serve(listener, tls.server_config()?, app, shutdown_signal()).await?;

    log::info!("LanRoom Server stopped");
    Ok(())
}

/// 等待 Ctrl+C 或 SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    log::info!("Received shutdown signal, stopping services...");
}
