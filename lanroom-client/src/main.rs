/*!
LanRoom Client - 控制面命令行客户端

客户端主要功能：
- 注册、登录和刷新会话令牌
- 创建和加入房间
- 心跳和隧道参数协商
- 管理员角色变更
*/

use clap::{Parser, Subcommand};
use env_logger::Builder;
use lanroom::protocol::*;
use lanroom_client::api::default_http_client;
use lanroom_client::ControlClient;
use log::LevelFilter;
use serde::Serialize;
use std::path::PathBuf;

/// 命令行参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 控制面地址
    #[arg(short, long, env = "LANROOM_SERVER", default_value = "https://localhost:8443")]
    server: String,

    /// 额外信任的CA证书（PEM）
    #[arg(long)]
    ca_cert: Option<PathBuf>,

    /// 跳过证书校验（仅用于开发环境）
    #[arg(long, action = clap::ArgAction::SetTrue)]
    insecure: bool,

    /// 启用调试日志
    #[arg(short, long, action = clap::ArgAction::SetTrue)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 注册新用户
    Register {
        #[arg(long, env = "LANROOM_USERNAME")]
        username: String,
        #[arg(long, env = "LANROOM_PASSWORD")]
        password: String,
        #[arg(long, env = "LANROOM_DEVICE_ID")]
        device_id: Option<String>,
    },
    /// 登录
    Login {
        #[arg(long, env = "LANROOM_USERNAME")]
        username: String,
        #[arg(long, env = "LANROOM_PASSWORD")]
        password: String,
    },
    /// 用设备令牌换取新的会话令牌
    Refresh {
        #[arg(long, env = "LANROOM_DEVICE_TOKEN")]
        device_token: String,
    },
    /// 创建房间（需要管理员权限）
    CreateRoom {
        name: String,
        #[arg(long)]
        transport: Option<Transport>,
        #[arg(long)]
        mtu: Option<u32>,
        #[arg(long, env = "LANROOM_SESSION_TOKEN")]
        session_token: String,
    },
    /// 加入房间
    JoinRoom {
        room_id: String,
        #[arg(long, env = "LANROOM_DEVICE_ID")]
        device_id: String,
        #[arg(long, env = "LANROOM_SESSION_TOKEN")]
        session_token: String,
    },
    /// 发送心跳
    Keepalive {
        #[arg(long, default_value_t = 1)]
        sequence: u64,
    },
    /// 协商隧道参数
    Bootstrap {
        room_id: String,
        #[arg(long)]
        transport: Option<Transport>,
        #[arg(long)]
        cipher_suite: Option<CipherSuite>,
        #[arg(long, default_value = "")]
        ephemeral_key: String,
    },
    /// 授予或撤销管理员角色
    SetAdmin {
        target_user: String,
        /// 撤销而不是授予
        #[arg(long, action = clap::ArgAction::SetTrue)]
        revoke: bool,
        #[arg(long, env = "LANROOM_SESSION_TOKEN")]
        session_token: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut logger = Builder::new();
    logger.filter(
        None,
        if args.debug {
            LevelFilter::Debug
        } else {
            LevelFilter::Warn
        },
    );
    logger.parse_default_env();
    logger.init();

    let ca_pem = match &args.ca_cert {
        Some(path) => Some(std::fs::read(path)?),
        None => None,
    };
    let http = default_http_client(ca_pem.as_deref(), args.insecure)?;
    let client = ControlClient::new(&args.server, Some(http))?;

    match args.command {
        Command::Register {
            username,
            password,
            device_id,
        } => {
            let req = RegisterRequest {
                username,
                password,
                device_id,
            };
            print(&client.register(&req).await?)
        }
        Command::Login { username, password } => {
            let req = LoginRequest { username, password };
            print(&client.login(&req).await?)
        }
        Command::Refresh { device_token } => {
            print(&client.refresh(&RefreshTokenRequest { device_token }).await?)
        }
        Command::CreateRoom {
            name,
            transport,
            mtu,
            session_token,
        } => {
            let req = CreateRoomRequest {
                name,
                preferred_transport: transport,
                mtu,
                session_token,
            };
            print(&client.create_room(&req).await?)
        }
        Command::JoinRoom {
            room_id,
            device_id,
            session_token,
        } => {
            let req = JoinRoomRequest {
                room_id,
                device_id,
                session_token,
            };
            print(&client.join_room(&req).await?)
        }
        Command::Keepalive { sequence } => print(&client.keepalive(&Keepalive { sequence }).await?),
        Command::Bootstrap {
            room_id,
            transport,
            cipher_suite,
            ephemeral_key,
        } => {
            let offer = TunnelOffer {
                room_id,
                transport,
                cipher_suite,
                ephemeral_key,
            };
            print(&client.bootstrap_tunnel(&offer).await?)
        }
        Command::SetAdmin {
            target_user,
            revoke,
            session_token,
        } => {
            let req = AdminRoleUpdateRequest {
                session_token,
                target_user,
                grant: !revoke,
            };
            print(&client.update_admin_role(&req).await?)
        }
    }
}

fn print<T: Serialize>(response: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(response)?);
    Ok(())
}
