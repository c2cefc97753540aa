/*!
LanRoom状态服务

控制面状态的唯一所有者。状态由单个actor任务持有，调用方通过可克隆的
`StateService` 句柄发送命令：
- 邮箱按FIFO顺序处理，所有读写完全串行化
- 修改类命令先作用于暂存副本，持久化成功后才替换内存状态
- 持久化完成后才向调用方返回结果
*/

use crate::crypto::DEFAULT_PBKDF2_ITERATIONS;
use crate::error::ControlError;
use crate::persistence;
use crate::protocol::*;
use crate::state::{self, ControlState};
use std::path::PathBuf;
use tokio::sync::{mpsc, oneshot};

/// 邮箱容量
const MAILBOX_CAPACITY: usize = 256;

/// 状态服务配置
#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// 状态文件路径；为空时只保存在内存中
    pub data_path: Option<PathBuf>,
    pub seed_demo_user: bool,
    pub pbkdf2_iterations: u32,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            data_path: None,
            seed_demo_user: true,
            pbkdf2_iterations: DEFAULT_PBKDF2_ITERATIONS,
        }
    }
}

type Reply<T> = oneshot::Sender<Result<T, ControlError>>;

/// 发送给状态actor的命令
#[derive(Debug)]
enum Command {
    Register {
        req: RegisterRequest,
        respond_to: Reply<RegisterResponse>,
    },
    Login {
        req: LoginRequest,
        respond_to: Reply<LoginResponse>,
    },
    Refresh {
        req: RefreshTokenRequest,
        respond_to: Reply<RefreshTokenResponse>,
    },
    CreateRoom {
        req: CreateRoomRequest,
        respond_to: Reply<CreateRoomResponse>,
    },
    JoinRoom {
        req: JoinRoomRequest,
        respond_to: Reply<JoinRoomResponse>,
    },
    BootstrapTunnel {
        offer: TunnelOffer,
        respond_to: Reply<TunnelAnswer>,
    },
    UpdateAdminRole {
        req: AdminRoleUpdateRequest,
        respond_to: Reply<AdminRoleUpdateResponse>,
    },
}

/// 状态服务句柄
#[derive(Clone)]
pub struct StateService {
    sender: mpsc::Sender<Command>,
}

impl StateService {
    /// 加载状态并启动actor
    ///
    /// 状态文件损坏时返回 `CorruptState`，此时不应开始服务。
    pub async fn start(config: ControlConfig) -> Result<Self, ControlError> {
        let mut state = match &config.data_path {
            Some(path) => {
                let path = path.clone();
                let snapshot = tokio::task::spawn_blocking(move || persistence::load(&path))
                    .await
                    .map_err(|e| ControlError::Internal(format!("load task failed: {e}")))??;
                ControlState::from_snapshot(snapshot)
            }
            None => ControlState::default(),
        };

        if config.seed_demo_user {
            state.seed_demo_user(config.pbkdf2_iterations)?;
        }

        let (sender, receiver) = mpsc::channel(MAILBOX_CAPACITY);
        let actor = StateActor {
            receiver,
            state,
            config,
        };
        tokio::spawn(actor.run());

        Ok(Self { sender })
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, ControlError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|e| ControlError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ControlError::Internal(format!("response receive failed: {e}")))?
    }

    pub async fn register(&self, req: RegisterRequest) -> Result<RegisterResponse, ControlError> {
        self.request(|respond_to| Command::Register { req, respond_to })
            .await
    }

    pub async fn login(&self, req: LoginRequest) -> Result<LoginResponse, ControlError> {
        self.request(|respond_to| Command::Login { req, respond_to })
            .await
    }

    pub async fn refresh(
        &self,
        req: RefreshTokenRequest,
    ) -> Result<RefreshTokenResponse, ControlError> {
        self.request(|respond_to| Command::Refresh { req, respond_to })
            .await
    }

    pub async fn create_room(
        &self,
        req: CreateRoomRequest,
    ) -> Result<CreateRoomResponse, ControlError> {
        self.request(|respond_to| Command::CreateRoom { req, respond_to })
            .await
    }

    pub async fn join_room(&self, req: JoinRoomRequest) -> Result<JoinRoomResponse, ControlError> {
        self.request(|respond_to| Command::JoinRoom { req, respond_to })
            .await
    }

    pub async fn bootstrap_tunnel(&self, offer: TunnelOffer) -> Result<TunnelAnswer, ControlError> {
        self.request(|respond_to| Command::BootstrapTunnel { offer, respond_to })
            .await
    }

    pub async fn update_admin_role(
        &self,
        req: AdminRoleUpdateRequest,
    ) -> Result<AdminRoleUpdateResponse, ControlError> {
        self.request(|respond_to| Command::UpdateAdminRole { req, respond_to })
            .await
    }

    /// 心跳不读写状态，直接应答
    pub fn keepalive(&self, req: Keepalive) -> KeepaliveAck {
        state::keepalive(req)
    }
}

/// 持有状态的actor
struct StateActor {
    receiver: mpsc::Receiver<Command>,
    state: ControlState,
    config: ControlConfig,
}

impl StateActor {
    async fn run(mut self) {
        log::debug!("State actor started");
        while let Some(command) = self.receiver.recv().await {
            self.handle(command).await;
        }
        log::info!("All state service handles dropped, state actor stopping");
    }

    async fn handle(&mut self, command: Command) {
        let iterations = self.config.pbkdf2_iterations;
        match command {
            Command::Register { req, respond_to } => {
                let result = self.commit(|state| state.register(req, iterations)).await;
                let _ = respond_to.send(result);
            }
            Command::Login { req, respond_to } => {
                let result = self.commit(|state| state.login(req)).await;
                let _ = respond_to.send(result);
            }
            Command::Refresh { req, respond_to } => {
                // 只新增内存中的会话令牌，无需落盘
                let _ = respond_to.send(self.state.refresh(req));
            }
            Command::CreateRoom { req, respond_to } => {
                let result = self.commit(|state| state.create_room(req)).await;
                let _ = respond_to.send(result);
            }
            Command::JoinRoom { req, respond_to } => {
                let result = self.commit(|state| state.join_room(req)).await;
                let _ = respond_to.send(result);
            }
            Command::BootstrapTunnel { offer, respond_to } => {
                let _ = respond_to.send(self.state.bootstrap_tunnel(offer));
            }
            Command::UpdateAdminRole { req, respond_to } => {
                let result = self.commit(|state| state.update_admin_role(req)).await;
                let _ = respond_to.send(result);
            }
        }
    }

    /// 在暂存副本上执行修改，持久化成功后提交
    async fn commit<T>(
        &mut self,
        op: impl FnOnce(&mut ControlState) -> Result<T, ControlError>,
    ) -> Result<T, ControlError> {
        let mut staged = self.state.clone();
        let outcome = op(&mut staged)?;
        self.persist(&staged).await?;
        self.state = staged;
        Ok(outcome)
    }

    async fn persist(&self, staged: &ControlState) -> Result<(), ControlError> {
        let Some(path) = self.config.data_path.clone() else {
            return Ok(());
        };

        let data = persistence::encode(&staged.snapshot())?;
        let written = tokio::task::spawn_blocking(move || persistence::write_atomic(&path, &data))
            .await
            .map_err(|e| ControlError::Internal(format!("persist task failed: {e}")))?;

        written.map_err(|e| {
            log::error!("Failed to persist state: {}", e);
            ControlError::Io(e)
        })
    }
}
