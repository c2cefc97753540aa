/*!
LanRoom控制面状态

聚合凭据存储、令牌注册表和房间注册表，实现所有控制面操作。
这里的方法都是同步的，串行化和持久化由 `service` 负责。
*/

use crate::credentials::CredentialStore;
use crate::crypto;
use crate::error::ControlError;
use crate::persistence::{Snapshot, SnapshotRef};
use crate::policy::{self, Privilege};
use crate::protocol::constants::{DEMO_DEVICE_ID, DEMO_PASSWORD, DEMO_USERNAME};
use crate::protocol::*;
use crate::rooms::RoomRegistry;
use crate::tokens::TokenRegistry;

/// 控制面状态
#[derive(Debug, Clone, Default)]
pub struct ControlState {
    pub credentials: CredentialStore,
    pub tokens: TokenRegistry,
    pub rooms: RoomRegistry,
}

impl ControlState {
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            credentials: CredentialStore::from_users(snapshot.users),
            tokens: TokenRegistry::from_devices(snapshot.device_bags),
            rooms: RoomRegistry::from_rooms(snapshot.rooms),
        }
    }

    pub fn snapshot(&self) -> SnapshotRef<'_> {
        SnapshotRef {
            users: self.credentials.users(),
            device_bags: self.tokens.devices(),
            rooms: self.rooms.rooms(),
        }
    }

    /// 用户表为空时创建演示账号
    pub fn seed_demo_user(&mut self, iterations: u32) -> Result<bool, ControlError> {
        if !self.credentials.is_empty() {
            return Ok(false);
        }
        self.credentials
            .seed(DEMO_USERNAME, DEMO_PASSWORD, DEMO_DEVICE_ID, iterations)?;
        log::info!("Seeded demo user {}", DEMO_USERNAME);
        Ok(true)
    }

    pub fn register(
        &mut self,
        req: RegisterRequest,
        iterations: u32,
    ) -> Result<RegisterResponse, ControlError> {
        let device_id = match req.device_id.filter(|d| !d.trim().is_empty()) {
            Some(device_id) => device_id,
            None => crypto::generate_device_id()?,
        };

        self.credentials
            .register(&req.username, &req.password, &device_id, iterations)?;
        let session_token = self.tokens.issue_session(&req.username)?;
        let device_token = self.tokens.issue_device(&req.username)?;

        Ok(RegisterResponse {
            session_token,
            device_token,
        })
    }

    pub fn login(&mut self, req: LoginRequest) -> Result<LoginResponse, ControlError> {
        self.credentials.verify(&req.username, &req.password)?;
        let session_token = self.tokens.issue_session(&req.username)?;
        let device_token = self.tokens.issue_device(&req.username)?;

        log::info!("User {} logged in", req.username);
        Ok(LoginResponse {
            session_token,
            device_token,
        })
    }

    pub fn refresh(
        &mut self,
        req: RefreshTokenRequest,
    ) -> Result<RefreshTokenResponse, ControlError> {
        let session_token = self.tokens.refresh(&req.device_token)?;
        Ok(RefreshTokenResponse { session_token })
    }

    pub fn create_room(
        &mut self,
        req: CreateRoomRequest,
    ) -> Result<CreateRoomResponse, ControlError> {
        let username = self.tokens.resolve_session(&req.session_token)?;
        policy::require(&self.credentials, username, Privilege::CreateRoom)?;

        let room = self
            .rooms
            .create(&req.name, req.preferred_transport, req.mtu);
        Ok(CreateRoomResponse {
            room_id: room.id.clone(),
            overlay_subnet: room.overlay_subnet.clone(),
            preferred_transport: room.preferred_transport,
            mtu: room.mtu,
        })
    }

    /// 加入房间；房间不存在时无论会话是否有效都返回 NotFound
    pub fn join_room(&mut self, req: JoinRoomRequest) -> Result<JoinRoomResponse, ControlError> {
        self.rooms.get(&req.room_id)?;
        let username = self.tokens.resolve_session(&req.session_token)?.to_string();
        if req.device_id.trim().is_empty() {
            return Err(ControlError::InvalidInput("device_id required".to_string()));
        }

        let membership = self.rooms.join(&req.room_id, &req.device_id, &username)?;
        Ok(JoinRoomResponse {
            virtual_ip: membership.virtual_ip,
            session_key: membership.session_key,
            transport: membership.transport,
            keepalive_interval_seconds: membership.keepalive_interval,
            overlay_subnet: membership.overlay_subnet,
        })
    }

    pub fn bootstrap_tunnel(&self, offer: TunnelOffer) -> Result<TunnelAnswer, ControlError> {
        self.rooms.bootstrap_tunnel(
            &offer.room_id,
            offer.transport,
            offer.cipher_suite,
            &offer.ephemeral_key,
        )
    }

    pub fn update_admin_role(
        &mut self,
        req: AdminRoleUpdateRequest,
    ) -> Result<AdminRoleUpdateResponse, ControlError> {
        let acting = self.tokens.resolve_session(&req.session_token)?.to_string();
        let is_admin =
            policy::grant_or_revoke(&mut self.credentials, &acting, &req.target_user, req.grant)?;
        Ok(AdminRoleUpdateResponse {
            target_user: req.target_user,
            is_admin,
        })
    }
}

/// 心跳应答，不涉及状态
pub fn keepalive(req: Keepalive) -> KeepaliveAck {
    KeepaliveAck {
        sequence: req.sequence,
        server_time_unix_sec: chrono::Utc::now().timestamp(),
        recommended_delay_ms: constants::RECOMMENDED_KEEPALIVE_DELAY_MS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::MIN_PBKDF2_ITERATIONS as ITER;

    fn register(state: &mut ControlState, username: &str, password: &str) -> RegisterResponse {
        state
            .register(
                RegisterRequest {
                    username: username.to_string(),
                    password: password.to_string(),
                    device_id: None,
                },
                ITER,
            )
            .unwrap()
    }

    fn create_room(
        state: &mut ControlState,
        session: &str,
        name: &str,
    ) -> Result<CreateRoomResponse, ControlError> {
        state.create_room(CreateRoomRequest {
            name: name.to_string(),
            preferred_transport: None,
            mtu: None,
            session_token: session.to_string(),
        })
    }

    #[test]
    fn test_register_binds_generated_device() {
        let mut state = ControlState::default();
        register(&mut state, "nova", "warp123");
        let record = state.credentials.get("nova").unwrap();
        assert!(record.device.starts_with("device-"));
        assert!(record.is_admin);
    }

    #[test]
    fn test_demo_user_only_seeded_into_empty_state() {
        let mut state = ControlState::default();
        assert!(state.seed_demo_user(ITER).unwrap());
        assert!(!state.seed_demo_user(ITER).unwrap());
        assert!(state
            .login(LoginRequest {
                username: DEMO_USERNAME.to_string(),
                password: DEMO_PASSWORD.to_string(),
            })
            .is_ok());
        assert!(!state.credentials.is_admin(DEMO_USERNAME));

        let mut populated = ControlState::default();
        register(&mut populated, "nova", "warp123");
        assert!(!populated.seed_demo_user(ITER).unwrap());
        assert!(!populated.credentials.contains(DEMO_USERNAME));
    }

    #[test]
    fn test_demo_session_has_no_privileges() {
        let mut state = ControlState::default();
        state.seed_demo_user(ITER).unwrap();
        let owner = register(&mut state, "owner", "secret");
        register(&mut state, "mallory", "pw");

        let demo = state
            .login(LoginRequest {
                username: DEMO_USERNAME.to_string(),
                password: DEMO_PASSWORD.to_string(),
            })
            .unwrap();
        assert!(matches!(
            create_room(&mut state, &demo.session_token, "alpha"),
            Err(ControlError::Forbidden(_))
        ));
        assert!(matches!(
            state.update_admin_role(AdminRoleUpdateRequest {
                session_token: demo.session_token.clone(),
                target_user: "mallory".to_string(),
                grant: true,
            }),
            Err(ControlError::Forbidden(_))
        ));
        assert!(!state.credentials.is_admin("mallory"));

        // 第一个真实注册的用户仍然是管理员
        create_room(&mut state, &owner.session_token, "alpha").unwrap();
    }

    #[test]
    fn test_create_room_requires_valid_session() {
        let mut state = ControlState::default();
        assert!(matches!(
            create_room(&mut state, "bogus", "alpha"),
            Err(ControlError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_non_admin_create_room_forbidden() {
        let mut state = ControlState::default();
        register(&mut state, "nova", "warp123");
        let member = register(&mut state, "orbit", "pw");
        assert!(matches!(
            create_room(&mut state, &member.session_token, "alpha"),
            Err(ControlError::Forbidden(_))
        ));
        assert!(state.rooms.is_empty());
    }

    #[test]
    fn test_join_unknown_room_is_not_found_even_with_bad_session() {
        let mut state = ControlState::default();
        let err = state
            .join_room(JoinRoomRequest {
                room_id: "room-7".to_string(),
                device_id: "rig".to_string(),
                session_token: "bogus".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, ControlError::NotFound(_)));
    }

    #[test]
    fn test_join_with_bad_session_is_unauthorized() {
        let mut state = ControlState::default();
        let admin = register(&mut state, "nova", "warp123");
        let room = create_room(&mut state, &admin.session_token, "alpha").unwrap();
        let err = state
            .join_room(JoinRoomRequest {
                room_id: room.room_id,
                device_id: "rig".to_string(),
                session_token: "bogus".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, ControlError::Unauthorized(_)));
    }

    #[test]
    fn test_update_admin_role_requires_session() {
        let mut state = ControlState::default();
        register(&mut state, "nova", "warp123");
        let err = state
            .update_admin_role(AdminRoleUpdateRequest {
                session_token: "bogus".to_string(),
                target_user: "nova".to_string(),
                grant: false,
            })
            .unwrap_err();
        assert!(matches!(err, ControlError::Unauthorized(_)));
    }

    #[test]
    fn test_keepalive_echoes_sequence() {
        let ack = keepalive(Keepalive { sequence: 7 });
        assert_eq!(ack.sequence, 7);
        assert_eq!(ack.recommended_delay_ms, 5000);
        assert!((chrono::Utc::now().timestamp() - ack.server_time_unix_sec).abs() < 60);
    }
}
