/*!
LanRoom房间模块

管理房间生命周期，包括：
- 房间创建与覆盖网络子网分配
- 成员加入与虚拟IP分配
- 隧道参数协商（仅声明式回显）
*/

use crate::crypto;
use crate::error::ControlError;
use crate::protocol::constants::OVERLAY_PREFIX;
use crate::protocol::{CipherSuite, Transport, TunnelAnswer};
use crate::{DEFAULT_KEEPALIVE_INTERVAL, DEFAULT_MTU};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 房间记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Room {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub preferred_transport: Transport,
    #[serde(default = "default_mtu")]
    pub mtu: u32,
    pub overlay_subnet: String,
    #[serde(default = "default_keepalive")]
    pub keepalive_interval: u32,
    /// 设备ID -> 用户名
    #[serde(default)]
    pub members: HashMap<String, String>,
}

fn default_mtu() -> u32 {
    DEFAULT_MTU
}

fn default_keepalive() -> u32 {
    DEFAULT_KEEPALIVE_INTERVAL
}

/// 加入房间的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub virtual_ip: String,
    pub session_key: String,
    pub transport: Transport,
    pub keepalive_interval: u32,
    pub overlay_subnet: String,
}

/// 房间注册表
#[derive(Debug, Clone, Default)]
pub struct RoomRegistry {
    rooms: HashMap<String, Room>,
}

impl RoomRegistry {
    pub fn from_rooms(rooms: HashMap<String, Room>) -> Self {
        Self { rooms }
    }

    pub fn rooms(&self) -> &HashMap<String, Room> {
        &self.rooms
    }

    pub fn get(&self, room_id: &str) -> Result<&Room, ControlError> {
        self.rooms
            .get(room_id)
            .ok_or_else(|| ControlError::NotFound(format!("room {} not found", room_id)))
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// 创建房间
    ///
    /// 房间ID和子网都由当前房间数推导，房间不会被删除，因此不会重复。
    pub fn create(&mut self, name: &str, transport: Option<Transport>, mtu: Option<u32>) -> &Room {
        let n = self.rooms.len() + 1;
        let room = Room {
            id: format!("room-{}", n),
            name: name.to_string(),
            preferred_transport: transport.unwrap_or_default(),
            mtu: mtu.filter(|m| *m > 0).unwrap_or(DEFAULT_MTU),
            overlay_subnet: format!("{}.{}.0/24", OVERLAY_PREFIX, n),
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            members: HashMap::new(),
        };

        log::info!(
            "Created room {} ({}) subnet {} via {}",
            room.id,
            room.name,
            room.overlay_subnet,
            room.preferred_transport
        );
        self.rooms.entry(room.id.clone()).or_insert(room)
    }

    /// 加入房间
    ///
    /// 虚拟IP直接由加入前的成员数换算得到；同一设备重复加入会覆盖原成员记录。
    pub fn join(
        &mut self,
        room_id: &str,
        device_id: &str,
        username: &str,
    ) -> Result<Membership, ControlError> {
        let room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| ControlError::NotFound(format!("room {} not found", room_id)))?;

        let count = room.members.len();
        let virtual_ip = format!("{}.{}.{}", OVERLAY_PREFIX, count + 1, count + 2);
        let session_key = crypto::generate_session_key(CipherSuite::default())?;
        room.members
            .insert(device_id.to_string(), username.to_string());

        log::debug!(
            "Device {} of {} joined {} as {}",
            device_id,
            username,
            room_id,
            virtual_ip
        );
        Ok(Membership {
            virtual_ip,
            session_key,
            transport: room.preferred_transport,
            keepalive_interval: room.keepalive_interval,
            overlay_subnet: room.overlay_subnet.clone(),
        })
    }

    /// 隧道协商：回显客户端的临时公钥，未提供的参数使用房间偏好或默认值
    pub fn bootstrap_tunnel(
        &self,
        room_id: &str,
        offered_transport: Option<Transport>,
        offered_cipher: Option<CipherSuite>,
        ephemeral_key: &str,
    ) -> Result<TunnelAnswer, ControlError> {
        let room = self.get(room_id)?;
        Ok(TunnelAnswer {
            transport: offered_transport.unwrap_or(room.preferred_transport),
            cipher_suite: offered_cipher.unwrap_or_default(),
            ephemeral_key: ephemeral_key.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_assigns_sequential_ids_and_subnets() {
        let mut registry = RoomRegistry::default();
        let first = registry.create("alpha", None, None).clone();
        let second = registry.create("beta", Some(Transport::Tcp), Some(1350)).clone();

        assert_eq!(first.id, "room-1");
        assert_eq!(first.overlay_subnet, "10.0.1.0/24");
        assert_eq!(first.mtu, DEFAULT_MTU);
        assert_eq!(first.preferred_transport, Transport::Udp);
        assert_eq!(first.keepalive_interval, 15);

        assert_eq!(second.id, "room-2");
        assert_eq!(second.overlay_subnet, "10.0.2.0/24");
        assert_eq!(second.mtu, 1350);
        assert_eq!(second.preferred_transport, Transport::Tcp);
    }

    #[test]
    fn test_zero_mtu_means_default() {
        let mut registry = RoomRegistry::default();
        assert_eq!(registry.create("alpha", None, Some(0)).mtu, DEFAULT_MTU);
    }

    #[test]
    fn test_join_allocates_from_member_count() {
        let mut registry = RoomRegistry::default();
        registry.create("alpha", Some(Transport::Tcp), None);

        let a = registry.join("room-1", "dev-a", "nova").unwrap();
        let b = registry.join("room-1", "dev-b", "orbit").unwrap();

        assert_eq!(a.virtual_ip, "10.0.1.2");
        assert_eq!(b.virtual_ip, "10.0.2.3");
        assert_ne!(a.session_key, b.session_key);
        assert_eq!(a.transport, Transport::Tcp);
        assert_eq!(a.overlay_subnet, "10.0.1.0/24");
        assert_eq!(registry.get("room-1").unwrap().members.len(), 2);
    }

    #[test]
    fn test_rejoin_overwrites_membership() {
        let mut registry = RoomRegistry::default();
        registry.create("alpha", None, None);
        registry.join("room-1", "dev-a", "nova").unwrap();
        registry.join("room-1", "dev-a", "orbit").unwrap();

        let room = registry.get("room-1").unwrap();
        assert_eq!(room.members.len(), 1);
        assert_eq!(room.members["dev-a"], "orbit");
    }

    #[test]
    fn test_join_unknown_room() {
        let mut registry = RoomRegistry::default();
        assert!(matches!(
            registry.join("room-9", "dev", "nova"),
            Err(ControlError::NotFound(_))
        ));
    }

    #[test]
    fn test_bootstrap_tunnel_fallbacks() {
        let mut registry = RoomRegistry::default();
        registry.create("pvp", Some(Transport::Tcp), None);

        let answer = registry.bootstrap_tunnel("room-1", None, None, "eph").unwrap();
        assert_eq!(answer.transport, Transport::Tcp);
        assert_eq!(answer.cipher_suite, CipherSuite::Aes256Gcm);
        assert_eq!(answer.ephemeral_key, "eph");

        let answer = registry
            .bootstrap_tunnel(
                "room-1",
                Some(Transport::Udp),
                Some(CipherSuite::ChaCha20Poly1305),
                "eph",
            )
            .unwrap();
        assert_eq!(answer.transport, Transport::Udp);
        assert_eq!(answer.cipher_suite, CipherSuite::ChaCha20Poly1305);

        assert!(registry.bootstrap_tunnel("room-2", None, None, "eph").is_err());
    }
}
