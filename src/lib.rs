/*!
LanRoom - control plane for a self-hosted multiplayer virtual LAN platform

This library provides the control-plane core for LanRoom, including:
- User credentials, session and device tokens
- Room lifecycle and membership bookkeeping
- Admin role authorization
- Crash-consistent state persistence
- The HTTPS request interface
*/

pub mod credentials;
pub mod crypto;
pub mod error;
pub mod network;
pub mod persistence;
pub mod policy;
pub mod protocol;
pub mod rooms;
pub mod service;
pub mod state;
pub mod tls;
pub mod tokens;

pub use error::ControlError;
pub use network::{router, serve};
pub use protocol::*;
pub use service::{ControlConfig, StateService};
pub use tls::TlsMaterial;

/// LanRoom version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default control-plane port
pub const DEFAULT_PORT: u16 = 8443;

/// Default MTU for a room
pub const DEFAULT_MTU: u32 = 1400;

/// Keepalive interval handed to room members (seconds)
pub const DEFAULT_KEEPALIVE_INTERVAL: u32 = 15;
