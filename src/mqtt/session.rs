//! Session identity and disconnect classification.

use crate::time::unix_millis;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Client classification assigned by authentication.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClientType {
    #[default]
    Device,
    Application,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub client_id: String,
    pub client_type: ClientType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Connection timestamp, ms since epoch.
    pub connected_at: u64,
    pub disconnected_at: Option<u64>,
    pub keep_alive: u16,
}

/// Identity of one connection of a client to one broker node.
///
/// A client id maps to many sessions over time; `session_id` is unique per connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub service_id: String,
    pub session_id: Uuid,
    pub clean_start: bool,
    /// Session expiry interval in seconds (MQTT 5.0).
    pub session_expiry_interval: u32,
    pub client_info: ClientInfo,
    pub connection_info: ConnectionInfo,
}

impl SessionInfo {
    pub fn new(
        service_id: impl Into<String>,
        client_id: impl Into<String>,
        client_type: ClientType,
        clean_start: bool,
    ) -> Self {
        Self {
            service_id: service_id.into(),
            session_id: Uuid::new_v4(),
            clean_start,
            session_expiry_interval: 0,
            client_info: ClientInfo {
                client_id: client_id.into(),
                client_type,
            },
            connection_info: ConnectionInfo {
                connected_at: unix_millis(),
                disconnected_at: None,
                keep_alive: 0,
            },
        }
    }

    pub fn with_session_expiry(mut self, interval: u32) -> Self {
        self.session_expiry_interval = interval;
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: u16) -> Self {
        self.connection_info.keep_alive = keep_alive;
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_info.client_id
    }

    /// Whether session state outlives the connection.
    pub fn is_persistent(&self) -> bool {
        !self.clean_start || self.session_expiry_interval > 0
    }

    pub fn mark_disconnected(&mut self) {
        self.connection_info.disconnected_at = Some(unix_millis());
    }
}

/// Why a connection ended, as seen by the connection handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DisconnectReason {
    /// Client sent DISCONNECT with reason 0x00.
    NormalDisconnection = 0x00,
    /// Client sent DISCONNECT asking for its will to be published.
    DisconnectWithWillMessage = 0x04,
    /// Transport closed without a DISCONNECT packet.
    ConnectionLost = 0x80,
    ProtocolError = 0x82,
    NotAuthorized = 0x87,
    ServerShuttingDown = 0x8B,
    KeepAliveTimeout = 0x8D,
    SessionTakenOver = 0x8E,
    AdministrativeAction = 0x98,
}

impl DisconnectReason {
    /// Everything except a normal client disconnect publishes the will.
    pub fn triggers_will(self) -> bool {
        !matches!(self, Self::NormalDisconnection)
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}
