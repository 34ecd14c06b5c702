//! Client authentication: credential context, provider contract and the
//! ordered provider chain.

pub mod chain;

pub use chain::AuthenticationChain;

use crate::mqtt::session::ClientType;
use async_trait::async_trait;
use thiserror::Error;

/// Definitive authentication outcome surfaced to the connection handler.
///
/// Messages are deliberately generic so clients learn nothing about which
/// provider rejected them.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthenticationError {
    #[error("Failed to authenticate client")]
    Rejected,
    #[error("Exception on client authentication")]
    ProviderFault,
}

/// Unexpected provider failure, distinct from an ordinary negative verdict.
#[derive(Debug, Error)]
pub enum ProviderFault {
    #[error("credential backend unavailable: {0}")]
    Unavailable(String),
    #[error("malformed credentials: {0}")]
    Malformed(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Credential material supplied by the transport layer for one CONNECT.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<Vec<u8>>,
    /// DER-encoded peer certificate chain, leaf first.
    pub certificate_chain: Vec<Vec<u8>>,
    pub bearer_token: Option<String>,
}

impl AuthContext {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            ..Self::default()
        }
    }

    pub fn with_basic(mut self, username: impl Into<String>, password: impl Into<Vec<u8>>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_certificate_chain(mut self, chain: Vec<Vec<u8>>) -> Self {
        self.certificate_chain = chain;
        self
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }
}

/// A provider's verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResponse {
    pub success: bool,
    pub client_type: ClientType,
    /// Replacement client id chosen by the provider (e.g. from a certificate CN).
    pub override_client_id: Option<String>,
}

impl AuthResponse {
    pub fn success(client_type: ClientType) -> Self {
        Self {
            success: true,
            client_type,
            override_client_id: None,
        }
    }

    pub fn failure() -> Self {
        Self {
            success: false,
            client_type: ClientType::default(),
            override_client_id: None,
        }
    }

    pub fn with_override_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.override_client_id = Some(client_id.into());
        self
    }
}

/// A single credential check (basic auth, X.509, JWT, ...).
#[async_trait]
pub trait AuthProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Return a negative [`AuthResponse`] to let the next provider try;
    /// return `Err` only for unexpected failures, which abort the chain.
    async fn authorize(&self, ctx: &AuthContext) -> Result<AuthResponse, ProviderFault>;
}
