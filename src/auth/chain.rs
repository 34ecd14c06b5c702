use crate::auth::{AuthContext, AuthProvider, AuthResponse, AuthenticationError};
use crate::mqtt::session::ClientType;
use std::sync::Arc;
use tracing::{trace, warn};

/// Ordered list of providers evaluated first-success-wins.
///
/// An empty chain admits every client as a device.
#[derive(Clone, Default)]
pub struct AuthenticationChain {
    providers: Arc<Vec<Arc<dyn AuthProvider>>>,
}

impl AuthenticationChain {
    pub fn new(providers: Vec<Arc<dyn AuthProvider>>) -> Self {
        Self {
            providers: Arc::new(providers),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub async fn authenticate(&self, ctx: &AuthContext) -> Result<AuthResponse, AuthenticationError> {
        trace!(client_id = %ctx.client_id, "authenticating client");
        if self.providers.is_empty() {
            return Ok(AuthResponse::success(ClientType::Device));
        }
        for provider in self.providers.iter() {
            match provider.authorize(ctx).await {
                Ok(response) if response.success => {
                    trace!(client_id = %ctx.client_id, provider = provider.name(), "client authenticated");
                    return Ok(response);
                }
                Ok(_) => {
                    trace!(client_id = %ctx.client_id, provider = provider.name(), "provider rejected client");
                }
                Err(fault) => {
                    warn!(
                        client_id = %ctx.client_id,
                        provider = provider.name(),
                        "failed to authenticate client: {fault}"
                    );
                    return Err(AuthenticationError::ProviderFault);
                }
            }
        }
        Err(AuthenticationError::Rejected)
    }
}

impl std::fmt::Debug for AuthenticationChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationChain")
            .field("providers", &self.provider_names())
            .finish()
    }
}
