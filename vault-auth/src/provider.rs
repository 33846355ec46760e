use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::client::{self, ServiceClient};
use crate::common::{AuthTokenQuery, ConnectionBlock, ConnectionSettings, ProviderConfig, TokenRecord};
use crate::error::{ConnectionError, LoginError};
use crate::login::AwsLoginResolver;

/// A configured Vault client plus the login resolver, shared by every read.
#[derive(Clone)]
pub struct Provider {
    client: Arc<dyn ServiceClient>,
    resolver: AwsLoginResolver,
}

/// Provider configuration and one auth token query, as read from a YAML document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoginDocument {
    #[serde(default)]
    pub vault: Vec<ConnectionBlock>,

    pub data: AuthTokenQuery,
}

impl LoginDocument {
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            vault: self.vault.clone(),
        }
    }
}

impl Provider {
    pub fn new(client: Arc<dyn ServiceClient>, resolver: AwsLoginResolver) -> Self {
        Self { client, resolver }
    }

    /// Validates `config` (with environment defaults) and builds the client.
    pub fn configure(config: &ProviderConfig) -> Result<Self, ConnectionError> {
        let settings = config.resolve()?;
        Self::from_settings(&settings)
    }

    pub fn from_settings(settings: &ConnectionSettings) -> Result<Self, ConnectionError> {
        let client = client::configure(settings)?;
        info!("Configured Vault client for {}", client.address());
        Ok(Self::new(Arc::new(client), AwsLoginResolver::default()))
    }

    /// Reads an auth token: validates the query, then logs in once.
    #[instrument(skip(self, query), fields(auth_backend = %query.auth_backend))]
    pub async fn read_auth_token(&self, query: &AuthTokenQuery) -> Result<TokenRecord, LoginError> {
        let request = query.to_request()?;
        self.resolver.login(self.client.as_ref(), &request).await
    }
}
