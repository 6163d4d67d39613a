use std::sync::Arc;

use tracing::instrument;

use crate::config::{AuthConfig, grant};
use crate::coordinator::RefreshFlow;
use crate::credential::Credential;
use crate::endpoint::TokenEndpoint;
use crate::errors::Result;
use crate::store::CredentialStore;

use super::Authenticator;

/// App-only access via client ID and secret
///
/// The service issues no refresh token here; "refreshing" requests a
/// brand new credential with the same secret.
#[derive(Debug, Clone)]
pub struct ClientCredentialsFlow {
    endpoint: TokenEndpoint,
}

impl ClientCredentialsFlow {
    pub fn new(endpoint: TokenEndpoint) -> Self {
        Self { endpoint }
    }

    pub fn endpoint(&self) -> &TokenEndpoint {
        &self.endpoint
    }

    async fn request(&self) -> Result<Credential> {
        let config = self.endpoint.config();
        let client_secret = self.endpoint.client_secret()?;
        let scope = config.scope_string();

        let mut params = vec![
            ("client_id", config.client_id.as_str()),
            ("client_secret", client_secret),
        ];
        if !scope.is_empty() {
            params.push(("scope", scope.as_str()));
        }

        self.endpoint
            .request_token(grant::CLIENT_CREDENTIALS, &params)
            .await
    }
}

#[async_trait::async_trait]
impl RefreshFlow for ClientCredentialsFlow {
    async fn refresh(&self, _refresh_token: Option<&str>) -> Result<Credential> {
        self.request().await
    }

    fn requires_refresh_token(&self) -> bool {
        false
    }
}

impl Authenticator<ClientCredentialsFlow> {
    pub fn new(config: AuthConfig, store: Arc<dyn CredentialStore>) -> Result<Self> {
        Ok(Self::from_flow(
            ClientCredentialsFlow::new(TokenEndpoint::new(config)?),
            store,
        ))
    }

    /// Request a credential with the client secret, then cache and persist it
    #[instrument(skip(self))]
    pub async fn acquire(&self) -> Result<Credential> {
        let credential = self.flow().request().await?;
        self.install_acquired(credential).await
    }
}
