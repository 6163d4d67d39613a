use std::sync::Arc;

use tracing::instrument;
use url::Url;

use crate::config::{AuthConfig, grant};
use crate::coordinator::RefreshFlow;
use crate::credential::Credential;
use crate::endpoint::TokenEndpoint;
use crate::errors::{AuthError, Result};
use crate::store::CredentialStore;

use super::Authenticator;

/// Classic authorization code flow for clients that can keep a secret
#[derive(Debug, Clone)]
pub struct AuthorizationCodeFlow {
    endpoint: TokenEndpoint,
}

impl AuthorizationCodeFlow {
    pub fn new(endpoint: TokenEndpoint) -> Self {
        Self { endpoint }
    }

    pub fn endpoint(&self) -> &TokenEndpoint {
        &self.endpoint
    }
}

#[async_trait::async_trait]
impl RefreshFlow for AuthorizationCodeFlow {
    async fn refresh(&self, refresh_token: Option<&str>) -> Result<Credential> {
        let refresh_token = refresh_token.ok_or(AuthError::MissingRefreshToken)?;
        let config = self.endpoint.config();
        let client_secret = self.endpoint.client_secret()?;

        let credential = self
            .endpoint
            .request_token(
                grant::REFRESH_TOKEN,
                &[
                    ("refresh_token", refresh_token),
                    ("client_id", config.client_id.as_str()),
                    ("client_secret", client_secret),
                ],
            )
            .await?;

        Ok(credential.or_refresh_token(Some(refresh_token)))
    }
}

impl Authenticator<AuthorizationCodeFlow> {
    pub fn new(config: AuthConfig, store: Arc<dyn CredentialStore>) -> Result<Self> {
        Ok(Self::from_flow(
            AuthorizationCodeFlow::new(TokenEndpoint::new(config)?),
            store,
        ))
    }

    pub fn authorize_url(&self, state: Option<&str>) -> Result<Url> {
        self.flow().endpoint().build_authorize_url(state, None)
    }

    /// Exchange the code in `redirect_url` for a credential, then cache and
    /// persist it
    #[instrument(skip_all)]
    pub async fn acquire(&self, redirect_url: &str, expected_state: Option<&str>) -> Result<Credential> {
        let endpoint = self.flow().endpoint();
        let config = endpoint.config();
        let client_secret = endpoint.client_secret()?;
        let code = endpoint.parse_redirect(redirect_url, expected_state)?;

        let credential = endpoint
            .request_token(
                grant::AUTHORIZATION_CODE,
                &[
                    ("code", code.as_str()),
                    ("redirect_uri", config.redirect_uri.as_str()),
                    ("client_id", config.client_id.as_str()),
                    ("client_secret", client_secret),
                ],
            )
            .await?;

        self.install_acquired(credential).await
    }
}
