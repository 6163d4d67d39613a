use std::sync::Arc;

use tracing::instrument;
use url::Url;

use crate::config::{AuthConfig, grant};
use crate::coordinator::RefreshFlow;
use crate::credential::Credential;
use crate::endpoint::TokenEndpoint;
use crate::errors::{AuthError, Result};
use crate::pkce::ProofKey;
use crate::store::CredentialStore;

use super::Authenticator;

/// Authorization code flow with a proof key (PKCE); no client secret needed
#[derive(Debug, Clone)]
pub struct ProofKeyFlow {
    endpoint: TokenEndpoint,
}

impl ProofKeyFlow {
    pub fn new(endpoint: TokenEndpoint) -> Self {
        Self { endpoint }
    }

    pub fn endpoint(&self) -> &TokenEndpoint {
        &self.endpoint
    }
}

#[async_trait::async_trait]
impl RefreshFlow for ProofKeyFlow {
    async fn refresh(&self, refresh_token: Option<&str>) -> Result<Credential> {
        let refresh_token = refresh_token.ok_or(AuthError::MissingRefreshToken)?;
        let config = self.endpoint.config();

        let credential = self
            .endpoint
            .request_token(
                grant::REFRESH_TOKEN,
                &[
                    ("refresh_token", refresh_token),
                    ("client_id", config.client_id.as_str()),
                ],
            )
            .await?;

        Ok(credential.or_refresh_token(Some(refresh_token)))
    }
}

impl Authenticator<ProofKeyFlow> {
    pub fn new(config: AuthConfig, store: Arc<dyn CredentialStore>) -> Result<Self> {
        Ok(Self::from_flow(ProofKeyFlow::new(TokenEndpoint::new(config)?), store))
    }

    /// URL the user visits to approve access, carrying the proof key's challenge
    pub fn authorize_url(&self, proof_key: &ProofKey, state: Option<&str>) -> Result<Url> {
        self.flow()
            .endpoint()
            .build_authorize_url(state, Some(&proof_key.challenge))
    }

    /// Exchange the code in `redirect_url` plus the proof key's verifier for a
    /// credential, then cache and persist it
    #[instrument(skip_all)]
    pub async fn acquire(
        &self,
        redirect_url: &str,
        code_verifier: &str,
        expected_state: Option<&str>,
    ) -> Result<Credential> {
        let endpoint = self.flow().endpoint();
        let config = endpoint.config();
        let code = endpoint.parse_redirect(redirect_url, expected_state)?;

        let credential = endpoint
            .request_token(
                grant::AUTHORIZATION_CODE,
                &[
                    ("code", code.as_str()),
                    ("redirect_uri", config.redirect_uri.as_str()),
                    ("client_id", config.client_id.as_str()),
                    ("code_verifier", code_verifier),
                ],
            )
            .await?;

        self.install_acquired(credential).await
    }
}
