use std::collections::HashMap;
use std::sync::Arc;

use ta_core::{HttpRequest, NetworkRecoveryHandler, ReqwestTransport, Transport};
use tracing::{debug, instrument};
use url::Url;

use crate::config::AuthConfig;
use crate::credential::Credential;
use crate::errors::{AuthError, Result};
use crate::models::TokenResponse;

/// Token endpoint client shared by all flows
///
/// Every token request goes through the recovery handler, so a 503 from the
/// accounts service is retried exactly like one from a resource endpoint.
#[derive(Clone)]
pub struct TokenEndpoint {
    config: AuthConfig,
    transport: Arc<dyn Transport>,
    recovery: NetworkRecoveryHandler,
}

impl std::fmt::Debug for TokenEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenEndpoint")
            .field("client_id", &self.config.client_id)
            .field("token_url", &self.config.token_url.as_str())
            .field("recovery", self.recovery.policy())
            .finish()
    }
}

impl TokenEndpoint {
    /// Create an endpoint client using a reqwest transport built from `config`
    pub fn new(config: AuthConfig) -> Result<Self> {
        let transport =
            ReqwestTransport::new(&config.http_timeouts, config.user_agent.as_deref())?;
        let recovery = NetworkRecoveryHandler::new(config.recovery.clone());

        Ok(Self {
            config,
            transport: Arc::new(transport),
            recovery,
        })
    }

    pub fn with_transport(
        config: AuthConfig,
        transport: Arc<dyn Transport>,
        recovery: NetworkRecoveryHandler,
    ) -> Self {
        Self {
            config,
            transport,
            recovery,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn recovery(&self) -> &NetworkRecoveryHandler {
        &self.recovery
    }

    pub(crate) fn client_secret(&self) -> Result<&str> {
        self.config
            .client_secret
            .as_deref()
            .ok_or_else(|| AuthError::config("This flow requires a client secret"))
    }

    /// Build the authorization URL for the user to visit
    #[instrument(skip(self, code_challenge))]
    pub fn build_authorize_url(&self, state: Option<&str>, code_challenge: Option<&str>) -> Result<Url> {
        let mut url = self.config.authorize_url.clone();

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.config.client_id)
                .append_pair("response_type", "code")
                .append_pair("redirect_uri", self.config.redirect_uri.as_str());

            if !self.config.scopes.is_empty() {
                query.append_pair("scope", &self.config.scope_string());
            }
            if self.config.show_dialog {
                query.append_pair("show_dialog", "true");
            }
            if let Some(challenge) = code_challenge {
                query
                    .append_pair("code_challenge_method", "S256")
                    .append_pair("code_challenge", challenge);
            }
            if let Some(s) = state {
                query.append_pair("state", s);
            }
        }

        debug!("Built authorize URL: {}", url);
        Ok(url)
    }

    /// Parse the redirect URL and extract the authorization code
    #[instrument(skip(self, redirect_url, expected_state))]
    pub fn parse_redirect(&self, redirect_url: &str, expected_state: Option<&str>) -> Result<String> {
        let url = Url::parse(redirect_url)?;
        let params: HashMap<_, _> = url.query_pairs().collect();

        if let Some(expected) = expected_state {
            match params.get("state") {
                Some(actual) if actual == expected => {}
                _ => return Err(AuthError::StateMismatch),
            }
        }

        if let Some(error) = params.get("error") {
            if error == "access_denied" {
                return Err(AuthError::UserCancelled);
            }
            return Err(AuthError::InvalidRedirect);
        }

        params
            .get("code")
            .filter(|c| !c.is_empty())
            .map(|c| c.to_string())
            .ok_or(AuthError::InvalidRedirect)
    }

    /// POST a form to the token endpoint and decode the resulting credential
    #[instrument(skip(self, params), fields(token_url = %self.config.token_url))]
    pub async fn request_token(&self, grant_type: &str, params: &[(&str, &str)]) -> Result<Credential> {
        let form = std::iter::once(("grant_type", grant_type)).chain(params.iter().copied());
        let request = HttpRequest::post_form(self.config.token_url.clone(), form);

        debug!(grant_type, "Requesting token");
        let credential = self
            .recovery
            .execute_with_recovery(|| {
                let request = request.clone();
                async move {
                    let response = self.transport.send(request).await?;
                    if !response.is_success() {
                        return Err(AuthError::Http(Box::new(response)));
                    }
                    Ok(TokenResponse::from_slice(&response.body)?.into_credential())
                }
            })
            .await?;

        debug!(expires_at = %credential.expires_at(), "Received token");
        Ok(credential)
    }
}
