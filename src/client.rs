use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use ta_auth::CredentialProvider;
use ta_core::{
    HttpRequest, HttpResponse, HttpTimeouts, NetworkRecoveryHandler, RateLimitSnapshot,
    RecoveryPolicy, RequestError, ReqwestTransport, Transport,
};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::ClientConfig;
use crate::error::{Error, Result};

/// Authenticated client for the catalog API
///
/// Each request carries `Authorization: <token_type> <access_token>` from
/// the provider's credential and is sent through the recovery handler. A 401 triggers one forced refresh and one
/// more attempt; a second 401 is returned to the caller.
#[derive(Clone)]
pub struct TonearmClient {
    base_url: Url,
    provider: Arc<dyn CredentialProvider>,
    transport: Arc<dyn Transport>,
    recovery: NetworkRecoveryHandler,
}

impl std::fmt::Debug for TonearmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TonearmClient")
            .field("base_url", &self.base_url.as_str())
            .field("recovery", self.recovery.policy())
            .finish_non_exhaustive()
    }
}

impl TonearmClient {
    pub fn new(base_url: Url, provider: Arc<dyn CredentialProvider>) -> Result<Self> {
        let transport = ReqwestTransport::new(&HttpTimeouts::default(), Some("tonearm"))?;
        Ok(Self::with_transport(
            base_url,
            provider,
            Arc::new(transport),
            NetworkRecoveryHandler::new(RecoveryPolicy::default()),
        ))
    }

    pub fn with_transport(
        mut base_url: Url,
        provider: Arc<dyn CredentialProvider>,
        transport: Arc<dyn Transport>,
        recovery: NetworkRecoveryHandler,
    ) -> Self {
        // joined paths must land below the base, not replace its last segment
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Self {
            base_url,
            provider,
            transport,
            recovery,
        }
    }

    /// Build a client from file settings, reusing the config's timeouts and
    /// retry policy for resource requests
    pub fn from_config(config: &ClientConfig, provider: Arc<dyn CredentialProvider>) -> Result<Self> {
        let user_agent = config.user_agent.as_deref().unwrap_or("tonearm");
        let transport = ReqwestTransport::new(&config.http_timeouts(), Some(user_agent))?;

        Ok(Self::with_transport(
            config.api_base_url()?,
            provider,
            Arc::new(transport),
            NetworkRecoveryHandler::new(config.recovery_policy()?),
        ))
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn recovery(&self) -> &NetworkRecoveryHandler {
        &self.recovery
    }

    /// Most recent quota state reported by the API
    pub fn rate_limit(&self) -> Option<RateLimitSnapshot> {
        self.recovery.rate_limits().latest()
    }

    /// Resolve `path` against the base URL
    pub fn url(&self, path: &str) -> Result<Url> {
        let relative = path.trim_start_matches('/');
        self.base_url
            .join(relative)
            .map_err(|source| Error::InvalidUrl {
                url: path.to_string(),
                source,
            })
    }

    pub fn request(&self, method: Method, path: &str) -> Result<HttpRequest> {
        Ok(HttpRequest::new(method, self.url(path)?))
    }

    /// Send `request` with a credential, retrying once with a forced
    /// refresh if the API answers 401
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path()))]
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let credential = self.provider.credential(false).await?;

        let authorized = request.clone().authorization(&credential.authorization_header())?;
        match self.recovery.send(self.transport.as_ref(), &authorized).await {
            Err(RequestError::Status(response)) if response.status == StatusCode::UNAUTHORIZED => {
                warn!("Credential rejected, refreshing before one more attempt");
            }
            other => return Ok(other?),
        }

        let credential = self.provider.credential(true).await?;
        let authorized = request.authorization(&credential.authorization_header())?;
        let response = self
            .recovery
            .send(self.transport.as_ref(), &authorized)
            .await?;

        debug!("Request succeeded after refresh");
        Ok(response)
    }

    pub async fn get(&self, path: &str) -> Result<HttpResponse> {
        self.send(self.request(Method::GET, path)?).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        Ok(self.get(path).await?.json()?)
    }
}
