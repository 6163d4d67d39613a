//! Token authenticators, one per OAuth flow
//!
//! All three share [`Authenticator`], which wraps a [`RefreshCoordinator`]
//! around the flow's refresh procedure; flow-specific acquisition lives in
//! each submodule.

mod authorization_code;
mod client_credentials;
mod proof_key;

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::instrument;

use crate::coordinator::{CredentialEvent, RefreshCoordinator, RefreshFlow};
use crate::credential::Credential;
use crate::errors::Result;
use crate::store::CredentialStore;

pub use authorization_code::AuthorizationCodeFlow;
pub use client_credentials::ClientCredentialsFlow;
pub use proof_key::ProofKeyFlow;

pub type ProofKeyAuthenticator = Authenticator<ProofKeyFlow>;
pub type AuthorizationCodeAuthenticator = Authenticator<AuthorizationCodeFlow>;
pub type ClientCredentialsAuthenticator = Authenticator<ClientCredentialsFlow>;

/// Anything that can hand out a usable credential
#[async_trait::async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn credential(&self, invalidating_previous: bool) -> Result<Credential>;
}

/// Token authenticator for flow `F`
pub struct Authenticator<F> {
    coordinator: RefreshCoordinator<F>,
}

impl<F> Clone for Authenticator<F> {
    fn clone(&self) -> Self {
        Self {
            coordinator: self.coordinator.clone(),
        }
    }
}

impl<F> std::fmt::Debug for Authenticator<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("flow", &std::any::type_name::<F>())
            .finish_non_exhaustive()
    }
}

impl<F: RefreshFlow> Authenticator<F> {
    pub fn from_flow(flow: F, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            coordinator: RefreshCoordinator::new(flow, store),
        }
    }

    pub fn coordinator(&self) -> &RefreshCoordinator<F> {
        &self.coordinator
    }

    pub fn flow(&self) -> &F {
        self.coordinator.flow()
    }

    /// See [`RefreshCoordinator::refresh_if_needed`]
    pub async fn refresh_if_needed(&self, invalidating_previous: bool) -> Result<Credential> {
        self.coordinator.refresh_if_needed(invalidating_previous).await
    }

    /// Exchange `refresh_token` for a new credential right away, bypassing
    /// the expiry check. A missing `refresh_token` in the response keeps the
    /// one passed in.
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh(&self, refresh_token: &str) -> Result<Credential> {
        let credential = self
            .flow()
            .refresh(Some(refresh_token))
            .await?
            .or_refresh_token(Some(refresh_token));
        self.coordinator
            .install(credential.clone(), CredentialEvent::Refreshed(credential))
            .await
    }

    /// Cached credential, if any (possibly expired)
    pub async fn cached_credential(&self) -> Option<Credential> {
        self.coordinator.cached().await
    }

    /// Whether the cached credential grants every scope in `scopes`
    pub async fn is_authorized_for<'a>(&self, scopes: impl IntoIterator<Item = &'a str>) -> bool {
        self.coordinator
            .cached()
            .await
            .is_some_and(|c| c.is_authorized_for(scopes))
    }

    /// Log out: forget the cached credential and erase the stored one
    pub async fn deauthorize(&self) -> Result<()> {
        self.coordinator.clear().await
    }

    /// Retry saving the cached credential after a persistence failure
    pub async fn persist(&self) -> Result<()> {
        self.coordinator.persist().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CredentialEvent> {
        self.coordinator.subscribe()
    }

    pub(crate) async fn install_acquired(&self, credential: Credential) -> Result<Credential> {
        self.coordinator
            .install(credential.clone(), CredentialEvent::Acquired(credential))
            .await
    }
}

#[async_trait::async_trait]
impl<F: RefreshFlow> CredentialProvider for Authenticator<F> {
    async fn credential(&self, invalidating_previous: bool) -> Result<Credential> {
        self.refresh_if_needed(invalidating_previous).await
    }
}
