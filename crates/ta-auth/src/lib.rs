//! OAuth token lifecycle for the tonearm client
//!
//! This crate acquires, caches and refreshes access credentials for the
//! accounts service, making sure concurrent demand results in a single
//! refresh request.
//!
//! # Flows
//!
//! - [`ProofKeyAuthenticator`]: authorization code with PKCE, for public clients
//! - [`AuthorizationCodeAuthenticator`]: authorization code with a client secret
//! - [`ClientCredentialsAuthenticator`]: app-only access, no user involved
//!
//! All three share one [`RefreshCoordinator`]. Token endpoint calls go
//! through `ta_core`'s recovery handler, so transient failures are retried.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ta_auth::{AuthConfig, MemoryCredentialStore, ProofKey, ProofKeyAuthenticator};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuthConfig::new("my-client-id", "http://127.0.0.1:8888/callback".parse()?)
//!     .with_scopes(["user-read-private"]);
//! let auth = ProofKeyAuthenticator::new(config, Arc::new(MemoryCredentialStore::new()))?;
//!
//! let proof_key = ProofKey::generate()?;
//! let state = ta_auth::pkce::generate_state()?;
//! println!("Visit: {}", auth.authorize_url(&proof_key, Some(&state))?);
//!
//! // After the user approves, the browser lands on the redirect URI...
//! let redirect = "http://127.0.0.1:8888/callback?code=...&state=...";
//! auth.acquire(redirect, &proof_key.verifier, Some(&state)).await?;
//!
//! // Later: cached until it expires, then refreshed exactly once
//! let credential = auth.refresh_if_needed(false).await?;
//! println!("Expires at {}", credential.expires_at());
//! # Ok(())
//! # }
//! ```
//!
//! # Important Notes
//!
//! - Tokens are redacted from `Debug` output and never logged
//! - A [`AuthError::Persistence`] failure means the new credential is cached
//!   in memory but could not be saved; call `persist()` to retry the save

pub mod config;
pub mod coordinator;
pub mod credential;
pub mod endpoint;
pub mod errors;
pub mod file_store;
pub mod flows;
pub mod models;
pub mod pkce;
pub mod store;

// Re-export main types
pub use config::AuthConfig;
pub use coordinator::{CredentialEvent, RefreshCoordinator, RefreshFlow};
pub use credential::Credential;
pub use endpoint::TokenEndpoint;
pub use errors::{AuthError, Result};
pub use file_store::JsonFileCredentialStore;
pub use flows::{
    Authenticator, AuthorizationCodeAuthenticator, AuthorizationCodeFlow,
    ClientCredentialsAuthenticator, ClientCredentialsFlow, CredentialProvider,
    ProofKeyAuthenticator, ProofKeyFlow,
};
pub use models::{TokenErrorResponse, TokenResponse};
pub use pkce::ProofKey;
pub use store::{CredentialStore, MemoryCredentialStore};
