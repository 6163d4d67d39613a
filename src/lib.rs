//! tonearm: OAuth token lifecycle and resilient requests for a music
//! catalog API
//!
//! The work is split across two crates, re-exported here:
//!
//! - [`ta_auth`]: credentials, stores, the three authenticator flows and the
//!   single-flight refresh coordinator
//! - [`ta_core`]: transport, retry classification with backoff, and rate
//!   limit tracking
//!
//! [`TonearmClient`] ties them together for resource requests, and
//! [`ClientConfig`] reads the settings for both from a TOML file.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tonearm::{ClientConfig, ProofKeyAuthenticator, TonearmClient};
//!
//! # async fn example() -> Result<(), tonearm::Error> {
//! let config = ClientConfig::load("tonearm.toml").await?;
//! let store = Arc::new(config.credential_store().await?);
//! let auth = ProofKeyAuthenticator::new(config.auth_config()?, store)?;
//!
//! let client = TonearmClient::from_config(&config, Arc::new(auth))?;
//! let album: serde_json::Value = client.get_json("albums/4aawyAB9vmqN3uQ7FjRGTy").await?;
//! println!("{}", album["name"]);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;

pub use ta_auth;
pub use ta_core;

pub use client::TonearmClient;
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use ta_auth::{
    AuthConfig, AuthError, AuthorizationCodeAuthenticator, ClientCredentialsAuthenticator,
    Credential, CredentialEvent, CredentialProvider, CredentialStore, JsonFileCredentialStore,
    MemoryCredentialStore, ProofKey, ProofKeyAuthenticator,
};
pub use ta_core::{NetworkRecoveryHandler, RateLimitSnapshot, RecoveryPolicy, RequestError};
