//! Proof Key for Code Exchange (RFC 7636) helpers

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};

use crate::errors::{AuthError, Result};

/// Random bytes behind a verifier; 64 bytes encode to 86 characters,
/// inside the 43..=128 range the RFC allows
const VERIFIER_BYTES: usize = 64;
const STATE_BYTES: usize = 32;

/// A code verifier and its S256 challenge
#[derive(Clone, PartialEq, Eq)]
pub struct ProofKey {
    pub verifier: String,
    pub challenge: String,
}

impl ProofKey {
    pub fn generate() -> Result<Self> {
        let verifier = generate_code_verifier()?;
        let challenge = code_challenge(&verifier);
        Ok(Self { verifier, challenge })
    }
}

impl std::fmt::Debug for ProofKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProofKey")
            .field("verifier", &"[REDACTED]")
            .field("challenge", &self.challenge)
            .finish()
    }
}

fn random_urlsafe(len: usize) -> Result<String> {
    let mut bytes = vec![0u8; len];
    getrandom::fill(&mut bytes)
        .map_err(|e| AuthError::config(format!("System randomness unavailable: {}", e)))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

pub fn generate_code_verifier() -> Result<String> {
    random_urlsafe(VERIFIER_BYTES)
}

/// Anti-forgery `state` value for authorization URLs
pub fn generate_state() -> Result<String> {
    random_urlsafe(STATE_BYTES)
}

/// `BASE64URL(SHA256(verifier))`, the S256 method
pub fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}
