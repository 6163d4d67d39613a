use serde::{Deserialize, Serialize};

use crate::credential::Credential;
use crate::errors::{AuthError, Result};

/// Token endpoint response (code exchange, refresh and client credentials)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub scope: Option<String>,
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl TokenResponse {
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        let response: Self = serde_json::from_slice(body)?;
        if response.access_token.is_empty() {
            return Err(AuthError::MalformedResponse("empty access_token".to_string()));
        }
        Ok(response)
    }

    /// Convert to a [`Credential`], anchoring `expires_in` at the current instant
    pub fn into_credential(self) -> Credential {
        Credential::expiring_in(
            self.access_token,
            self.refresh_token,
            self.expires_in,
            self.scope,
            self.token_type,
        )
    }
}

/// RFC 6749 error body, e.g. `{"error": "invalid_grant"}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl TokenErrorResponse {
    pub fn from_slice(body: &[u8]) -> Option<Self> {
        serde_json::from_slice(body).ok()
    }

    pub fn is_invalid_grant(&self) -> bool {
        self.error == "invalid_grant"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_full_response() {
        let body = br#"{
            "access_token": "BQD",
            "token_type": "Bearer",
            "scope": "user-read-email",
            "expires_in": 3600,
            "refresh_token": "AQB"
        }"#;

        let credential = TokenResponse::from_slice(body).unwrap().into_credential();
        assert_eq!(credential.access_token(), "BQD");
        assert_eq!(credential.refresh_token(), Some("AQB"));
        assert_eq!(credential.scope(), Some("user-read-email"));
        assert_eq!(credential.token_type(), "Bearer");
        assert!(!credential.is_expired());
    }

    #[test]
    fn test_decode_without_optional_fields() {
        let body = br#"{"access_token": "BQD", "token_type": "Bearer", "expires_in": 3600}"#;

        let credential = TokenResponse::from_slice(body).unwrap().into_credential();
        assert_eq!(credential.refresh_token(), None);
        assert_eq!(credential.scope(), None);
    }

    #[test]
    fn test_malformed_response() {
        let missing_expiry = br#"{"access_token": "BQD", "token_type": "Bearer"}"#;
        assert!(matches!(
            TokenResponse::from_slice(missing_expiry),
            Err(AuthError::MalformedResponse(_))
        ));

        let empty_token = br#"{"access_token": "", "token_type": "Bearer", "expires_in": 1}"#;
        assert!(matches!(
            TokenResponse::from_slice(empty_token),
            Err(AuthError::MalformedResponse(_))
        ));

        assert!(matches!(
            TokenResponse::from_slice(b"<html>"),
            Err(AuthError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_error_body() {
        let body = br#"{"error": "invalid_grant", "error_description": "Refresh token revoked"}"#;
        let error = TokenErrorResponse::from_slice(body).unwrap();
        assert!(error.is_invalid_grant());
        assert_eq!(error.error_description.as_deref(), Some("Refresh token revoked"));
    }
}
