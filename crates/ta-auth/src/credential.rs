use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Access token plus expiry and metadata
///
/// Never mutated: a refresh produces a new value that supersedes this one.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credential {
    access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
    token_type: String,
}

impl Credential {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_at: DateTime<Utc>,
        scope: Option<String>,
        token_type: impl Into<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_at,
            scope,
            token_type: token_type.into(),
        }
    }

    /// Build from a relative lifetime, measured from now
    pub fn expiring_in(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in: u64,
        scope: Option<String>,
        token_type: impl Into<String>,
    ) -> Self {
        let secs = i64::try_from(expires_in).unwrap_or(i64::MAX);
        let expires_at = chrono::Duration::try_seconds(secs)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self::new(access_token, refresh_token, expires_at, scope, token_type)
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Expired, or expiring within `tolerance`
    pub fn is_expired_within(&self, tolerance: Duration) -> bool {
        match chrono::Duration::from_std(tolerance) {
            Ok(tolerance) => Utc::now() + tolerance >= self.expires_at,
            Err(_) => true,
        }
    }

    /// Space-separated scope string as a set
    pub fn scopes(&self) -> BTreeSet<&str> {
        self.scope
            .as_deref()
            .map(|s| s.split_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn is_authorized_for<'a>(&self, scopes: impl IntoIterator<Item = &'a str>) -> bool {
        let granted = self.scopes();
        scopes.into_iter().all(|scope| granted.contains(scope))
    }

    /// Keep `previous` as the refresh token when this credential came
    /// without one
    pub fn or_refresh_token(mut self, previous: Option<&str>) -> Self {
        if self.refresh_token.is_none() {
            self.refresh_token = previous.map(str::to_string);
        }
        self
    }

    /// `Authorization` header value
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .field("token_type", &self.token_type)
            .finish()
    }
}
