use ta_core::{HttpTimeouts, RecoveryPolicy};
use url::Url;

/// Accounts service endpoints
pub mod endpoints {
    pub const AUTHORIZE: &str = "https://accounts.spotify.com/authorize";
    pub const TOKEN: &str = "https://accounts.spotify.com/api/token";
}

/// Grant types sent in the `grant_type` form field
pub mod grant {
    pub const AUTHORIZATION_CODE: &str = "authorization_code";
    pub const REFRESH_TOKEN: &str = "refresh_token";
    pub const CLIENT_CREDENTIALS: &str = "client_credentials";
}

/// Configuration shared by every authenticator flow
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// OAuth client ID
    pub client_id: String,

    /// Required by the authorization-code and client-credentials flows
    pub client_secret: Option<String>,

    /// Redirect URI registered for the client
    pub redirect_uri: Url,

    /// Requested scopes
    pub scopes: Vec<String>,

    /// Ask the user to approve again even if they already did
    pub show_dialog: bool,

    pub authorize_url: Url,

    pub token_url: Url,

    /// HTTP client timeouts
    pub http_timeouts: HttpTimeouts,

    /// Custom user agent (optional)
    pub user_agent: Option<String>,

    /// Retry policy for token endpoint requests
    pub recovery: RecoveryPolicy,
}

impl AuthConfig {
    pub fn new(client_id: impl Into<String>, redirect_uri: Url) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            redirect_uri,
            scopes: Vec::new(),
            show_dialog: false,
            authorize_url: Url::parse(endpoints::AUTHORIZE).expect("valid authorize URL"),
            token_url: Url::parse(endpoints::TOKEN).expect("valid token URL"),
            http_timeouts: HttpTimeouts::default(),
            user_agent: Some("tonearm".to_string()),
            recovery: RecoveryPolicy::default(),
        }
    }

    pub fn with_client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(client_secret.into());
        self
    }

    pub fn with_scopes<S: Into<String>>(mut self, scopes: impl IntoIterator<Item = S>) -> Self {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_token_url(mut self, token_url: Url) -> Self {
        self.token_url = token_url;
        self
    }

    pub fn with_authorize_url(mut self, authorize_url: Url) -> Self {
        self.authorize_url = authorize_url;
        self
    }

    pub fn with_recovery(mut self, recovery: RecoveryPolicy) -> Self {
        self.recovery = recovery;
        self
    }

    /// Scopes joined the way the wire format expects them
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }
}
