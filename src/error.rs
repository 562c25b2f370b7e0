//! Error types for the session subsystem.

/// Errors that can occur during session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Callback state missing or not matching the stored pending value
    /// (possible CSRF). Fatal to the login attempt.
    #[error("Invalid state token")]
    InvalidState,

    /// PKCE is enabled but no verifier was stored at callback time, e.g.
    /// storage was cleared between the redirect and the return.
    #[error("Missing PKCE verifier")]
    MissingVerifier,

    /// The authorization server denied the authorization request, or the
    /// callback arrived without an authorization code.
    #[error("Authorization failed: {0}")]
    AuthorizationDenied(String),

    /// Non-success response from the token endpoint. The raw body is
    /// preserved for diagnostics; no interpretation beyond logging.
    #[error("Token endpoint returned HTTP {status}: {body}")]
    TokenEndpoint { status: u16, body: String },

    /// Success response from the token endpoint that did not parse.
    #[error("Malformed token response: {0}")]
    MalformedResponse(String),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Session storage error.
    #[error("Storage error: {0}")]
    Storage(String),

    /// An endpoint URL from the configuration did not parse.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Refresh requested with no live session or no refresh token.
    #[error("Not authenticated")]
    NotAuthenticated,
}
