//! Token set model and expiry checks.
//!
//! [`TokenResponse`] is the raw JSON body the token endpoint returns;
//! [`TokenSet`] is the persisted form with lifetimes resolved to absolute
//! instants at issuance. The session manager owns the single living
//! `TokenSet` and mirrors it into storage.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Safety margin for access-token expiry checks (5 seconds).
///
/// A token with less than this much validity left is treated as already
/// expired, covering clock skew and request latency.
pub const EXPIRY_MARGIN_MS: i64 = 5000;

/// Raw response body from the token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Access-token lifetime in seconds.
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Refresh-token lifetime in seconds, if the server reports one.
    #[serde(default)]
    pub refresh_expires_in: Option<i64>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// The current token set.
///
/// Either fully absent (unauthenticated) or carrying a non-empty access
/// token with its absolute expiry instant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenSet {
    /// Bearer credential, opaque to this system.
    pub access_token: String,

    /// Present only if the authorization server issued one.
    pub refresh_token: Option<String>,

    /// Signed identity assertion, decoded for display only.
    pub id_token: Option<String>,

    /// Absolute access-token expiry instant.
    pub expires_at: DateTime<Utc>,

    /// Absolute refresh-token expiry instant, if the server reported a
    /// lifetime.
    #[serde(default)]
    pub refresh_expires_at: Option<DateTime<Utc>>,
}

impl TokenSet {
    /// Build a token set from a token-endpoint response, resolving the
    /// reported lifetimes to absolute instants.
    #[must_use]
    pub fn from_response(response: TokenResponse) -> Self {
        let now = Utc::now();
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            id_token: response.id_token,
            expires_at: now + Duration::seconds(response.expires_in),
            refresh_expires_at: response
                .refresh_expires_in
                .map(|secs| now + Duration::seconds(secs)),
        }
    }

    /// Whether less than the safety margin of validity remains.
    #[must_use]
    pub fn needs_refresh(&self) -> bool {
        Utc::now() + Duration::milliseconds(EXPIRY_MARGIN_MS) >= self.expires_at
    }

    /// Whether the access-token expiry has passed outright (no margin).
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Whether a refresh-token expiry was reported and has passed.
    #[must_use]
    pub fn refresh_expired(&self) -> bool {
        self.refresh_expires_at
            .is_some_and(|at| Utc::now() >= at)
    }

    /// The token whose payload carries the user identity: the identity
    /// token when present, the access token otherwise.
    #[must_use]
    pub fn identity_token(&self) -> &str {
        self.id_token.as_deref().unwrap_or(&self.access_token)
    }

    /// Seconds until the access token expires (zero if already expired).
    #[must_use]
    pub fn expires_in_secs(&self) -> u64 {
        (self.expires_at - Utc::now())
            .num_seconds()
            .try_into()
            .unwrap_or(0)
    }

    /// Seconds until the refresh token expires, if a lifetime is known.
    #[must_use]
    pub fn refresh_expires_in_secs(&self) -> Option<u64> {
        self.refresh_expires_at
            .map(|at| (at - Utc::now()).num_seconds().try_into().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_set(expires_at: DateTime<Utc>) -> TokenSet {
        TokenSet {
            access_token: "access".to_string(),
            refresh_token: Some("refresh".to_string()),
            id_token: None,
            expires_at,
            refresh_expires_at: None,
        }
    }

    #[test]
    fn test_from_response_resolves_lifetimes() {
        let before = Utc::now();
        let tokens = TokenSet::from_response(TokenResponse {
            access_token: "T1".to_string(),
            expires_in: 3600,
            refresh_token: Some("R1".to_string()),
            refresh_expires_in: Some(7200),
            id_token: None,
            token_type: "Bearer".to_string(),
        });
        let after = Utc::now();

        assert_eq!(tokens.access_token, "T1");
        assert_eq!(tokens.refresh_token.as_deref(), Some("R1"));
        assert!(tokens.expires_at >= before + Duration::seconds(3600));
        assert!(tokens.expires_at <= after + Duration::seconds(3600));
        let refresh_at = tokens.refresh_expires_at.unwrap();
        assert!(refresh_at >= before + Duration::seconds(7200));
        assert!(refresh_at <= after + Duration::seconds(7200));
    }

    #[test]
    fn test_from_response_without_refresh_lifetime() {
        let tokens = TokenSet::from_response(TokenResponse {
            access_token: "T1".to_string(),
            expires_in: 60,
            refresh_token: None,
            refresh_expires_in: None,
            id_token: None,
            token_type: "Bearer".to_string(),
        });
        assert!(tokens.refresh_token.is_none());
        assert!(tokens.refresh_expires_at.is_none());
        assert!(!tokens.refresh_expired());
    }

    #[test]
    fn test_needs_refresh_inside_margin() {
        let tokens = token_set(Utc::now() + Duration::milliseconds(3000));
        assert!(tokens.needs_refresh());
        assert!(!tokens.is_expired());
    }

    #[test]
    fn test_needs_refresh_outside_margin() {
        let tokens = token_set(Utc::now() + Duration::milliseconds(10_000));
        assert!(!tokens.needs_refresh());
        assert!(!tokens.is_expired());
    }

    #[test]
    fn test_expired_token() {
        let tokens = token_set(Utc::now() - Duration::seconds(1));
        assert!(tokens.needs_refresh());
        assert!(tokens.is_expired());
        assert_eq!(tokens.expires_in_secs(), 0);
    }

    #[test]
    fn test_refresh_expired() {
        let mut tokens = token_set(Utc::now() + Duration::seconds(60));
        tokens.refresh_expires_at = Some(Utc::now() - Duration::milliseconds(1));
        assert!(tokens.refresh_expired());

        tokens.refresh_expires_at = Some(Utc::now() + Duration::seconds(60));
        assert!(!tokens.refresh_expired());
    }

    #[test]
    fn test_identity_token_prefers_id_token() {
        let mut tokens = token_set(Utc::now() + Duration::seconds(60));
        assert_eq!(tokens.identity_token(), "access");

        tokens.id_token = Some("identity".to_string());
        assert_eq!(tokens.identity_token(), "identity");
    }

    #[test]
    fn test_serde_round_trip() {
        let tokens = TokenSet {
            access_token: "access".to_string(),
            refresh_token: Some("refresh".to_string()),
            id_token: Some("id".to_string()),
            expires_at: Utc::now() + Duration::seconds(3600),
            refresh_expires_at: Some(Utc::now() + Duration::seconds(7200)),
        };
        let json = serde_json::to_string(&tokens).unwrap();
        let parsed: TokenSet = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, tokens);
    }

    #[test]
    fn test_response_defaults() {
        // Only the two required fields present.
        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token":"T1","expires_in":300}"#).unwrap();
        assert_eq!(response.access_token, "T1");
        assert_eq!(response.expires_in, 300);
        assert!(response.refresh_token.is_none());
        assert!(response.refresh_expires_in.is_none());
        assert!(response.id_token.is_none());
        assert_eq!(response.token_type, "Bearer");
    }
}
