//! Attaching session credentials to outgoing requests.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::SessionError;
use crate::session::SessionManager;

/// Trait for authenticating HTTP requests.
///
/// Implementations add an Authorization header (or equivalent) so API
/// clients stay decoupled from where credentials come from.
#[async_trait]
pub trait RequestAuthorizer: Send + Sync {
    /// Authenticate the request builder.
    async fn authorize(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, SessionError>;
}

/// [`RequestAuthorizer`] backed by the session manager.
///
/// Each request asks the session for a fresh access token, so the
/// refresh-ahead logic runs exactly where staleness would be observed.
/// When no token is available the request goes out unmodified; it never
/// triggers a sign-in and the resource server decides what to reject.
#[derive(Clone)]
pub struct SessionAuthorizer {
    session: Arc<SessionManager>,
}

impl SessionAuthorizer {
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl RequestAuthorizer for SessionAuthorizer {
    async fn authorize(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, SessionError> {
        match self.session.valid_access_token().await {
            Some(token) => Ok(request.bearer_auth(token)),
            None => Ok(request),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OAuthConfig;
    use crate::endpoint::TokenEndpoint;
    use crate::store::{MemorySessionStore, SessionStore};
    use crate::token::{TokenResponse, TokenSet};
    use chrono::{Duration, Utc};

    struct NoEndpoint;

    #[async_trait]
    impl TokenEndpoint for NoEndpoint {
        async fn exchange_code(
            &self,
            _code: &str,
            _verifier: Option<&str>,
        ) -> Result<TokenResponse, SessionError> {
            panic!("no network expected");
        }

        async fn exchange_refresh(
            &self,
            _refresh_token: &str,
        ) -> Result<TokenResponse, SessionError> {
            panic!("no network expected");
        }
    }

    fn session_with_tokens(tokens: Option<TokenSet>) -> Arc<SessionManager> {
        let store = MemorySessionStore::new();
        if let Some(tokens) = tokens {
            store
                .put(
                    crate::store::StoreKey::Tokens,
                    &serde_json::to_string(&tokens).unwrap(),
                )
                .unwrap();
        }
        Arc::new(SessionManager::new(
            OAuthConfig::default(),
            Arc::new(store),
            Arc::new(NoEndpoint),
        ))
    }

    #[tokio::test]
    async fn test_authorize_adds_bearer_header() {
        let session = session_with_tokens(Some(TokenSet {
            access_token: "AT-1".to_string(),
            refresh_token: None,
            id_token: None,
            expires_at: Utc::now() + Duration::seconds(300),
            refresh_expires_at: None,
        }));
        session.restore().await.unwrap();

        let authorizer = SessionAuthorizer::new(session);
        let client = reqwest::Client::new();
        let request = authorizer
            .authorize(client.get("http://127.0.0.1:9/orders"))
            .await
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(
            request.headers().get("authorization").unwrap(),
            "Bearer AT-1"
        );
    }

    #[tokio::test]
    async fn test_authorize_without_session_passes_through() {
        let session = session_with_tokens(None);
        let authorizer = SessionAuthorizer::new(session);
        let client = reqwest::Client::new();

        let request = authorizer
            .authorize(client.get("http://127.0.0.1:9/orders"))
            .await
            .unwrap()
            .build()
            .unwrap();

        assert!(request.headers().get("authorization").is_none());
    }
}
