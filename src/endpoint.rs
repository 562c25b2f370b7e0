//! Token endpoint client.
//!
//! Speaks the two grant types the session uses: `authorization_code`
//! (with optional PKCE verifier) and `refresh_token`. Requests are
//! form-encoded; confidential clients additionally authenticate with an
//! HTTP Basic header built from the client id and secret.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::OAuthConfig;
use crate::error::SessionError;
use crate::token::TokenResponse;

/// Timeout for token endpoint requests.
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Error response shape from the token endpoint.
///
/// Parsed for logging only; callers receive the raw body verbatim.
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Client for the authorization server's token endpoint.
///
/// Abstracted as a trait so session logic can be exercised against a
/// scripted endpoint in tests.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Redeem an authorization code for a token set.
    ///
    /// `verifier` is the PKCE code verifier, present exactly when the
    /// authorization request carried a code challenge.
    async fn exchange_code(
        &self,
        code: &str,
        verifier: Option<&str>,
    ) -> Result<TokenResponse, SessionError>;

    /// Exchange a refresh token for a fresh token set.
    async fn exchange_refresh(&self, refresh_token: &str) -> Result<TokenResponse, SessionError>;
}

/// [`TokenEndpoint`] backed by an HTTP client.
#[derive(Debug, Clone)]
pub struct HttpTokenEndpoint {
    config: OAuthConfig,
    http_client: reqwest::Client,
}

impl HttpTokenEndpoint {
    /// Create a client for the token endpoint named in config.
    ///
    /// Redirects are not followed; a token endpoint that redirects is
    /// misconfigured and surfaces as an error status.
    pub fn new(config: OAuthConfig) -> Result<Self, SessionError> {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            config,
            http_client,
        })
    }

    /// Create a client reusing an existing `reqwest::Client`.
    pub fn with_client(config: OAuthConfig, http_client: reqwest::Client) -> Self {
        Self {
            config,
            http_client,
        }
    }

    /// Authorization header for confidential clients, absent for public
    /// ones.
    fn basic_auth_header(&self) -> Option<String> {
        self.config.client_secret.as_ref().map(|secret| {
            let credentials = STANDARD.encode(format!("{}:{}", self.config.client_id, secret));
            format!("Basic {credentials}")
        })
    }

    async fn post_form(&self, params: &[(&str, &str)]) -> Result<TokenResponse, SessionError> {
        let mut request = self
            .http_client
            .post(&self.config.token_endpoint)
            .form(params);
        if let Some(header) = self.basic_auth_header() {
            request = request.header(reqwest::header::AUTHORIZATION, header);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<TokenErrorResponse>(&body) {
                warn!(
                    error = %error.error,
                    description = ?error.error_description,
                    "Token endpoint rejected the request"
                );
            }
            return Err(SessionError::TokenEndpoint {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            SessionError::MalformedResponse(format!("Failed to parse token response: {}", e))
        })
    }
}

#[async_trait]
impl TokenEndpoint for HttpTokenEndpoint {
    async fn exchange_code(
        &self,
        code: &str,
        verifier: Option<&str>,
    ) -> Result<TokenResponse, SessionError> {
        debug!("Exchanging authorization code for tokens");

        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
        ];
        if let Some(verifier) = verifier {
            params.push(("code_verifier", verifier));
        }

        let tokens = self.post_form(&params).await?;
        debug!("Authorization code exchange successful");
        Ok(tokens)
    }

    async fn exchange_refresh(&self, refresh_token: &str) -> Result<TokenResponse, SessionError> {
        debug!("Refreshing access token");

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
        ];

        let tokens = self.post_form(&params).await?;
        debug!("Token refresh successful");
        Ok(tokens)
    }
}
