//! Session lifecycle management.
//!
//! [`SessionManager`] owns the single living token set, drives the
//! authorization-code flow from redirect to callback, refreshes tokens
//! behind a single-flight guard, and publishes every lifecycle
//! transition on a watch channel so callers can react to sign-in and
//! sign-out as they happen.

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, watch};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::OAuthConfig;
use crate::endpoint::{HttpTokenEndpoint, TokenEndpoint};
use crate::error::SessionError;
use crate::identity::{UserIdentity, decode_for_display};
use crate::pkce::{self, Pkce};
use crate::store::{SessionStore, StoreKey};
use crate::token::TokenSet;

/// Path callers land on when no redirect path was stored.
pub const DEFAULT_REDIRECT_PATH: &str = "/";

/// Lifecycle state of the session, published on every transition.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SessionState {
    #[default]
    Unauthenticated,
    /// A sign-in redirect has been issued and its callback is awaited.
    AuthorizationPending,
    Authenticated { user: Option<UserIdentity> },
    /// A refresh is in flight; the previous tokens remain the working set.
    Refreshing { user: Option<UserIdentity> },
}

impl SessionState {
    /// Whether a session is established (a refresh in flight still counts).
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. } | Self::Refreshing { .. })
    }

    /// Display identity of the signed-in user, if decoded.
    pub fn user(&self) -> Option<&UserIdentity> {
        match self {
            Self::Authenticated { user } | Self::Refreshing { user } => user.as_ref(),
            _ => None,
        }
    }
}

/// Point-in-time snapshot of the session for diagnostics.
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub authenticated: bool,
    pub expired: bool,
    pub needs_refresh: bool,
    pub expires_in_secs: Option<u64>,
    pub refresh_expires_in_secs: Option<u64>,
    pub user: Option<UserIdentity>,
}

/// Artifacts persisted between issuing the redirect and its callback.
struct PendingAuthorization {
    state: String,
    code_verifier: Option<String>,
    redirect_path: String,
}

impl PendingAuthorization {
    /// Write the pending artifacts to storage. A stale verifier from an
    /// earlier PKCE flow is removed when this flow runs without PKCE.
    fn persist(&self, store: &dyn SessionStore) -> Result<(), SessionError> {
        store.put(StoreKey::State, &self.state)?;
        match &self.code_verifier {
            Some(verifier) => store.put(StoreKey::Verifier, verifier)?,
            None => store.remove(StoreKey::Verifier)?,
        }
        store.put(StoreKey::RedirectPath, &self.redirect_path)?;
        Ok(())
    }
}

/// Manages the OAuth session: sign-in, callback, refresh, sign-out.
pub struct SessionManager {
    config: OAuthConfig,
    store: Arc<dyn SessionStore>,
    endpoint: Arc<dyn TokenEndpoint>,
    /// The single living token set.
    tokens: RwLock<Option<TokenSet>>,
    /// Serializes refreshes so concurrent callers ride one exchange.
    refresh_guard: Mutex<()>,
    /// Serializes pending-state consumption so duplicate callbacks cannot
    /// both redeem the same authorization.
    pending_guard: Mutex<()>,
    state_tx: watch::Sender<SessionState>,
}

impl SessionManager {
    // =========================================================================
    // Construction and observers
    // =========================================================================

    /// Create a session manager over the given storage and token endpoint.
    pub fn new(
        config: OAuthConfig,
        store: Arc<dyn SessionStore>,
        endpoint: Arc<dyn TokenEndpoint>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Unauthenticated);
        Self {
            config,
            store,
            endpoint,
            tokens: RwLock::new(None),
            refresh_guard: Mutex::new(()),
            pending_guard: Mutex::new(()),
            state_tx,
        }
    }

    /// Create a session manager wired to the HTTP token endpoint from config.
    pub fn from_config(
        config: OAuthConfig,
        store: Arc<dyn SessionStore>,
    ) -> Result<Self, SessionError> {
        let endpoint = Arc::new(HttpTokenEndpoint::new(config.clone())?);
        Ok(Self::new(config, store, endpoint))
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state_tx.borrow().clone()
    }

    /// Subscribe to lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Whether a session is currently established.
    pub fn is_authenticated(&self) -> bool {
        self.state().is_authenticated()
    }

    /// Display identity of the signed-in user, if one was decoded.
    pub fn current_user(&self) -> Option<UserIdentity> {
        self.state_tx.borrow().user().cloned()
    }

    /// Point-in-time snapshot for diagnostics.
    pub async fn status(&self) -> SessionStatus {
        let tokens = self.tokens.read().await;
        match tokens.as_ref() {
            Some(t) => SessionStatus {
                authenticated: true,
                expired: t.is_expired(),
                needs_refresh: t.needs_refresh(),
                expires_in_secs: Some(t.expires_in_secs()),
                refresh_expires_in_secs: t.refresh_expires_in_secs(),
                user: self.current_user(),
            },
            None => SessionStatus {
                authenticated: false,
                expired: false,
                needs_refresh: false,
                expires_in_secs: None,
                refresh_expires_in_secs: None,
                user: None,
            },
        }
    }

    fn publish(&self, state: SessionState) {
        self.state_tx.send_replace(state);
    }

    // =========================================================================
    // Flow: login
    // =========================================================================

    /// Begin a sign-in: persist the flow artifacts and return the
    /// authorization URL to send the user to.
    ///
    /// `redirect_path` is the application path to return to once the
    /// callback completes; it is stored until [`Self::consume_redirect_path`]
    /// claims it.
    pub fn login(&self, redirect_path: &str) -> Result<Url, SessionError> {
        let state = pkce::generate_state();
        let challenge = self.config.use_pkce.then(Pkce::generate);

        let pending = PendingAuthorization {
            state,
            code_verifier: challenge.as_ref().map(|p| p.verifier.clone()),
            redirect_path: redirect_path.to_string(),
        };
        pending.persist(self.store.as_ref())?;

        let url = self.authorize_url(&pending.state, challenge.as_ref())?;
        self.publish(SessionState::AuthorizationPending);
        info!("Authorization redirect issued");
        Ok(url)
    }

    fn authorize_url(&self, state: &str, challenge: Option<&Pkce>) -> Result<Url, SessionError> {
        let mut url = Url::parse(&self.config.authorization_endpoint)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &self.config.client_id);
            query.append_pair("response_type", "code");
            query.append_pair("scope", &self.config.scope);
            query.append_pair("redirect_uri", &self.config.redirect_uri);
            if let Some(challenge) = challenge {
                query.append_pair("code_challenge", &challenge.challenge);
                query.append_pair("code_challenge_method", challenge.method);
            }
            query.append_pair("state", state);
        }
        Ok(url)
    }

    // =========================================================================
    // Flow: callback
    // =========================================================================

    /// Complete a sign-in from the authorization callback.
    ///
    /// The stored state and verifier are consumed up front, and consumption
    /// is serialized: when duplicate callbacks race, exactly one of them can
    /// redeem the pending authorization and the rest fail with
    /// [`SessionError::InvalidState`]. A failed callback abandons a pending
    /// authorization, but an established session survives a stray or
    /// duplicate callback.
    pub async fn handle_callback(&self, code: &str, state: &str) -> Result<(), SessionError> {
        let (stored_state, verifier) = {
            let _guard = self.pending_guard.lock().await;
            (
                self.store.take(StoreKey::State)?,
                self.store.take(StoreKey::Verifier)?,
            )
        };

        let Some(expected_state) = stored_state else {
            warn!("Callback received with no pending authorization");
            self.fail_pending();
            return Err(SessionError::InvalidState);
        };
        if state != expected_state {
            warn!("Callback state token does not match the pending authorization");
            self.fail_pending();
            return Err(SessionError::InvalidState);
        }
        if self.config.use_pkce && verifier.is_none() {
            warn!("Pending authorization is missing its code verifier");
            self.fail_pending();
            return Err(SessionError::MissingVerifier);
        }
        let verifier = verifier.filter(|_| self.config.use_pkce);

        let response = match self.endpoint.exchange_code(code, verifier.as_deref()).await {
            Ok(response) => response,
            Err(err) => {
                self.fail_pending();
                return Err(err);
            }
        };

        self.install(TokenSet::from_response(response)).await?;
        info!("Authorization code exchanged, session established");
        Ok(())
    }

    /// Drop back to Unauthenticated after a failed callback, but only when
    /// a pending authorization is what is being abandoned.
    fn fail_pending(&self) {
        self.state_tx.send_if_modified(|state| {
            if matches!(state, SessionState::AuthorizationPending) {
                *state = SessionState::Unauthenticated;
                true
            } else {
                false
            }
        });
    }

    /// Persist and adopt a token set, publishing the authenticated state.
    async fn install(&self, tokens: TokenSet) -> Result<(), SessionError> {
        let serialized = serde_json::to_string(&tokens)
            .map_err(|e| SessionError::Storage(format!("Failed to serialize session: {e}")))?;
        self.store.put(StoreKey::Tokens, &serialized)?;

        let user = decode_for_display(tokens.identity_token());
        *self.tokens.write().await = Some(tokens);
        self.publish(SessionState::Authenticated { user });
        Ok(())
    }

    // =========================================================================
    // Flow: token access and refresh
    // =========================================================================

    /// The current access token, refreshed first if it is about to expire.
    ///
    /// Returns `None` when no usable token can be produced; the session is
    /// signed out locally in that case so callers always observe a
    /// consistent state.
    pub async fn valid_access_token(&self) -> Option<String> {
        {
            let tokens = self.tokens.read().await;
            match tokens.as_ref() {
                None => return None,
                Some(t) if !t.needs_refresh() => return Some(t.access_token.clone()),
                Some(_) => {}
            }
        }

        let _guard = self.refresh_guard.lock().await;

        // Re-check under the guard: a concurrent caller may have already
        // refreshed (or torn down) the session while we waited.
        let expired_without_refresh = {
            let tokens = self.tokens.read().await;
            match tokens.as_ref() {
                None => return None,
                Some(t) if !t.needs_refresh() => return Some(t.access_token.clone()),
                Some(t) => t.refresh_token.is_none(),
            }
        };

        if expired_without_refresh {
            info!("Access token expired with no refresh token, signing out locally");
            self.clear_local().await;
            return None;
        }

        match self.refresh_holding_guard().await {
            Ok(()) => {
                let tokens = self.tokens.read().await;
                tokens.as_ref().map(|t| t.access_token.clone())
            }
            Err(_) => None,
        }
    }

    /// Refresh the session tokens now, regardless of remaining lifetime.
    ///
    /// Fails with [`SessionError::NotAuthenticated`] when there is no
    /// session or no refresh token. A rejected refresh signs the session
    /// out locally before the error is returned.
    pub async fn refresh(&self) -> Result<(), SessionError> {
        let _guard = self.refresh_guard.lock().await;
        self.refresh_holding_guard().await
    }

    /// One refresh attempt. Caller must hold `refresh_guard`.
    async fn refresh_holding_guard(&self) -> Result<(), SessionError> {
        let (refresh_token, prior_refresh_expires_at) = {
            let tokens = self.tokens.read().await;
            let Some(tokens) = tokens.as_ref() else {
                return Err(SessionError::NotAuthenticated);
            };
            let Some(refresh_token) = tokens.refresh_token.clone() else {
                return Err(SessionError::NotAuthenticated);
            };
            (refresh_token, tokens.refresh_expires_at)
        };

        debug!("Refreshing session tokens");
        self.publish(SessionState::Refreshing {
            user: self.current_user(),
        });

        let outcome = match self.endpoint.exchange_refresh(&refresh_token).await {
            Ok(response) => {
                let mut tokens = TokenSet::from_response(response);
                // A response that omits the refresh token keeps the prior
                // one, along with its expiry.
                if tokens.refresh_token.is_none() {
                    tokens.refresh_token = Some(refresh_token);
                    if tokens.refresh_expires_at.is_none() {
                        tokens.refresh_expires_at = prior_refresh_expires_at;
                    }
                }
                self.install(tokens).await
            }
            Err(err) => Err(err),
        };

        match outcome {
            Ok(()) => {
                info!("Session tokens refreshed");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "Token refresh failed, signing out locally");
                self.clear_local().await;
                Err(err)
            }
        }
    }

    // =========================================================================
    // Flow: logout and restore
    // =========================================================================

    /// Terminate the session locally and produce the provider's
    /// end-session URL.
    ///
    /// Local state is cleared unconditionally; whether to navigate to the
    /// returned URL is the caller's choice.
    pub async fn logout(&self) -> Result<Url, SessionError> {
        self.clear_local().await;
        info!("Signed out locally");
        self.end_session_url()
    }

    fn end_session_url(&self) -> Result<Url, SessionError> {
        let mut url = Url::parse(&self.config.logout_endpoint)?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair(
                "post_logout_redirect_uri",
                &self.config.post_logout_redirect_uri,
            );
        Ok(url)
    }

    /// Clear persisted and in-memory session state. Storage failures are
    /// logged; the in-memory session ends regardless.
    async fn clear_local(&self) {
        if let Err(err) = self.store.remove(StoreKey::Tokens) {
            warn!(error = %err, "Failed to clear persisted session");
        }
        *self.tokens.write().await = None;
        self.publish(SessionState::Unauthenticated);
    }

    /// Adopt a previously persisted session, if one is present and alive.
    ///
    /// A record that cannot be parsed or has expired (either token) is
    /// discarded from storage and the session stays signed out. Restore
    /// never contacts the authorization server.
    pub async fn restore(&self) -> Result<(), SessionError> {
        let Some(raw) = self.store.get(StoreKey::Tokens)? else {
            debug!("No persisted session");
            return Ok(());
        };

        let tokens: TokenSet = match serde_json::from_str(&raw) {
            Ok(tokens) => tokens,
            Err(err) => {
                warn!(error = %err, "Discarding unreadable session record");
                self.store.remove(StoreKey::Tokens)?;
                return Ok(());
            }
        };

        if tokens.refresh_expired() {
            info!("Persisted refresh token has expired, discarding session");
            self.store.remove(StoreKey::Tokens)?;
            return Ok(());
        }
        if tokens.is_expired() {
            info!("Persisted access token has expired, discarding session");
            self.store.remove(StoreKey::Tokens)?;
            return Ok(());
        }

        let user = decode_for_display(tokens.identity_token());
        *self.tokens.write().await = Some(tokens);
        self.publish(SessionState::Authenticated { user });
        info!("Session restored from storage");
        Ok(())
    }

    // =========================================================================
    // Redirect path
    // =========================================================================

    /// The application path stored at login, consumed on first read.
    /// Defaults to `/` when nothing is stored.
    pub fn consume_redirect_path(&self) -> String {
        match self.store.take(StoreKey::RedirectPath) {
            Ok(Some(path)) => path,
            Ok(None) => DEFAULT_REDIRECT_PATH.to_string(),
            Err(err) => {
                warn!(error = %err, "Failed to read stored redirect path");
                DEFAULT_REDIRECT_PATH.to_string()
            }
        }
    }
}
