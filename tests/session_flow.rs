//! End-to-end tests of the sign-in flow over the real stack: file-backed
//! storage, the HTTP token endpoint client, and the axum callback
//! listener, with wiremock standing in for the authorization server.

use std::path::Path;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use servex_auth::config::OAuthConfig;
use servex_auth::endpoint::HttpTokenEndpoint;
use servex_auth::pkce::Pkce;
use servex_auth::store::{FileSessionStore, SessionStore, StoreKey};
use servex_auth::{SessionError, SessionManager, TokenSet};

fn token_json(access: &str, expires_in: i64, refresh: Option<&str>) -> serde_json::Value {
    let mut body = serde_json::json!({
        "access_token": access,
        "expires_in": expires_in,
        "token_type": "Bearer",
    });
    if let Some(refresh) = refresh {
        body["refresh_token"] = serde_json::json!(refresh);
        body["refresh_expires_in"] = serde_json::json!(86400);
    }
    body
}

fn with_id_token(mut body: serde_json::Value, claims: &str) -> serde_json::Value {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims);
    body["id_token"] = serde_json::json!(format!("{header}.{payload}.sig"));
    body
}

fn manager_for(server: &MockServer, dir: &Path) -> Arc<SessionManager> {
    let config = OAuthConfig {
        token_endpoint: format!("{}/token", server.uri()),
        ..OAuthConfig::default()
    };
    let store = Arc::new(FileSessionStore::new(dir));
    let endpoint = Arc::new(HttpTokenEndpoint::new(config.clone()).unwrap());
    Arc::new(SessionManager::new(config, store, endpoint))
}

fn query_param(url: &Url, name: &str) -> String {
    url.query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
        .unwrap()
}

#[tokio::test]
async fn test_full_sign_in_flow() {
    // 1. Stand in for the authorization server's token endpoint
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let manager = manager_for(&server, dir.path());

    // 2. Begin sign-in and pick the flow artifacts out of the URL
    let url = manager.login("/orders").unwrap();
    let state = query_param(&url, "state");
    let store = FileSessionStore::new(dir.path());
    let verifier = store.get(StoreKey::Verifier).unwrap().unwrap();
    assert_eq!(
        query_param(&url, "code_challenge"),
        Pkce::compute_challenge(&verifier)
    );

    // 3. The code exchange must carry the verifier that was stored
    let body = with_id_token(
        token_json("AT-1", 300, Some("RT-1")),
        r#"{"name":"Dana Diner","email":"dana@servex.example"}"#,
    );
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=code-1"))
        .and(body_string_contains(format!("code_verifier={verifier}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1)
        .mount(&server)
        .await;

    // 4. Complete the callback
    manager.handle_callback("code-1", &state).await.unwrap();

    assert!(manager.is_authenticated());
    assert_eq!(
        manager.current_user().unwrap().display_name(),
        Some("Dana Diner")
    );
    assert_eq!(manager.consume_redirect_path(), "/orders");
    assert_eq!(manager.valid_access_token().await.as_deref(), Some("AT-1"));

    // 5. Single-use artifacts are gone from disk
    assert!(store.get(StoreKey::State).unwrap().is_none());
    assert!(store.get(StoreKey::Verifier).unwrap().is_none());
}

#[tokio::test]
async fn test_expiring_token_is_refreshed_over_http() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let manager = manager_for(&server, dir.path());

    // 1. The exchange hands out an access token already inside the
    //    refresh margin
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_json("AT-1", 3, Some("RT-1"))))
        .expect(1)
        .mount(&server)
        .await;

    // 2. The next token request must go through the refresh grant
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=RT-1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(token_json("AT-2", 300, Some("RT-2"))),
        )
        .expect(1)
        .mount(&server)
        .await;

    let url = manager.login("/").unwrap();
    let state = query_param(&url, "state");
    manager.handle_callback("code-1", &state).await.unwrap();

    assert_eq!(manager.valid_access_token().await.as_deref(), Some("AT-2"));

    // 3. The rotated pair is what reaches disk
    let store = FileSessionStore::new(dir.path());
    let persisted: TokenSet =
        serde_json::from_str(&store.get(StoreKey::Tokens).unwrap().unwrap()).unwrap();
    assert_eq!(persisted.access_token, "AT-2");
    assert_eq!(persisted.refresh_token.as_deref(), Some("RT-2"));
}

#[tokio::test]
async fn test_session_survives_restart() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    {
        let manager = manager_for(&server, dir.path());
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(with_id_token(
                token_json("AT-1", 300, Some("RT-1")),
                r#"{"preferred_username":"dana"}"#,
            )))
            .mount(&server)
            .await;

        let url = manager.login("/").unwrap();
        let state = query_param(&url, "state");
        manager.handle_callback("code-1", &state).await.unwrap();
    }

    // A fresh manager over the same directory picks the session back up
    // without contacting the server again.
    let manager = manager_for(&server, dir.path());
    manager.restore().await.unwrap();

    assert!(manager.is_authenticated());
    assert_eq!(manager.current_user().unwrap().display_name(), Some("dana"));
    assert_eq!(manager.valid_access_token().await.as_deref(), Some("AT-1"));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_callback_listener_round_trip() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let manager = manager_for(&server, dir.path());

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(token_json("AT-1", 300, Some("RT-1"))),
        )
        .mount(&server)
        .await;

    // 1. Begin sign-in and serve the callback route the way the CLI does
    let url = manager.login("/").unwrap();
    let state = query_param(&url, "state");

    let (done_tx, mut done_rx) = tokio::sync::mpsc::channel(1);
    let app = servex_auth::callback::router("/auth/callback", manager.clone(), done_tx);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // 2. Play the browser following the provider redirect
    let response = reqwest::get(format!(
        "http://{addr}/auth/callback?code=code-1&state={state}"
    ))
    .await
    .unwrap();
    assert_eq!(response.status(), 200);
    let page = response.text().await.unwrap();
    assert!(page.contains("Signed in"));

    // 3. The listener reports the outcome and the session is live
    done_rx.recv().await.unwrap().unwrap();
    assert!(manager.is_authenticated());
}

#[tokio::test]
async fn test_denied_callback_reports_error() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let manager = manager_for(&server, dir.path());

    manager.login("/").unwrap();

    let (done_tx, mut done_rx) = tokio::sync::mpsc::channel(1);
    let app = servex_auth::callback::router("/auth/callback", manager.clone(), done_tx);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // The provider reports the user cancelled; no code is exchanged.
    let response = reqwest::get(format!(
        "http://{addr}/auth/callback?error=access_denied&error_description=User+cancelled"
    ))
    .await
    .unwrap();
    let page = response.text().await.unwrap();
    assert!(page.contains("Sign-in failed"));

    let outcome = done_rx.recv().await.unwrap();
    assert!(matches!(outcome, Err(SessionError::AuthorizationDenied(_))));
    assert!(!manager.is_authenticated());
    assert!(server.received_requests().await.unwrap().is_empty());
}
