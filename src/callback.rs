//! Authorization callback handling.
//!
//! The authorization server redirects the browser back with
//! `?code=...&state=...` on success, or `?error=...` when the user was
//! turned away. This module validates those query parameters, hands the
//! code and state to the session manager, and renders a small HTML page
//! telling the user what happened. The [`router`] serves the callback on
//! the loopback listener the CLI binds during sign-in.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use serde::Deserialize;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::error::SessionError;
use crate::session::SessionManager;

/// Query parameters from the authorization callback.
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Validate callback parameters and extract the code/state pair.
///
/// An `error` parameter from the authorization server, or a missing
/// code, means the user was not signed in; a missing state token makes
/// the callback unverifiable.
pub fn validate_callback_params(params: &CallbackParams) -> Result<(String, String), SessionError> {
    if let Some(ref error) = params.error {
        let desc = params
            .error_description
            .as_deref()
            .unwrap_or("Unknown error");
        warn!(error = %error, description = %desc, "Authorization server returned an error");
        return Err(SessionError::AuthorizationDenied(format!(
            "{}: {}",
            error, desc
        )));
    }

    let code = params
        .code
        .as_ref()
        .ok_or_else(|| {
            SessionError::AuthorizationDenied(
                "Missing authorization code in callback".to_string(),
            )
        })?
        .clone();

    let state = params.state.as_ref().ok_or(SessionError::InvalidState)?.clone();

    Ok((code, state))
}

/// Shared state for the callback route.
#[derive(Clone)]
struct CallbackState {
    session: Arc<SessionManager>,
    done: mpsc::Sender<Result<(), SessionError>>,
}

/// Build the router serving the authorization callback at `path`.
///
/// The outcome of each callback is reported on `done` so the caller can
/// stop the listener once sign-in concludes.
pub fn router(
    path: &str,
    session: Arc<SessionManager>,
    done: mpsc::Sender<Result<(), SessionError>>,
) -> Router {
    Router::new()
        .route(path, get(handle))
        .layer(TraceLayer::new_for_http())
        .with_state(CallbackState { session, done })
}

async fn handle(
    State(state): State<CallbackState>,
    Query(params): Query<CallbackParams>,
) -> Html<String> {
    let result = match validate_callback_params(&params) {
        Ok((code, state_token)) => state.session.handle_callback(&code, &state_token).await,
        Err(err) => Err(err),
    };

    let page = match &result {
        Ok(()) => success_html(),
        Err(err) => error_html(&err.to_string()),
    };

    let _ = state.done.send(result).await;
    Html(page)
}

// =============================================================================
// HTML Response Generation
// =============================================================================

/// Generate the page shown after a successful sign-in.
pub fn success_html() -> String {
    r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Signed in to ServeX</title>
    <style>
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            display: flex;
            justify-content: center;
            align-items: center;
            min-height: 100vh;
            margin: 0;
            background: #16213e;
            color: #e0e0e0;
        }
        .container { text-align: center; padding: 2rem; max-width: 400px; }
        h1 { color: #34d399; margin-bottom: 1rem; }
        p { color: #9ca3af; }
        .close-hint { font-size: 0.875rem; color: #6b7280; }
    </style>
    <script>
        setTimeout(function() {
            window.close();
        }, 3000);
    </script>
</head>
<body>
    <div class="container">
        <h1>Signed in</h1>
        <p>Your ServeX session is ready. You can return to the app.</p>
        <p class="close-hint">This window will close automatically...</p>
    </div>
</body>
</html>"#
        .to_string()
}

/// Generate the page shown when sign-in fails.
pub fn error_html(detail: &str) -> String {
    let detail = html_escape(detail);
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>ServeX sign-in failed</title>
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            display: flex;
            justify-content: center;
            align-items: center;
            min-height: 100vh;
            margin: 0;
            background: #16213e;
            color: #e0e0e0;
        }}
        .container {{ text-align: center; padding: 2rem; max-width: 500px; }}
        h1 {{ color: #f87171; margin-bottom: 1rem; }}
        p {{ color: #9ca3af; margin-bottom: 1rem; }}
        .error-details {{
            background: rgba(248, 113, 113, 0.1);
            border: 1px solid rgba(248, 113, 113, 0.3);
            border-radius: 8px;
            padding: 1rem;
            margin-top: 1rem;
            text-align: left;
            font-family: monospace;
            color: #f87171;
        }}
    </style>
</head>
<body>
    <div class="container">
        <h1>Sign-in failed</h1>
        <p>We could not verify your identity. Please try signing in again.</p>
        <div class="error-details">{detail}</div>
        <p>Please close this window and try again.</p>
    </div>
</body>
</html>"#
    )
}

/// Simple HTML escaping to prevent XSS.
fn html_escape(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
