//! Display-identity extraction from JWT payloads.
//!
//! The payload segment is base64url-decoded and parsed as JSON without any
//! signature or expiry verification. The result is advisory, for greetings
//! and account menus only; authorization decisions never consult it.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Display identity decoded from a token payload.
///
/// All fields are optional; providers differ in which claims they emit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserIdentity {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
}

impl UserIdentity {
    /// Best available display string: full name, then username, then email.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .or(self.preferred_username.as_deref())
            .or(self.email.as_deref())
    }
}

/// Decode the display identity carried in a JWT-shaped token.
///
/// Returns `None` for any malformed input: wrong segment count, invalid
/// base64url, or a payload that is not a JSON object. Absence of identity
/// is a normal outcome, not an error.
#[must_use]
pub fn decode_for_display(token: &str) -> Option<UserIdentity> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(identity) => Some(identity),
        Err(err) => {
            debug!("token payload is not an identity object: {err}");
            None
        }
    }
}
