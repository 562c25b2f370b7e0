//! PKCE (Proof Key for Code Exchange) and OAuth state generation.
//!
//! Provides the cryptographic material for the authorization-code flow:
//! - Code verifier generation (32 random bytes, hex-encoded to 64 chars)
//! - S256 code challenge derivation using SHA-256
//! - Random state tokens for CSRF protection (256 bits of entropy)

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use sha2::{Digest, Sha256};

/// PKCE challenge method constant.
const PKCE_METHOD: &str = "S256";

/// Random bytes behind a code verifier. Hex encoding doubles this to 64
/// characters, inside the 43-128 range RFC 7636 requires.
const VERIFIER_BYTES: usize = 32;

/// Random bytes behind a state token (43 characters base64url encoded).
const STATE_BYTES: usize = 32;

/// PKCE (Proof Key for Code Exchange) data.
///
/// Contains a code verifier and its corresponding challenge for use
/// in the OAuth 2.0 authorization code flow with PKCE.
#[derive(Debug, Clone)]
pub struct Pkce {
    /// The code verifier (secret, used during token exchange).
    pub verifier: String,

    /// The code challenge (sent in the authorization URL).
    /// SHA-256 hash of the verifier, base64url encoded without padding.
    pub challenge: String,

    /// The challenge method (always "S256").
    pub method: &'static str,
}

impl Pkce {
    /// Generate a new PKCE verifier/challenge pair.
    ///
    /// The verifier is 32 cryptographically random bytes hex-encoded; the
    /// challenge is the SHA-256 hash of the verifier's UTF-8 bytes,
    /// base64url encoded without padding.
    #[must_use]
    pub fn generate() -> Self {
        let bytes: [u8; VERIFIER_BYTES] = rand::rng().random();
        let verifier = hex::encode(bytes);
        let challenge = Self::compute_challenge(&verifier);

        Self {
            verifier,
            challenge,
            method: PKCE_METHOD,
        }
    }

    /// Compute the S256 challenge from a verifier.
    #[must_use]
    pub fn compute_challenge(verifier: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(verifier.as_bytes());
        let hash = hasher.finalize();
        URL_SAFE_NO_PAD.encode(hash)
    }
}

/// Generate a random OAuth state token.
///
/// 32 cryptographically random bytes, base64url encoded without padding.
/// State tokens correlate a callback with the login that initiated it and
/// must never be predictable or reused.
#[must_use]
pub fn generate_state() -> String {
    let bytes: [u8; STATE_BYTES] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(bytes)
}
