//! OAuth session management for the ServeX admin console.
//!
//! Implements the authorization-code flow with PKCE against the realm's
//! authorization server: sign-in, callback handling, token refresh with
//! a safety margin, persistence across restarts, and sign-out.

pub mod authorize;
pub mod callback;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod identity;
pub mod pkce;
pub mod session;
pub mod store;
pub mod token;

pub use authorize::{RequestAuthorizer, SessionAuthorizer};
pub use config::Config;
pub use error::SessionError;
pub use identity::UserIdentity;
pub use session::{SessionManager, SessionState, SessionStatus};
pub use store::{SessionStore, StoreKey};
pub use token::TokenSet;
