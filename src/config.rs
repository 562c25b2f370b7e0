use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Environment override tracking
// ---------------------------------------------------------------------------

/// Tracks which configuration settings are overridden by environment variables.
///
/// Overridden settings beat the config file; the tracking lets diagnostics
/// (e.g. `status` output) show where an effective value came from.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    overrides: HashMap<String, String>,
}

impl EnvOverrides {
    /// Check whether a setting key (e.g. "oauth.client_id") is overridden by an env var.
    pub fn is_overridden(&self, key: &str) -> bool {
        self.overrides.contains_key(key)
    }

    /// Get the env var name that overrides the given setting key.
    pub fn env_var_for(&self, key: &str) -> Option<&str> {
        self.overrides.get(key).map(String::as_str)
    }

    /// Get all overrides as a map of setting key -> env var name.
    pub fn all(&self) -> &HashMap<String, String> {
        &self.overrides
    }

    fn record(&mut self, key: &str, env_var: &str) {
        self.overrides.insert(key.to_string(), env_var.to_string());
    }
}

// ---------------------------------------------------------------------------
// Main configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Env var overrides are not serialized to TOML.
    #[serde(skip)]
    pub env_overrides: EnvOverrides,
}

/// Authorization server endpoints and client registration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OAuthConfig {
    #[serde(default = "default_authorization_endpoint")]
    pub authorization_endpoint: String,
    #[serde(default = "default_token_endpoint")]
    pub token_endpoint: String,
    #[serde(default = "default_logout_endpoint")]
    pub logout_endpoint: String,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Secret for confidential clients. Leave unset for public clients;
    /// PKCE carries the proof instead.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default = "default_scope")]
    pub scope: String,
    #[serde(default = "default_true")]
    pub use_pkce: bool,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_post_logout_redirect_uri")]
    pub post_logout_redirect_uri: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            authorization_endpoint: default_authorization_endpoint(),
            token_endpoint: default_token_endpoint(),
            logout_endpoint: default_logout_endpoint(),
            client_id: default_client_id(),
            client_secret: None,
            scope: default_scope(),
            use_pkce: true,
            redirect_uri: default_redirect_uri(),
            post_logout_redirect_uri: default_post_logout_redirect_uri(),
        }
    }
}

impl OAuthConfig {
    /// Socket address and path of the redirect URI, for binding the local
    /// callback listener.
    pub fn redirect_addr(&self) -> anyhow::Result<(String, String)> {
        let url = url::Url::parse(&self.redirect_uri)?;
        let host = url
            .host_str()
            .ok_or_else(|| anyhow::anyhow!("redirect_uri has no host: {}", self.redirect_uri))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| anyhow::anyhow!("redirect_uri has no port: {}", self.redirect_uri))?;
        Ok((format!("{host}:{port}"), url.path().to_string()))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_backend")]
    pub backend: StorageBackend,
    #[serde(default = "default_storage_dir")]
    pub dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            dir: default_storage_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    File,
    Keyring,
    Memory,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Keyring => write!(f, "keyring"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

impl FromStr for StorageBackend {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(Self::File),
            "keyring" => Ok(Self::Keyring),
            "memory" => Ok(Self::Memory),
            _ => Err(format!("Unknown storage backend: {s}")),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

fn default_authorization_endpoint() -> String {
    "http://127.0.0.1:8180/realms/ServeX/protocol/openid-connect/auth".to_string()
}
fn default_token_endpoint() -> String {
    "http://127.0.0.1:8180/realms/ServeX/protocol/openid-connect/token".to_string()
}
fn default_logout_endpoint() -> String {
    "http://127.0.0.1:8180/realms/ServeX/protocol/openid-connect/logout".to_string()
}
fn default_client_id() -> String {
    "servexclient".to_string()
}
fn default_scope() -> String {
    "openid profile email".to_string()
}
const fn default_true() -> bool {
    true
}
fn default_redirect_uri() -> String {
    "http://localhost:4200/auth/callback".to_string()
}
fn default_post_logout_redirect_uri() -> String {
    "http://localhost:4200".to_string()
}
fn default_storage_backend() -> StorageBackend {
    StorageBackend::File
}
fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("servex")
        .join("session")
}
fn default_log_level() -> String {
    "info".to_string()
}

// ---------------------------------------------------------------------------
// Config loading and env overrides
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a TOML file, then apply environment variable
    /// overrides. Any setting prefixed with `SERVEX_` takes precedence over
    /// the file value and is tracked in `env_overrides`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            config
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Every supported setting has a corresponding `SERVEX_*` env var. When
    /// set, the env var value replaces the file/default value and the setting
    /// key is recorded in `env_overrides`.
    fn apply_env_overrides(&mut self) {
        let mut ov = EnvOverrides::default();

        // -- Helpers (macros for concise per-field overrides) --

        macro_rules! env_str {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = val;
                    ov.record($key, $env);
                }
            };
        }
        macro_rules! env_bool {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
                    ov.record($key, $env);
                }
            };
        }
        macro_rules! env_path {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = PathBuf::from(val);
                    ov.record($key, $env);
                }
            };
        }
        macro_rules! env_opt_str {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = if val.is_empty() { None } else { Some(val) };
                    ov.record($key, $env);
                }
            };
        }

        // -- OAuth --
        env_str!(
            "oauth.authorization_endpoint",
            "SERVEX_OAUTH_AUTH_URL",
            self.oauth.authorization_endpoint
        );
        env_str!(
            "oauth.token_endpoint",
            "SERVEX_OAUTH_TOKEN_URL",
            self.oauth.token_endpoint
        );
        env_str!(
            "oauth.logout_endpoint",
            "SERVEX_OAUTH_LOGOUT_URL",
            self.oauth.logout_endpoint
        );
        env_str!("oauth.client_id", "SERVEX_OAUTH_CLIENT_ID", self.oauth.client_id);
        env_opt_str!(
            "oauth.client_secret",
            "SERVEX_OAUTH_CLIENT_SECRET",
            self.oauth.client_secret
        );
        env_str!("oauth.scope", "SERVEX_OAUTH_SCOPE", self.oauth.scope);
        env_bool!("oauth.use_pkce", "SERVEX_OAUTH_USE_PKCE", self.oauth.use_pkce);
        env_str!(
            "oauth.redirect_uri",
            "SERVEX_OAUTH_REDIRECT_URI",
            self.oauth.redirect_uri
        );
        env_str!(
            "oauth.post_logout_redirect_uri",
            "SERVEX_OAUTH_POST_LOGOUT_URI",
            self.oauth.post_logout_redirect_uri
        );

        // -- Storage --
        if let Ok(val) = std::env::var("SERVEX_STORAGE_BACKEND") {
            if let Ok(backend) = val.parse() {
                self.storage.backend = backend;
                ov.record("storage.backend", "SERVEX_STORAGE_BACKEND");
            }
        }
        env_path!("storage.dir", "SERVEX_STORAGE_DIR", self.storage.dir);

        // -- Logging --
        env_str!("logging.level", "SERVEX_LOG_LEVEL", self.logging.level);
        env_bool!("logging.json", "SERVEX_LOG_JSON", self.logging.json);

        self.env_overrides = ov;
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            oauth: OAuthConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
            env_overrides: EnvOverrides::default(),
        }
    }
}

// Helper for default storage directory
mod dirs {
    use std::path::PathBuf;

    pub fn data_local_dir() -> Option<PathBuf> {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local").join("share"))
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
