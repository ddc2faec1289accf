//! Configuration management

use std::{env, path::Path, path::PathBuf, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Upper bound on dispatch attempts, retries included
pub const MAX_DISPATCH_ATTEMPTS: u32 = 3;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    pub env_files: Vec<String>,
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Identity provider configuration
    pub oauth: OAuthConfig,
    /// CSRF state token configuration
    pub state: StateConfig,
    /// Moderation policy configuration
    pub moderation: ModerationConfig,
    /// Generative backend configuration
    pub dispatch: DispatchConfig,
    /// Conversation persistence configuration
    pub storage: StorageConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Request timeout (must exceed the dispatch timeout)
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Graceful shutdown timeout
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8501,
            request_timeout: Duration::from_secs(45),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

/// OAuth 2.0 identity provider configuration (Google by default)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// Client ID registered with the provider (supports `env:VAR_NAME`)
    pub client_id: String,
    /// Client secret (supports `env:VAR_NAME` and `${VAR}`)
    pub client_secret: String,
    /// Pre-registered redirect URI
    pub redirect_uri: String,
    /// Authorization endpoint
    pub authorization_endpoint: String,
    /// Token endpoint
    pub token_endpoint: String,
    /// User-info endpoint
    pub userinfo_endpoint: String,
    /// Scopes to request
    pub scopes: Vec<String>,
    /// Upper bound for code exchange plus user-info lookup
    #[serde(with = "humantime_serde")]
    pub exchange_timeout: Duration,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: "env:GOOGLE_CLIENT_ID".to_string(),
            client_secret: "env:GOOGLE_CLIENT_SECRET".to_string(),
            redirect_uri: "http://localhost:8501/oauth/callback".to_string(),
            authorization_endpoint: "https://accounts.google.com/o/oauth2/auth".to_string(),
            token_endpoint: "https://oauth2.googleapis.com/token".to_string(),
            userinfo_endpoint: "https://www.googleapis.com/oauth2/v2/userinfo".to_string(),
            scopes: vec![
                "openid".to_string(),
                "https://www.googleapis.com/auth/userinfo.email".to_string(),
                "https://www.googleapis.com/auth/userinfo.profile".to_string(),
            ],
            exchange_timeout: Duration::from_secs(10),
        }
    }
}

impl OAuthConfig {
    /// Resolve the client id (expand `env:` indirection)
    #[must_use]
    pub fn resolve_client_id(&self) -> String {
        resolve_secret(&self.client_id)
    }

    /// Resolve the client secret (expand `env:` indirection)
    #[must_use]
    pub fn resolve_client_secret(&self) -> String {
        resolve_secret(&self.client_secret)
    }
}

/// CSRF state token configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// How long an issued state token stays valid
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(600),
        }
    }
}

/// Moderation policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationConfig {
    /// Include the built-in denylist of phrases and patterns
    pub use_default_denylist: bool,
    /// Extra denied phrases (case-insensitive substring match)
    pub deny_phrases: Vec<String>,
    /// Extra denied patterns (case-insensitive regular expressions)
    pub deny_patterns: Vec<String>,
    /// Log blocked messages (reason only, never the text)
    pub log_blocked: bool,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            use_default_denylist: true,
            deny_phrases: Vec::new(),
            deny_patterns: Vec::new(),
            log_blocked: true,
        }
    }
}

/// Generative backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Backend API base URL
    pub api_base: String,
    /// Model name
    pub model: String,
    /// API key (supports `env:VAR_NAME`)
    pub api_key: String,
    /// How many recent messages are sent as context
    pub context_messages: usize,
    /// Upper bound for one send, retries included
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Replies longer than this are shortened
    pub max_reply_chars: usize,
    /// System instruction override (built-in persona when unset)
    pub system_instruction: Option<String>,
    /// Retry policy
    pub retry: RetryConfig,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            api_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-1.5-flash".to_string(),
            api_key: "env:API_KEY".to_string(),
            context_messages: 20,
            timeout: Duration::from_secs(30),
            max_reply_chars: 800,
            system_instruction: None,
            retry: RetryConfig::default(),
        }
    }
}

impl DispatchConfig {
    /// Resolve the API key (expand `env:` indirection)
    #[must_use]
    pub fn resolve_api_key(&self) -> String {
        resolve_secret(&self.api_key)
    }
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable retries
    pub enabled: bool,
    /// Maximum attempts, first call included
    pub max_attempts: u32,
    /// Initial backoff duration
    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
    /// Backoff multiplier
    pub multiplier: f32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: MAX_DISPATCH_ATTEMPTS,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(4),
            multiplier: 2.0,
        }
    }
}

/// Which persistence backend holds user records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// JSON files in a directory
    File,
    /// Process memory only (lost on restart)
    Memory,
}

/// Conversation persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend kind
    pub backend: StorageBackend,
    /// Directory for the file backend (defaults to `~/.asha/users`)
    pub directory: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            directory: None,
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // Merge environment variables (ASHA_ prefix)
        figment = figment.merge(Env::prefixed("ASHA_").split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        // Env files must be loaded before ${VAR} expansion
        config.load_env_files();
        config.expand_env_vars()?;

        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` describing the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        let retry = &self.dispatch.retry;
        if retry.max_attempts == 0 || retry.max_attempts > MAX_DISPATCH_ATTEMPTS {
            return Err(Error::Config(format!(
                "dispatch.retry.max_attempts must be between 1 and {MAX_DISPATCH_ATTEMPTS}, got {}",
                retry.max_attempts
            )));
        }
        if self.dispatch.context_messages == 0 {
            return Err(Error::Config(
                "dispatch.context_messages must be at least 1".to_string(),
            ));
        }
        if self.server.request_timeout <= self.dispatch.timeout {
            return Err(Error::Config(format!(
                "server.request_timeout ({}s) must exceed dispatch.timeout ({}s)",
                self.server.request_timeout.as_secs_f32(),
                self.dispatch.timeout.as_secs_f32()
            )));
        }
        if self.state.ttl.is_zero() {
            return Err(Error::Config("state.ttl must be positive".to_string()));
        }
        url::Url::parse(&self.oauth.authorization_endpoint).map_err(|e| {
            Error::Config(format!("oauth.authorization_endpoint is not a URL: {e}"))
        })?;
        url::Url::parse(&self.oauth.redirect_uri)
            .map_err(|e| Error::Config(format!("oauth.redirect_uri is not a URL: {e}")))?;
        Ok(())
    }

    /// Blank out literal secrets before the config is displayed
    ///
    /// `env:VAR` references are kept since they name, not hold, a secret.
    pub fn redact_secrets(&mut self) {
        for value in [&mut self.oauth.client_secret, &mut self.dispatch.api_key] {
            if !value.is_empty() && !value.starts_with("env:") {
                *value = "[REDACTED]".to_string();
            }
        }
    }

    /// Load environment files into the process environment.
    /// Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = expand_home(path_str);
            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => tracing::info!("Loaded env file: {expanded}"),
                    Err(e) => tracing::warn!("Failed to load env file {expanded}: {e}"),
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }

    /// Expand ${VAR} and ${VAR:-default} patterns in secret-bearing values
    fn expand_env_vars(&mut self) -> Result<()> {
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}")
            .map_err(|e| Error::Internal(format!("Invalid expansion pattern: {e}")))?;

        for value in [
            &mut self.oauth.client_id,
            &mut self.oauth.client_secret,
            &mut self.oauth.redirect_uri,
            &mut self.dispatch.api_key,
        ] {
            *value = Self::expand_string(&re, value);
        }

        if let Some(dir) = self.storage.directory.as_mut() {
            let expanded = Self::expand_string(&re, &dir.to_string_lossy());
            *dir = PathBuf::from(expand_home(&expanded));
        }
        Ok(())
    }

    /// Expand environment variables in a string
    fn expand_string(re: &Regex, value: &str) -> String {
        re.replace_all(value, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map_or("", |m| m.as_str());
            env::var(var_name).unwrap_or_else(|_| default.to_string())
        })
        .into_owned()
    }
}

/// Resolve `env:VAR_NAME` indirection, leaving literals untouched
fn resolve_secret(value: &str) -> String {
    match value.strip_prefix("env:") {
        Some(var_name) => env::var(var_name).unwrap_or_default(),
        None => value.to_string(),
    }
}

fn expand_home(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.display().to_string(), 1);
        }
    }
    path.to_string()
}
