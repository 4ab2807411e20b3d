//! Shared configuration for the cornea client.
//!
//! TOML profiles, session token resolution (env + keyring + plaintext),
//! and translation to `cornea_core::CoreConfig`. The core never reads
//! files; everything it needs is built here.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use cornea_core::{CoreConfig, RetryPolicy};

/// Environment variable that overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "CORNEA_CONFIG";

const KEYRING_SERVICE: &str = "cornea";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("unknown profile '{profile}'")]
    UnknownProfile { profile: String },

    #[error("no session token configured for profile '{profile}'")]
    NoToken { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named platform profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Look up `name`, or the default profile when `name` is `None`.
    pub fn profile<'a>(
        &'a self,
        name: Option<&'a str>,
    ) -> Result<(&'a str, &'a Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get(name)
            .map(|profile| (name, profile))
            .ok_or_else(|| ConfigError::UnknownProfile {
                profile: name.into(),
            })
    }

    /// Core tuning for `profile` (or the bare defaults).
    pub fn core_config(&self, profile: Option<&Profile>) -> CoreConfig {
        let timeout = profile
            .and_then(|p| p.request_timeout)
            .unwrap_or(self.defaults.request_timeout);
        let debounce = profile
            .and_then(|p| p.view_debounce_ms)
            .unwrap_or(self.defaults.view_debounce_ms);
        CoreConfig {
            request_timeout: Duration::from_secs(timeout),
            view_debounce: Duration::from_millis(debounce),
            retry: RetryPolicy {
                delay: Duration::from_secs(self.defaults.retry_delay),
                max_attempts: self.defaults.retry_attempts,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    #[serde(default = "default_view_debounce_ms")]
    pub view_debounce_ms: u64,

    /// Fixed delay between retries, in seconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,

    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            request_timeout: default_request_timeout(),
            view_debounce_ms: default_view_debounce_ms(),
            retry_delay: default_retry_delay(),
            retry_attempts: default_retry_attempts(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_request_timeout() -> u64 {
    30
}
fn default_view_debounce_ms() -> u64 {
    100
}
fn default_retry_delay() -> u64 {
    5
}
fn default_retry_attempts() -> u32 {
    3
}

/// A named platform profile.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    /// Platform endpoint (e.g., "wss://platform.example.com/client").
    pub platform: String,

    /// Place to activate after login.
    pub place: Option<String>,

    /// Session token (plaintext, prefer keyring or env var).
    pub token: Option<String>,

    /// Environment variable name containing the session token.
    pub token_env: Option<String>,

    /// Override request timeout (seconds).
    pub request_timeout: Option<u64>,

    /// Override view debounce (milliseconds).
    pub view_debounce_ms: Option<u64>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path: `CORNEA_CONFIG`, then platform
/// conventions, then `~/.config/cornea`.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }
    ProjectDirs::from("com", "cornea", "cornea").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("cornea");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` + environment. A missing file yields the defaults.
///
/// Env keys nest on a double underscore:
/// `CORNEA_DEFAULTS__REQUEST_TIMEOUT=10`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("CORNEA_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if anything goes wrong.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Session settings ────────────────────────────────────────────────

/// Everything needed to open a platform session for one profile.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub profile: String,
    pub platform: Url,
    pub place: Option<String>,
    pub token: SecretString,
}

/// Resolve the session token: profile's `token_env` → keyring →
/// plaintext.
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Profile's token_env → env var lookup
    if let Some(val) = profile
        .token_env
        .as_ref()
        .and_then(|name| std::env::var(name).ok())
    {
        return Ok(SecretString::from(val));
    }

    // 2. System keyring
    if let Some(secret) = keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/token"))
        .ok()
        .and_then(|entry| entry.get_password().ok())
    {
        return Ok(SecretString::from(secret));
    }

    // 3. Plaintext in config
    if let Some(ref token) = profile.token {
        return Ok(SecretString::from(token.clone()));
    }

    Err(ConfigError::NoToken {
        profile: profile_name.into(),
    })
}

/// Validate a platform endpoint. Only websocket and http(s) schemes are
/// accepted.
pub fn parse_platform_url(raw: &str) -> Result<Url, ConfigError> {
    let url: Url = raw.parse().map_err(|_| ConfigError::Validation {
        field: "platform".into(),
        reason: format!("invalid URL: {raw}"),
    })?;
    match url.scheme() {
        "ws" | "wss" | "http" | "https" => Ok(url),
        other => Err(ConfigError::Validation {
            field: "platform".into(),
            reason: format!("unsupported scheme '{other}'"),
        }),
    }
}

/// Build `SessionSettings` from a profile.
pub fn session_settings(
    profile: &Profile,
    profile_name: &str,
) -> Result<SessionSettings, ConfigError> {
    let platform = parse_platform_url(&profile.platform)?;
    let token = resolve_token(profile, profile_name)?;
    Ok(SessionSettings {
        profile: profile_name.into(),
        platform,
        place: profile.place.clone(),
        token,
    })
}
