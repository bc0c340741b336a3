//! Shared configuration for Indra tools.
//!
//! TOML profiles, platform paths, the credential store backend choice,
//! and translation to `indra_core::SessionConfig`. The CLI adds its
//! flag-aware wrappers on top.

mod keyring_store;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use indra_core::{CredentialStore, FileCredentialStore, PollInterval, SessionConfig};

pub use keyring_store::KeyringCredentialStore;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no profile named '{profile}'")]
    NoProfile { profile: String },

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
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named account profiles.
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

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Per-request timeout, seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Polling interval, seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    #[serde(default)]
    pub credential_backend: CredentialBackend,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
            poll_interval: default_poll_interval(),
            credential_backend: CredentialBackend::default(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}
fn default_poll_interval() -> u64 {
    indra_core::DEFAULT_POLL_INTERVAL.as_secs()
}

/// Where the session token and device cache are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialBackend {
    /// `credentials.json` in the platform data directory, mode 0600.
    #[default]
    File,
    /// The OS keyring.
    Keyring,
}

/// A named account profile.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Profile {
    /// Account email the magic link is sent to.
    pub email: String,

    /// API root. Defaults to the public Indra API.
    pub api_url: Option<String>,

    /// Override polling interval, seconds (30-300).
    pub poll_interval: Option<u64>,

    /// Override request timeout, seconds.
    pub timeout: Option<u64>,

    pub credential_backend: Option<CredentialBackend>,

    /// Operating-system tag sent with magic-link requests.
    pub os_tag: Option<String>,

    /// How long an emailed link stays redeemable.
    pub challenge_ttl_mins: Option<u64>,

    /// Estimated token lifetime.
    pub token_lifetime_hours: Option<u64>,

    /// Refresh this long before the estimated expiry.
    pub refresh_margin_mins: Option<u64>,

    /// Discard stored credentials older than this. `0` disables the check.
    pub max_offline_days: Option<u64>,

    /// Attempts per read on transient failures, including the first.
    pub retry_attempts: Option<u32>,
}

impl Profile {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            ..Self::default()
        }
    }

    pub fn backend(&self, defaults: &Defaults) -> CredentialBackend {
        self.credential_backend.unwrap_or(defaults.credential_backend)
    }
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("uk.co", "indra", "indra")
}

fn home_fallback(parts: &[&str]) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.extend(parts);
    p
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(&[".config", "indra", "config.toml"]),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Directory for persisted session state.
pub fn data_dir() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(&[".local", "share", "indra"]),
        |dirs| dirs.data_dir().to_path_buf(),
    )
}

/// File used by the `file` credential backend.
pub fn credentials_path() -> PathBuf {
    data_dir().join("credentials.json")
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file. `INDRA_`-prefixed variables override it,
/// with `__` separating nesting levels (`INDRA_DEFAULTS__POLL_INTERVAL`).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("INDRA_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
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

// ── Profile resolution ──────────────────────────────────────────────

/// Pick the named profile, falling back to the configured default.
pub fn resolve_profile<'a>(
    cfg: &'a Config,
    name: Option<&str>,
) -> Result<(String, &'a Profile), ConfigError> {
    let name = name
        .or(cfg.default_profile.as_deref())
        .unwrap_or("default")
        .to_owned();
    match cfg.profiles.get(&name) {
        Some(profile) => Ok((name, profile)),
        None => Err(ConfigError::NoProfile { profile: name }),
    }
}

fn validation(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

fn secs(count: u64, unit: u64) -> Duration {
    Duration::from_secs(count.saturating_mul(unit))
}

/// Build a `SessionConfig` from a profile.
pub fn profile_to_session_config(
    profile: &Profile,
    defaults: &Defaults,
) -> Result<SessionConfig, ConfigError> {
    let email = profile.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(validation("email", format!("not an email address: '{email}'")));
    }

    let raw_url = profile
        .api_url
        .as_deref()
        .unwrap_or(indra_api::DEFAULT_API_URL);
    let api_url: url::Url = raw_url
        .parse()
        .map_err(|_| validation("api_url", format!("invalid URL: {raw_url}")))?;

    let poll_secs = profile.poll_interval.unwrap_or(defaults.poll_interval);
    let poll_interval =
        PollInterval::from_secs(poll_secs).map_err(|e| validation("poll_interval", e.to_string()))?;

    let mut config = SessionConfig::new(email, api_url);
    config.poll_interval = poll_interval;
    config.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    if let Some(ref os_tag) = profile.os_tag {
        config.os_tag.clone_from(os_tag);
    }

    if let Some(mins) = profile.challenge_ttl_mins {
        config.auth.challenge_ttl = secs(mins, MINUTE);
    }
    if let Some(hours) = profile.token_lifetime_hours {
        config.auth.token_lifetime = secs(hours, HOUR);
    }
    if let Some(mins) = profile.refresh_margin_mins {
        config.auth.refresh_margin = secs(mins, MINUTE);
    }
    if let Some(days) = profile.max_offline_days {
        config.auth.max_offline = (days > 0).then(|| secs(days, DAY));
    }
    if config.auth.refresh_margin >= config.auth.token_lifetime {
        return Err(validation(
            "refresh_margin_mins",
            "must be shorter than the token lifetime",
        ));
    }

    if let Some(attempts) = profile.retry_attempts {
        if attempts == 0 {
            return Err(validation("retry_attempts", "must be at least 1"));
        }
        config.retry.max_attempts = attempts;
    }

    Ok(config)
}

/// Open the credential store a profile asks for.
pub fn open_credential_store(profile: &Profile, defaults: &Defaults) -> Arc<dyn CredentialStore> {
    match profile.backend(defaults) {
        CredentialBackend::File => Arc::new(FileCredentialStore::new(credentials_path())),
        CredentialBackend::Keyring => Arc::new(KeyringCredentialStore::new()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn profile() -> Profile {
        Profile::new("driver@example.com")
    }

    #[test]
    fn defaults_produce_a_valid_session_config() {
        let config = profile_to_session_config(&profile(), &Defaults::default()).unwrap();
        assert_eq!(config.email, "driver@example.com");
        assert_eq!(config.api_url.as_str(), "https://api.indra.co.uk/");
        assert_eq!(config.poll_interval.get(), Duration::from_secs(60));
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.os_tag, "1");
    }

    #[test]
    fn poll_interval_outside_window_is_rejected() {
        for secs in [10, 301] {
            let mut p = profile();
            p.poll_interval = Some(secs);
            let err = profile_to_session_config(&p, &Defaults::default()).unwrap_err();
            assert!(
                matches!(err, ConfigError::Validation { ref field, .. } if field == "poll_interval"),
                "{err}"
            );
        }
    }

    #[test]
    fn policy_overrides_apply() {
        let mut p = profile();
        p.challenge_ttl_mins = Some(5);
        p.token_lifetime_hours = Some(2);
        p.refresh_margin_mins = Some(15);
        p.max_offline_days = Some(0);
        p.retry_attempts = Some(5);

        let config = profile_to_session_config(&p, &Defaults::default()).unwrap();
        assert_eq!(config.auth.challenge_ttl, Duration::from_secs(300));
        assert_eq!(config.auth.token_lifetime, Duration::from_secs(7200));
        assert_eq!(config.auth.refresh_margin, Duration::from_secs(900));
        assert_eq!(config.auth.max_offline, None);
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn inconsistent_policy_is_rejected() {
        let mut p = profile();
        p.token_lifetime_hours = Some(1);
        p.refresh_margin_mins = Some(60);
        assert!(profile_to_session_config(&p, &Defaults::default()).is_err());

        let mut p = profile();
        p.retry_attempts = Some(0);
        assert!(profile_to_session_config(&p, &Defaults::default()).is_err());

        let mut p = profile();
        p.email = "nobody".into();
        assert!(profile_to_session_config(&p, &Defaults::default()).is_err());

        let mut p = profile();
        p.api_url = Some("not a url".into());
        assert!(profile_to_session_config(&p, &Defaults::default()).is_err());
    }

    #[test]
    fn save_then_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = Config::default();
        let mut p = profile();
        p.poll_interval = Some(120);
        p.credential_backend = Some(CredentialBackend::Keyring);
        cfg.profiles.insert("default".into(), p);
        save_config_to(&cfg, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("credential_backend = \"keyring\""), "{text}");

        let loaded = load_config_from(&path).unwrap();
        let (name, loaded_profile) = resolve_profile(&loaded, None).unwrap();
        assert_eq!(name, "default");
        assert_eq!(loaded_profile.poll_interval, Some(120));
        assert_eq!(
            loaded_profile.backend(&loaded.defaults),
            CredentialBackend::Keyring
        );
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.defaults.poll_interval, 60);
        assert_eq!(cfg.defaults.credential_backend, CredentialBackend::File);
        assert!(matches!(
            resolve_profile(&cfg, Some("home")),
            Err(ConfigError::NoProfile { .. })
        ));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "defaults = 3").unwrap();
        assert!(matches!(
            load_config_from(&path),
            Err(ConfigError::Figment(_))
        ));
    }
}
