//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use indra_config::ConfigError;
use indra_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const UNSUPPORTED: i32 = 5;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Authentication ───────────────────────────────────────────────
    #[error("Not signed in")]
    #[diagnostic(code(indra::not_signed_in), help("Run: indra login"))]
    NotSignedIn,

    #[error("Session expired")]
    #[diagnostic(
        code(indra::session_expired),
        help("The Indra cloud no longer accepts the stored token.\nRun: indra login")
    )]
    SessionExpired,

    #[error("Sign-in failed: {message}")]
    #[diagnostic(
        code(indra::auth_failed),
        help(
            "Magic links are single-use and expire after a few minutes.\n\
             Request a fresh one with: indra login --force"
        )
    )]
    AuthFailed { message: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("Charger '{identifier}' not found")]
    #[diagnostic(
        code(indra::not_found),
        help("Run: indra devices --refresh to see the chargers on this account")
    )]
    NotFound { identifier: String },

    #[error("Several chargers on this account: {available}")]
    #[diagnostic(
        code(indra::ambiguous_device),
        help("Name one by uid or name, e.g. indra snapshot <DEVICE>")
    )]
    AmbiguousDevice { available: String },

    #[error("{command} is not supported by charger {device}")]
    #[diagnostic(code(indra::unsupported))]
    Unsupported { command: String, device: String },

    // ── Remote ───────────────────────────────────────────────────────
    #[error("Could not reach the Indra cloud: {message}")]
    #[diagnostic(
        code(indra::connection_failed),
        help("Check your network connection and try again.")
    )]
    Connection { message: String },

    #[error("Indra API error: {message}")]
    #[diagnostic(code(indra::api_error))]
    ApiError { message: String },

    #[error("No fresh reading for '{device}': {reason}")]
    #[diagnostic(
        code(indra::stale),
        help("The last good reading is shown with -o json. Try again shortly.")
    )]
    Stale { device: String, reason: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(indra::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(indra::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: indra config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No account configured")]
    #[diagnostic(
        code(indra::no_config),
        help(
            "Create a profile with: indra config init\n\
             Or pass --email / set INDRA_EMAIL.\n\
             Expected config at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error("{message}")]
    #[diagnostic(code(indra::config))]
    Config { message: String },

    #[error("Credential storage failed: {message}")]
    #[diagnostic(
        code(indra::credential_store),
        help("Switch backends with: indra config init --backend file")
    )]
    CredentialStore { message: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render JSON: {0}")]
    #[diagnostic(code(indra::json))]
    Json(#[from] serde_json::Error),

    #[error("Failed to render YAML: {0}")]
    #[diagnostic(code(indra::yaml))]
    Yaml(#[from] serde_yaml::Error),

    #[error("Internal error: {0}")]
    #[diagnostic(code(indra::internal))]
    Internal(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotSignedIn | Self::SessionExpired | Self::AuthFailed { .. } => exit_code::AUTH,
            Self::NotFound { .. } | Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::Unsupported { .. } => exit_code::UNSUPPORTED,
            Self::Connection { .. } | Self::Stale { .. } => exit_code::CONNECTION,
            Self::Validation { .. } | Self::AmbiguousDevice { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::AuthRequest { message } | CoreError::AuthExchange { message } => {
                CliError::AuthFailed { message }
            }
            CoreError::AuthExpired => CliError::SessionExpired,
            CoreError::NotAuthenticated => CliError::NotSignedIn,
            CoreError::Transient { message, .. } => CliError::Connection { message },
            CoreError::RequestRejected { status, message } => CliError::ApiError {
                message: format!("HTTP {status}: {message}"),
            },
            CoreError::UnsupportedCommand {
                command,
                device_uid,
            } => CliError::Unsupported {
                command,
                device: device_uid,
            },
            CoreError::DeviceNotFound { device_uid } => CliError::NotFound {
                identifier: device_uid,
            },
            CoreError::CredentialStore { message } => CliError::CredentialStore { message },
            CoreError::Config { message } => CliError::Config { message },
            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoProfile { profile } => CliError::ProfileNotFound {
                name: profile,
                available: "(run: indra config profiles)".into(),
            },
            other => CliError::Config {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_keep_their_exit_class() {
        assert_eq!(CliError::from(CoreError::AuthExpired).exit_code(), exit_code::AUTH);
        assert_eq!(
            CliError::from(CoreError::Transient {
                message: "503".into(),
                status: Some(503),
            })
            .exit_code(),
            exit_code::CONNECTION
        );
        assert_eq!(
            CliError::from(CoreError::UnsupportedCommand {
                command: "solar_enable".into(),
                device_uid: "d".into(),
            })
            .exit_code(),
            exit_code::UNSUPPORTED
        );
        assert_eq!(
            CliError::from(CoreError::DeviceNotFound {
                device_uid: "d".into(),
            })
            .exit_code(),
            exit_code::NOT_FOUND
        );
    }

    #[test]
    fn config_validation_is_a_usage_error() {
        let err = CliError::from(ConfigError::Validation {
            field: "poll_interval".into(),
            reason: "too short".into(),
        });
        assert_eq!(err.exit_code(), exit_code::USAGE);
    }
}
