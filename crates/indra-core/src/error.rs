// ── Core error types ──
//
// User-facing errors from indra-core. Consumers never match on HTTP status
// codes directly: the `From<indra_api::Error>` impl folds transport-layer
// failures into the session taxonomy.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Authentication ───────────────────────────────────────────────
    /// The magic-link request could not be issued.
    #[error("Magic link request failed: {message}")]
    AuthRequest { message: String },

    /// The magic link could not be exchanged for a token. Start over with a
    /// new request.
    #[error("Magic link exchange failed: {message}")]
    AuthExchange { message: String },

    /// The token died mid-session and could not be renewed.
    #[error("Session expired -- sign in again")]
    AuthExpired,

    /// No credential is installed.
    #[error("Not signed in")]
    NotAuthenticated,

    // ── Remote ───────────────────────────────────────────────────────
    /// Network failure or 5xx. Retriable; cached state stays valid.
    #[error("Temporary failure talking to the Indra API: {message}")]
    Transient {
        message: String,
        status: Option<u16>,
    },

    /// A non-auth 4xx. Not retried.
    #[error("Request rejected by the Indra API (HTTP {status}): {message}")]
    RequestRejected { status: u16, message: String },

    // ── Local validation ─────────────────────────────────────────────
    #[error("{command} is not supported by device {device_uid}")]
    UnsupportedCommand { command: String, device_uid: String },

    #[error("Device not found: {device_uid}")]
    DeviceNotFound { device_uid: String },

    // ── Persistence / configuration ──────────────────────────────────
    #[error("Credential store error: {message}")]
    CredentialStore { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// The host has to run the magic-link flow again.
    pub fn needs_reauth(&self) -> bool {
        matches!(self, Self::AuthExpired | Self::NotAuthenticated)
    }

    pub(crate) fn credential_store(err: impl std::fmt::Display) -> Self {
        Self::CredentialStore {
            message: err.to_string(),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<indra_api::Error> for CoreError {
    fn from(err: indra_api::Error) -> Self {
        let transient = err.is_transient();
        match err {
            indra_api::Error::Unauthorized { .. } | indra_api::Error::InvalidToken { .. } => {
                CoreError::AuthExpired
            }
            indra_api::Error::Rejected { status, message } => {
                CoreError::RequestRejected { status, message }
            }
            indra_api::Error::Server { status, message } => CoreError::Transient {
                message,
                status: Some(status),
            },
            indra_api::Error::Transport(ref e) if transient => CoreError::Transient {
                message: e.to_string(),
                status: e.status().map(|s| s.as_u16()),
            },
            indra_api::Error::Transport(e) => CoreError::Internal(e.to_string()),
            indra_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid API URL: {e}"),
            },
            indra_api::Error::UnusableBaseUrl(url) => CoreError::Config {
                message: format!("API URL cannot carry paths: {url}"),
            },
            indra_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Unexpected response: {message}"))
            }
        }
    }
}
