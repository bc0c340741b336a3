use thiserror::Error;

/// Top-level error type for the `indra-api` crate.
///
/// Classifies every failure by where it happened: the HTTP status the
/// vendor returned, the network underneath it, or the payload it sent back.
/// `indra-core` maps these into the session-level taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The bearer token was refused (HTTP 401 or 403).
    #[error("Unauthorized (HTTP {status})")]
    Unauthorized { status: u16 },

    /// A token endpoint answered 200 but the body is not a usable token.
    #[error("Token endpoint returned no usable token ({length} characters)")]
    InvalidToken { length: usize },

    // ── HTTP status ─────────────────────────────────────────────────
    /// Any other 4xx response. Not worth retrying.
    #[error("Request rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// A 5xx response from the vendor.
    #[error("Server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The base URL cannot carry path segments (e.g. `mailto:`).
    #[error("Base URL cannot be used for API paths: {0}")]
    UnusableBaseUrl(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if the token was refused and a refresh might help.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// Returns `true` if this is a transient error worth retrying.
    ///
    /// Request-builder and body-decode failures are programming or payload
    /// errors, everything else reqwest reports is the network.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => !e.is_builder() && !e.is_decode(),
            Self::Server { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` for a non-auth 4xx.
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized { status }
            | Self::Rejected { status, .. }
            | Self::Server { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let unauthorized = Error::Unauthorized { status: 403 };
        assert!(unauthorized.is_unauthorized());
        assert!(!unauthorized.is_transient());
        assert_eq!(unauthorized.status(), Some(403));

        let server = Error::Server {
            status: 503,
            message: "maintenance".into(),
        };
        assert!(server.is_transient());
        assert!(!server.is_rejected());

        let rejected = Error::Rejected {
            status: 404,
            message: "no such device".into(),
        };
        assert!(rejected.is_rejected());
        assert!(!rejected.is_transient());

        assert!(!Error::InvalidToken { length: 2 }.is_transient());
    }
}
