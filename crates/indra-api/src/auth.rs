// Passwordless (magic-link) authentication
//
// The vendor never sees a password. The client asks the "check" endpoint to
// email a link, receives a one-time hash, and after the user clicks the link
// the "token" endpoint trades that hash for a bearer token. Token
// validation and renewal go through the regular bearer-authenticated
// endpoints.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::{IndraClient, read_body};
use crate::endpoint::Endpoint;
use crate::error::Error;

/// Shortest body the token endpoints return when a token was actually issued.
/// Anything shorter is a status string, not a JWT.
pub const MIN_TOKEN_LEN: usize = 51;

/// Operating-system tag sent in the magic-link paths.
pub const DEFAULT_OS_TAG: &str = "1";

// ── Identifiers ──────────────────────────────────────────────────────

/// Per-install device key the vendor binds a login to.
///
/// Generated once and then persisted: a new key for the same account is a
/// new "phone" as far as the vendor is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MobileKey(String);

impl MobileKey {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MobileKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for MobileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Bearer token ─────────────────────────────────────────────────────

/// A bearer token. `Debug` never prints the secret.
#[derive(Debug, Clone)]
pub struct BearerToken(SecretString);

impl BearerToken {
    /// Parse a token endpoint body: a JSON string (quotes optional) that
    /// must be at least [`MIN_TOKEN_LEN`] characters long.
    pub fn parse(body: &str) -> Option<Self> {
        let token = unquote(body);
        (token.len() >= MIN_TOKEN_LEN).then(|| Self(SecretString::from(token.to_owned())))
    }

    /// Wrap an already-validated token (e.g. one restored from storage).
    pub fn from_secret(secret: SecretString) -> Self {
        Self(secret)
    }

    pub fn expose(&self) -> &SecretString {
        &self.0
    }
}

impl From<String> for BearerToken {
    fn from(value: String) -> Self {
        Self(SecretString::from(value))
    }
}

impl PartialEq for BearerToken {
    fn eq(&self, other: &Self) -> bool {
        self.0.expose_secret() == other.0.expose_secret()
    }
}

impl Eq for BearerToken {}

/// Strip whitespace and one pair of surrounding double quotes.
pub(crate) fn unquote(body: &str) -> &str {
    let trimmed = body.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed)
}

// ── Endpoints ────────────────────────────────────────────────────────

impl IndraClient {
    /// Ask the vendor to email a magic link.
    ///
    /// `GET /api/user/check/{email}/{mobileKey}/{os}`. Returns the one-time
    /// hash the token endpoint expects. Some accounts get an empty hash, in
    /// which case the hash must come from the link itself.
    pub async fn request_magic_link(
        &self,
        email: &str,
        mobile_key: &MobileKey,
        os_tag: &str,
    ) -> Result<String, Error> {
        let url = self.url(&["api", "user", "check", email, mobile_key.as_str(), os_tag])?;
        debug!("requesting magic link");

        let resp = self.http().get(url).send().await?;
        let body = read_body(resp).await?;
        Ok(unquote(&body).to_owned())
    }

    /// Trade a redeemed hash for a bearer token.
    ///
    /// `GET /api/user/token/{email}/{mobileKey}/{hash}/{os}`. Returns
    /// `Ok(None)` while the link has not been clicked yet (the vendor then
    /// answers 200 with a short status body).
    pub async fn exchange_token(
        &self,
        email: &str,
        mobile_key: &MobileKey,
        hash: &str,
        os_tag: &str,
    ) -> Result<Option<BearerToken>, Error> {
        let url = self.url(&[
            "api",
            "user",
            "token",
            email,
            mobile_key.as_str(),
            hash,
            os_tag,
        ])?;
        debug!("exchanging magic-link hash for a token");

        let resp = self.http().get(url).send().await?;
        let body = read_body(resp).await?;
        Ok(BearerToken::parse(&body))
    }

    /// Check whether a token is still accepted.
    ///
    /// `GET /api/authorize/validate`. A 401/403 is a definitive "no"; every
    /// other failure is returned as an error so callers can tell a dead
    /// token from a dead network.
    pub async fn validate_token(&self, token: &BearerToken) -> Result<bool, Error> {
        match self.execute_raw(&Endpoint::ValidateToken, token).await {
            Ok(_) => Ok(true),
            Err(Error::Unauthorized { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Renew a token. `GET /api/authorize/refresh`.
    pub async fn refresh_token(&self, token: &BearerToken) -> Result<BearerToken, Error> {
        let body = self.execute_raw(&Endpoint::RefreshToken, token).await?;
        BearerToken::parse(&body).ok_or(Error::InvalidToken {
            length: unquote(&body).len(),
        })
    }
}
