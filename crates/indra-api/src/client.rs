// Indra cloud API HTTP client
//
// Wraps `reqwest::Client` with vendor URL construction and status
// classification. The client holds no session state: every authenticated
// call takes the bearer token explicitly, so the session layer above decides
// which token is current and when to refresh it.

use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use url::Url;

use crate::auth::BearerToken;
use crate::endpoint::Endpoint;
use crate::error::Error;
use crate::transport::TransportConfig;

/// Production API root.
pub const DEFAULT_API_URL: &str = "https://api.indra.co.uk";

/// Longest body excerpt carried in error messages.
const BODY_PREVIEW: usize = 200;

/// Raw HTTP client for the Indra cloud API.
#[derive(Debug, Clone)]
pub struct IndraClient {
    http: reqwest::Client,
    base_url: Url,
}

impl IndraClient {
    /// Create a client from a `TransportConfig`.
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, base_url))
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    /// The API base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    // ── URL builder ──────────────────────────────────────────────────

    /// Append percent-encoded path segments to the base URL.
    ///
    /// Segments carry user input (email, device uid), so they are pushed
    /// one by one instead of being formatted into a path string.
    pub(crate) fn url(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::UnusableBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    // ── Authenticated calls ──────────────────────────────────────────

    /// Execute an endpoint with a bearer token and return the JSON body.
    ///
    /// Empty bodies (typical for commands) come back as `Value::Null`.
    pub async fn execute(
        &self,
        endpoint: &Endpoint,
        token: &BearerToken,
    ) -> Result<serde_json::Value, Error> {
        let body = self.execute_raw(endpoint, token).await?;
        if body.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        parse_json(&body)
    }

    /// Execute an endpoint and deserialize the body into `T`.
    pub async fn execute_as<T: DeserializeOwned>(
        &self,
        endpoint: &Endpoint,
        token: &BearerToken,
    ) -> Result<T, Error> {
        let body = self.execute_raw(endpoint, token).await?;
        parse_json(&body)
    }

    /// Execute an endpoint and return the body text untouched.
    pub async fn execute_raw(
        &self,
        endpoint: &Endpoint,
        token: &BearerToken,
    ) -> Result<String, Error> {
        let url = self.url(&endpoint.segments())?;
        debug!("{} {}", endpoint.method(), url);

        let resp = self
            .http
            .request(endpoint.method(), url)
            .bearer_auth(token.expose().expose_secret())
            .send()
            .await?;

        read_body(resp).await
    }
}

// ── Response handling ────────────────────────────────────────────────

/// Classify the status and return the body text on success.
pub(crate) async fn read_body(resp: reqwest::Response) -> Result<String, Error> {
    let status = resp.status();
    trace!(%status, "response");

    if status.is_success() {
        return Ok(resp.text().await?);
    }

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(Error::Unauthorized {
            status: status.as_u16(),
        });
    }

    let raw = resp.text().await.unwrap_or_default();
    let message = if raw.is_empty() {
        status.to_string()
    } else {
        preview(&raw).to_owned()
    };

    if status.is_server_error() {
        Err(Error::Server {
            status: status.as_u16(),
            message,
        })
    } else {
        Err(Error::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

pub(crate) fn parse_json<T: DeserializeOwned>(body: &str) -> Result<T, Error> {
    serde_json::from_str(body).map_err(|e| Error::Deserialization {
        message: format!("{e} (body preview: {:?})", preview(body)),
        body: body.to_owned(),
    })
}

fn preview(body: &str) -> &str {
    match body.char_indices().nth(BODY_PREVIEW) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn url_encodes_segments() {
        let client = IndraClient::with_client(
            reqwest::Client::new(),
            Url::parse("https://api.example.com/").unwrap(),
        );
        let url = client
            .url(&["api", "user", "check", "a b@c.com", "key", "1"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/api/user/check/a%20b@c.com/key/1"
        );
    }

    #[test]
    fn url_keeps_base_path_prefix() {
        let client = IndraClient::with_client(
            reqwest::Client::new(),
            Url::parse("http://127.0.0.1:9000/proxy").unwrap(),
        );
        let url = client.url(&["api", "devices"]).unwrap();
        assert_eq!(url.path(), "/proxy/api/devices");
    }

    #[test]
    fn preview_respects_char_boundaries() {
        let body = "é".repeat(300);
        assert_eq!(preview(&body).chars().count(), BODY_PREVIEW);
    }
}
