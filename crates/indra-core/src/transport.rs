// ── Authenticated request primitive ──
//
// Every vendor call the poller and dispatcher make goes through here. The
// bearer token comes from the auth flow; a refused token triggers one
// (shared) refresh and one retry. Reads may additionally be retried with
// backoff on transient failures; commands never are.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use indra_api::{Endpoint, IndraClient};

use crate::auth::AuthFlow;
use crate::config::RetryPolicy;
use crate::error::CoreError;

#[derive(Clone)]
pub struct Transport {
    client: IndraClient,
    auth: Arc<AuthFlow>,
    retry: RetryPolicy,
}

impl Transport {
    pub(crate) fn new(client: IndraClient, auth: Arc<AuthFlow>, retry: RetryPolicy) -> Self {
        Self {
            client,
            auth,
            retry,
        }
    }

    /// One attempt (plus the post-refresh retry). Used for commands.
    pub async fn call(&self, endpoint: &Endpoint) -> Result<serde_json::Value, CoreError> {
        let body = self.authorized(endpoint).await?;
        Ok(decode_value(&body))
    }

    /// Like [`call`](Self::call), deserializing into `T`.
    pub async fn call_as<T: DeserializeOwned>(&self, endpoint: &Endpoint) -> Result<T, CoreError> {
        let body = self.authorized(endpoint).await?;
        decode(&body)
    }

    /// Retry transient failures per the injected [`RetryPolicy`]. Used for
    /// reads.
    pub async fn call_retrying_as<T: DeserializeOwned>(
        &self,
        endpoint: &Endpoint,
    ) -> Result<T, CoreError> {
        let body = self.with_retry(endpoint).await?;
        decode(&body)
    }

    pub async fn call_retrying(
        &self,
        endpoint: &Endpoint,
    ) -> Result<serde_json::Value, CoreError> {
        let body = self.with_retry(endpoint).await?;
        Ok(decode_value(&body))
    }

    async fn with_retry(&self, endpoint: &Endpoint) -> Result<String, CoreError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.authorized(endpoint).await {
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    debug!(
                        endpoint = %endpoint.describe(),
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn authorized(&self, endpoint: &Endpoint) -> Result<String, CoreError> {
        self.auth.ensure_fresh().await;
        let (generation, token) = self.auth.current().ok_or(CoreError::NotAuthenticated)?;

        match self.client.execute_raw(endpoint, &token).await {
            Ok(body) => Ok(body),
            Err(e) if e.is_unauthorized() => {
                debug!(endpoint = %endpoint.describe(), "token refused, refreshing");
                self.auth.refresh_after(generation).await?;

                let (_, token) = self.auth.current().ok_or(CoreError::AuthExpired)?;
                match self.client.execute_raw(endpoint, &token).await {
                    Ok(body) => Ok(body),
                    Err(e) if e.is_unauthorized() => {
                        warn!(endpoint = %endpoint.describe(), "refreshed token refused");
                        self.auth.invalidate("refreshed token was refused");
                        Err(CoreError::AuthExpired)
                    }
                    Err(e) => Err(e.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, CoreError> {
    let text = if body.trim().is_empty() { "null" } else { body };
    serde_json::from_str(text)
        .map_err(|e| CoreError::Internal(format!("Unexpected response: {e}")))
}

/// Untyped bodies never fail: command endpoints answer with empty bodies,
/// JSON, or bare text depending on firmware.
fn decode_value(body: &str) -> serde_json::Value {
    if body.trim().is_empty() {
        return serde_json::Value::Null;
    }
    serde_json::from_str(body).unwrap_or_else(|_| serde_json::Value::String(body.to_owned()))
}
