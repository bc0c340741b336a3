// ── Runtime session configuration ──
//
// These types describe *how* a session talks to the vendor and how patient
// it is. They never touch disk: `indra-config` (or any other host) builds a
// `SessionConfig` and hands it in.

use std::time::Duration;

use url::Url;

use crate::error::CoreError;

/// Shortest allowed polling interval.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(30);
/// Longest allowed polling interval.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(300);
/// Polling interval used when none is configured.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

// ── PollInterval ─────────────────────────────────────────────────

/// A polling interval inside the 30–300s window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollInterval(Duration);

impl PollInterval {
    pub fn new(interval: Duration) -> Result<Self, CoreError> {
        if interval < MIN_POLL_INTERVAL || interval > MAX_POLL_INTERVAL {
            return Err(CoreError::Config {
                message: format!(
                    "polling interval must be between {}s and {}s, got {}s",
                    MIN_POLL_INTERVAL.as_secs(),
                    MAX_POLL_INTERVAL.as_secs(),
                    interval.as_secs()
                ),
            });
        }
        Ok(Self(interval))
    }

    pub fn from_secs(secs: u64) -> Result<Self, CoreError> {
        Self::new(Duration::from_secs(secs))
    }

    pub fn get(self) -> Duration {
        self.0
    }
}

impl Default for PollInterval {
    fn default() -> Self {
        Self(DEFAULT_POLL_INTERVAL)
    }
}

// ── RetryPolicy ──────────────────────────────────────────────────

/// Bounded exponential backoff for transient read failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. `1` disables retrying.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before attempt `attempt + 1`, where `attempt` is 1-based.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1_u32 << exponent)
            .min(self.max_delay)
    }
}

// ── AuthPolicy ───────────────────────────────────────────────────

/// Timing policy for the magic-link flow and token lifecycle.
///
/// The vendor publishes no token lifetime, so the expiry is an estimate
/// counted from the moment a token is issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthPolicy {
    /// How long an emailed link stays redeemable.
    pub challenge_ttl: Duration,
    /// Estimated lifetime of a bearer token.
    pub token_lifetime: Duration,
    /// Refresh proactively once the token is this close to its estimate.
    pub refresh_margin: Duration,
    /// Restored credentials older than this are discarded unvalidated.
    pub max_offline: Option<Duration>,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self {
            challenge_ttl: Duration::from_secs(15 * 60),
            token_lifetime: Duration::from_secs(24 * 60 * 60),
            refresh_margin: Duration::from_secs(10 * 60),
            max_offline: Some(Duration::from_secs(30 * 24 * 60 * 60)),
        }
    }
}

// ── SessionConfig ────────────────────────────────────────────────

/// Configuration for one account session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Account email the magic link is sent to.
    pub email: String,
    /// API root, normally `https://api.indra.co.uk`.
    pub api_url: Url,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Operating-system tag used in the magic-link paths.
    pub os_tag: String,
    pub poll_interval: PollInterval,
    pub retry: RetryPolicy,
    pub auth: AuthPolicy,
}

impl SessionConfig {
    pub fn new(email: impl Into<String>, api_url: Url) -> Self {
        Self {
            email: email.into(),
            api_url,
            timeout: Duration::from_secs(30),
            os_tag: indra_api::DEFAULT_OS_TAG.to_owned(),
            poll_interval: PollInterval::default(),
            retry: RetryPolicy::default(),
            auth: AuthPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_interval_bounds() {
        assert!(PollInterval::from_secs(29).is_err());
        assert!(PollInterval::from_secs(301).is_err());
        assert_eq!(
            PollInterval::from_secs(30).map(PollInterval::get).ok(),
            Some(MIN_POLL_INTERVAL)
        );
        assert_eq!(PollInterval::default().get(), Duration::from_secs(60));
    }

    #[test]
    fn retry_delay_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 6,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(4), Duration::from_millis(500));
        assert_eq!(policy.delay_for(40), Duration::from_millis(500));
    }

    #[test]
    fn no_retry_policy_has_single_attempt() {
        assert_eq!(RetryPolicy::none().max_attempts, 1);
    }
}
