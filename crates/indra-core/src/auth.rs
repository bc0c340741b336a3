// ── Magic-link auth flow ──
//
// Drives the passwordless login as an explicit state machine whose
// resumption input (the redeemed link) arrives from outside, plus the
// token lifecycle after it: proactive and reactive refresh, restore on
// startup, logout.
//
// The current credential lives in an `ArcSwapOption` so readers never
// block. Every install bumps a generation counter; refreshes are serialized
// by `refresh_lock` and skipped when the generation a caller saw is already
// stale, so concurrent 401s collapse into one refresh.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, warn};
use url::Url;

use indra_api::{BearerToken, IndraClient, MobileKey};

use crate::config::AuthPolicy;
use crate::credential::{Persistence, SessionCredential};
use crate::error::CoreError;

// ── AuthState ────────────────────────────────────────────────────

/// Observable auth state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AuthState {
    Unauthenticated,
    /// The magic-link request is in flight.
    ChallengeRequested,
    /// The email is out; waiting for the user to click the link.
    AwaitingUserAction { expires_at: DateTime<Utc> },
    Authenticated { expires_at: DateTime<Utc> },
    /// A refresh is in flight for a token near (or past) its expiry.
    Expiring { expires_at: DateTime<Utc> },
    /// The session was lost and a brand-new challenge is needed.
    ReauthRequired { reason: String },
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. } | Self::Expiring { .. })
    }

    pub fn needs_reauth(&self) -> bool {
        matches!(self, Self::ReauthRequired { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::ChallengeRequested => "challenge requested",
            Self::AwaitingUserAction { .. } => "awaiting magic link",
            Self::Authenticated { .. } => "authenticated",
            Self::Expiring { .. } => "refreshing",
            Self::ReauthRequired { .. } => "sign-in required",
        }
    }
}

// ── AuthChallenge ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeState {
    Requested,
    AwaitingUserClick,
    Redeemed,
    Expired,
}

/// An outstanding magic-link request.
#[derive(Debug, Clone, Serialize)]
pub struct AuthChallenge {
    pub email: String,
    #[serde(skip)]
    pub mobile_key: MobileKey,
    /// One-time hash from the check endpoint. Empty when the vendor sent
    /// none; the link then supplies it.
    #[serde(skip)]
    pub hash: String,
    pub os_tag: String,
    pub requested_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub state: ChallengeState,
}

impl AuthChallenge {
    /// A redeemed challenge never expires; it is simply used up.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.state {
            ChallengeState::Expired => true,
            ChallengeState::Redeemed => false,
            ChallengeState::Requested | ChallengeState::AwaitingUserClick => {
                now >= self.expires_at
            }
        }
    }
}

/// Pull the redemption hash out of whatever the user pasted: a link with a
/// `hash` query parameter, a link ending in the hash, or the bare hash.
pub fn extract_redemption_hash(input: &str) -> Option<String> {
    let trimmed = input.trim().trim_matches('"');
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(url) = Url::parse(trimmed) {
        if url.has_host() {
            if let Some((_, hash)) = url.query_pairs().find(|(k, _)| k == "hash") {
                return Some(hash.into_owned()).filter(|h| !h.is_empty());
            }
            return url
                .path_segments()
                .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
                .map(str::to_owned);
        }
    }

    if trimmed.chars().any(|c| c.is_whitespace() || c == '/' || c == '?') {
        return None;
    }
    Some(trimmed.to_owned())
}

fn validate_email(email: &str) -> Result<(), CoreError> {
    let malformed = || CoreError::AuthRequest {
        message: format!("malformed email address: {email:?}"),
    };
    let (local, domain) = email.split_once('@').ok_or_else(malformed)?;
    if local.is_empty()
        || domain.is_empty()
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || email.contains('/')
        || email.chars().any(char::is_whitespace)
        || domain.contains('@')
    {
        return Err(malformed());
    }
    Ok(())
}

/// Policy durations are capped so timestamp arithmetic cannot overflow.
fn to_chrono(d: Duration) -> chrono::Duration {
    let cap = chrono::Duration::days(365 * 100);
    chrono::Duration::from_std(d).map_or(cap, |d| d.min(cap))
}

// ── AuthFlow ─────────────────────────────────────────────────────

#[derive(Debug)]
pub(crate) struct ActiveCredential {
    generation: u64,
    token: BearerToken,
    expires_at: DateTime<Utc>,
}

/// The auth state machine for one account.
pub struct AuthFlow {
    client: IndraClient,
    email: String,
    os_tag: String,
    policy: AuthPolicy,
    mobile_key: MobileKey,
    persistence: Persistence,
    current: ArcSwapOption<ActiveCredential>,
    generation: AtomicU64,
    refresh_lock: Mutex<()>,
    challenge: Mutex<Option<AuthChallenge>>,
    state: watch::Sender<AuthState>,
}

impl AuthFlow {
    pub(crate) fn new(
        client: IndraClient,
        email: &str,
        os_tag: &str,
        policy: AuthPolicy,
        persistence: Persistence,
    ) -> Result<Self, CoreError> {
        let record = persistence.load_or_init()?;
        let (state, _) = watch::channel(AuthState::Unauthenticated);
        Ok(Self {
            client,
            email: email.trim().to_owned(),
            os_tag: os_tag.to_owned(),
            policy,
            mobile_key: record.mobile_key,
            persistence,
            current: ArcSwapOption::empty(),
            generation: AtomicU64::new(0),
            refresh_lock: Mutex::new(()),
            challenge: Mutex::new(None),
            state,
        })
    }

    pub fn mobile_key(&self) -> &MobileKey {
        &self.mobile_key
    }

    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// The latest challenge, if any, with its current state.
    pub async fn challenge(&self) -> Option<AuthChallenge> {
        let guard = self.challenge.lock().await;
        guard.clone().map(|mut c| {
            if c.is_expired(Utc::now()) {
                c.state = ChallengeState::Expired;
            }
            c
        })
    }

    /// Current token and the generation it was installed under.
    pub(crate) fn current(&self) -> Option<(u64, BearerToken)> {
        self.current
            .load()
            .as_ref()
            .map(|c| (c.generation, c.token.clone()))
    }

    pub fn is_authenticated(&self) -> bool {
        self.current.load().is_some()
    }

    fn set_state(&self, next: AuthState) {
        self.state.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            debug!(from = state.label(), to = next.label(), "auth state");
            *state = next;
            true
        });
    }

    // ── Magic link ───────────────────────────────────────────────

    /// Ask the vendor to email a magic link to `email`, which must be the
    /// configured account.
    pub async fn request_challenge(&self, email: &str) -> Result<AuthChallenge, CoreError> {
        let email = email.trim();
        validate_email(email)?;
        if !email.eq_ignore_ascii_case(&self.email) {
            return Err(CoreError::AuthRequest {
                message: format!("{email} is not the configured account ({})", self.email),
            });
        }

        let previous = self.state();
        self.set_state(AuthState::ChallengeRequested);

        let now = Utc::now();
        let mut challenge = AuthChallenge {
            email: email.to_owned(),
            mobile_key: self.mobile_key.clone(),
            hash: String::new(),
            os_tag: self.os_tag.clone(),
            requested_at: now,
            expires_at: now + to_chrono(self.policy.challenge_ttl),
            state: ChallengeState::Requested,
        };
        let replaced = self.challenge.lock().await.replace(challenge.clone());

        let hash = match self
            .client
            .request_magic_link(email, &self.mobile_key, &self.os_tag)
            .await
        {
            Ok(hash) => hash,
            Err(e) => {
                *self.challenge.lock().await = replaced;
                self.set_state(previous);
                warn!(error = %e, "magic link request failed");
                return Err(CoreError::AuthRequest {
                    message: e.to_string(),
                });
            }
        };

        challenge.hash = hash;
        challenge.state = ChallengeState::AwaitingUserClick;
        *self.challenge.lock().await = Some(challenge.clone());

        self.set_state(AuthState::AwaitingUserAction {
            expires_at: challenge.expires_at,
        });
        info!("magic link sent");
        Ok(challenge)
    }

    /// Redeem a clicked magic link (or its bare hash).
    pub async fn complete_challenge(&self, link: &str) -> Result<(), CoreError> {
        let hash = extract_redemption_hash(link).ok_or_else(|| CoreError::AuthExchange {
            message: "no redemption hash found in the link".into(),
        })?;

        let mut guard = self.challenge.lock().await;
        let challenge = self.live_challenge(&mut guard)?;
        if !challenge.hash.is_empty() && challenge.hash != hash {
            return Err(CoreError::AuthExchange {
                message: "link does not belong to the outstanding request".into(),
            });
        }

        let token = self
            .client
            .exchange_token(&challenge.email, &challenge.mobile_key, &hash, &challenge.os_tag)
            .await
            .map_err(|e| CoreError::AuthExchange {
                message: e.to_string(),
            })?
            .ok_or_else(|| CoreError::AuthExchange {
                message: "the vendor issued no token for this link".into(),
            })?;

        if let Some(c) = guard.as_mut() {
            c.state = ChallengeState::Redeemed;
        }
        drop(guard);
        self.install(token);
        info!("signed in");
        Ok(())
    }

    /// Poll the token endpoint with the challenge's own hash until the user
    /// clicks the link or `timeout` passes.
    pub async fn await_redemption(
        &self,
        poll_every: Duration,
        timeout: Duration,
    ) -> Result<(), CoreError> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let challenge = {
                let mut guard = self.challenge.lock().await;
                self.live_challenge(&mut guard)?.clone()
            };
            if challenge.hash.is_empty() {
                return Err(CoreError::AuthExchange {
                    message: "the vendor returned no hash; paste the link instead".into(),
                });
            }

            match self
                .client
                .exchange_token(
                    &challenge.email,
                    &challenge.mobile_key,
                    &challenge.hash,
                    &challenge.os_tag,
                )
                .await
            {
                Ok(Some(token)) => {
                    if let Some(c) = self.challenge.lock().await.as_mut() {
                        c.state = ChallengeState::Redeemed;
                    }
                    self.install(token);
                    info!("signed in");
                    return Ok(());
                }
                Ok(None) => debug!("magic link not redeemed yet"),
                Err(e) if e.is_transient() => debug!(error = %e, "token poll failed, retrying"),
                Err(e) => {
                    return Err(CoreError::AuthExchange {
                        message: e.to_string(),
                    });
                }
            }

            if tokio::time::Instant::now() + poll_every > deadline {
                return Err(CoreError::AuthExchange {
                    message: format!(
                        "magic link was not clicked within {}s",
                        timeout.as_secs()
                    ),
                });
            }
            tokio::time::sleep(poll_every).await;
        }
    }

    /// The outstanding, unexpired challenge. Expired ones are dropped.
    fn live_challenge<'a>(
        &self,
        slot: &'a mut Option<AuthChallenge>,
    ) -> Result<&'a AuthChallenge, CoreError> {
        let expired = match slot.as_ref() {
            None => {
                return Err(CoreError::AuthExchange {
                    message: "no magic link request is outstanding".into(),
                });
            }
            Some(c) if c.state == ChallengeState::Requested => {
                return Err(CoreError::AuthExchange {
                    message: "the magic link request has not been answered yet".into(),
                });
            }
            Some(c) if c.state == ChallengeState::Redeemed => {
                return Err(CoreError::AuthExchange {
                    message: "this magic link was already used; request a new one".into(),
                });
            }
            Some(c) => c.is_expired(Utc::now()),
        };
        if expired {
            *slot = None;
            if !self.is_authenticated() {
                self.set_state(AuthState::Unauthenticated);
            }
            return Err(CoreError::AuthExchange {
                message: "the magic link has expired; request a new one".into(),
            });
        }
        slot.as_ref().ok_or_else(|| CoreError::Internal("challenge vanished".into()))
    }

    // ── Token lifecycle ──────────────────────────────────────────

    /// Install a freshly issued token and persist it.
    fn install(&self, token: BearerToken) -> u64 {
        self.install_at(token, Utc::now(), true)
    }

    fn install_at(&self, token: BearerToken, issued_at: DateTime<Utc>, persist: bool) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let expires_at = issued_at + to_chrono(self.policy.token_lifetime);

        if persist {
            let secret = token.expose().expose_secret().to_owned();
            if let Err(e) = self.persistence.update(|record| {
                record.token = Some(secret);
                record.issued_at = Some(issued_at);
                record.expires_at = Some(expires_at);
            }) {
                warn!(error = %e, "could not persist credential");
            }
        }

        self.current.store(Some(Arc::new(ActiveCredential {
            generation,
            token,
            expires_at,
        })));
        self.set_state(AuthState::Authenticated { expires_at });
        generation
    }

    /// Drop the credential and tell the host to sign in again.
    pub(crate) fn invalidate(&self, reason: &str) {
        self.current.store(None);
        if let Err(e) = self.persistence.update(|record| record.clear_token()) {
            warn!(error = %e, "could not clear persisted credential");
        }
        error!(reason, "session lost, sign-in required");
        self.set_state(AuthState::ReauthRequired {
            reason: reason.to_owned(),
        });
    }

    /// Renew the token unless someone already replaced generation
    /// `observed`. Concurrent callers queue on the lock and share the
    /// outcome.
    pub(crate) async fn refresh_after(&self, observed: u64) -> Result<(), CoreError> {
        let _guard = self.refresh_lock.lock().await;

        let Some(current) = self.current.load_full() else {
            return Err(CoreError::AuthExpired);
        };
        if current.generation != observed {
            debug!("token already refreshed by another caller");
            return Ok(());
        }

        self.set_state(AuthState::Expiring {
            expires_at: current.expires_at,
        });

        match self.client.refresh_token(&current.token).await {
            Ok(token) => {
                self.install(token);
                info!("token refreshed");
                Ok(())
            }
            Err(e) if e.is_transient() => {
                warn!(error = %e, "token refresh failed, keeping current token");
                self.set_state(AuthState::Authenticated {
                    expires_at: current.expires_at,
                });
                Err(e.into())
            }
            Err(e) => {
                self.invalidate(&format!("token refresh refused: {e}"));
                Err(CoreError::AuthExpired)
            }
        }
    }

    /// Refresh ahead of the expiry estimate. Transient failures keep the
    /// old token in use.
    pub(crate) async fn ensure_fresh(&self) {
        let Some(current) = self.current.load_full() else {
            return;
        };
        let due = current.expires_at - to_chrono(self.policy.refresh_margin);
        if Utc::now() < due {
            return;
        }
        debug!("token near expiry, refreshing");
        if let Err(e) = self.refresh_after(current.generation).await {
            debug!(error = %e, "proactive refresh failed");
        }
    }

    /// Bring back the persisted credential and check it with the vendor.
    ///
    /// Returns whether the session is authenticated afterwards. A transient
    /// failure keeps the restored token and is returned as an error.
    pub async fn validate_restored(&self) -> Result<bool, CoreError> {
        let record = self.persistence.load_or_init()?;
        let Some(SessionCredential {
            token, issued_at, ..
        }) = record.credential()
        else {
            self.set_state(AuthState::Unauthenticated);
            return Ok(false);
        };

        // A token of unknown age cannot be shown to be within the limit.
        let now = Utc::now();
        let past_limit = self.policy.max_offline.is_some_and(|max_offline| {
            issued_at.is_none_or(|at| now - at > to_chrono(max_offline))
        });
        if past_limit {
            self.invalidate("stored credential is older than the offline limit");
            return Ok(false);
        }

        let token = BearerToken::from_secret(token);
        let generation = self.install_at(token.clone(), issued_at.unwrap_or(now), false);

        match self.client.validate_token(&token).await {
            Ok(true) => {
                info!("restored session is valid");
                Ok(true)
            }
            Ok(false) => {
                debug!("restored token refused, trying a refresh");
                match self.refresh_after(generation).await {
                    Ok(()) => Ok(true),
                    Err(CoreError::AuthExpired) => Ok(false),
                    Err(e) => Err(e),
                }
            }
            Err(e) => {
                warn!(error = %e, "could not validate restored session");
                Err(e.into())
            }
        }
    }

    /// Sign out: forget the token and any outstanding challenge. The mobile
    /// key and device cache stay.
    pub async fn logout(&self) -> Result<(), CoreError> {
        *self.challenge.lock().await = None;
        self.current.store(None);
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.persistence.update(|record| record.clear_token())?;
        self.set_state(AuthState::Unauthenticated);
        info!("signed out");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn hash_from_query_parameter() {
        assert_eq!(
            extract_redemption_hash("https://app.indra.co.uk/login?email=a%40b.com&hash=H1")
                .as_deref(),
            Some("H1")
        );
    }

    #[test]
    fn hash_from_last_path_segment() {
        assert_eq!(
            extract_redemption_hash("https://app.indra.co.uk/magic/H2/").as_deref(),
            Some("H2")
        );
    }

    #[test]
    fn bare_hash_and_garbage() {
        assert_eq!(extract_redemption_hash("  \"H3\" ").as_deref(), Some("H3"));
        assert_eq!(extract_redemption_hash(""), None);
        assert_eq!(extract_redemption_hash("two words"), None);
        assert_eq!(extract_redemption_hash("https://app.indra.co.uk/?hash="), None);
    }

    #[test]
    fn email_validation() {
        assert!(validate_email("a@b.com").is_ok());
        assert!(validate_email("first.last+ev@example.co.uk").is_ok());
        for bad in ["", "ab.com", "@b.com", "a@", "a@b", "a b@c.com", "a@b@c.com", "a/b@c.com"] {
            assert!(validate_email(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn challenge_expiry() {
        let now = Utc::now();
        let mut challenge = AuthChallenge {
            email: "a@b.com".into(),
            mobile_key: MobileKey::generate(),
            hash: "H".into(),
            os_tag: "1".into(),
            requested_at: now,
            expires_at: now + chrono::Duration::minutes(15),
            state: ChallengeState::AwaitingUserClick,
        };
        assert!(!challenge.is_expired(now));
        assert!(challenge.is_expired(now + chrono::Duration::minutes(16)));
        challenge.state = ChallengeState::Redeemed;
        assert!(!challenge.is_expired(now + chrono::Duration::minutes(16)));
        challenge.state = ChallengeState::Expired;
        assert!(challenge.is_expired(now));
    }

    #[test]
    fn state_predicates() {
        let now = Utc::now();
        assert!(AuthState::Expiring { expires_at: now }.is_authenticated());
        assert!(!AuthState::AwaitingUserAction { expires_at: now }.is_authenticated());
        assert!(
            AuthState::ReauthRequired {
                reason: "x".into()
            }
            .needs_reauth()
        );
    }
}
