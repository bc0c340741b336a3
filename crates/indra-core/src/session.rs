// ── Session ──
//
// The host-facing handle for one Indra account. Owns the auth flow, the
// authenticated transport, the poller and the command dispatcher, and the
// lifecycle of the background poll task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use indra_api::{IndraClient, MobileKey, TransportConfig};

use crate::auth::{AuthChallenge, AuthFlow, AuthState};
use crate::command::{self, Ack, CommandKind, Expectations, PendingEffect};
use crate::config::{PollInterval, SessionConfig};
use crate::credential::{CredentialStore, Persistence};
use crate::error::CoreError;
use crate::model::{Device, DeviceEvent};
use crate::poller::{self, PollState, Poller, SnapshotView};
use crate::transport::Transport;

/// One signed-in (or signing-in) account.
///
/// Cheaply cloneable via `Arc<SessionInner>`. Construction does no network
/// I/O: call [`restore`](Self::restore) or run the magic-link flow, then
/// [`start`](Self::start) to begin polling.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: SessionConfig,
    auth: Arc<AuthFlow>,
    transport: Transport,
    poller: Arc<Poller>,
    expectations: Arc<Expectations>,
    persistence: Persistence,
    cancel: CancellationToken,
    /// Child token for the running poll task; cancelled on logout and
    /// replaced on the next start.
    cancel_child: Mutex<CancellationToken>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Session {
    pub fn new(config: SessionConfig, store: Arc<dyn CredentialStore>) -> Result<Self, CoreError> {
        let transport_config = TransportConfig::default().with_timeout(config.timeout);
        let client = IndraClient::new(config.api_url.clone(), &transport_config)?;
        Self::with_client(config, store, client)
    }

    /// Build around an existing API client.
    pub fn with_client(
        config: SessionConfig,
        store: Arc<dyn CredentialStore>,
        client: IndraClient,
    ) -> Result<Self, CoreError> {
        let persistence = Persistence::new(store, &config.email);
        let auth = Arc::new(AuthFlow::new(
            client.clone(),
            &config.email,
            &config.os_tag,
            config.auth,
            persistence.clone(),
        )?);
        let record = persistence.load_or_init()?;

        let transport = Transport::new(client, Arc::clone(&auth), config.retry);
        let expectations = Arc::new(Expectations::default());
        let poller = Arc::new(Poller::new(
            transport.clone(),
            Arc::clone(&auth),
            persistence.clone(),
            Arc::clone(&expectations),
            config.poll_interval,
            record.devices,
            record.energy,
        ));

        let cancel = CancellationToken::new();
        let cancel_child = cancel.child_token();

        Ok(Self {
            inner: Arc::new(SessionInner {
                config,
                auth,
                transport,
                poller,
                expectations,
                persistence,
                cancel,
                cancel_child: Mutex::new(cancel_child),
                task_handles: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Key the credential store files this account under.
    pub fn account(&self) -> &str {
        self.inner.persistence.account()
    }

    pub fn mobile_key(&self) -> &MobileKey {
        self.inner.auth.mobile_key()
    }

    /// Authenticated request primitive, for calls the session does not wrap.
    pub fn transport(&self) -> &Transport {
        &self.inner.transport
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Spawn the poll task. Idempotent while a task is running.
    pub async fn start(&self) {
        let mut handles = self.inner.task_handles.lock().await;
        handles.retain(|h| !h.is_finished());
        if !handles.is_empty() {
            debug!("poller already running");
            return;
        }

        let cancel = {
            let mut child = self.inner.cancel_child.lock().await;
            if child.is_cancelled() {
                *child = self.inner.cancel.child_token();
            }
            child.clone()
        };

        handles.push(tokio::spawn(poller::poll_task(
            Arc::clone(&self.inner.poller),
            cancel,
        )));
        info!(
            interval_secs = self.inner.poller.interval().get().as_secs(),
            "poller started"
        );
    }

    /// Stop the poll task and wait for it.
    pub async fn stop(&self) {
        self.inner.cancel_child.lock().await.cancel();
        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
    }

    /// Stop permanently. The session cannot be started again.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.stop().await;
        debug!("session shut down");
    }

    // ── Auth ─────────────────────────────────────────────────────

    pub fn auth_state(&self) -> AuthState {
        self.inner.auth.state()
    }

    pub fn subscribe_auth(&self) -> watch::Receiver<AuthState> {
        self.inner.auth.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.auth.is_authenticated()
    }

    /// Bring back a persisted credential and check it with the vendor.
    pub async fn restore(&self) -> Result<bool, CoreError> {
        self.inner.auth.validate_restored().await
    }

    pub async fn start_challenge(&self, email: &str) -> Result<AuthChallenge, CoreError> {
        self.inner.auth.request_challenge(email).await
    }

    pub async fn complete_challenge(&self, link: &str) -> Result<(), CoreError> {
        self.inner.auth.complete_challenge(link).await
    }

    pub async fn await_redemption(
        &self,
        poll_every: Duration,
        timeout: Duration,
    ) -> Result<(), CoreError> {
        self.inner.auth.await_redemption(poll_every, timeout).await
    }

    pub async fn pending_challenge(&self) -> Option<AuthChallenge> {
        self.inner.auth.challenge().await
    }

    /// Stop polling, drop the credential and any pending command
    /// expectations.
    pub async fn logout(&self) -> Result<(), CoreError> {
        self.stop().await;
        self.inner.expectations.clear();
        let result = self.inner.auth.logout().await;
        self.inner.poller.signed_out();
        result
    }

    /// Log out and delete the stored record, mobile key and device cache
    /// included. The next session for this account starts from scratch.
    pub async fn forget_account(&self) -> Result<(), CoreError> {
        self.logout().await?;
        self.inner.persistence.forget()?;
        info!(account = self.account(), "stored session removed");
        Ok(())
    }

    // ── Polling ──────────────────────────────────────────────────

    pub fn snapshot(&self, device_uid: &str) -> Result<SnapshotView, CoreError> {
        self.inner.poller.view(device_uid)
    }

    pub fn poll_state(&self) -> Arc<PollState> {
        self.inner.poller.state()
    }

    pub fn subscribe_poll(&self) -> watch::Receiver<Arc<PollState>> {
        self.inner.poller.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<DeviceEvent> {
        self.inner.poller.events()
    }

    /// Run one tick now, outside the schedule.
    pub async fn poll_now(&self) -> Result<(), CoreError> {
        self.inner.poller.tick().await
    }

    pub fn poll_interval(&self) -> PollInterval {
        self.inner.poller.interval()
    }

    /// Takes effect from the next sleep; the running task picks it up.
    pub fn set_poll_interval(&self, interval: PollInterval) {
        self.inner.poller.set_interval(interval);
    }

    // ── Devices ──────────────────────────────────────────────────

    /// Devices on the account, fetched once per session.
    pub async fn devices(&self) -> Result<Vec<Device>, CoreError> {
        Ok(self.inner.poller.ensure_devices(false).await?.as_ref().clone())
    }

    /// Re-fetch the device list.
    pub async fn refresh_devices(&self) -> Result<Vec<Device>, CoreError> {
        Ok(self.inner.poller.ensure_devices(true).await?.as_ref().clone())
    }

    /// Devices known without a network call (this session or the cache).
    pub fn cached_devices(&self) -> Vec<Device> {
        self.inner.poller.known_devices()
    }

    // ── Commands ─────────────────────────────────────────────────

    /// Send a command. Unknown devices and unsupported commands fail
    /// without a network call once the device list is known.
    pub async fn issue_command(
        &self,
        kind: CommandKind,
        device_uid: &str,
    ) -> Result<Ack, CoreError> {
        let device = self.inner.poller.device(device_uid).await?;
        let ack =
            command::dispatch(&self.inner.transport, &device.capabilities, kind, device_uid)
                .await?;
        self.inner.expectations.record(&ack);
        Ok(ack)
    }

    /// Acknowledged commands no poll has confirmed or refuted yet.
    pub fn pending_effects(&self, device_uid: &str) -> Vec<PendingEffect> {
        self.inner.expectations.pending_for(device_uid)
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use crate::credential::MemoryCredentialStore;
    use crate::poller::PollStatus;

    use super::*;

    fn session() -> (Session, Arc<MemoryCredentialStore>) {
        let store = Arc::new(MemoryCredentialStore::new());
        // Nothing listens here; no request is made while signed out.
        let config = SessionConfig::new("driver@example.com", "http://127.0.0.1:9".parse().unwrap());
        let session = Session::new(config, Arc::clone(&store) as Arc<dyn CredentialStore>).unwrap();
        (session, store)
    }

    #[tokio::test(start_paused = true)]
    async fn poll_task_idles_until_signed_in() {
        let (session, _store) = session();
        session.start().await;
        session.start().await;

        tokio::time::sleep(Duration::from_secs(600)).await;
        let state = session.poll_state();
        assert_eq!(state.status, PollStatus::Unauthenticated);
        assert!(state.last_attempt.is_none());

        session.stop().await;
        session.start().await;
        session.shutdown().await;
    }

    #[tokio::test]
    async fn forget_account_removes_the_record() {
        let (session, store) = session();
        assert_eq!(session.account(), "driver@example.com");
        assert!(store.load("driver@example.com").unwrap().is_some());

        session.forget_account().await.unwrap();
        assert!(store.load("driver@example.com").unwrap().is_none());
        assert!(!session.is_authenticated());
    }
}
