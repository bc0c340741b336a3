// ── Device state poller ──
//
// One background loop per session. Each tick fetches every charger's
// readings concurrently, normalizes them into snapshots, derives edge
// transitions, and publishes the result through a `watch` channel. A failed
// tick never replaces a good snapshot: the previous one stays and is
// reported as stale.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::{Mutex, broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use indra_api::{ApiDevice, DeviceProperties, DeviceTelemetry, Endpoint, SolarStatus, Transaction};

use crate::auth::AuthFlow;
use crate::command::Expectations;
use crate::config::PollInterval;
use crate::convert::{self, RawReadings};
use crate::credential::Persistence;
use crate::energy::{EnergyBaseline, EnergyTracker};
use crate::error::CoreError;
use crate::model::{Device, DeviceEvent, TelemetrySnapshot, event::diff};
use crate::transport::Transport;

const EVENT_CHANNEL_SIZE: usize = 256;

// ── Published state ──────────────────────────────────────────────

/// Outcome of the most recent tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PollStatus {
    /// No poll has run under the current credential.
    Unauthenticated,
    Fresh,
    /// The last tick failed; snapshots are from an earlier tick.
    Stale { reason: String },
    /// The credential was refused. Polling is paused until sign-in.
    NeedsReauth,
}

/// Everything the poller knows, replaced wholesale on every tick.
#[derive(Debug, Clone, Serialize)]
pub struct PollState {
    pub status: PollStatus,
    /// Last good snapshot per device.
    pub snapshots: BTreeMap<String, Arc<TelemetrySnapshot>>,
    /// Devices whose readings failed on the last tick.
    pub device_errors: BTreeMap<String, String>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_attempt: Option<DateTime<Utc>>,
}

impl Default for PollState {
    fn default() -> Self {
        Self {
            status: PollStatus::Unauthenticated,
            snapshots: BTreeMap::new(),
            device_errors: BTreeMap::new(),
            last_success: None,
            last_attempt: None,
        }
    }
}

/// What a host should render for one charger.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SnapshotView {
    Fresh {
        snapshot: Arc<TelemetrySnapshot>,
    },
    /// Data may be out of date. `last` is absent if no tick has succeeded
    /// for this device yet.
    Stale {
        last: Option<Arc<TelemetrySnapshot>>,
        reason: String,
    },
    Unauthenticated {
        last: Option<Arc<TelemetrySnapshot>>,
    },
}

impl SnapshotView {
    pub fn snapshot(&self) -> Option<&Arc<TelemetrySnapshot>> {
        match self {
            Self::Fresh { snapshot } => Some(snapshot),
            Self::Stale { last, .. } | Self::Unauthenticated { last } => last.as_ref(),
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh { .. })
    }
}

// ── Poller ───────────────────────────────────────────────────────

pub(crate) struct Poller {
    transport: Transport,
    auth: Arc<AuthFlow>,
    persistence: Persistence,
    expectations: Arc<Expectations>,
    devices: ArcSwapOption<Vec<Device>>,
    /// Whether `devices` came from the vendor during this session rather
    /// than the credential store cache.
    devices_fetched: AtomicBool,
    devices_lock: Mutex<()>,
    /// Held for the whole tick so manual and scheduled polls never overlap.
    tick_lock: Mutex<EnergyTracker>,
    state: watch::Sender<Arc<PollState>>,
    events: broadcast::Sender<DeviceEvent>,
    interval: watch::Sender<PollInterval>,
}

impl Poller {
    pub(crate) fn new(
        transport: Transport,
        auth: Arc<AuthFlow>,
        persistence: Persistence,
        expectations: Arc<Expectations>,
        interval: PollInterval,
        cached_devices: Vec<Device>,
        saved_energy: BTreeMap<String, EnergyBaseline>,
    ) -> Self {
        let (state, _) = watch::channel(Arc::new(PollState::default()));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let (interval, _) = watch::channel(interval);
        let devices = if cached_devices.is_empty() {
            None
        } else {
            Some(Arc::new(cached_devices))
        };

        Self {
            transport,
            auth,
            persistence,
            expectations,
            devices: ArcSwapOption::new(devices),
            devices_fetched: AtomicBool::new(false),
            devices_lock: Mutex::new(()),
            tick_lock: Mutex::new(EnergyTracker::from_saved(saved_energy)),
            state,
            events,
            interval,
        }
    }

    pub(crate) fn state(&self) -> Arc<PollState> {
        self.state.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<PollState>> {
        self.state.subscribe()
    }

    pub(crate) fn events(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }

    pub(crate) fn interval(&self) -> PollInterval {
        *self.interval.borrow()
    }

    pub(crate) fn set_interval(&self, interval: PollInterval) {
        info!(secs = interval.get().as_secs(), "poll interval changed");
        self.interval.send_replace(interval);
    }

    /// Known devices, from this session or the cache.
    pub(crate) fn known_devices(&self) -> Vec<Device> {
        self.devices
            .load_full()
            .map(|d| d.as_ref().clone())
            .unwrap_or_default()
    }

    pub(crate) fn view(&self, device_uid: &str) -> Result<SnapshotView, CoreError> {
        let state = self.state();
        let last = state.snapshots.get(device_uid).cloned();

        match &state.status {
            PollStatus::Unauthenticated | PollStatus::NeedsReauth => {
                return Ok(SnapshotView::Unauthenticated { last });
            }
            PollStatus::Stale { reason } if state.device_errors.is_empty() => {
                return Ok(SnapshotView::Stale {
                    last,
                    reason: reason.clone(),
                });
            }
            PollStatus::Stale { .. } | PollStatus::Fresh => {}
        }

        if let Some(devices) = self.devices.load_full() {
            if !devices.iter().any(|d| d.device_uid == device_uid) {
                return Err(CoreError::DeviceNotFound {
                    device_uid: device_uid.to_owned(),
                });
            }
        }

        if let Some(reason) = state.device_errors.get(device_uid) {
            return Ok(SnapshotView::Stale {
                last,
                reason: reason.clone(),
            });
        }
        Ok(match last {
            Some(snapshot) => SnapshotView::Fresh { snapshot },
            None => SnapshotView::Stale {
                last: None,
                reason: "not polled yet".into(),
            },
        })
    }

    /// Reset to the signed-out view, keeping last snapshots for display.
    pub(crate) fn signed_out(&self) {
        let status = self.signed_out_status();
        self.state.send_if_modified(|state| {
            if state.status == status {
                return false;
            }
            *state = Arc::new(PollState {
                status,
                ..(**state).clone()
            });
            true
        });
    }

    fn signed_out_status(&self) -> PollStatus {
        if self.auth.state().needs_reauth() {
            PollStatus::NeedsReauth
        } else {
            PollStatus::Unauthenticated
        }
    }

    // ── Devices ──────────────────────────────────────────────────

    pub(crate) async fn device(&self, device_uid: &str) -> Result<Device, CoreError> {
        let devices = match self.devices.load_full() {
            Some(devices) => devices,
            None => self.ensure_devices(false).await?,
        };
        devices
            .iter()
            .find(|d| d.device_uid == device_uid)
            .cloned()
            .ok_or_else(|| CoreError::DeviceNotFound {
                device_uid: device_uid.to_owned(),
            })
    }

    /// Fetch the device list once per session, or again when `force`d.
    pub(crate) async fn ensure_devices(&self, force: bool) -> Result<Arc<Vec<Device>>, CoreError> {
        if !force && self.devices_fetched.load(Ordering::Acquire) {
            if let Some(devices) = self.devices.load_full() {
                return Ok(devices);
            }
        }

        let _guard = self.devices_lock.lock().await;
        if !force && self.devices_fetched.load(Ordering::Acquire) {
            if let Some(devices) = self.devices.load_full() {
                return Ok(devices);
            }
        }

        let listing: Vec<ApiDevice> = self
            .transport
            .call_retrying_as(&Endpoint::Devices)
            .await
            .inspect_err(|e| error!(error = %e, "device list unavailable"))?;

        let resolved = join_all(listing.into_iter().map(|api| self.resolve_device(api))).await;
        let devices = Arc::new(resolved.into_iter().collect::<Result<Vec<_>, _>>()?);

        let cached = devices.as_ref().clone();
        if let Err(e) = self.persistence.update(|record| record.devices = cached) {
            warn!(error = %e, "could not cache device list");
        }

        info!(count = devices.len(), "device list loaded");
        self.devices.store(Some(Arc::clone(&devices)));
        self.devices_fetched.store(true, Ordering::Release);
        Ok(devices)
    }

    async fn resolve_device(&self, api: ApiDevice) -> Result<Device, CoreError> {
        let solar_reported = api.solar_capable.is_some();
        let mut device = Device::from(api);
        if !solar_reported {
            device.capabilities.solar_capable = self.probe_solar(&device.device_uid).await?;
        }
        Ok(device)
    }

    /// A charger supports solar mode iff its solar endpoint answers with
    /// data. Only credential failures propagate.
    async fn probe_solar(&self, device_uid: &str) -> Result<bool, CoreError> {
        let endpoint = Endpoint::SolarStatus {
            device_uid: device_uid.to_owned(),
        };
        match self.transport.call_as::<Option<SolarStatus>>(&endpoint).await {
            Ok(Some(status)) => Ok(status.enabled.is_some() || !status.extra.is_empty()),
            Ok(None) => Ok(false),
            Err(e) if e.needs_reauth() => Err(e),
            Err(e) => {
                debug!(device_uid, error = %e, "solar probe failed, treating as unsupported");
                Ok(false)
            }
        }
    }

    // ── Tick ─────────────────────────────────────────────────────

    /// Poll every device once and publish the result.
    pub(crate) async fn tick(&self) -> Result<(), CoreError> {
        let mut tracker = self.tick_lock.lock().await;
        let started = Utc::now();

        if !self.auth.is_authenticated() {
            self.signed_out();
            return Err(CoreError::NotAuthenticated);
        }

        let devices = match self.ensure_devices(false).await {
            Ok(devices) => devices,
            Err(e) if e.needs_reauth() => return Err(self.publish_failure(e, started)),
            // The list is fetched again next tick; until then the cached one
            // is good enough to poll.
            Err(e) => match self.devices.load_full() {
                Some(cached) => {
                    warn!(error = %e, count = cached.len(), "polling cached device list");
                    cached
                }
                None => return Err(self.publish_failure(e, started)),
            },
        };

        let (readings, transactions) = tokio::join!(
            join_all(devices.iter().map(|d| self.fetch_readings(d))),
            self.fetch_transactions(),
        );
        let completed = Utc::now();

        let transactions = match transactions {
            Ok(t) => t,
            Err(e) => return Err(self.publish_failure(e, completed)),
        };
        if readings
            .iter()
            .any(|r| r.as_ref().is_err_and(CoreError::needs_reauth))
        {
            return Err(self.publish_failure(CoreError::AuthExpired, completed));
        }

        let previous = self.state();
        let mut snapshots = previous.snapshots.clone();
        snapshots.retain(|uid, _| {
            let listed = devices.iter().any(|d| &d.device_uid == uid);
            if !listed {
                tracker.forget(uid);
            }
            listed
        });
        let mut device_errors = BTreeMap::new();
        let mut events = Vec::new();

        for (device, result) in devices.iter().zip(readings) {
            let uid = &device.device_uid;
            let mut raw = match result {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(device_uid = %uid, error = %e, "device poll failed, keeping last snapshot");
                    device_errors.insert(uid.clone(), e.to_string());
                    continue;
                }
            };

            raw.last_transaction = transactions
                .as_deref()
                .and_then(|t| convert::latest_transaction_for(t, uid));
            let mut snapshot = convert::snapshot(uid, completed, raw);
            snapshot.session_energy_kwh =
                tracker.observe(uid, snapshot.cable, snapshot.total_energy_kwh);

            let mut transitions = previous
                .snapshots
                .get(uid)
                .map(|prev| diff(prev, &snapshot))
                .unwrap_or_default();
            transitions.extend(self.expectations.reconcile(&snapshot, started));
            events.extend(transitions.into_iter().map(|transition| DeviceEvent {
                device_uid: uid.clone(),
                at: completed,
                transition,
            }));

            snapshots.insert(uid.clone(), Arc::new(snapshot));
        }

        if let Some(baselines) = tracker.take_changes() {
            if let Err(e) = self.persistence.update(|record| record.energy = baselines) {
                warn!(error = %e, "could not save energy baselines");
            }
        }

        let any_success = devices.is_empty() || device_errors.len() < devices.len();
        let status = match device_errors.values().next() {
            None => PollStatus::Fresh,
            Some(reason) => PollStatus::Stale {
                reason: reason.clone(),
            },
        };

        debug!(
            devices = devices.len(),
            failed = device_errors.len(),
            events = events.len(),
            "poll complete"
        );

        self.state.send_replace(Arc::new(PollState {
            status,
            snapshots,
            device_errors,
            last_success: if any_success {
                Some(completed)
            } else {
                previous.last_success
            },
            last_attempt: Some(completed),
        }));

        for event in events {
            let _ = self.events.send(event);
        }
        Ok(())
    }

    /// Keep every snapshot, record why the tick failed, and hand the error
    /// back to the caller.
    fn publish_failure(&self, err: CoreError, at: DateTime<Utc>) -> CoreError {
        let status = if err.needs_reauth() {
            self.signed_out_status()
        } else {
            warn!(error = %err, "poll failed, snapshots are stale");
            PollStatus::Stale {
                reason: err.to_string(),
            }
        };
        self.state.send_modify(|state| {
            *state = Arc::new(PollState {
                status,
                last_attempt: Some(at),
                ..(**state).clone()
            });
        });
        err
    }

    async fn fetch_readings(&self, device: &Device) -> Result<RawReadings, CoreError> {
        let uid = &device.device_uid;
        let properties = Endpoint::Properties {
            device_uid: uid.clone(),
        };
        let telemetry = Endpoint::DeviceTelemetry {
            device_uid: uid.clone(),
        };

        // An empty or `null` body carries no readings; it is not an error.
        let (properties, telemetry, solar) = tokio::join!(
            self.transport.call_retrying_as::<Option<DeviceProperties>>(&properties),
            self.transport.call_retrying_as::<Option<DeviceTelemetry>>(&telemetry),
            self.fetch_solar(device),
        );

        Ok(RawReadings {
            properties: properties?.unwrap_or_default(),
            telemetry: telemetry?.unwrap_or_default(),
            solar: solar?,
            last_transaction: None,
        })
    }

    async fn fetch_solar(&self, device: &Device) -> Result<Option<SolarStatus>, CoreError> {
        if !device.capabilities.solar_capable {
            return Ok(None);
        }
        let endpoint = Endpoint::SolarStatus {
            device_uid: device.device_uid.clone(),
        };
        match self
            .transport
            .call_retrying_as::<Option<SolarStatus>>(&endpoint)
            .await
        {
            Ok(status) => Ok(status),
            Err(e) if e.needs_reauth() => Err(e),
            Err(e) => {
                debug!(device_uid = %device.device_uid, error = %e, "solar status unavailable");
                Ok(None)
            }
        }
    }

    async fn fetch_transactions(&self) -> Result<Option<Vec<Transaction>>, CoreError> {
        match self
            .transport
            .call_retrying_as::<Option<Vec<Transaction>>>(&Endpoint::LatestTransactions)
            .await
        {
            Ok(txns) => Ok(txns),
            Err(e) if e.needs_reauth() => Err(e),
            Err(e) => {
                debug!(error = %e, "transactions unavailable");
                Ok(None)
            }
        }
    }
}

// ── Background loop ──────────────────────────────────────────────

/// Tick on the configured interval while authenticated. Paused while
/// signed out; resumes as soon as the auth flow installs a credential.
pub(crate) async fn poll_task(poller: Arc<Poller>, cancel: CancellationToken) {
    let mut auth_rx = poller.auth.subscribe();
    let mut interval_rx = poller.interval.subscribe();

    loop {
        if !poller.auth.is_authenticated() {
            poller.signed_out();
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                changed = auth_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }
        }

        let started = tokio::time::Instant::now();
        if let Err(e) = poller.tick().await {
            debug!(error = %e, "poll tick failed");
        }
        // Lost the credential during the tick: wait for sign-in, not the clock.
        if !poller.auth.is_authenticated() {
            continue;
        }

        // A new interval re-arms the deadline from the last tick's start.
        loop {
            let deadline = started + interval_rx.borrow_and_update().get();
            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                () = tokio::time::sleep_until(deadline) => break,
                changed = interval_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }
    }
}
