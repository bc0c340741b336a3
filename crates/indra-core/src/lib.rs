// indra-core: Session, polling and command layer for Indra EV chargers
//
// Wraps `indra-api` with the magic-link auth state machine, a credential
// store, an authenticated transport with single-flight token refresh, a
// background poller that publishes normalized snapshots, and a command
// dispatcher whose effects are reconciled against later polls.

pub mod auth;
pub mod command;
pub mod config;
pub mod convert;
pub mod credential;
pub mod energy;
pub mod error;
pub mod model;
pub mod poller;
pub mod session;
pub mod transport;

// ── Primary re-exports ──────────────────────────────────────────
pub use auth::{AuthChallenge, AuthFlow, AuthState, ChallengeState, extract_redemption_hash};
pub use command::{Ack, CommandKind, CommandRequest, EffectField, PendingEffect};
pub use config::{
    AuthPolicy, DEFAULT_POLL_INTERVAL, MAX_POLL_INTERVAL, MIN_POLL_INTERVAL, PollInterval,
    RetryPolicy, SessionConfig,
};
pub use credential::{
    CredentialStore, FileCredentialStore, MemoryCredentialStore, SessionCredential,
    StoredSession, account_key,
};
pub use error::CoreError;
pub use poller::{PollState, PollStatus, SnapshotView};
pub use session::Session;
pub use transport::Transport;

// ── Model re-exports ────────────────────────────────────────────
pub use model::{
    CableState, Capabilities, ChargeSession, ChargerMode, Connectivity, Device, DeviceEvent,
    FaultFlags, TelemetrySnapshot, Transition,
};
