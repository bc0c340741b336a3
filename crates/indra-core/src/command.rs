// ── Command API ──
//
// Remote control actions. A command is validated locally against the
// device's capabilities, sent once, and acknowledged by HTTP success. It
// does not own the resulting state: the next poll is the source of truth.
// What the command expects to change is recorded so the poller can confirm
// or refute it, and so hosts can render an optimistic state until then.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use tracing::{debug, info, warn};

use indra_api::Endpoint;

use crate::error::CoreError;
use crate::model::{Capabilities, TelemetrySnapshot, Transition};
use crate::transport::Transport;

// ── CommandKind ──────────────────────────────────────────────────

/// Every action the vendor API accepts.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CommandKind {
    BoostStart,
    BoostStop,
    Lock,
    Unlock,
    SolarEnable,
    SolarDisable,
}

/// The snapshot field a command drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EffectField {
    Boost,
    Locked,
    Solar,
}

impl EffectField {
    /// Current value of this field in a snapshot. `None` is unknown.
    pub fn read(self, snapshot: &TelemetrySnapshot) -> Option<bool> {
        match self {
            Self::Boost => snapshot.boost_active,
            Self::Locked => snapshot.locked,
            Self::Solar => snapshot.solar_enabled,
        }
    }
}

impl CommandKind {
    pub fn endpoint(self, device_uid: &str) -> Endpoint {
        let device_uid = device_uid.to_owned();
        match self {
            Self::BoostStart => Endpoint::BoostStart { device_uid },
            Self::BoostStop => Endpoint::BoostStop { device_uid },
            Self::Lock => Endpoint::Lock { device_uid },
            Self::Unlock => Endpoint::Unlock { device_uid },
            Self::SolarEnable => Endpoint::SolarEnable { device_uid },
            Self::SolarDisable => Endpoint::SolarDisable { device_uid },
        }
    }

    pub fn supported_by(self, caps: &Capabilities) -> bool {
        match self {
            Self::BoostStart | Self::BoostStop => true,
            Self::Lock | Self::Unlock => caps.lockable,
            Self::SolarEnable | Self::SolarDisable => caps.solar_capable,
        }
    }

    /// Field and value the charger should report once the command lands.
    pub fn expected_effect(self) -> (EffectField, bool) {
        match self {
            Self::BoostStart => (EffectField::Boost, true),
            Self::BoostStop => (EffectField::Boost, false),
            Self::Lock => (EffectField::Locked, true),
            Self::Unlock => (EffectField::Locked, false),
            Self::SolarEnable => (EffectField::Solar, true),
            Self::SolarDisable => (EffectField::Solar, false),
        }
    }
}

// ── Request / Ack ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct CommandRequest {
    pub kind: CommandKind,
    pub device_uid: String,
    pub issued_at: DateTime<Utc>,
}

/// The vendor accepted the command.
#[derive(Debug, Clone, Serialize)]
pub struct Ack {
    pub request: CommandRequest,
    pub acknowledged_at: DateTime<Utc>,
    /// Response body, `Null` when empty.
    pub response: serde_json::Value,
}

/// An acknowledged command the poller has not yet confirmed or refuted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingEffect {
    pub command: CommandKind,
    pub field: EffectField,
    pub value: bool,
    pub acknowledged_at: DateTime<Utc>,
}

// ── Expectations ─────────────────────────────────────────────────

/// Pending effects keyed by device and field; a newer command on the same
/// field replaces the older one.
#[derive(Debug, Default)]
pub(crate) struct Expectations {
    pending: Mutex<HashMap<(String, EffectField), PendingEffect>>,
}

impl Expectations {
    pub(crate) fn record(&self, ack: &Ack) {
        let (field, value) = ack.request.kind.expected_effect();
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.insert(
            (ack.request.device_uid.clone(), field),
            PendingEffect {
                command: ack.request.kind,
                field,
                value,
                acknowledged_at: ack.acknowledged_at,
            },
        );
    }

    pub(crate) fn pending_for(&self, device_uid: &str) -> Vec<PendingEffect> {
        let pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<_> = pending
            .iter()
            .filter(|((uid, _), _)| uid == device_uid)
            .map(|(_, effect)| effect.clone())
            .collect();
        out.sort_by_key(|e| e.acknowledged_at);
        out
    }

    /// Resolve effects against a snapshot whose fetch began at
    /// `poll_started`. Effects acknowledged after that stay pending.
    pub(crate) fn reconcile(
        &self,
        snapshot: &TelemetrySnapshot,
        poll_started: DateTime<Utc>,
    ) -> Vec<Transition> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let mut out = Vec::new();

        pending.retain(|(uid, field), effect| {
            if uid != &snapshot.device_uid || effect.acknowledged_at >= poll_started {
                return true;
            }
            let Some(observed) = field.read(snapshot) else {
                return true;
            };
            let command = effect.command.to_string();
            if observed == effect.value {
                debug!(device_uid = %uid, %command, "command confirmed");
                out.push(Transition::CommandConfirmed { command });
            } else {
                warn!(device_uid = %uid, %command, "command not reflected by charger");
                out.push(Transition::CommandNotReflected { command });
            }
            false
        });

        out
    }

    pub(crate) fn clear(&self) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

// ── Dispatch ─────────────────────────────────────────────────────

/// Validate and send one command. Capability checks happen before any
/// network call.
pub(crate) async fn dispatch(
    transport: &Transport,
    caps: &Capabilities,
    kind: CommandKind,
    device_uid: &str,
) -> Result<Ack, CoreError> {
    if !kind.supported_by(caps) {
        return Err(CoreError::UnsupportedCommand {
            command: kind.to_string(),
            device_uid: device_uid.to_owned(),
        });
    }

    let request = CommandRequest {
        kind,
        device_uid: device_uid.to_owned(),
        issued_at: Utc::now(),
    };

    let response = transport
        .call(&kind.endpoint(device_uid))
        .await
        .inspect_err(|e| warn!(%device_uid, command = %kind, error = %e, "command failed"))?;

    info!(%device_uid, command = %kind, "command acknowledged");
    Ok(Ack {
        request,
        acknowledged_at: Utc::now(),
        response,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use strum::IntoEnumIterator;

    use super::*;

    fn ack(kind: CommandKind, at: DateTime<Utc>) -> Ack {
        Ack {
            request: CommandRequest {
                kind,
                device_uid: "dev".into(),
                issued_at: at,
            },
            acknowledged_at: at,
            response: serde_json::Value::Null,
        }
    }

    #[test]
    fn names_round_trip_through_strings() {
        for kind in CommandKind::iter() {
            assert_eq!(CommandKind::from_str(&kind.to_string()).unwrap(), kind);
        }
        assert_eq!(CommandKind::SolarEnable.to_string(), "solar_enable");
    }

    #[test]
    fn capability_gate() {
        let caps = Capabilities {
            solar_capable: false,
            lockable: true,
        };
        assert!(CommandKind::BoostStart.supported_by(&caps));
        assert!(CommandKind::Unlock.supported_by(&caps));
        assert!(!CommandKind::SolarEnable.supported_by(&caps));
        assert!(!CommandKind::SolarDisable.supported_by(&caps));
    }

    #[test]
    fn endpoints_match_commands() {
        assert_eq!(
            CommandKind::Unlock.endpoint("d").describe(),
            "PUT /unlock/d"
        );
        assert_eq!(
            CommandKind::BoostStop.endpoint("d").describe(),
            "POST /api/command/boost/stop/d"
        );
    }

    #[test]
    fn reconcile_confirms_refutes_and_waits() {
        let expectations = Expectations::default();
        let t0 = Utc::now();
        expectations.record(&ack(CommandKind::BoostStart, t0));
        expectations.record(&ack(CommandKind::Lock, t0));
        expectations.record(&ack(CommandKind::SolarEnable, t0));

        let mut snap = TelemetrySnapshot::empty("dev", t0 + Duration::seconds(5));
        snap.boost_active = Some(true);
        snap.locked = Some(false);
        snap.solar_enabled = None;

        // A poll that started before the ack resolves nothing.
        assert!(expectations.reconcile(&snap, t0 - Duration::seconds(1)).is_empty());

        let mut events = expectations.reconcile(&snap, t0 + Duration::seconds(1));
        events.sort_by_key(|t| format!("{t:?}"));
        assert_eq!(
            events,
            vec![
                Transition::CommandConfirmed {
                    command: "boost_start".into()
                },
                Transition::CommandNotReflected {
                    command: "lock".into()
                },
            ]
        );

        let still = expectations.pending_for("dev");
        assert_eq!(still.len(), 1);
        assert_eq!(still[0].command, CommandKind::SolarEnable);
    }

    #[test]
    fn newer_command_supersedes_older_on_same_field() {
        let expectations = Expectations::default();
        let t0 = Utc::now();
        expectations.record(&ack(CommandKind::BoostStart, t0));
        expectations.record(&ack(CommandKind::BoostStop, t0 + Duration::seconds(1)));

        let pending = expectations.pending_for("dev");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].command, CommandKind::BoostStop);
        assert!(!pending[0].value);

        expectations.clear();
        assert!(expectations.pending_for("dev").is_empty());
    }
}
