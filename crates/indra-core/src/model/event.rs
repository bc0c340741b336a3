// ── Edge transitions between consecutive snapshots ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::telemetry::{CableState, ChargerMode, Connectivity, TelemetrySnapshot};

/// Something that changed on a charger between two poll ticks, or the
/// outcome of reconciling an acknowledged command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceEvent {
    pub device_uid: String,
    pub at: DateTime<Utc>,
    pub transition: Transition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transition {
    PluggedIn,
    Unplugged,
    ChargingStarted,
    ChargingStopped,
    ModeChanged { from: ChargerMode, to: ChargerMode },
    FaultRaised,
    FaultCleared,
    WentOffline,
    CameOnline,
    /// A poll after the command's acknowledgement shows its effect.
    CommandConfirmed { command: String },
    /// A poll after the command's acknowledgement shows the opposite state.
    CommandNotReflected { command: String },
}

/// Edges from `prev` to `next`. Unknown readings on either side produce no
/// edge for that signal.
pub fn diff(prev: &TelemetrySnapshot, next: &TelemetrySnapshot) -> Vec<Transition> {
    let mut out = Vec::new();

    if prev.cable.has_vehicle() != next.cable.has_vehicle()
        && prev.cable != CableState::Unknown
        && next.cable != CableState::Unknown
    {
        out.push(if next.cable.has_vehicle() {
            Transition::PluggedIn
        } else {
            Transition::Unplugged
        });
    }

    if prev.charging() != next.charging() {
        out.push(if next.charging() {
            Transition::ChargingStarted
        } else {
            Transition::ChargingStopped
        });
    }

    if prev.mode != next.mode
        && prev.mode != ChargerMode::Unknown
        && next.mode != ChargerMode::Unknown
    {
        out.push(Transition::ModeChanged {
            from: prev.mode,
            to: next.mode,
        });
    }

    match (prev.faults.any(), next.faults.any()) {
        (false, true) => out.push(Transition::FaultRaised),
        (true, false) => out.push(Transition::FaultCleared),
        _ => {}
    }

    match (prev.connectivity, next.connectivity) {
        (Connectivity::Online, Connectivity::Offline) => out.push(Transition::WentOffline),
        (Connectivity::Offline, Connectivity::Online) => out.push(Transition::CameOnline),
        _ => {}
    }

    out
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    use super::*;

    fn snap(mode: ChargerMode, cable: CableState) -> TelemetrySnapshot {
        let mut s = TelemetrySnapshot::empty("dev", Utc::now());
        s.mode = mode;
        s.cable = cable;
        s
    }

    #[test]
    fn connected_to_charging() {
        let prev = snap(ChargerMode::Idle, CableState::Connected);
        let next = snap(ChargerMode::Charging, CableState::Charging);
        assert_eq!(
            diff(&prev, &next),
            vec![
                Transition::ChargingStarted,
                Transition::ModeChanged {
                    from: ChargerMode::Idle,
                    to: ChargerMode::Charging
                },
            ]
        );
    }

    #[test]
    fn plug_and_unplug() {
        let idle = snap(ChargerMode::Idle, CableState::NotCharging);
        let plugged = snap(ChargerMode::Idle, CableState::Connected);
        assert_eq!(diff(&idle, &plugged), vec![Transition::PluggedIn]);
        assert_eq!(diff(&plugged, &idle), vec![Transition::Unplugged]);

        let unknown = snap(ChargerMode::Idle, CableState::Unknown);
        assert!(diff(&plugged, &unknown).is_empty());
        assert!(diff(&unknown, &plugged).is_empty());
    }

    #[test]
    fn faults_and_connectivity() {
        let mut prev = snap(ChargerMode::Idle, CableState::Connected);
        prev.connectivity = Connectivity::Online;
        let mut next = prev.clone();
        next.faults.supply_issue = true;
        next.connectivity = Connectivity::Offline;

        assert_eq!(
            diff(&prev, &next),
            vec![Transition::FaultRaised, Transition::WentOffline]
        );
        assert_eq!(
            diff(&next, &prev),
            vec![Transition::FaultCleared, Transition::CameOnline]
        );
    }
}
