// ── Telemetry snapshot ──
//
// One immutable value per device per poll tick. Every field the vendor may
// omit is an `Option` or has an `Unknown` variant, so a sparse response
// never fails a tick.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Charger operating mode (`chargerMode` property).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum ChargerMode {
    Idle,
    Boost,
    Charging,
    Solar,
    #[default]
    Unknown,
}

/// Cable state (`cableState` property).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase", ascii_case_insensitive)]
pub enum CableState {
    Charging,
    NotCharging,
    Connected,
    #[default]
    Unknown,
}

impl CableState {
    /// A vehicle cable is in the socket.
    pub fn is_plugged(self) -> bool {
        matches!(self, Self::Charging | Self::NotCharging | Self::Connected)
    }

    /// A vehicle session is open. `notCharging` is also what the charger
    /// reports right after the cable is pulled, so it does not count.
    pub fn has_vehicle(self) -> bool {
        matches!(self, Self::Charging | Self::Connected)
    }
}

/// Cloud reachability of the charger (`disconnected` property).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Connectivity {
    Online,
    Offline,
    #[default]
    Unknown,
}

/// Fault and warning flags. A flag the vendor did not report reads `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FaultFlags {
    /// `chargeInterruptedSupplyIssue`
    pub supply_issue: bool,
    /// `chargeInterruptedUnknown`
    pub interrupted_unknown: bool,
    /// `deviceInoperableTemporary`, `deviceInoperableDiagnosed` or
    /// `deviceNotAuthorised`
    pub device_fault: bool,
    /// `deviceNotAuthorised`; also sets `device_fault`
    pub not_authorised: bool,
    /// `lowCurrentOperable`, `lowCurrentInoperable` or `notAcceptingCurrent`
    pub low_current: bool,
}

impl FaultFlags {
    /// Charging was interrupted for any reason.
    pub fn charge_interrupted(&self) -> bool {
        self.supply_issue || self.interrupted_unknown
    }

    pub fn any(&self) -> bool {
        self.charge_interrupted() || self.device_fault || self.not_authorised || self.low_current
    }
}

/// The last completed charge session from the transactions report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeSession {
    pub energy_kwh: Option<f64>,
    pub range_miles: Option<f64>,
    pub started: Option<String>,
    pub ended: Option<String>,
}

/// Normalized state of one charger at one poll tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub device_uid: String,
    pub polled_at: DateTime<Utc>,
    pub mode: ChargerMode,
    pub cable: CableState,
    /// Telemetry `state` string, kept verbatim.
    pub telemetry_state: Option<String>,
    /// Power delivered to the vehicle, kW.
    pub power_kw: Option<f64>,
    pub current_a: Option<f64>,
    pub voltage_v: Option<f64>,
    pub temperature_c: Option<f64>,
    /// Energy delivered since the cable was plugged in, kWh.
    pub session_energy_kwh: Option<f64>,
    /// Lifetime energy delivered, kWh.
    pub total_energy_kwh: Option<f64>,
    /// CT clamp (grid import/export) power, kW.
    pub grid_power_kw: Option<f64>,
    pub frequency_hz: Option<f64>,
    pub faults: FaultFlags,
    pub boost_active: Option<bool>,
    pub locked: Option<bool>,
    /// Solar matching. `None` when the charger has no solar support or the
    /// status could not be read this tick.
    pub solar_enabled: Option<bool>,
    pub connectivity: Connectivity,
    pub last_session: Option<ChargeSession>,
}

impl TelemetrySnapshot {
    /// A snapshot with every reading unknown.
    pub fn empty(device_uid: impl Into<String>, polled_at: DateTime<Utc>) -> Self {
        Self {
            device_uid: device_uid.into(),
            polled_at,
            mode: ChargerMode::Unknown,
            cable: CableState::Unknown,
            telemetry_state: None,
            power_kw: None,
            current_a: None,
            voltage_v: None,
            temperature_c: None,
            session_energy_kwh: None,
            total_energy_kwh: None,
            grid_power_kw: None,
            frequency_hz: None,
            faults: FaultFlags::default(),
            boost_active: None,
            locked: None,
            solar_enabled: None,
            connectivity: Connectivity::Unknown,
            last_session: None,
        }
    }

    /// Energy is flowing, per the mode or the cable state.
    pub fn charging(&self) -> bool {
        self.mode == ChargerMode::Charging || self.cable == CableState::Charging
    }

    pub fn cable_connected(&self) -> bool {
        self.cable.is_plugged()
    }

    pub fn charge_interrupted(&self) -> bool {
        self.faults.charge_interrupted()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn vendor_strings_parse() {
        assert_eq!(ChargerMode::from_str("IDLE").unwrap(), ChargerMode::Idle);
        assert_eq!(ChargerMode::from_str("charging").unwrap(), ChargerMode::Charging);
        assert!(ChargerMode::from_str("SCHEDULE").is_err());
        assert_eq!(
            CableState::from_str("notCharging").unwrap(),
            CableState::NotCharging
        );
        assert_eq!(ChargerMode::Solar.to_string(), "SOLAR");
        assert_eq!(CableState::Connected.to_string(), "connected");
    }

    #[test]
    fn derived_signals() {
        let mut snap = TelemetrySnapshot::empty("dev", Utc::now());
        assert!(!snap.charging());
        assert!(!snap.cable_connected());

        snap.cable = CableState::NotCharging;
        assert!(snap.cable_connected());
        assert!(!snap.charging());

        snap.mode = ChargerMode::Charging;
        assert!(snap.charging());

        snap.faults.interrupted_unknown = true;
        assert!(snap.charge_interrupted());
        assert!(snap.faults.any());
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let snap = TelemetrySnapshot {
            device_uid: "dev-1".into(),
            polled_at: "2026-03-01T12:00:00Z".parse().unwrap(),
            mode: ChargerMode::Boost,
            cable: CableState::Charging,
            telemetry_state: Some("charging".into()),
            power_kw: Some(7.2),
            current_a: Some(31.3),
            voltage_v: Some(241.7),
            temperature_c: Some(23.5),
            session_energy_kwh: Some(0.1 + 0.2),
            total_energy_kwh: Some(1234.567),
            grid_power_kw: Some(-1.75),
            frequency_hz: Some(49.98),
            faults: FaultFlags {
                supply_issue: true,
                interrupted_unknown: false,
                device_fault: true,
                not_authorised: false,
                low_current: true,
            },
            boost_active: Some(true),
            locked: Some(false),
            solar_enabled: None,
            connectivity: Connectivity::Online,
            last_session: Some(ChargeSession {
                energy_kwh: Some(12.25),
                range_miles: Some(41.0),
                started: Some("2026-02-28T22:00:00Z".into()),
                ended: None,
            }),
        };

        let json = serde_json::to_string(&snap).unwrap();
        let back: TelemetrySnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snap);
        assert_eq!(
            back.session_energy_kwh.unwrap().to_bits(),
            (0.1_f64 + 0.2).to_bits()
        );
    }
}
