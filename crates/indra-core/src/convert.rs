// ── API-to-domain type conversions ──
//
// Bridges raw `indra_api` response types into canonical `indra_core::model`
// types. Normalizes vendor names, converts W → kW and Wh → kWh, and maps
// anything missing or unrecognized to `None` / `Unknown`.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use tracing::debug;

use indra_api::models::{ApiDevice, DeviceProperties, DeviceTelemetry, SolarStatus, Transaction};

use crate::model::{
    CableState, Capabilities, ChargeSession, ChargerMode, Connectivity, Device, FaultFlags,
    TelemetrySnapshot,
};

// ── Property names ─────────────────────────────────────────────────

const PROP_CHARGER_MODE: &str = "chargerMode";
const PROP_CABLE_STATE: &str = "cableState";
const PROP_BOOST: &str = "boost";
const PROP_LOCKED: &str = "deviceLocked";
const PROP_DISCONNECTED: &str = "disconnected";
const PROP_SUPPLY_ISSUE: &str = "chargeInterruptedSupplyIssue";
const PROP_INTERRUPTED_UNKNOWN: &str = "chargeInterruptedUnknown";
const PROP_INOPERABLE_TEMPORARY: &str = "deviceInoperableTemporary";
const PROP_INOPERABLE_DIAGNOSED: &str = "deviceInoperableDiagnosed";
const PROP_NOT_AUTHORISED: &str = "deviceNotAuthorised";
const PROP_LOW_CURRENT_OPERABLE: &str = "lowCurrentOperable";
const PROP_LOW_CURRENT_INOPERABLE: &str = "lowCurrentInoperable";
const PROP_NOT_ACCEPTING_CURRENT: &str = "notAcceptingCurrent";

// ── Helpers ────────────────────────────────────────────────────────

fn kilo(raw: Option<f64>) -> Option<f64> {
    raw.map(|v| v / 1000.0)
}

fn parse_or_unknown<T: FromStr + Default>(name: &str, raw: Option<String>) -> T {
    match raw {
        Some(value) => T::from_str(&value).unwrap_or_else(|_| {
            debug!(property = name, %value, "unrecognized value");
            T::default()
        }),
        None => T::default(),
    }
}

// ── Device ─────────────────────────────────────────────────────────

impl From<ApiDevice> for Device {
    fn from(api: ApiDevice) -> Self {
        let (model, capacity_kw) = api
            .device_model
            .map_or((None, None), |m| (m.device_model, m.device_capacity));

        let defaults = Capabilities::default();
        let name = api
            .device_name
            .filter(|n| !n.trim().is_empty())
            .or_else(|| model.as_ref().map(|m| format!("Indra {m}")))
            .unwrap_or_else(|| api.device_uid.clone());

        Self {
            name,
            model,
            capacity_kw,
            firmware_version: api.firmware_version,
            location_uid: api.location.and_then(|l| l.location_uid),
            capabilities: Capabilities {
                solar_capable: api.solar_capable.unwrap_or(defaults.solar_capable),
                lockable: api.lockable.unwrap_or(defaults.lockable),
            },
            device_uid: api.device_uid,
        }
    }
}

// ── Snapshot ───────────────────────────────────────────────────────

/// Everything fetched for one device in one tick.
#[derive(Debug, Default)]
pub struct RawReadings {
    pub properties: DeviceProperties,
    pub telemetry: DeviceTelemetry,
    /// `None` when not fetched or not readable this tick.
    pub solar: Option<SolarStatus>,
    /// Most recent transaction for this device, if any.
    pub last_transaction: Option<Transaction>,
}

/// An unauthorised charger is inoperable too, so it also raises
/// `device_fault`; `not_authorised` says why.
fn fault_flags(props: &DeviceProperties) -> FaultFlags {
    let set = |name: &str| props.flag(name).unwrap_or(false);
    let not_authorised = set(PROP_NOT_AUTHORISED);
    FaultFlags {
        supply_issue: set(PROP_SUPPLY_ISSUE),
        interrupted_unknown: set(PROP_INTERRUPTED_UNKNOWN),
        device_fault: set(PROP_INOPERABLE_TEMPORARY)
            || set(PROP_INOPERABLE_DIAGNOSED)
            || not_authorised,
        not_authorised,
        low_current: set(PROP_LOW_CURRENT_OPERABLE)
            || set(PROP_LOW_CURRENT_INOPERABLE)
            || set(PROP_NOT_ACCEPTING_CURRENT),
    }
}

fn connectivity(props: &DeviceProperties) -> Connectivity {
    match props.flag(PROP_DISCONNECTED) {
        Some(true) => Connectivity::Offline,
        Some(false) => Connectivity::Online,
        None => Connectivity::Unknown,
    }
}

fn charge_session(txn: Transaction) -> ChargeSession {
    let (energy_kwh, range_miles) = txn
        .totals
        .map_or((None, None), |t| (t.energy_imported_kwh, t.range_miles));
    ChargeSession {
        energy_kwh,
        range_miles,
        started: txn.start,
        ended: txn.end,
    }
}

/// Normalize one device's raw readings. Session energy is filled in later
/// by the energy tracker, which needs history.
pub fn snapshot(
    device_uid: &str,
    polled_at: DateTime<Utc>,
    raw: RawReadings,
) -> TelemetrySnapshot {
    let props = &raw.properties;
    let data = &raw.telemetry.data;

    TelemetrySnapshot {
        device_uid: device_uid.to_owned(),
        polled_at,
        mode: parse_or_unknown::<ChargerMode>(PROP_CHARGER_MODE, props.setting(PROP_CHARGER_MODE)),
        cable: parse_or_unknown::<CableState>(PROP_CABLE_STATE, props.setting(PROP_CABLE_STATE)),
        telemetry_state: raw.telemetry.state.clone(),
        power_kw: kilo(data.power_to_ev),
        current_a: data.current,
        voltage_v: data.voltage,
        temperature_c: data.temp,
        session_energy_kwh: None,
        total_energy_kwh: kilo(data.active_energy_to_ev),
        grid_power_kw: kilo(data.ct_clamp),
        frequency_hz: data.freq,
        faults: fault_flags(props),
        boost_active: props.flag(PROP_BOOST),
        locked: props.flag(PROP_LOCKED),
        solar_enabled: raw.solar.and_then(|s| s.enabled),
        connectivity: connectivity(props),
        last_session: raw.last_transaction.map(charge_session),
    }
}

/// The newest transaction per device from the `latest` report. The vendor
/// lists newest first.
pub fn latest_transaction_for(txns: &[Transaction], device_uid: &str) -> Option<Transaction> {
    txns.iter()
        .find(|t| t.device_uid.as_deref() == Some(device_uid))
        .cloned()
}
