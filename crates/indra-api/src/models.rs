// Vendor API response types
//
// Wire models for the Indra cloud API. Fields use `#[serde(default)]`
// liberally because the vendor omits whatever a given charger model or
// firmware does not report. Unmodelled fields land in `extra`.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// `#[serde(default)]` only covers a missing key; the vendor also sends an
/// explicit `null` where it has nothing to report.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ── Devices ──────────────────────────────────────────────────────────

/// One entry of `GET /api/devices`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiDevice {
    #[serde(rename = "deviceUID", alias = "deviceUid")]
    pub device_uid: String,
    #[serde(default, alias = "name")]
    pub device_name: Option<String>,
    #[serde(default)]
    pub device_model: Option<ApiDeviceModel>,
    #[serde(default)]
    pub firmware_version: Option<String>,
    #[serde(default)]
    pub location: Option<ApiLocation>,
    /// Not reported by every firmware; absent means "probe the solar endpoint".
    #[serde(default)]
    pub solar_capable: Option<bool>,
    #[serde(default)]
    pub lockable: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiDeviceModel {
    #[serde(default)]
    pub device_model: Option<String>,
    /// Rated capacity in kW.
    #[serde(default)]
    pub device_capacity: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiLocation {
    #[serde(default, rename = "locationUID")]
    pub location_uid: Option<String>,
}

// ── Properties ───────────────────────────────────────────────────────

/// `GET /api/command/properties/{deviceUid}`.
///
/// A flat map of property name to `{"settingValue": "..."}`. Boolean
/// properties arrive as the strings `"True"` / `"False"`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceProperties(pub BTreeMap<String, serde_json::Value>);

impl DeviceProperties {
    /// The raw `settingValue` of a property, stringified if the vendor sent
    /// a JSON bool or number instead of a string.
    pub fn setting(&self, name: &str) -> Option<String> {
        match self.0.get(name)?.get("settingValue")? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Bool(b) => Some(if *b { "True" } else { "False" }.to_owned()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// A boolean property. `None` when missing or not a recognizable bool.
    pub fn flag(&self, name: &str) -> Option<bool> {
        let value = self.setting(name)?;
        if value.eq_ignore_ascii_case("true") {
            Some(true)
        } else if value.eq_ignore_ascii_case("false") {
            Some(false)
        } else {
            None
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ── Telemetry ────────────────────────────────────────────────────────

/// `GET /api/telemetry/devices/{deviceUid}/latest`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceTelemetry {
    /// Coarse charger state, e.g. `"charging"`.
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: TelemetryData,
}

/// Raw readings in vendor units.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryData {
    /// Power delivered to the vehicle, W.
    #[serde(default)]
    pub power_to_ev: Option<f64>,
    /// A.
    #[serde(default)]
    pub current: Option<f64>,
    /// V.
    #[serde(default)]
    pub voltage: Option<f64>,
    /// °C.
    #[serde(default)]
    pub temp: Option<f64>,
    /// Lifetime energy delivered, Wh.
    #[serde(default)]
    pub active_energy_to_ev: Option<f64>,
    /// CT clamp (grid) power, W.
    #[serde(default)]
    pub ct_clamp: Option<f64>,
    /// Hz.
    #[serde(default)]
    pub freq: Option<f64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ── Solar ────────────────────────────────────────────────────────────

/// `GET /api/devices/{deviceUid}/solar`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SolarStatus {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ── Transactions ─────────────────────────────────────────────────────

/// One entry of `GET /api/reports/transactions/latest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    // The vendor spells it `deviceUId` here, unlike the device listing.
    #[serde(default, rename = "deviceUId", alias = "deviceUID")]
    pub device_uid: Option<String>,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub totals: Option<TransactionTotals>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionTotals {
    #[serde(default)]
    pub energy_imported_kwh: Option<f64>,
    #[serde(default)]
    pub range_miles: Option<f64>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn properties_read_setting_values() {
        let props: DeviceProperties = serde_json::from_value(json!({
            "chargerMode": { "settingValue": "IDLE" },
            "boost": { "settingValue": "True" },
            "deviceLocked": { "settingValue": false },
            "cableState": { "other": 1 },
        }))
        .unwrap();

        assert_eq!(props.setting("chargerMode").as_deref(), Some("IDLE"));
        assert_eq!(props.flag("boost"), Some(true));
        assert_eq!(props.flag("deviceLocked"), Some(false));
        assert_eq!(props.setting("cableState"), None);
        assert_eq!(props.flag("chargerMode"), None);
        assert_eq!(props.flag("missing"), None);
    }

    #[test]
    fn device_listing_tolerates_sparse_entries() {
        let device: ApiDevice = serde_json::from_value(json!({
            "deviceUID": "abc",
            "deviceModel": { "deviceModel": "Smart PRO", "deviceCapacity": 7.4 },
            "location": { "locationUID": "loc-1" },
            "serial": "X1"
        }))
        .unwrap();

        assert_eq!(device.device_uid, "abc");
        assert!(device.device_name.is_none());
        assert_eq!(
            device.device_model.unwrap().device_capacity,
            Some(7.4)
        );
        assert_eq!(device.location.unwrap().location_uid.as_deref(), Some("loc-1"));
        assert!(device.extra.contains_key("serial"));
    }

    #[test]
    fn telemetry_tolerates_null_data() {
        let telemetry: DeviceTelemetry =
            serde_json::from_value(json!({ "state": "idle", "data": null })).unwrap();
        assert_eq!(telemetry.state.as_deref(), Some("idle"));
        assert!(telemetry.data.power_to_ev.is_none());

        let telemetry: DeviceTelemetry = serde_json::from_value(json!({
            "state": null,
            "data": { "powerToEv": null, "voltage": 239.5 }
        }))
        .unwrap();
        assert!(telemetry.state.is_none());
        assert!(telemetry.data.power_to_ev.is_none());
        assert_eq!(telemetry.data.voltage, Some(239.5));
    }

    #[test]
    fn null_properties_body_reads_as_absent() {
        let props: Option<DeviceProperties> = serde_json::from_str("null").unwrap();
        assert!(props.unwrap_or_default().is_empty());
    }

    #[test]
    fn transaction_uses_vendor_spelling() {
        let txn: Transaction = serde_json::from_value(json!({
            "deviceUId": "abc",
            "start": "2026-01-01T10:00:00Z",
            "totals": { "energyImportedKwh": 12.5, "rangeMiles": 40.0 }
        }))
        .unwrap();

        assert_eq!(txn.device_uid.as_deref(), Some("abc"));
        assert_eq!(txn.totals.unwrap().energy_imported_kwh, Some(12.5));
    }
}
