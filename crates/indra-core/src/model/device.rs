// ── Charger domain types ──

use serde::{Deserialize, Serialize};

/// A charger on the account. Fetched once per session and cached with the
/// credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub device_uid: String,
    pub name: String,
    pub model: Option<String>,
    /// Rated capacity in kW.
    pub capacity_kw: Option<f64>,
    pub firmware_version: Option<String>,
    pub location_uid: Option<String>,
    pub capabilities: Capabilities,
}

impl Device {
    /// Human label, e.g. `Smart PRO 7.4kW`.
    pub fn model_label(&self) -> String {
        let model = self.model.as_deref().unwrap_or("Charger");
        match self.capacity_kw {
            Some(kw) => format!("{model} {kw}kW"),
            None => model.to_owned(),
        }
    }
}

/// What the charger accepts commands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub solar_capable: bool,
    pub lockable: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            solar_capable: false,
            lockable: true,
        }
    }
}
