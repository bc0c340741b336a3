// Vendor REST surface
//
// Every bearer-authenticated call the client makes is described by one
// `Endpoint` value: HTTP method plus path segments. The magic-link endpoints
// are unauthenticated and live in `auth.rs` instead.

use reqwest::Method;

/// One bearer-authenticated vendor endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `GET /api/authorize/validate`
    ValidateToken,
    /// `GET /api/authorize/refresh`
    RefreshToken,
    /// `GET /api/devices`
    Devices,
    /// `GET /api/command/properties/{deviceUid}`
    Properties { device_uid: String },
    /// `GET /api/telemetry/devices/{deviceUid}/latest`
    DeviceTelemetry { device_uid: String },
    /// `GET /api/devices/{deviceUid}/solar`
    SolarStatus { device_uid: String },
    /// `GET /api/reports/transactions/latest`
    LatestTransactions,
    /// `POST /api/command/boost/start/{deviceUid}`
    BoostStart { device_uid: String },
    /// `POST /api/command/boost/stop/{deviceUid}`
    BoostStop { device_uid: String },
    /// `PUT /lock/{deviceUid}` (no `/api` prefix)
    Lock { device_uid: String },
    /// `PUT /unlock/{deviceUid}` (no `/api` prefix)
    Unlock { device_uid: String },
    /// `PUT /api/devices/{deviceUid}/solar/enable`
    SolarEnable { device_uid: String },
    /// `PUT /api/devices/{deviceUid}/solar/disable`
    SolarDisable { device_uid: String },
}

impl Endpoint {
    pub fn method(&self) -> Method {
        match self {
            Self::BoostStart { .. } | Self::BoostStop { .. } => Method::POST,
            Self::Lock { .. }
            | Self::Unlock { .. }
            | Self::SolarEnable { .. }
            | Self::SolarDisable { .. } => Method::PUT,
            _ => Method::GET,
        }
    }

    /// Path segments below the API base URL, unencoded.
    pub fn segments(&self) -> Vec<&str> {
        match self {
            Self::ValidateToken => vec!["api", "authorize", "validate"],
            Self::RefreshToken => vec!["api", "authorize", "refresh"],
            Self::Devices => vec!["api", "devices"],
            Self::Properties { device_uid } => {
                vec!["api", "command", "properties", device_uid.as_str()]
            }
            Self::DeviceTelemetry { device_uid } => {
                vec!["api", "telemetry", "devices", device_uid.as_str(), "latest"]
            }
            Self::SolarStatus { device_uid } => vec!["api", "devices", device_uid.as_str(), "solar"],
            Self::LatestTransactions => vec!["api", "reports", "transactions", "latest"],
            Self::BoostStart { device_uid } => {
                vec!["api", "command", "boost", "start", device_uid.as_str()]
            }
            Self::BoostStop { device_uid } => {
                vec!["api", "command", "boost", "stop", device_uid.as_str()]
            }
            Self::Lock { device_uid } => vec!["lock", device_uid.as_str()],
            Self::Unlock { device_uid } => vec!["unlock", device_uid.as_str()],
            Self::SolarEnable { device_uid } => {
                vec!["api", "devices", device_uid.as_str(), "solar", "enable"]
            }
            Self::SolarDisable { device_uid } => {
                vec!["api", "devices", device_uid.as_str(), "solar", "disable"]
            }
        }
    }

    /// Display form used in logs, e.g. `PUT /lock/abc`.
    pub fn describe(&self) -> String {
        format!("{} /{}", self.method(), self.segments().join("/"))
    }

    /// Whether this endpoint changes charger state.
    pub fn is_command(&self) -> bool {
        self.method() != Method::GET
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_paths_follow_vendor_layout() {
        let uid = "dev-1".to_owned();
        assert_eq!(
            Endpoint::BoostStart { device_uid: uid.clone() }.describe(),
            "POST /api/command/boost/start/dev-1"
        );
        assert_eq!(
            Endpoint::Lock { device_uid: uid.clone() }.describe(),
            "PUT /lock/dev-1"
        );
        assert_eq!(
            Endpoint::SolarDisable { device_uid: uid.clone() }.describe(),
            "PUT /api/devices/dev-1/solar/disable"
        );
        assert_eq!(
            Endpoint::DeviceTelemetry { device_uid: uid }.describe(),
            "GET /api/telemetry/devices/dev-1/latest"
        );
    }

    #[test]
    fn reads_are_not_commands() {
        assert!(!Endpoint::Devices.is_command());
        assert!(!Endpoint::LatestTransactions.is_command());
        assert!(Endpoint::Unlock { device_uid: "x".into() }.is_command());
    }
}
