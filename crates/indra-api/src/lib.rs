// indra-api: Async Rust client for the Indra EV charger cloud API

pub mod auth;
pub mod client;
pub mod endpoint;
pub mod error;
pub mod models;
pub mod transport;

pub use auth::{BearerToken, DEFAULT_OS_TAG, MIN_TOKEN_LEN, MobileKey};
pub use client::{DEFAULT_API_URL, IndraClient};
pub use endpoint::Endpoint;
pub use error::Error;
pub use models::{
    ApiDevice, ApiDeviceModel, ApiLocation, DeviceProperties, DeviceTelemetry, SolarStatus,
    TelemetryData, Transaction, TransactionTotals,
};
pub use transport::TransportConfig;
