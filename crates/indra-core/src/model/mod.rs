// ── Domain model ──
//
// Canonical types the session hands to hosts. Vendor field names and units
// never leak past `convert`.

pub mod device;
pub mod event;
pub mod telemetry;

pub use device::{Capabilities, Device};
pub use event::{DeviceEvent, Transition};
pub use telemetry::{
    CableState, ChargeSession, ChargerMode, Connectivity, FaultFlags, TelemetrySnapshot,
};
