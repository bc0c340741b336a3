//! Device list handler.

use tabled::Tabled;

use indra_core::{Device, Session};

use crate::cli::{DevicesArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "UID")]
    uid: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Firmware")]
    firmware: String,
    #[tabled(rename = "Solar")]
    solar: String,
    #[tabled(rename = "Lock")]
    lock: String,
}

fn to_row(device: &Device) -> DeviceRow {
    DeviceRow {
        uid: device.device_uid.clone(),
        name: device.name.clone(),
        model: device.model_label(),
        firmware: device.firmware_version.clone().unwrap_or_else(|| "-".into()),
        solar: output::yes_no(Some(device.capabilities.solar_capable)),
        lock: output::yes_no(Some(device.capabilities.lockable)),
    }
}

pub async fn handle(
    session: &Session,
    args: &DevicesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    util::require_signed_in(session).await?;
    let cached = session.cached_devices();
    let devices = if args.refresh || cached.is_empty() {
        session.refresh_devices().await?
    } else {
        cached
    };

    let out = output::render_list(global.output, &devices, to_row, |d| d.device_uid.clone())?;
    output::print_output(&out, global.quiet);
    Ok(())
}
