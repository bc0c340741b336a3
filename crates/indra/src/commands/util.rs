//! Shared helpers for command handlers.

use tracing::warn;

use indra_core::{AuthState, Device, Session};

use crate::error::CliError;

/// Bring back the stored credential, failing when there is none.
///
/// A network failure during validation keeps the restored token: the
/// command then runs against it and reports its own error if it fails.
pub async fn require_signed_in(session: &Session) -> Result<(), CliError> {
    match session.restore().await {
        Ok(true) => Ok(()),
        Ok(false) => Err(signed_out_error(&session.auth_state())),
        Err(e) if session.is_authenticated() => {
            warn!(error = %e, "could not validate stored session, using it anyway");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn signed_out_error(state: &AuthState) -> CliError {
    if state.needs_reauth() {
        CliError::SessionExpired
    } else {
        CliError::NotSignedIn
    }
}

/// Run one poll tick. Only auth failures abort the command; anything else
/// leaves the affected snapshots stale, which the caller reports.
pub async fn poll_once(session: &Session) -> Result<(), CliError> {
    match session.poll_now().await {
        Ok(()) => Ok(()),
        Err(e) if e.needs_reauth() => Err(e.into()),
        Err(e) => {
            warn!(error = %e, "poll failed");
            Ok(())
        }
    }
}

/// Resolve a charger by uid or name.
pub async fn resolve_device(
    session: &Session,
    identifier: Option<&str>,
) -> Result<Device, CliError> {
    let devices = session.devices().await?;
    pick_device(&devices, identifier)
}

/// Match `identifier` against uids, then names (case-insensitive). With no
/// identifier the account's only charger is picked.
pub fn pick_device(devices: &[Device], identifier: Option<&str>) -> Result<Device, CliError> {
    let Some(identifier) = identifier else {
        return match devices {
            [only] => Ok(only.clone()),
            [] => Err(CliError::NotFound {
                identifier: "(no chargers on this account)".into(),
            }),
            many => Err(CliError::AmbiguousDevice {
                available: many
                    .iter()
                    .map(|d| format!("{} ({})", d.name, d.device_uid))
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        };
    };

    devices
        .iter()
        .find(|d| d.device_uid == identifier)
        .or_else(|| {
            devices
                .iter()
                .find(|d| d.name.eq_ignore_ascii_case(identifier))
        })
        .cloned()
        .ok_or_else(|| CliError::NotFound {
            identifier: identifier.into(),
        })
}

/// Map a dialoguer / interactive I/O failure into CliError.
pub fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}
