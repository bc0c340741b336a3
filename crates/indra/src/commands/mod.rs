//! Command dispatch: bridges CLI args -> session calls -> output formatting.

pub mod auth;
pub mod config_cmd;
pub mod control;
pub mod devices;
pub mod telemetry;
pub mod util;

use indra_core::Session;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a session-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    session: &Session,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Login(args) => auth::login(session, &args, global).await,
        Command::Logout(args) => auth::logout(session, &args, global).await,
        Command::Status => auth::status(session, global).await,
        Command::Devices(args) => devices::handle(session, &args, global).await,
        Command::Snapshot(args) => telemetry::snapshot(session, &args, global).await,
        Command::Watch(args) => telemetry::watch(session, &args, global).await,
        Command::Session(args) => telemetry::last_session(session, &args, global).await,
        Command::Boost(args) => control::boost(session, &args, global).await,
        Command::Lock(args) => control::lock(session, &args, global, true).await,
        Command::Unlock(args) => control::lock(session, &args, global, false).await,
        Command::Solar(args) => control::solar(session, &args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => Err(CliError::Internal(
            "config and completions run without a session".into(),
        )),
    }
}
