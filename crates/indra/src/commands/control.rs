//! Boost, lock and solar handlers.

use serde::Serialize;
use tokio::sync::broadcast::error::TryRecvError;

use indra_core::{Ack, CommandKind, Device, Session, Transition};

use crate::cli::{BoostArgs, BoostCommand, ControlArgs, GlobalOpts, SolarArgs, SolarCommand};
use crate::error::CliError;
use crate::output::{self, Painter};

use super::util;

/// What the poll after a command showed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum Outcome {
    Confirmed,
    NotReflected,
    /// The charger did not report the field on that poll.
    Pending,
}

impl Outcome {
    fn label(self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::NotReflected => "not_reflected",
            Self::Pending => "pending",
        }
    }
}

#[derive(Debug, Serialize)]
struct CommandReport {
    device: String,
    #[serde(flatten)]
    ack: Ack,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<Outcome>,
}

/// Poll once and look for the reconciliation event for `kind`.
async fn confirm(
    session: &Session,
    kind: CommandKind,
    device_uid: &str,
) -> Result<Outcome, CliError> {
    let mut events = session.events();
    util::poll_once(session).await?;

    let command = kind.to_string();
    loop {
        match events.try_recv() {
            Ok(event) if event.device_uid == device_uid => match event.transition {
                Transition::CommandConfirmed { command: ref c } if *c == command => {
                    return Ok(Outcome::Confirmed);
                }
                Transition::CommandNotReflected { command: ref c } if *c == command => {
                    return Ok(Outcome::NotReflected);
                }
                _ => {}
            },
            Ok(_) | Err(TryRecvError::Lagged(_)) => {}
            Err(TryRecvError::Empty | TryRecvError::Closed) => return Ok(Outcome::Pending),
        }
    }
}

fn report_detail(report: &CommandReport, painter: Painter) -> String {
    let mut rows = vec![
        ("Charger", painter.accent(&report.device)),
        ("Command", report.ack.request.kind.to_string()),
        (
            "Acknowledged",
            report
                .ack
                .acknowledged_at
                .with_timezone(&chrono::Local)
                .format("%H:%M:%S")
                .to_string(),
        ),
    ];
    if let Some(outcome) = report.outcome {
        let shown = match outcome {
            Outcome::Confirmed => painter.good("confirmed by charger"),
            Outcome::NotReflected => painter.bad("charger still reports the old state"),
            Outcome::Pending => painter.warn("not reported yet"),
        };
        rows.push(("Outcome", shown));
    }
    output::detail_block(&rows)
}

async fn run(
    session: &Session,
    kind: CommandKind,
    args: &ControlArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    util::require_signed_in(session).await?;
    let Device {
        device_uid, name, ..
    } = util::resolve_device(session, args.device.as_deref()).await?;

    let ack = session.issue_command(kind, &device_uid).await?;
    let outcome = if args.confirm {
        Some(confirm(session, kind, &device_uid).await?)
    } else {
        None
    };

    let report = CommandReport {
        device: name,
        ack,
        outcome,
    };
    let painter = Painter::new(global.color);
    let out = output::render_single(
        global.output,
        &report,
        |r| report_detail(r, painter),
        |r| {
            r.outcome
                .map_or("acknowledged", Outcome::label)
                .to_owned()
        },
    )?;
    output::print_output(&out, global.quiet);

    if outcome == Some(Outcome::NotReflected) {
        tracing::warn!(command = %kind, device_uid = %device_uid, "command acknowledged but not reflected");
    }
    Ok(())
}

pub async fn boost(
    session: &Session,
    args: &BoostArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match &args.command {
        BoostCommand::Start(a) => run(session, CommandKind::BoostStart, a, global).await,
        BoostCommand::Stop(a) => run(session, CommandKind::BoostStop, a, global).await,
    }
}

pub async fn lock(
    session: &Session,
    args: &ControlArgs,
    global: &GlobalOpts,
    locked: bool,
) -> Result<(), CliError> {
    let kind = if locked {
        CommandKind::Lock
    } else {
        CommandKind::Unlock
    };
    run(session, kind, args, global).await
}

pub async fn solar(
    session: &Session,
    args: &SolarArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match &args.command {
        SolarCommand::Enable(a) => run(session, CommandKind::SolarEnable, a, global).await,
        SolarCommand::Disable(a) => run(session, CommandKind::SolarDisable, a, global).await,
    }
}
