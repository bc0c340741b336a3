//! Snapshot, watch and charge-session handlers.

use std::collections::HashMap;

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use indra_core::{
    ChargeSession, Connectivity, DeviceEvent, PollInterval, PollStatus, Session, SnapshotView,
    TelemetrySnapshot, Transition,
};

use crate::cli::{DeviceArg, GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output::{self, Painter};

use super::util;

fn clock(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M:%S").to_string()
}

// ── Snapshot ────────────────────────────────────────────────────────

/// Poll once and return what to show for `device_uid`, failing when there
/// is nothing to show at all.
async fn current_view(session: &Session, device_uid: &str) -> Result<SnapshotView, CliError> {
    util::poll_once(session).await?;
    let view = session.snapshot(device_uid)?;
    match view {
        SnapshotView::Unauthenticated { .. } => Err(CliError::NotSignedIn),
        SnapshotView::Stale { last: None, reason } => Err(CliError::Stale {
            device: device_uid.to_owned(),
            reason,
        }),
        view => Ok(view),
    }
}

fn snapshot_detail(name: &str, view: &SnapshotView, painter: Painter) -> String {
    let Some(snap) = view.snapshot() else {
        return String::new();
    };

    let freshness = match view {
        SnapshotView::Stale { reason, .. } => painter.warn(&format!("stale ({reason})")),
        _ => painter.good("fresh"),
    };
    let faults = if snap.faults.any() {
        painter.bad(&fault_summary(snap))
    } else {
        "none".into()
    };
    let online = match snap.connectivity {
        Connectivity::Online => painter.good("online"),
        Connectivity::Offline => painter.bad("offline"),
        Connectivity::Unknown => painter.dim("unknown"),
    };

    output::detail_block(&[
        ("Charger", painter.accent(name)),
        ("Reading", format!("{freshness} at {}", clock(snap.polled_at))),
        ("Mode", snap.mode.to_string()),
        ("Cable", snap.cable.to_string()),
        ("Power", output::reading(snap.power_kw, "kW", 2)),
        ("Current", output::reading(snap.current_a, "A", 1)),
        ("Voltage", output::reading(snap.voltage_v, "V", 1)),
        ("Temperature", output::reading(snap.temperature_c, "°C", 1)),
        ("Session energy", output::reading(snap.session_energy_kwh, "kWh", 2)),
        ("Total energy", output::reading(snap.total_energy_kwh, "kWh", 1)),
        ("Grid", output::reading(snap.grid_power_kw, "kW", 2)),
        ("Frequency", output::reading(snap.frequency_hz, "Hz", 2)),
        ("Boost", output::yes_no(snap.boost_active)),
        ("Locked", output::yes_no(snap.locked)),
        ("Solar", output::yes_no(snap.solar_enabled)),
        ("Cloud", online),
        ("Faults", faults),
    ])
}

fn fault_summary(snap: &TelemetrySnapshot) -> String {
    let f = &snap.faults;
    [
        (f.supply_issue, "supply issue"),
        (f.interrupted_unknown, "interrupted"),
        (f.device_fault, "device fault"),
        (f.not_authorised, "not authorised"),
        (f.low_current, "low current"),
    ]
    .iter()
    .filter(|(set, _)| *set)
    .map(|(_, label)| *label)
    .collect::<Vec<_>>()
    .join(", ")
}

pub async fn snapshot(
    session: &Session,
    args: &DeviceArg,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    util::require_signed_in(session).await?;
    let device = util::resolve_device(session, args.device.as_deref()).await?;
    let view = current_view(session, &device.device_uid).await?;

    let painter = Painter::new(global.color);
    let out = output::render_single(
        global.output,
        &view,
        |v| snapshot_detail(&device.name, v, painter),
        |v| {
            v.snapshot()
                .map_or_else(|| "UNKNOWN".into(), |s| s.mode.to_string())
        },
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── Last charge session ─────────────────────────────────────────────

fn session_detail(name: &str, last: Option<&ChargeSession>, painter: Painter) -> String {
    let Some(last) = last else {
        return format!("{}: no completed session reported", painter.accent(name));
    };
    let or_dash = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".into());
    output::detail_block(&[
        ("Charger", painter.accent(name)),
        ("Energy", output::reading(last.energy_kwh, "kWh", 2)),
        ("Range added", output::reading(last.range_miles, "mi", 0)),
        ("Started", or_dash(&last.started)),
        ("Ended", or_dash(&last.ended)),
    ])
}

pub async fn last_session(
    session: &Session,
    args: &DeviceArg,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    util::require_signed_in(session).await?;
    let device = util::resolve_device(session, args.device.as_deref()).await?;
    let view = current_view(session, &device.device_uid).await?;
    let last = view.snapshot().and_then(|s| s.last_session.clone());

    let painter = Painter::new(global.color);
    let out = output::render_single(
        global.output,
        &last,
        |l| session_detail(&device.name, l.as_ref(), painter),
        |l| {
            l.as_ref()
                .and_then(|s| s.energy_kwh)
                .map_or_else(|| "-".into(), |kwh| format!("{kwh:.2}"))
        },
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── Watch ───────────────────────────────────────────────────────────

/// One line of `watch` output in the structured formats.
#[derive(Debug, Serialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum WatchRecord<'a> {
    Reading {
        device_uid: &'a str,
        view: &'a SnapshotView,
    },
    Event {
        event: &'a DeviceEvent,
    },
}

fn transition_label(transition: &Transition) -> String {
    match transition {
        Transition::PluggedIn => "vehicle plugged in".into(),
        Transition::Unplugged => "vehicle unplugged".into(),
        Transition::ChargingStarted => "charging started".into(),
        Transition::ChargingStopped => "charging stopped".into(),
        Transition::ModeChanged { from, to } => format!("mode {from} -> {to}"),
        Transition::FaultRaised => "fault raised".into(),
        Transition::FaultCleared => "fault cleared".into(),
        Transition::WentOffline => "went offline".into(),
        Transition::CameOnline => "back online".into(),
        Transition::CommandConfirmed { command } => format!("{command} confirmed"),
        Transition::CommandNotReflected { command } => format!("{command} not reflected"),
    }
}

struct WatchPrinter {
    format: OutputFormat,
    painter: Painter,
    names: HashMap<String, String>,
    quiet: bool,
}

impl WatchPrinter {
    fn name<'a>(&'a self, uid: &'a str) -> &'a str {
        self.names.get(uid).map_or(uid, String::as_str)
    }

    fn emit(
        &self,
        record: &WatchRecord<'_>,
        human: impl FnOnce() -> String,
    ) -> Result<(), CliError> {
        let line = match self.format {
            OutputFormat::Table => human(),
            OutputFormat::Json | OutputFormat::JsonCompact => serde_json::to_string(record)?,
            OutputFormat::Yaml => format!("---\n{}", serde_yaml::to_string(record)?),
            OutputFormat::Plain => match record {
                WatchRecord::Reading { device_uid, view } => format!(
                    "{device_uid} {}",
                    view.snapshot()
                        .map_or_else(|| "UNKNOWN".into(), |s| s.mode.to_string())
                ),
                WatchRecord::Event { event } => {
                    format!("{} {}", event.device_uid, transition_label(&event.transition))
                }
            },
        };
        output::print_output(&line, self.quiet);
        Ok(())
    }

    fn reading(&self, device_uid: &str, view: &SnapshotView) -> Result<(), CliError> {
        let record = WatchRecord::Reading { device_uid, view };
        self.emit(&record, || {
            let name = self.name(device_uid);
            match view {
                SnapshotView::Fresh { snapshot } => format!(
                    "{} {:<14} {:<9} {:<12} {:>9}  session {}",
                    self.painter.dim(&clock(snapshot.polled_at)),
                    name,
                    snapshot.mode.to_string(),
                    snapshot.cable.to_string(),
                    output::reading(snapshot.power_kw, "kW", 2),
                    output::reading(snapshot.session_energy_kwh, "kWh", 2),
                ),
                SnapshotView::Stale { reason, .. } => format!(
                    "{} {:<14} {}",
                    self.painter.dim(&clock(Utc::now())),
                    name,
                    self.painter.warn(&format!("stale: {reason}")),
                ),
                SnapshotView::Unauthenticated { .. } => format!(
                    "{} {:<14} {}",
                    self.painter.dim(&clock(Utc::now())),
                    name,
                    self.painter.bad("signed out"),
                ),
            }
        })
    }

    fn readings(&self, session: &Session, watched: &[String]) -> Result<(), CliError> {
        for uid in watched {
            self.reading(uid, &session.snapshot(uid)?)?;
        }
        Ok(())
    }

    fn event(&self, event: &DeviceEvent) -> Result<(), CliError> {
        self.emit(&WatchRecord::Event { event }, || {
            let label = transition_label(&event.transition);
            let label = match event.transition {
                Transition::FaultRaised
                | Transition::WentOffline
                | Transition::CommandNotReflected { .. } => self.painter.bad(&label),
                _ => self.painter.accent(&label),
            };
            format!(
                "{} {:<14} {label}",
                self.painter.dim(&clock(event.at)),
                self.name(&event.device_uid),
            )
        })
    }
}

pub async fn watch(
    session: &Session,
    args: &WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    util::require_signed_in(session).await?;
    let devices = session.devices().await?;
    let only = match args.device.as_deref() {
        Some(id) => Some(util::pick_device(&devices, Some(id))?.device_uid),
        None => None,
    };
    if let Some(secs) = args.interval {
        let interval = PollInterval::from_secs(secs).map_err(|e| CliError::Validation {
            field: "interval".into(),
            reason: e.to_string(),
        })?;
        session.set_poll_interval(interval);
    }

    let printer = WatchPrinter {
        format: global.output,
        painter: Painter::new(global.color),
        names: devices
            .iter()
            .map(|d| (d.device_uid.clone(), d.name.clone()))
            .collect(),
        quiet: global.quiet,
    };
    let watched: Vec<String> = devices
        .iter()
        .map(|d| d.device_uid.clone())
        .filter(|uid| only.as_ref().is_none_or(|o| o == uid))
        .collect();

    let mut poll_rx = session.subscribe_poll();
    let mut events = session.events();
    session.start().await;
    if !global.quiet {
        eprintln!(
            "Watching {} charger(s) every {}s. Ctrl-C to stop.",
            watched.len(),
            session.poll_interval().get().as_secs()
        );
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let result = loop {
        tokio::select! {
            biased;
            signal = &mut ctrl_c => {
                break signal.map_err(CliError::from);
            }
            changed = poll_rx.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let status = poll_rx.borrow_and_update().status.clone();
                if status == PollStatus::NeedsReauth {
                    break Err(CliError::SessionExpired);
                }
                if let Err(e) = printer.readings(session, &watched) {
                    break Err(e);
                }
            }
            event = events.recv() => match event {
                Ok(event) if only.as_ref().is_none_or(|o| o == &event.device_uid) => {
                    if let Err(e) = printer.event(&event) {
                        break Err(e);
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event stream lagged"),
                Err(RecvError::Closed) => break Ok(()),
            },
        }
    };

    debug!("watch finished");
    session.shutdown().await;
    result
}
