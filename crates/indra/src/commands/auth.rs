//! Sign-in, sign-out and status handlers.

use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use dialoguer::Input;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use indra_core::{AuthState, Session};

use crate::cli::{GlobalOpts, LoginArgs, LogoutArgs};
use crate::error::CliError;
use crate::output::{self, Painter};

use super::util;

/// Poll period of the `login --wait` loop.
const REDEMPTION_POLL: Duration = Duration::from_secs(5);

fn local_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

// ── Login ───────────────────────────────────────────────────────────

pub async fn login(
    session: &Session,
    args: &LoginArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let painter = Painter::new(global.color);
    let email = session.config().email.clone();

    if !args.force && matches!(session.restore().await, Ok(true)) {
        if !global.quiet {
            eprintln!("Already signed in as {}", painter.accent(&email));
            eprintln!("  Request a new link with: indra login --force");
        }
        return Ok(());
    }

    let challenge = session.start_challenge(&email).await?;
    if !global.quiet {
        eprintln!("Magic link sent to {}", painter.accent(&email));
        eprintln!(
            "  {}",
            painter.dim(&format!("valid until {}", local_time(challenge.expires_at)))
        );
    }

    if args.wait {
        let remaining = (challenge.expires_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        let spinner = if global.quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new_spinner()
        };
        spinner.set_style(ProgressStyle::default_spinner());
        spinner.set_message("waiting for the link to be clicked");
        spinner.enable_steady_tick(Duration::from_millis(120));
        let result = session.await_redemption(REDEMPTION_POLL, remaining).await;
        spinner.finish_and_clear();
        result?;
    } else {
        let link: String = Input::new()
            .with_prompt("Paste the link from the email")
            .interact_text()
            .map_err(util::prompt_err)?;
        session.complete_challenge(&link).await?;
    }

    if !global.quiet {
        eprintln!("{} Signed in as {email}", painter.good("✓"));
    }
    Ok(())
}

// ── Logout ──────────────────────────────────────────────────────────

pub async fn logout(
    session: &Session,
    args: &LogoutArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    if args.forget {
        session.forget_account().await?;
    } else {
        session.logout().await?;
    }
    if !global.quiet {
        let what = if args.forget {
            "Signed out and removed stored session"
        } else {
            "Signed out"
        };
        eprintln!("✓ {what}");
    }
    Ok(())
}

// ── Status ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct StatusReport {
    account: String,
    api_url: String,
    auth: AuthState,
    poll_interval_secs: u64,
    devices: Vec<String>,
    /// Why the stored session could not be checked, if it could not.
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<String>,
}

fn auth_detail(state: &AuthState, painter: Painter) -> String {
    match state {
        AuthState::Authenticated { expires_at } | AuthState::Expiring { expires_at } => format!(
            "{} (token good until about {})",
            painter.good(state.label()),
            local_time(*expires_at)
        ),
        AuthState::ReauthRequired { reason } => {
            format!("{} ({reason})", painter.bad(state.label()))
        }
        other => painter.warn(other.label()),
    }
}

pub async fn status(session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    let note = session.restore().await.err().map(|e| e.to_string());

    let report = StatusReport {
        account: session.account().to_owned(),
        api_url: session.config().api_url.to_string(),
        auth: session.auth_state(),
        poll_interval_secs: session.poll_interval().get().as_secs(),
        devices: session
            .cached_devices()
            .iter()
            .map(|d| format!("{} ({})", d.name, d.device_uid))
            .collect(),
        note,
    };

    let painter = Painter::new(global.color);
    let out = output::render_single(
        global.output,
        &report,
        |r| {
            let mut rows = vec![
                ("Account", r.account.clone()),
                ("API", r.api_url.clone()),
                ("Auth", auth_detail(&r.auth, painter)),
                ("Poll every", format!("{}s", r.poll_interval_secs)),
                (
                    "Chargers",
                    if r.devices.is_empty() {
                        painter.dim("(none cached)")
                    } else {
                        r.devices.join(", ")
                    },
                ),
            ];
            if let Some(ref note) = r.note {
                rows.push(("Note", painter.warn(note)));
            }
            output::detail_block(&rows)
        },
        |r| r.auth.label().to_owned(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
