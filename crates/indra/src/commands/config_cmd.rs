//! Config subcommand handlers.

use std::io::IsTerminal;

use dialoguer::Input;

use indra_config::{CredentialBackend, Profile};
use indra_core::PollInterval;

use crate::cli::{BackendArg, ConfigArgs, ConfigCommand, ConfigInitArgs, GlobalOpts};
use crate::config;
use crate::error::CliError;
use crate::output;

use super::util::prompt_err;

fn poll_interval(seconds: u64) -> Result<PollInterval, CliError> {
    PollInterval::from_secs(seconds).map_err(|e| CliError::Validation {
        field: "interval".into(),
        reason: e.to_string(),
    })
}

// ── Init ────────────────────────────────────────────────────────────

fn init(args: &ConfigInitArgs, global: &GlobalOpts) -> Result<(), CliError> {
    if let Some(secs) = args.interval {
        poll_interval(secs)?;
    }

    let mut cfg = config::load_config_or_default();
    let profile_name = args
        .name
        .clone()
        .unwrap_or_else(|| config::active_profile_name(global, &cfg));

    let email = match global.email.clone() {
        Some(email) => email,
        None if std::io::stdin().is_terminal() => Input::new()
            .with_prompt("Indra account email")
            .interact_text()
            .map_err(prompt_err)?,
        None => {
            return Err(CliError::Validation {
                field: "email".into(),
                reason: "pass --email when not running interactively".into(),
            });
        }
    };
    let email = email.trim().to_owned();
    if !email.contains('@') {
        return Err(CliError::Validation {
            field: "email".into(),
            reason: format!("not an email address: '{email}'"),
        });
    }

    let mut profile = cfg
        .profiles
        .remove(&profile_name)
        .unwrap_or_else(|| Profile::new(email.clone()));
    profile.email = email;
    if let Some(backend) = args.backend {
        profile.credential_backend = Some(match backend {
            BackendArg::File => CredentialBackend::File,
            BackendArg::Keyring => CredentialBackend::Keyring,
        });
    }
    if args.interval.is_some() {
        profile.poll_interval = args.interval;
    }
    if let Some(ref url) = global.api_url {
        profile.api_url = Some(url.clone());
    }

    if cfg.profiles.is_empty() {
        cfg.default_profile = Some(profile_name.clone());
    }
    cfg.profiles.insert(profile_name.clone(), profile);
    config::save_config(&cfg)?;

    if !global.quiet {
        eprintln!(
            "✓ Profile '{profile_name}' written to {}",
            config::config_path().display()
        );
        eprintln!("  Sign in with: indra login");
    }
    Ok(())
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match &args.command {
        ConfigCommand::Init(init_args) => init(init_args, global),

        ConfigCommand::Show => {
            let cfg = config::load_config_or_default();
            let out = output::render_single(
                global.output,
                &cfg,
                |c| format!("{c:#?}"),
                |_| "config".into(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::SetInterval { seconds } => {
            poll_interval(*seconds)?;
            let mut cfg = config::load_config_or_default();
            let profile_name = config::active_profile_name(global, &cfg);
            let available = config::available_profiles(&cfg);
            let profile =
                cfg.profiles
                    .get_mut(&profile_name)
                    .ok_or_else(|| CliError::ProfileNotFound {
                        name: profile_name.clone(),
                        available,
                    })?;
            profile.poll_interval = Some(*seconds);
            config::save_config(&cfg)?;
            if !global.quiet {
                eprintln!("✓ Polling every {seconds}s on profile '{profile_name}'");
            }
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = config::load_config_or_default();
            let default = cfg.default_profile.as_deref().unwrap_or("default");
            if cfg.profiles.is_empty() {
                eprintln!("No profiles configured. Run: indra config init");
                return Ok(());
            }
            let mut names: Vec<_> = cfg.profiles.keys().collect();
            names.sort();
            for name in names {
                let marker = if name == default { " *" } else { "" };
                println!("{name}{marker}");
            }
            Ok(())
        }

        ConfigCommand::Use { name } => {
            let mut cfg = config::load_config_or_default();
            if !cfg.profiles.contains_key(name) {
                return Err(CliError::ProfileNotFound {
                    name: name.clone(),
                    available: config::available_profiles(&cfg),
                });
            }
            cfg.default_profile = Some(name.clone());
            config::save_config(&cfg)?;
            if !global.quiet {
                eprintln!("✓ Default profile set to '{name}'");
            }
            Ok(())
        }

        ConfigCommand::Path => {
            println!("{}", config::config_path().display());
            Ok(())
        }
    }
}
