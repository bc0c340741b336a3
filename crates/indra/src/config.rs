//! CLI wrapper over `indra-config`: flag-aware profile resolution and
//! session construction.

use std::sync::Arc;

use indra_config::{Config, Profile};
use indra_core::{CredentialStore, Session, SessionConfig};

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use indra_config::{config_path, load_config_or_default, save_config};

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// List profile names for error help text.
pub fn available_profiles(config: &Config) -> String {
    let mut names: Vec<_> = config.profiles.keys().cloned().collect();
    if names.is_empty() {
        return "(none)".into();
    }
    names.sort();
    names.join(", ")
}

/// The profile to run with: the configured one, or one built from
/// `--email` alone when no profile exists.
fn effective_profile(global: &GlobalOpts, cfg: &Config) -> Result<Profile, CliError> {
    let name = active_profile_name(global, cfg);
    let mut profile = match indra_config::resolve_profile(cfg, Some(&name)) {
        Ok((_, profile)) => profile.clone(),
        Err(_) if global.profile.is_some() => {
            return Err(CliError::ProfileNotFound {
                name,
                available: available_profiles(cfg),
            });
        }
        Err(_) => {
            let email = global.email.as_deref().ok_or_else(|| CliError::NoConfig {
                path: config_path().display().to_string(),
            })?;
            Profile::new(email)
        }
    };

    // Flags beat the profile.
    if let Some(ref email) = global.email {
        profile.email.clone_from(email);
    }
    if let Some(ref url) = global.api_url {
        profile.api_url = Some(url.clone());
    }
    if let Some(timeout) = global.timeout {
        profile.timeout = Some(timeout);
    }
    Ok(profile)
}

/// Build the session for the active profile. No network I/O.
pub fn open_session(global: &GlobalOpts) -> Result<Session, CliError> {
    let cfg = load_config_or_default();
    let profile = effective_profile(global, &cfg)?;
    let session_config: SessionConfig =
        indra_config::profile_to_session_config(&profile, &cfg.defaults)?;
    let store: Arc<dyn CredentialStore> =
        indra_config::open_credential_store(&profile, &cfg.defaults);

    tracing::debug!(
        account = %session_config.email,
        api_url = %session_config.api_url,
        poll_secs = session_config.poll_interval.get().as_secs(),
        "opening session"
    );
    Ok(Session::new(session_config, store)?)
}
