//! Clap derive structures for the `indra` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// indra -- control and monitor Indra smart EV chargers
#[derive(Debug, Parser)]
#[command(
    name = "indra",
    version,
    about = "Monitor and control Indra EV chargers from the command line",
    long_about = "Signs in to the Indra cloud with an emailed magic link, polls your\n\
        chargers for live telemetry, and sends boost, lock and solar commands.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Account profile to use
    #[arg(long, short = 'p', env = "INDRA_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Account email (overrides profile)
    #[arg(long, short = 'e', env = "INDRA_EMAIL", global = true)]
    pub email: Option<String>,

    /// API root (overrides profile)
    #[arg(long, env = "INDRA_API_URL", global = true, hide = true)]
    pub api_url: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "INDRA_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "INDRA_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sign in with an emailed magic link
    Login(LoginArgs),

    /// Sign out and drop the stored token
    Logout(LogoutArgs),

    /// Show sign-in and polling status
    Status,

    /// List chargers on the account
    #[command(alias = "dev", alias = "d")]
    Devices(DevicesArgs),

    /// Show the latest telemetry for a charger
    #[command(alias = "snap", alias = "s")]
    Snapshot(DeviceArg),

    /// Poll continuously and print changes as they happen
    Watch(WatchArgs),

    /// Start or stop a boost charge
    Boost(BoostArgs),

    /// Lock the charger
    Lock(ControlArgs),

    /// Unlock the charger
    Unlock(ControlArgs),

    /// Turn solar matching on or off
    Solar(SolarArgs),

    /// Show the last completed charge session
    Session(DeviceArg),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  AUTH
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct LoginArgs {
    /// Wait for the link to be clicked instead of prompting for it
    #[arg(long, short = 'w')]
    pub wait: bool,

    /// Request a new link even when already signed in
    #[arg(long, short = 'f')]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct LogoutArgs {
    /// Also delete the device key and cached device list
    #[arg(long)]
    pub forget: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  DEVICES & TELEMETRY
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct DevicesArgs {
    /// Fetch the list again instead of using the cached one
    #[arg(long, short = 'r')]
    pub refresh: bool,
}

/// Selects one charger. Optional when the account has exactly one.
#[derive(Debug, Args)]
pub struct DeviceArg {
    /// Charger uid or name
    pub device: Option<String>,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Only report this charger (uid or name)
    pub device: Option<String>,

    /// Polling interval in seconds (30-300)
    #[arg(long, short = 'i')]
    pub interval: Option<u64>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONTROL
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ControlArgs {
    /// Charger uid or name
    pub device: Option<String>,

    /// Poll once after the command and report whether it took effect
    #[arg(long, short = 'c')]
    pub confirm: bool,
}

#[derive(Debug, Args)]
pub struct BoostArgs {
    #[command(subcommand)]
    pub command: BoostCommand,
}

#[derive(Debug, Subcommand)]
pub enum BoostCommand {
    /// Start charging at full power now
    Start(ControlArgs),
    /// Stop a running boost
    Stop(ControlArgs),
}

#[derive(Debug, Args)]
pub struct SolarArgs {
    #[command(subcommand)]
    pub command: SolarCommand,
}

#[derive(Debug, Subcommand)]
pub enum SolarCommand {
    /// Charge from surplus solar only
    Enable(ControlArgs),
    /// Stop solar matching
    Disable(ControlArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create or update a profile (prompts for anything not given)
    Init(ConfigInitArgs),

    /// Display current resolved configuration
    Show,

    /// Set the polling interval of the active profile
    SetInterval {
        /// Seconds between polls (30-300)
        seconds: u64,
    },

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },

    /// Print the config file path
    Path,
}

#[derive(Debug, Args)]
pub struct ConfigInitArgs {
    /// Profile name
    #[arg(long = "name", short = 'n')]
    pub name: Option<String>,

    /// Where to keep the session token
    #[arg(long)]
    pub backend: Option<BackendArg>,

    /// Polling interval in seconds (30-300)
    #[arg(long, short = 'i')]
    pub interval: Option<u64>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum BackendArg {
    /// A file in the platform data directory
    File,
    /// The OS keyring
    Keyring,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_tree_is_consistent() {
        Cli::command().debug_assert();
    }
}
