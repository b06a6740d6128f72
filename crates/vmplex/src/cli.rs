//! Clap derive structures for the `vmplex` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// vmplex -- watch and drive hypervisor-managed virtual machines
#[derive(Debug, Parser)]
#[command(
    name = "vmplex",
    version,
    about = "Watch and manage virtual machines from the command line",
    long_about = "Keeps a live mirror of every managed virtual machine, fed by the \n\
        hypervisor's change notifications and a periodic summary poll.",
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
    /// JSON fixture describing the hypervisor's instances and metrics
    #[arg(long, short = 'f', env = "VMPLEX_FIXTURE", global = true)]
    pub fixture: Option<PathBuf>,

    /// Settings file (defaults to the platform config directory)
    #[arg(long, env = "VMPLEX_SETTINGS", global = true)]
    pub settings: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "VMPLEX_OUTPUT",
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
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
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

#[derive(Debug, Clone, ValueEnum)]
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
    /// List managed virtual machines
    #[command(alias = "ls")]
    List(ListArgs),

    /// Follow the live VM list until interrupted
    Watch(WatchArgs),

    /// Start a virtual machine
    Start(VmArg),

    /// Shut down the guest operating system
    Stop(VmArg),

    /// Power off immediately
    TurnOff(VmArg),

    /// Save the VM state to disk
    Save(VmArg),

    /// Pause a running VM
    Pause(VmArg),

    /// Hard reset
    Reset(VmArg),

    /// Inspect and edit user settings
    Settings(SettingsArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Shared Arguments ─────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct VmArg {
    /// VM guid or name
    pub vm: String,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Only VMs whose name contains this text
    #[arg(long, short = 'n')]
    pub name: Option<String>,

    /// Only running VMs
    #[arg(long)]
    pub running: bool,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Stop after this long (e.g. "30s", "5m")
    #[arg(long, value_parser = humantime::parse_duration)]
    pub duration: Option<Duration>,

    /// Stop after this many updates
    #[arg(long)]
    pub count: Option<usize>,
}

// ── Settings ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SettingsArgs {
    #[command(subcommand)]
    pub command: SettingsCommand,
}

#[derive(Debug, Subcommand)]
pub enum SettingsCommand {
    /// Print the settings file location
    Path,

    /// Show the active settings
    Show,

    /// Set the debugger arguments for one VM
    SetDebugger {
        /// VM guid or name, as recorded in the settings
        vm: String,

        /// Arguments passed to the debugger
        #[arg(allow_hyphen_values = true)]
        arguments: String,
    },
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
