//! Output formatting: table, JSON, YAML, plain.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`,
//! structured formats use serde, plain emits one identifier per line.

use std::io::{self, IsTerminal, Write};
use std::time::Duration;

use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use vmplex_core::{EnabledState, Heartbeat, VmSnapshot};

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: &ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

fn paint_state(state: EnabledState, color: bool) -> String {
    let label = state.to_string();
    if !color {
        return label;
    }
    match state {
        EnabledState::Running => label.green().to_string(),
        EnabledState::Off => label.dimmed().to_string(),
        EnabledState::Saved | EnabledState::Paused => label.yellow().to_string(),
        s if s.is_transitional() => label.cyan().to_string(),
        _ => label.red().to_string(),
    }
}

fn paint_heartbeat(heartbeat: Option<Heartbeat>, color: bool) -> String {
    let Some(heartbeat) = heartbeat else {
        return "-".into();
    };
    let label = heartbeat.to_string();
    match (color, heartbeat.is_healthy()) {
        (false, _) => label,
        (true, true) => label.green().to_string(),
        (true, false) => label.red().to_string(),
    }
}

// ── VM rows ──────────────────────────────────────────────────────────

#[derive(Tabled)]
pub struct VmRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "Heartbeat")]
    heartbeat: String,
    #[tabled(rename = "Uptime")]
    uptime: String,
    #[tabled(rename = "GUID")]
    guid: String,
}

impl VmRow {
    pub fn new(vm: &VmSnapshot, color: bool) -> Self {
        let summary = &vm.summary;
        Self {
            name: vm.name().to_owned(),
            state: paint_state(vm.main.enabled_state, color),
            cpu: summary
                .processor_load
                .map_or_else(|| "-".into(), |load| format!("{load}%")),
            memory: summary
                .memory_usage_mb
                .map_or_else(|| "-".into(), |mb| format!("{mb} MB")),
            heartbeat: paint_heartbeat(summary.heartbeat, color),
            uptime: summary.uptime.map_or_else(|| "-".into(), format_uptime),
            guid: vm.guid.to_string(),
        }
    }
}

fn format_uptime(uptime: Duration) -> String {
    humantime::format_duration(Duration::from_secs(uptime.as_secs())).to_string()
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of serde-serializable + tabled items in the chosen format.
pub fn render_list<T, R>(
    format: &OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
    R: Tabled,
{
    match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            Ok(render_table(&rows))
        }
        OutputFormat::Json => Ok(serde_json::to_string_pretty(data)?),
        OutputFormat::JsonCompact => Ok(serde_json::to_string(data)?),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(data)?),
        OutputFormat::Plain => Ok(data.iter().map(&id_fn).collect::<Vec<_>>().join("\n")),
    }
}

/// Render a single serde-serializable item in the chosen format.
pub fn render_single<T>(
    format: &OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
{
    match format {
        OutputFormat::Table => Ok(detail_fn(data)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(data)?),
        OutputFormat::JsonCompact => Ok(serde_json::to_string(data)?),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(data)?),
        OutputFormat::Plain => Ok(id_fn(data)),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}
