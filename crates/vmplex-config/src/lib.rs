//! User settings for vmplex.
//!
//! A JSON settings file (`vmplex-settings.json`) layered under
//! `VMPLEX_`-prefixed environment variables, per-VM configuration the
//! application fills in as it discovers guests, and translation of the
//! `sync` section to [`vmplex_core::EngineConfig`]. [`SettingsStore`]
//! keeps the active copy and reloads it when the file changes on disk.

mod watcher;

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use vmplex_core::{EngineConfig, VIRTUAL_MACHINE_CAPTION, VmGuid};

pub use watcher::{ReloadError, SettingsStore};

/// Settings file name, both in the platform config dir and as an
/// explicit override.
pub const SETTINGS_FILE: &str = "vmplex-settings.json";

/// Environment variable that overrides the settings file location.
pub const SETTINGS_PATH_ENV: &str = "VMPLEX_SETTINGS";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize settings: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("settings loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("cannot watch settings file: {0}")]
    Watch(#[from] notify::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── Settings structs ────────────────────────────────────────────────

/// Root of the user settings file.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Style parts of the interface compactly.
    pub compact_mode: bool,

    pub font_size: f64,

    /// Executable launched when debugging a VM.
    pub debugger: String,

    /// Known VMs. Populated automatically as guests are discovered.
    pub virtual_machines: Vec<VmConfig>,

    /// Engine tuning.
    pub sync: SyncSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            compact_mode: false,
            font_size: 14.0,
            debugger: "windbgx".into(),
            virtual_machines: Vec::new(),
            sync: SyncSettings::default(),
        }
    }
}

impl Settings {
    pub fn vm_config(&self, guid: &VmGuid) -> Option<&VmConfig> {
        self.virtual_machines.iter().find(|vm| &vm.guid == guid)
    }

    /// Add entries for unseen VMs and refresh the names of known ones.
    /// Returns `true` if anything changed.
    pub fn register_vms<'a, I>(&mut self, vms: I) -> bool
    where
        I: IntoIterator<Item = (&'a VmGuid, &'a str)>,
    {
        let mut changed = false;
        for (guid, name) in vms {
            match self.virtual_machines.iter_mut().find(|vm| &vm.guid == guid) {
                Some(existing) if existing.name != name => {
                    existing.name = name.to_owned();
                    changed = true;
                }
                Some(_) => {}
                None => {
                    self.virtual_machines.push(VmConfig::new(guid.clone(), name));
                    changed = true;
                }
            }
        }
        changed
    }
}

/// Per-VM user settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct VmConfig {
    pub guid: VmGuid,

    /// Friendly name as last reported by the hypervisor.
    pub name: String,

    /// Passed to the debugger, e.g. `-k net:port=50000,key=1.2.3.4`.
    pub debugger_arguments: String,

    pub rdp_settings: Option<RdpSettings>,
}

impl VmConfig {
    pub fn new(guid: VmGuid, name: impl Into<String>) -> Self {
        Self {
            guid,
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Remote desktop options for one VM. Unset fields fall back to the
/// `effective_*` defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RdpSettings {
    pub default_enhanced_session: Option<bool>,
    pub redirect_clipboard: Option<bool>,
    pub audio_redirection_mode: Option<AudioRedirectionMode>,
    pub audio_capture_redirection_mode: Option<bool>,
    pub redirect_drives: Option<bool>,
    pub redirect_devices: Option<bool>,
    pub redirect_smart_cards: Option<bool>,
    pub desktop_width: Option<u32>,
    pub desktop_height: Option<u32>,
}

impl RdpSettings {
    pub fn effective_enhanced_session(&self) -> bool {
        self.default_enhanced_session.unwrap_or(true)
    }

    pub fn effective_redirect_clipboard(&self) -> bool {
        self.redirect_clipboard.unwrap_or(true)
    }

    pub fn effective_audio_mode(&self) -> AudioRedirectionMode {
        self.audio_redirection_mode.unwrap_or_default()
    }

    pub fn effective_desktop_size(&self) -> (u32, u32) {
        (
            self.desktop_width.unwrap_or(1024),
            self.desktop_height.unwrap_or(768),
        )
    }
}

/// Where remote audio is played.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum AudioRedirectionMode {
    /// Bring to this computer.
    #[default]
    Redirect,
    /// Leave at the remote computer.
    PlayOnServer,
    /// Do not play.
    None,
}

/// The `sync` section: how the engine mirrors the hypervisor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Summary poll interval, in humantime form (`"1s"`, `"500ms"`).
    pub poll_interval: String,
    pub managed_category: String,
    pub initial_poll: bool,
    pub removal_channel_size: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            poll_interval: "1s".into(),
            managed_category: VIRTUAL_MACHINE_CAPTION.into(),
            initial_poll: true,
            removal_channel_size: 64,
        }
    }
}

impl SyncSettings {
    /// Build the engine configuration, validating the interval.
    pub fn to_engine_config(&self) -> Result<EngineConfig, ConfigError> {
        let poll_interval = humantime::parse_duration(&self.poll_interval).map_err(|e| {
            ConfigError::Validation {
                field: "sync.poll_interval".into(),
                reason: e.to_string(),
            }
        })?;
        if poll_interval < Duration::from_millis(50) {
            return Err(ConfigError::Validation {
                field: "sync.poll_interval".into(),
                reason: format!("{} is below the 50ms minimum", self.poll_interval),
            });
        }
        if self.managed_category.trim().is_empty() {
            return Err(ConfigError::Validation {
                field: "sync.managed_category".into(),
                reason: "must not be empty".into(),
            });
        }

        Ok(EngineConfig {
            poll_interval,
            managed_category: self.managed_category.clone(),
            initial_poll: self.initial_poll,
            removal_channel_size: self.removal_channel_size.max(1),
            ..EngineConfig::default()
        })
    }
}

// ── Settings file path ──────────────────────────────────────────────

/// Resolve the settings file: `VMPLEX_SETTINGS`, then the platform config
/// directory, then the working directory.
pub fn settings_path() -> PathBuf {
    if let Some(path) = std::env::var_os(SETTINGS_PATH_ENV) {
        return PathBuf::from(path);
    }
    ProjectDirs::from("dev", "vmplex", "vmplex").map_or_else(
        || PathBuf::from(SETTINGS_FILE),
        |dirs| dirs.config_dir().join(SETTINGS_FILE),
    )
}

// ── Loading and saving ──────────────────────────────────────────────

/// Load settings from `path` + environment. A missing file yields the
/// defaults.
pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Settings::default()))
        .merge(Json::file(path))
        .merge(Env::prefixed("VMPLEX_").split("__"));

    Ok(figment.extract()?)
}

/// Serialize settings as pretty JSON to `path`, creating parent dirs.
pub fn save_settings(path: &Path, settings: &Settings) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, json)?;
    Ok(())
}
