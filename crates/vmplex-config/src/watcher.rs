// ── Settings store with file watching ──
//
// Holds the active settings, persists mutations and reloads when the file
// is edited externally. Editors often hold the file briefly while saving,
// so a reload retries a few times before reporting the failure.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use vmplex_core::VmGuid;

use crate::{ConfigError, Settings, VmConfig, load_settings, save_settings};

const RELOAD_ATTEMPTS: usize = 5;
const RELOAD_BACKOFF: Duration = Duration::from_millis(100);
const ERROR_REPORT_INTERVAL: Duration = Duration::from_secs(3);

/// A settings reload that failed after every retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to load settings file \"{}\": {reason}", path.display())]
pub struct ReloadError {
    pub path: PathBuf,
    pub reason: String,
}

/// Shared handle to the active user settings.
#[derive(Clone)]
pub struct SettingsStore {
    inner: Arc<Inner>,
}

struct Inner {
    path: PathBuf,
    active: Mutex<Arc<Settings>>,
    changes: watch::Sender<Arc<Settings>>,
    reload_errors: broadcast::Sender<ReloadError>,
    last_error_report: Mutex<Option<Instant>>,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl std::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsStore")
            .field("path", &self.inner.path)
            .finish_non_exhaustive()
    }
}

impl SettingsStore {
    /// Load the settings file. A missing file yields defaults; an
    /// unreadable or malformed one is an error.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let settings = Arc::new(load_settings(&path)?);
        let (changes, _) = watch::channel(Arc::clone(&settings));
        let (reload_errors, _) = broadcast::channel(8);

        Ok(Self {
            inner: Arc::new(Inner {
                path,
                active: Mutex::new(settings),
                changes,
                reload_errors,
                last_error_report: Mutex::new(None),
                watcher: Mutex::new(None),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// The active settings (cheap `Arc` clone).
    pub fn settings(&self) -> Arc<Settings> {
        Arc::clone(&self.inner.active.lock())
    }

    /// Receiver that wakes whenever the active settings change.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Settings>> {
        self.inner.changes.subscribe()
    }

    /// Receiver for reloads that failed after all retries. Reports are
    /// throttled to one every few seconds.
    pub fn reload_errors(&self) -> broadcast::Receiver<ReloadError> {
        self.inner.reload_errors.subscribe()
    }

    pub fn vm_config(&self, guid: &VmGuid) -> Option<VmConfig> {
        self.inner.active.lock().vm_config(guid).cloned()
    }

    /// Apply `mutator` to a copy of the settings, persist it, then make it
    /// active.
    pub fn mutate<F>(&self, mutator: F) -> Result<Arc<Settings>, ConfigError>
    where
        F: FnOnce(&mut Settings),
    {
        self.inner.update(|settings| {
            mutator(settings);
            true
        })
    }

    /// Record newly seen VMs and refresh known names. Writes the file only
    /// when something changed.
    pub fn register_vms<'a, I>(&self, vms: I) -> Result<bool, ConfigError>
    where
        I: IntoIterator<Item = (&'a VmGuid, &'a str)>,
    {
        let mut changed = false;
        self.inner.update(|settings| {
            changed = settings.register_vms(vms);
            changed
        })?;
        Ok(changed)
    }

    /// Re-read the file once.
    pub fn reload(&self) -> Result<(), ConfigError> {
        self.inner.reload()
    }

    /// Start watching the settings file. Changes trigger a reload with
    /// retries; calling this again is a no-op.
    pub fn watch(&self) -> Result<(), ConfigError> {
        let mut slot = self.inner.watcher.lock();
        if slot.is_some() {
            return Ok(());
        }

        let file_name = self.inner.path.file_name().map(ToOwned::to_owned);
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let mut watcher = notify::recommended_watcher(
            move |event: Result<notify::Event, notify::Error>| {
                let Ok(event) = event else { return };
                if !matches!(
                    event.kind,
                    EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
                ) {
                    return;
                }
                let ours = event
                    .paths
                    .iter()
                    .any(|p| p.file_name().map(ToOwned::to_owned) == file_name);
                if let (true, Some(inner)) = (ours, weak.upgrade()) {
                    inner.on_file_changed();
                }
            },
        )?;

        let dir = match self.inner.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        info!(path = %self.inner.path.display(), "watching settings file");

        *slot = Some(watcher);
        Ok(())
    }
}

impl Inner {
    fn update<F>(&self, apply: F) -> Result<Arc<Settings>, ConfigError>
    where
        F: FnOnce(&mut Settings) -> bool,
    {
        let mut active = self.active.lock();
        let mut next = Settings::clone(&active);
        if !apply(&mut next) {
            return Ok(Arc::clone(&active));
        }
        save_settings(&self.path, &next)?;

        let next = Arc::new(next);
        *active = Arc::clone(&next);
        drop(active);

        self.changes.send_replace(Arc::clone(&next));
        Ok(next)
    }

    fn reload(&self) -> Result<(), ConfigError> {
        let loaded = load_settings(&self.path)?;
        let mut active = self.active.lock();
        if **active == loaded {
            return Ok(());
        }
        let loaded = Arc::new(loaded);
        *active = Arc::clone(&loaded);
        drop(active);

        self.changes.send_replace(loaded);
        debug!(path = %self.path.display(), "settings reloaded");
        Ok(())
    }

    fn reload_with_retry(&self) -> Result<(), ConfigError> {
        let mut attempt = 1;
        loop {
            match self.reload() {
                Ok(()) => return Ok(()),
                Err(e) if attempt >= RELOAD_ATTEMPTS => return Err(e),
                Err(e) => {
                    debug!(attempt, error = %e, "settings reload failed; retrying");
                    attempt += 1;
                    std::thread::sleep(RELOAD_BACKOFF);
                }
            }
        }
    }

    fn on_file_changed(&self) {
        if let Err(e) = self.reload_with_retry() {
            self.report_reload_error(&e);
        }
    }

    /// Returns `true` if the error was reported rather than throttled.
    fn report_reload_error(&self, error: &ConfigError) -> bool {
        let mut last = self.last_error_report.lock();
        if last.is_some_and(|at| at.elapsed() < ERROR_REPORT_INTERVAL) {
            debug!(error = %error, "settings reload error suppressed");
            return false;
        }
        *last = Some(Instant::now());
        drop(last);

        let report = ReloadError {
            path: self.path.clone(),
            reason: error.to_string(),
        };
        warn!(%report, "settings reload failed");
        let _ = self.reload_errors.send(report);
        true
    }
}
