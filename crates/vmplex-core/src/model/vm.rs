// ── VM entry ──
//
// One cached virtual machine. The entry object lives for as long as the
// guid is present in the store; updates swap one of its two field groups
// atomically instead of replacing the entry, so references handed out to
// observers keep tracking the live state.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use bytes::Bytes;
use serde::Serialize;

use super::guid::VmGuid;
use super::instance::{EnabledState, InstanceSnapshot};
use super::summary::{Heartbeat, SummaryRecord};

/// Identity and attribute group, fed by the initial snapshot and by
/// modification notifications.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MainInformation {
    pub name: String,
    pub processor_count: Option<u16>,
    pub version: Option<String>,
    pub enhanced_session_capable: bool,
    pub enabled_state: EnabledState,
    #[serde(skip)]
    pub thumbnail: Option<Bytes>,
}

impl From<&InstanceSnapshot> for MainInformation {
    fn from(snapshot: &InstanceSnapshot) -> Self {
        Self {
            name: snapshot.name.clone(),
            processor_count: snapshot.processor_count,
            version: snapshot.version.clone(),
            enhanced_session_capable: snapshot.enhanced_session_capable,
            enabled_state: snapshot.enabled_state,
            thumbnail: snapshot.thumbnail.clone(),
        }
    }
}

/// Live metrics group, fed only by the summary poller.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SummaryInformation {
    pub processor_load: Option<u16>,
    pub memory_usage_mb: Option<u64>,
    pub heartbeat: Option<Heartbeat>,
    pub uptime: Option<Duration>,
    pub memory_available_pct: Option<i32>,
}

impl From<&SummaryRecord> for SummaryInformation {
    fn from(record: &SummaryRecord) -> Self {
        Self {
            processor_load: record.processor_load,
            memory_usage_mb: record.memory_usage_mb,
            heartbeat: record.heartbeat,
            uptime: record.uptime,
            memory_available_pct: record.memory_available_pct,
        }
    }
}

/// A cached virtual machine held by the [`VmStore`](crate::VmStore).
///
/// Each group is read and replaced as a whole, so a reader never sees
/// fields from two different updates of the same group.
#[derive(Debug)]
pub struct VmEntry {
    guid: VmGuid,
    main: ArcSwap<MainInformation>,
    summary: ArcSwap<SummaryInformation>,
}

impl VmEntry {
    pub fn new(snapshot: &InstanceSnapshot) -> Self {
        Self {
            guid: snapshot.guid.clone(),
            main: ArcSwap::from_pointee(MainInformation::from(snapshot)),
            summary: ArcSwap::from_pointee(SummaryInformation::default()),
        }
    }

    pub fn guid(&self) -> &VmGuid {
        &self.guid
    }

    pub fn main(&self) -> Arc<MainInformation> {
        self.main.load_full()
    }

    pub fn summary(&self) -> Arc<SummaryInformation> {
        self.summary.load_full()
    }

    pub fn name(&self) -> String {
        self.main.load().name.clone()
    }

    pub fn enabled_state(&self) -> EnabledState {
        self.main.load().enabled_state
    }

    /// Immutable copy of both groups.
    pub fn snapshot(&self) -> VmSnapshot {
        VmSnapshot {
            guid: self.guid.clone(),
            main: self.main(),
            summary: self.summary(),
        }
    }

    /// Replace the identity/attribute group. Snapshots for another guid
    /// are ignored.
    pub(crate) fn apply_main_information(&self, snapshot: &InstanceSnapshot) -> bool {
        if snapshot.guid != self.guid {
            return false;
        }
        self.main.store(Arc::new(MainInformation::from(snapshot)));
        true
    }

    /// Replace the metrics group. Records for another guid are ignored.
    pub(crate) fn apply_summary_information(&self, record: &SummaryRecord) -> bool {
        if record.guid != self.guid {
            return false;
        }
        self.summary.store(Arc::new(SummaryInformation::from(record)));
        true
    }
}

/// Point-in-time copy of a [`VmEntry`], used for removal notices and
/// serialized output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VmSnapshot {
    pub guid: VmGuid,
    pub main: Arc<MainInformation>,
    pub summary: Arc<SummaryInformation>,
}

impl VmSnapshot {
    pub fn name(&self) -> &str {
        &self.main.name
    }
}
