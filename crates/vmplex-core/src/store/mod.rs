// ── State store ──
//
// Ordered, concurrency-safe mirror of every managed VM. One reader-writer
// lock guards both the map structure and each entry's field-group swaps;
// it is never held across a provider call. Observers get a pre-built
// snapshot through a `watch` channel so iteration never races a writer.

mod refresh;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::RwLock;
use tokio::sync::watch;

use crate::model::{InstanceSnapshot, SummaryRecord, VmEntry, VmGuid, VmSnapshot};

pub use refresh::MergeStats;

/// Ordered snapshot of the store, shared with every subscriber.
pub type VmList = Arc<Vec<Arc<VmEntry>>>;

/// The single source of truth for cached VM state.
///
/// Entries keep the order in which they were first inserted. Mutation is
/// crate-private: only the reconciler and the poller write.
pub struct VmStore {
    entries: RwLock<IndexMap<VmGuid, Arc<VmEntry>>>,
    snapshot: watch::Sender<VmList>,
    version: watch::Sender<u64>,
    last_summary: watch::Sender<Option<DateTime<Utc>>>,
}

impl Default for VmStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for VmStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VmStore")
            .field("len", &self.len())
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}

impl VmStore {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        let (version, _) = watch::channel(0u64);
        let (last_summary, _) = watch::channel(None);
        Self {
            entries: RwLock::new(IndexMap::new()),
            snapshot,
            version,
            last_summary,
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Current entries in insertion order (cheap `Arc` clone).
    pub fn snapshot(&self) -> VmList {
        self.snapshot.borrow().clone()
    }

    pub fn get(&self, guid: &VmGuid) -> Option<Arc<VmEntry>> {
        self.entries.read().get(guid).cloned()
    }

    /// First entry whose current name matches, ignoring ASCII case.
    pub fn find_by_name(&self, name: &str) -> Option<Arc<VmEntry>> {
        self.entries
            .read()
            .values()
            .find(|entry| entry.main().name.eq_ignore_ascii_case(name))
            .cloned()
    }

    pub fn contains(&self, guid: &VmGuid) -> bool {
        self.entries.read().contains_key(guid)
    }

    pub fn guids(&self) -> Vec<VmGuid> {
        self.entries.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Receiver that wakes on every insert, remove and field-group update.
    pub fn subscribe(&self) -> watch::Receiver<VmList> {
        self.snapshot.subscribe()
    }

    /// Monotonic mutation counter.
    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    /// Completion time of the last successful summary merge.
    pub fn last_summary_update(&self) -> Option<DateTime<Utc>> {
        *self.last_summary.borrow()
    }

    pub fn subscribe_last_summary(&self) -> watch::Receiver<Option<DateTime<Utc>>> {
        self.last_summary.subscribe()
    }

    // ── Mutations (crate-private) ────────────────────────────────────

    /// Insert a new entry unless one with the same guid already exists.
    /// Returns `true` if the entry was inserted.
    pub(crate) fn insert_if_absent(&self, instance: &InstanceSnapshot) -> bool {
        let mut entries = self.entries.write();
        if entries.contains_key(&instance.guid) {
            return false;
        }
        entries.insert(instance.guid.clone(), Arc::new(VmEntry::new(instance)));
        self.rebuild_snapshot(&entries);
        self.bump_version();
        true
    }

    /// Remove an entry, returning its last state captured under the lock.
    pub(crate) fn remove(&self, guid: &VmGuid) -> Option<VmSnapshot> {
        let mut entries = self.entries.write();
        let removed = entries.shift_remove(guid)?;
        let last = removed.snapshot();
        self.rebuild_snapshot(&entries);
        self.bump_version();
        Some(last)
    }

    /// Replace the main-information group of an existing entry.
    pub(crate) fn update_main(&self, instance: &InstanceSnapshot) -> bool {
        let applied = self
            .entries
            .write()
            .get(&instance.guid)
            .is_some_and(|entry| entry.apply_main_information(instance));
        if applied {
            self.notify_field_change();
        }
        applied
    }

    /// Replace the summary-information group of an existing entry.
    #[cfg(test)]
    pub(crate) fn update_summary(&self, record: &SummaryRecord) -> bool {
        let applied = self.apply_summary_locked(record);
        if applied {
            self.notify_field_change();
        }
        applied
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn apply_summary_locked(&self, record: &SummaryRecord) -> bool {
        self.entries
            .write()
            .get(&record.guid)
            .is_some_and(|entry| entry.apply_summary_information(record))
    }

    fn rebuild_snapshot(&self, entries: &IndexMap<VmGuid, Arc<VmEntry>>) {
        let values: Vec<Arc<VmEntry>> = entries.values().cloned().collect();
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }

    /// Entries are updated in place; wake subscribers without rebuilding.
    fn notify_field_change(&self) {
        self.snapshot.send_modify(|_| {});
        self.bump_version();
    }

    fn bump_version(&self) {
        self.version.send_modify(|v| *v += 1);
    }
}
