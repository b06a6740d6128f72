// ── Bulk application logic ──
//
// Applies the initial identity snapshot and each round of summary records
// to the VmStore. The lock is taken per entry, so readers interleave with
// a large merge instead of waiting for all of it.

use chrono::Utc;
use tracing::debug;

use super::VmStore;
use crate::model::{InstanceSnapshot, SummaryRecord};

/// Outcome of merging one batch of summary records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Records applied to an existing entry.
    pub applied: usize,
    /// Records whose guid had no entry; skipped.
    pub unknown: usize,
}

impl VmStore {
    /// Load the initial full snapshot. Entries that already exist (a
    /// creation notification won the race) keep their current fields.
    /// Returns the number of entries inserted.
    pub(crate) fn populate(&self, instances: &[InstanceSnapshot]) -> usize {
        instances
            .iter()
            .filter(|instance| self.insert_if_absent(instance))
            .count()
    }

    /// Merge one successful poll round.
    pub(crate) fn apply_summary_records(&self, records: &[SummaryRecord]) -> MergeStats {
        let mut stats = MergeStats::default();
        for record in records {
            if self.apply_summary_locked(record) {
                stats.applied += 1;
            } else {
                debug!(guid = %record.guid, "summary record for unknown vm skipped");
                stats.unknown += 1;
            }
        }

        if stats.applied > 0 {
            self.notify_field_change();
        }
        self.last_summary.send_replace(Some(Utc::now()));
        stats
    }
}
