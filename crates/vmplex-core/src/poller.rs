// ── Summary poller ──
//
// Periodic bulk metrics query. The eligible set is listed fresh each
// round; the store lock is only taken for the merge, after the provider
// has answered. A failed round leaves metrics stale until the next one.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::model::SummaryField;
use crate::provider::{Provider, ProviderError};
use crate::store::{MergeStats, VmStore};

/// Result of one poll round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Records were merged into the store.
    Merged(MergeStats),
    /// No eligible instances; the bulk query was not issued.
    Skipped,
    /// The bulk query reported a non-zero status.
    Failed { status: u32 },
}

/// Merges bulk summary metrics into the store on a fixed interval.
#[derive(Clone)]
pub struct SummaryPoller {
    provider: Arc<dyn Provider>,
    store: Arc<VmStore>,
    fields: Arc<[SummaryField]>,
    managed_category: Arc<str>,
    interval: Duration,
}

impl SummaryPoller {
    pub fn new(
        provider: Arc<dyn Provider>,
        store: Arc<VmStore>,
        fields: &[SummaryField],
        managed_category: impl Into<Arc<str>>,
        interval: Duration,
    ) -> Self {
        Self {
            provider,
            store,
            fields: fields.into(),
            managed_category: managed_category.into(),
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run a single round: list, resolve settings, query, merge.
    pub async fn poll_once(&self) -> Result<PollOutcome, ProviderError> {
        let instances = self.provider.list_instances(&self.managed_category).await?;

        let mut handles = Vec::with_capacity(instances.len());
        for instance in &instances {
            handles.extend(self.provider.associated_settings(instance).await?);
        }
        if handles.is_empty() {
            return Ok(PollOutcome::Skipped);
        }

        let response = self
            .provider
            .query_summary_information(&self.fields, &handles)
            .await?;
        if !response.is_success() {
            return Ok(PollOutcome::Failed {
                status: response.status,
            });
        }

        Ok(PollOutcome::Merged(
            self.store.apply_summary_records(&response.records),
        ))
    }

    /// Poll every interval until `cancel` fires. Individual failures are
    /// logged and the loop carries on.
    pub async fn run(self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await; // consume the immediate first tick

        debug!(interval = ?self.interval, "summary poller started");
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            // Dropping the in-flight round on cancel discards its records.
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                outcome = self.poll_once() => outcome,
            };

            match outcome {
                Ok(PollOutcome::Merged(stats)) => {
                    trace!(applied = stats.applied, unknown = stats.unknown, "summary merged");
                }
                Ok(PollOutcome::Skipped) => trace!("no eligible vms; summary query skipped"),
                Ok(PollOutcome::Failed { status }) => {
                    debug!(status, "summary query failed; keeping stale metrics");
                }
                Err(e) => debug!(error = %e, "summary poll failed"),
            }
        }
        debug!("summary poller stopped");
    }
}
