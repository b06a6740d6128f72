// ── Engine configuration ──
//
// Tuning for the synchronization engine. Built by the host (usually from
// the user settings file) and handed in; core never reads config files.

use std::time::Duration;

use crate::model::{SummaryField, VIRTUAL_MACHINE_CAPTION};

/// Configuration for one synchronization engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Delay between summary polls.
    pub poll_interval: Duration,
    /// Caption that marks a computer system as a managed guest.
    pub managed_category: String,
    /// Fields requested from the bulk summary query.
    pub summary_fields: Vec<SummaryField>,
    /// Capacity of the "VM removed" broadcast channel.
    pub removal_channel_size: usize,
    /// Merge one round of metrics before the engine reports `Running`.
    pub initial_poll: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            managed_category: VIRTUAL_MACHINE_CAPTION.into(),
            summary_fields: SummaryField::DEFAULT_REQUEST.to_vec(),
            removal_channel_size: 64,
            initial_poll: true,
        }
    }
}

impl EngineConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn without_initial_poll(mut self) -> Self {
        self.initial_poll = false;
        self
    }
}
