// ── Core error types ──
//
// Only startup failures and explicit operator commands surface errors to
// the host. Poll failures, unknown guids and observer faults are absorbed
// inside the engine and never reach this type.

use thiserror::Error;

use crate::model::VmGuid;
use crate::provider::ProviderError;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Startup errors ───────────────────────────────────────────────
    #[error("Cannot connect to the virtualization provider: {reason}")]
    ConnectionFailed { reason: String },

    /// The management service could not be reached. Almost always a
    /// privilege problem; the host must report it and exit.
    #[error("Unable to interact with the Virtual Machine Management Service: {reason}")]
    ManagementUnavailable { reason: String },

    #[error("Failed to subscribe to {kind} events: {reason}")]
    SubscriptionFailed { kind: String, reason: String },

    #[error("Initial snapshot failed: {reason}")]
    SnapshotFailed { reason: String },

    // ── Lifecycle errors ─────────────────────────────────────────────
    #[error("Engine already started")]
    AlreadyStarted,

    #[error("Engine is not running")]
    EngineStopped,

    // ── Command errors ───────────────────────────────────────────────
    #[error("Virtual machine not found: {guid}")]
    VmNotFound { guid: VmGuid },

    #[error("Management operation {operation} failed with status {status}")]
    OperationFailed { operation: String, status: u32 },

    // ── Provider errors (wrapped) ────────────────────────────────────
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

impl CoreError {
    /// Whether the host must render this error and terminate instead of
    /// running in a degraded state.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. }
                | Self::ManagementUnavailable { .. }
                | Self::SubscriptionFailed { .. }
                | Self::SnapshotFailed { .. }
        )
    }
}
