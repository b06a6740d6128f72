//! Live, reconciled in-memory mirror of hypervisor-managed virtual machines.
//!
//! The crate keeps a local view of every managed VM consistent with the
//! hypervisor by combining two feeds:
//!
//! - **[`EventReconciler`]**: applies creation, deletion and modification
//!   notifications to the identity/attribute group of each entry.
//!
//! - **[`SummaryPoller`]**: merges one bulk metrics query per interval into
//!   the metrics group. A failed round keeps the previous metrics.
//!
//! - **[`VmStore`]**: the ordered, lock-guarded collection of [`VmEntry`]
//!   values. Readers take `watch`-published snapshots and can hold entries
//!   while background tasks keep updating them.
//!
//! - **[`Engine`]**: composition root. [`start()`](Engine::start) connects,
//!   checks the management capability, opens the subscriptions, loads the
//!   initial snapshot and spawns the background tasks.
//!
//! - **[`Provider`]**: async boundary to the management protocol. The
//!   bundled [`MemoryProvider`] backs fixtures and tests.

pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod poller;
pub mod provider;
pub mod reconcile;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use command::{Command, CommandResult};
pub use config::EngineConfig;
pub use engine::{Engine, EngineState};
pub use error::CoreError;
pub use poller::{PollOutcome, SummaryPoller};
pub use provider::{
    ManagementService, MemoryFixture, MemoryProvider, NotificationStream, Provider,
    ProviderError, SettingsHandle, SummaryResponse,
};
pub use reconcile::{ChangeFeeds, EventReconciler};
pub use store::{MergeStats, VmList, VmStore};
pub use stream::{VmFilter, VmStream, VmWatchStream};

pub use model::{
    ChangeKind, ChangeNotification, EnabledState, Heartbeat, InstanceSnapshot, MainInformation,
    RequestedState, SummaryField, SummaryInformation, SummaryRecord, VIRTUAL_MACHINE_CAPTION,
    VmEntry, VmGuid, VmSnapshot,
};
