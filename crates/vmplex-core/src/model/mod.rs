// ── Domain model ──
//
// Typed values produced at the provider boundary and the cached entry
// the store hands out to observers.

pub mod guid;
pub mod instance;
pub mod summary;
pub mod vm;

pub use guid::VmGuid;
pub use instance::{
    ChangeKind, ChangeNotification, EnabledState, InstanceSnapshot, RequestedState,
    VIRTUAL_MACHINE_CAPTION,
};
pub use summary::{Heartbeat, SummaryField, SummaryRecord};
pub use vm::{MainInformation, SummaryInformation, VmEntry, VmSnapshot};
