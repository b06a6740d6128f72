// ── Command API ──
//
// Operator actions against a single VM. Every variant maps onto one
// `RequestStateChange` call; the engine refreshes the entry's main
// information from the provider once the call returns.

use crate::model::{RequestedState, VmGuid, VmSnapshot};
use crate::provider::STATUS_JOB_STARTED;

/// All state-changing operations on a virtual machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start { guid: VmGuid },
    /// Orderly guest shutdown.
    Stop { guid: VmGuid },
    /// Hard power off.
    TurnOff { guid: VmGuid },
    Save { guid: VmGuid },
    Pause { guid: VmGuid },
    Reset { guid: VmGuid },
}

impl Command {
    pub fn guid(&self) -> &VmGuid {
        match self {
            Self::Start { guid }
            | Self::Stop { guid }
            | Self::TurnOff { guid }
            | Self::Save { guid }
            | Self::Pause { guid }
            | Self::Reset { guid } => guid,
        }
    }

    pub fn requested_state(&self) -> RequestedState {
        match self {
            Self::Start { .. } => RequestedState::Running,
            Self::Stop { .. } => RequestedState::Stopping,
            Self::TurnOff { .. } => RequestedState::Off,
            Self::Save { .. } => RequestedState::Saved,
            Self::Pause { .. } => RequestedState::Paused,
            Self::Reset { .. } => RequestedState::Reset,
        }
    }

    /// Short operation label used in errors and logs.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Stop { .. } => "stop",
            Self::TurnOff { .. } => "turn-off",
            Self::Save { .. } => "save",
            Self::Pause { .. } => "pause",
            Self::Reset { .. } => "reset",
        }
    }
}

/// Successful command outcome, carrying the entry as it was when the
/// request was issued. Either way the entry settles through modification
/// notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    /// The provider applied the change synchronously.
    Completed(VmSnapshot),
    /// The provider accepted the change as a background job.
    JobStarted(VmSnapshot),
}

impl CommandResult {
    pub(crate) fn from_status(status: u32, snapshot: VmSnapshot) -> Self {
        if status == STATUS_JOB_STARTED {
            Self::JobStarted(snapshot)
        } else {
            Self::Completed(snapshot)
        }
    }

    pub fn snapshot(&self) -> &VmSnapshot {
        match self {
            Self::Completed(snapshot) | Self::JobStarted(snapshot) => snapshot,
        }
    }
}
