// ── Instance identity snapshots and change notifications ──
//
// Typed view of `Msvm_ComputerSystem` as delivered by the provider,
// either from an identity query or inside a change notification.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use strum::Display;

use super::guid::VmGuid;

/// Caption the hypervisor gives to guest computer systems. The host itself
/// is exposed through the same class with a different caption.
pub const VIRTUAL_MACHINE_CAPTION: &str = "Virtual Machine";

/// Operational state of a computer system (`EnabledState`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnabledState {
    Unknown,
    Running,
    Off,
    ShuttingDown,
    Saved,
    Paused,
    Starting,
    Saving,
    Pausing,
    Resuming,
    Other(u16),
}

impl EnabledState {
    /// Decode the raw CIM / Hyper-V state code.
    pub fn from_code(code: u16) -> Self {
        match code {
            0 => Self::Unknown,
            2 => Self::Running,
            3 => Self::Off,
            4 => Self::ShuttingDown,
            6 => Self::Saved,
            9 => Self::Paused,
            10 => Self::Starting,
            32773 => Self::Saving,
            32776 => Self::Pausing,
            32777 => Self::Resuming,
            other => Self::Other(other),
        }
    }

    pub fn code(self) -> u16 {
        match self {
            Self::Unknown => 0,
            Self::Running => 2,
            Self::Off => 3,
            Self::ShuttingDown => 4,
            Self::Saved => 6,
            Self::Paused => 9,
            Self::Starting => 10,
            Self::Saving => 32773,
            Self::Pausing => 32776,
            Self::Resuming => 32777,
            Self::Other(code) => code,
        }
    }

    pub fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn is_transitional(self) -> bool {
        matches!(
            self,
            Self::ShuttingDown | Self::Starting | Self::Saving | Self::Pausing | Self::Resuming
        )
    }
}

impl fmt::Display for EnabledState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unknown => "Unknown",
            Self::Running => "Running",
            Self::Off => "Off",
            Self::ShuttingDown => "Shutting Down",
            Self::Saved => "Saved",
            Self::Paused => "Paused",
            Self::Starting => "Starting",
            Self::Saving => "Saving",
            Self::Pausing => "Pausing",
            Self::Resuming => "Resuming",
            Self::Other(code) => return write!(f, "Other ({code})"),
        };
        f.write_str(label)
    }
}

/// Target state for `RequestStateChange`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestedState {
    Running,
    Off,
    Stopping,
    Saved,
    Paused,
    Reset,
}

impl RequestedState {
    pub fn code(self) -> u16 {
        match self {
            Self::Running => 2,
            Self::Off => 3,
            Self::Stopping => 4,
            Self::Saved => 6,
            Self::Paused => 9,
            Self::Reset => 11,
        }
    }

    /// State the instance settles in once the request completes.
    pub fn settled_state(self) -> EnabledState {
        match self {
            Self::Running | Self::Reset => EnabledState::Running,
            Self::Off | Self::Stopping => EnabledState::Off,
            Self::Saved => EnabledState::Saved,
            Self::Paused => EnabledState::Paused,
        }
    }
}

/// Point-in-time identity and attribute record for one computer system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceSnapshot {
    pub guid: VmGuid,
    pub name: String,
    #[serde(default = "default_caption")]
    pub caption: String,
    #[serde(default)]
    pub processor_count: Option<u16>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub enhanced_session_capable: bool,
    #[serde(default = "default_state")]
    pub enabled_state: EnabledState,
    /// Raw RGB565 thumbnail, when the provider includes one.
    #[serde(skip)]
    pub thumbnail: Option<Bytes>,
}

fn default_caption() -> String {
    VIRTUAL_MACHINE_CAPTION.into()
}

fn default_state() -> EnabledState {
    EnabledState::Off
}

impl InstanceSnapshot {
    /// A powered-off guest with no optional attributes filled in.
    pub fn new(guid: impl Into<VmGuid>, name: impl Into<String>) -> Self {
        Self {
            guid: guid.into(),
            name: name.into(),
            caption: default_caption(),
            processor_count: None,
            version: None,
            enhanced_session_capable: false,
            enabled_state: default_state(),
            thumbnail: None,
        }
    }

    pub fn with_state(mut self, state: EnabledState) -> Self {
        self.enabled_state = state;
        self
    }

    pub fn with_processors(mut self, count: u16) -> Self {
        self.processor_count = Some(count);
        self
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = caption.into();
        self
    }

    pub fn is_virtual_machine(&self, category: &str) -> bool {
        self.caption == category
    }
}

/// The three intrinsic event classes the engine subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChangeKind {
    Creation,
    Deletion,
    Modification,
}

impl ChangeKind {
    pub const ALL: [Self; 3] = [Self::Creation, Self::Deletion, Self::Modification];

    /// Event class name used in the provider's subscription query.
    pub fn event_class(self) -> &'static str {
        match self {
            Self::Creation => "__InstanceCreationEvent",
            Self::Deletion => "__InstanceDeletionEvent",
            Self::Modification => "__InstanceModificationEvent",
        }
    }
}

/// A single delivery from one of the change subscriptions.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeNotification {
    pub kind: ChangeKind,
    pub target: InstanceSnapshot,
    /// Only present for modifications.
    pub previous: Option<InstanceSnapshot>,
}

impl ChangeNotification {
    pub fn created(target: InstanceSnapshot) -> Self {
        Self {
            kind: ChangeKind::Creation,
            target,
            previous: None,
        }
    }

    pub fn deleted(target: InstanceSnapshot) -> Self {
        Self {
            kind: ChangeKind::Deletion,
            target,
            previous: None,
        }
    }

    pub fn modified(previous: Option<InstanceSnapshot>, target: InstanceSnapshot) -> Self {
        Self {
            kind: ChangeKind::Modification,
            target,
            previous,
        }
    }
}
