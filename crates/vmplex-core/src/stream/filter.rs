// ── Filter predicates for VM lists ──
//
// Lets the presentation layer narrow a snapshot without touching the
// provider.

use crate::model::{EnabledState, VmEntry};

/// Filter predicate for VM entries.
pub enum VmFilter {
    All,
    ByState(EnabledState),
    Running,
    /// Guests in a transition such as starting or saving.
    Transitional,
    /// Name contains the needle, ignoring ASCII case.
    NameContains(String),
    Custom(Box<dyn Fn(&VmEntry) -> bool + Send + Sync>),
}

impl VmFilter {
    pub fn matches(&self, entry: &VmEntry) -> bool {
        match self {
            Self::All => true,
            Self::ByState(state) => entry.enabled_state() == *state,
            Self::Running => entry.enabled_state().is_running(),
            Self::Transitional => entry.enabled_state().is_transitional(),
            Self::NameContains(needle) => entry
                .name()
                .to_ascii_lowercase()
                .contains(&needle.to_ascii_lowercase()),
            Self::Custom(f) => f(entry),
        }
    }
}
