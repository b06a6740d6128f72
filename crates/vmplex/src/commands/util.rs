//! Shared helpers for command handlers.

use vmplex_core::{Engine, VmGuid};

use crate::error::CliError;

/// Resolve a VM identifier (guid or display name) via snapshot lookup.
pub fn resolve_vm(engine: &Engine, identifier: &str) -> Result<VmGuid, CliError> {
    engine
        .resolve(identifier)
        .map(|entry| entry.guid().clone())
        .ok_or_else(|| CliError::NotFound {
            resource_type: "vm".into(),
            identifier: identifier.into(),
            list_command: "list".into(),
        })
}
