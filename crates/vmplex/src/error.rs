//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use vmplex_config::ConfigError;
use vmplex_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const PERMISSION: i32 = 5;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Startup ──────────────────────────────────────────────────────
    #[error("Unable to interact with the Virtual Machine Management Service")]
    #[diagnostic(
        code(vmplex::management_unavailable),
        help(
            "{reason}\n\
             Run vmplex from an elevated prompt, or add the current user to the\n\
             \"Hyper-V Administrators\" group and sign in again."
        )
    )]
    ManagementUnavailable { reason: String },

    #[error("Could not connect to the virtualization provider")]
    #[diagnostic(code(vmplex::connection_failed), help("{reason}"))]
    ConnectionFailed { reason: String },

    #[error("Engine startup failed: {message}")]
    #[diagnostic(code(vmplex::startup_failed))]
    Startup { message: String },

    #[error("No provider configured")]
    #[diagnostic(
        code(vmplex::no_provider),
        help(
            "Pass a fixture describing the hypervisor with --fixture <FILE>\n\
             or set VMPLEX_FIXTURE."
        )
    )]
    NoProvider,

    #[error("Cannot read fixture {path}")]
    #[diagnostic(code(vmplex::fixture))]
    Fixture {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(vmplex::not_found),
        help("Run: vmplex {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("Operation '{operation}' failed with status {status}")]
    #[diagnostic(
        code(vmplex::operation_failed),
        help("The hypervisor rejected the request; check the VM's current state.")
    )]
    OperationFailed { operation: String, status: u32 },

    // ── Validation / configuration ───────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(vmplex::validation))]
    Validation { field: String, reason: String },

    #[error(transparent)]
    #[diagnostic(code(vmplex::config))]
    Config(#[from] ConfigError),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Serialization failed: {0}")]
    #[diagnostic(code(vmplex::json))]
    Json(#[from] serde_json::Error),

    #[error("Serialization failed: {0}")]
    #[diagnostic(code(vmplex::yaml))]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    #[diagnostic(code(vmplex::core))]
    Core(CoreError),
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ManagementUnavailable { reason } => Self::ManagementUnavailable { reason },
            CoreError::ConnectionFailed { reason } => Self::ConnectionFailed { reason },
            CoreError::SubscriptionFailed { .. } | CoreError::SnapshotFailed { .. } => {
                Self::Startup {
                    message: err.to_string(),
                }
            }
            CoreError::VmNotFound { guid } => Self::NotFound {
                resource_type: "vm".into(),
                identifier: guid.to_string(),
                list_command: "list".into(),
            },
            CoreError::OperationFailed { operation, status } => {
                Self::OperationFailed { operation, status }
            }
            other => Self::Core(other),
        }
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ManagementUnavailable { .. } => exit_code::PERMISSION,
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::NoProvider | Self::Fixture { .. } | Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmplex_core::VmGuid;

    #[test]
    fn management_unavailable_has_its_own_exit_code() {
        let err = CliError::from(CoreError::ManagementUnavailable {
            reason: "access denied".into(),
        });
        assert_eq!(err.exit_code(), exit_code::PERMISSION);
    }

    #[test]
    fn missing_vm_maps_to_not_found() {
        let err = CliError::from(CoreError::VmNotFound {
            guid: VmGuid::new("a"),
        });
        assert_eq!(err.exit_code(), exit_code::NOT_FOUND);
        assert!(err.to_string().contains("'A'"));
    }
}
