//! Provider client boundary.
//!
//! The engine talks to the hypervisor's management protocol through the
//! [`Provider`] trait. Implementations adapt the protocol's loosely typed
//! records into [`InstanceSnapshot`] / [`SummaryRecord`] values so the
//! core never touches untyped data. Request timeouts are the provider's
//! responsibility.

mod memory;

use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;
use thiserror::Error;

use crate::model::{
    ChangeKind, ChangeNotification, InstanceSnapshot, RequestedState, SummaryField, SummaryRecord,
    VmGuid,
};

pub use memory::{MemoryFixture, MemoryProvider};

/// Boxed notification feed returned by [`Provider::subscribe`].
pub type NotificationStream = Pin<Box<dyn Stream<Item = ChangeNotification> + Send>>;

/// `ReturnValue` of a management method that completed synchronously.
pub const STATUS_COMPLETED: u32 = 0;
/// `ReturnValue` of a management method that started an async job.
pub const STATUS_JOB_STARTED: u32 = 4096;

/// Errors raised at the provider boundary.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("cannot connect to {namespace}: {reason}")]
    Connect { namespace: String, reason: String },

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("subscription to {kind} events failed: {reason}")]
    Subscribe { kind: ChangeKind, reason: String },

    #[error("instance not found: {0}")]
    NotFound(VmGuid),

    #[error("provider connection closed")]
    Closed,
}

/// Opaque reference to a `Msvm_VirtualSystemSettingData` instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SettingsHandle(String);

impl SettingsHandle {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Identity of the management service found by the capability check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagementService {
    pub name: String,
}

/// Result of one bulk summary query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryResponse {
    /// Method `ReturnValue`; non-zero means the call failed.
    pub status: u32,
    pub records: Vec<SummaryRecord>,
}

impl SummaryResponse {
    pub fn ok(records: Vec<SummaryRecord>) -> Self {
        Self {
            status: STATUS_COMPLETED,
            records,
        }
    }

    pub fn failed(status: u32) -> Self {
        Self {
            status,
            records: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == STATUS_COMPLETED
    }
}

/// Capability set the engine needs from the hypervisor management client.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Open the management namespace.
    async fn connect(&self) -> Result<(), ProviderError>;

    /// Look up the virtual system management service. `None` means the
    /// service exists but the caller may not use it.
    async fn management_service(&self) -> Result<Option<ManagementService>, ProviderError>;

    /// All computer systems whose caption equals `category`.
    async fn list_instances(&self, category: &str) -> Result<Vec<InstanceSnapshot>, ProviderError>;

    async fn get_instance(&self, guid: &VmGuid) -> Result<Option<InstanceSnapshot>, ProviderError>;

    /// Open a change feed for one intrinsic event class.
    async fn subscribe(&self, kind: ChangeKind) -> Result<NotificationStream, ProviderError>;

    /// Settings-data handles associated with an instance through
    /// `Msvm_SettingsDefineState`.
    async fn associated_settings(
        &self,
        instance: &InstanceSnapshot,
    ) -> Result<Vec<SettingsHandle>, ProviderError>;

    async fn query_summary_information(
        &self,
        fields: &[SummaryField],
        settings: &[SettingsHandle],
    ) -> Result<SummaryResponse, ProviderError>;

    /// Invoke `RequestStateChange`; returns the method's `ReturnValue`.
    async fn request_state_change(
        &self,
        guid: &VmGuid,
        state: RequestedState,
    ) -> Result<u32, ProviderError>;
}
