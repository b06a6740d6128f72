// ── In-memory provider ──
//
// A self-contained `Provider` holding instances and metrics in memory.
// Used by the CLI's fixture mode and by the test suites, which drive it
// like a hypervisor: create, modify and delete instances, change the
// metrics the next poll will see, or make individual calls fail.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

use super::{
    ManagementService, NotificationStream, Provider, ProviderError, STATUS_COMPLETED,
    SettingsHandle, SummaryResponse,
};
use crate::model::{
    ChangeKind, ChangeNotification, InstanceSnapshot, RequestedState, SummaryField, SummaryRecord,
    VmGuid,
};

const NAMESPACE: &str = r"root\virtualization\v2";
const SETTINGS_PREFIX: &str = "Microsoft:";
const FEED_CAPACITY: usize = 256;

/// Serialized seed for a [`MemoryProvider`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryFixture {
    #[serde(default)]
    pub instances: Vec<InstanceSnapshot>,
    #[serde(default)]
    pub metrics: Vec<SummaryRecord>,
}

impl MemoryFixture {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[derive(Debug)]
struct State {
    instances: IndexMap<VmGuid, InstanceSnapshot>,
    metrics: HashMap<VmGuid, SummaryRecord>,
    connect_error: Option<String>,
    management_available: bool,
    failing_subscription: Option<ChangeKind>,
    fail_list: bool,
    fail_summary: bool,
    summary_status: u32,
    state_change_status: u32,
    state_changes: Vec<(VmGuid, RequestedState)>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            instances: IndexMap::new(),
            metrics: HashMap::new(),
            connect_error: None,
            management_available: true,
            failing_subscription: None,
            fail_list: false,
            fail_summary: false,
            summary_status: STATUS_COMPLETED,
            state_change_status: STATUS_COMPLETED,
            state_changes: Vec::new(),
        }
    }
}

struct Inner {
    state: Mutex<State>,
    creation: broadcast::Sender<ChangeNotification>,
    deletion: broadcast::Sender<ChangeNotification>,
    modification: broadcast::Sender<ChangeNotification>,
    summary_queries: AtomicUsize,
    summary_paused: watch::Sender<bool>,
}

/// Cloneable in-memory hypervisor.
#[derive(Clone)]
pub struct MemoryProvider {
    inner: Arc<Inner>,
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("MemoryProvider")
            .field("instances", &state.instances.len())
            .field("metrics", &state.metrics.len())
            .finish_non_exhaustive()
    }
}

impl MemoryProvider {
    pub fn new() -> Self {
        let (creation, _) = broadcast::channel(FEED_CAPACITY);
        let (deletion, _) = broadcast::channel(FEED_CAPACITY);
        let (modification, _) = broadcast::channel(FEED_CAPACITY);
        let (summary_paused, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                creation,
                deletion,
                modification,
                summary_queries: AtomicUsize::new(0),
                summary_paused,
            }),
        }
    }

    pub fn from_fixture(fixture: MemoryFixture) -> Self {
        let provider = Self::new();
        {
            let mut state = provider.inner.state.lock();
            for instance in fixture.instances {
                state.instances.insert(instance.guid.clone(), instance);
            }
            for record in fixture.metrics {
                state.metrics.insert(record.guid.clone(), record);
            }
        }
        provider
    }

    // ── Hypervisor-side mutations ────────────────────────────────────

    /// Add an instance without announcing it on the creation feed.
    pub fn insert_instance(&self, instance: InstanceSnapshot) {
        self.inner
            .state
            .lock()
            .instances
            .insert(instance.guid.clone(), instance);
    }

    /// Add an instance and announce it.
    pub fn create_instance(&self, instance: InstanceSnapshot) {
        self.insert_instance(instance.clone());
        self.emit(ChangeNotification::created(instance));
    }

    /// Replace an instance's attributes and announce the modification.
    pub fn modify_instance(&self, instance: InstanceSnapshot) {
        let previous = self
            .inner
            .state
            .lock()
            .instances
            .insert(instance.guid.clone(), instance.clone());
        self.emit(ChangeNotification::modified(previous, instance));
    }

    /// Remove an instance and announce the deletion. Returns false when
    /// the guid was not present (nothing is announced).
    pub fn delete_instance(&self, guid: &VmGuid) -> bool {
        let removed = {
            let mut state = self.inner.state.lock();
            state.metrics.remove(guid);
            state.instances.shift_remove(guid)
        };
        match removed {
            Some(instance) => {
                self.emit(ChangeNotification::deleted(instance));
                true
            }
            None => false,
        }
    }

    /// Deliver a notification verbatim, without touching stored state.
    pub fn emit(&self, notification: ChangeNotification) {
        let feed = match notification.kind {
            ChangeKind::Creation => &self.inner.creation,
            ChangeKind::Deletion => &self.inner.deletion,
            ChangeKind::Modification => &self.inner.modification,
        };
        // No subscribers yet is not an error for a hypervisor.
        let _ = feed.send(notification);
    }

    pub fn set_metrics(&self, record: SummaryRecord) {
        self.inner
            .state
            .lock()
            .metrics
            .insert(record.guid.clone(), record);
    }

    // ── Fault injection ──────────────────────────────────────────────

    pub fn fail_connect(&self, reason: impl Into<String>) {
        self.inner.state.lock().connect_error = Some(reason.into());
    }

    pub fn set_management_available(&self, available: bool) {
        self.inner.state.lock().management_available = available;
    }

    pub fn fail_subscription(&self, kind: ChangeKind) {
        self.inner.state.lock().failing_subscription = Some(kind);
    }

    pub fn fail_list_instances(&self, fail: bool) {
        self.inner.state.lock().fail_list = fail;
    }

    /// Make summary queries raise a transport error.
    pub fn fail_summary_queries(&self, fail: bool) {
        self.inner.state.lock().fail_summary = fail;
    }

    /// Status the next summary queries report; non-zero means failure.
    pub fn set_summary_status(&self, status: u32) {
        self.inner.state.lock().summary_status = status;
    }

    pub fn set_state_change_status(&self, status: u32) {
        self.inner.state.lock().state_change_status = status;
    }

    /// Hold summary queries after their records have been captured until
    /// [`resume_summary_queries`](Self::resume_summary_queries).
    pub fn pause_summary_queries(&self) {
        self.inner.summary_paused.send_replace(true);
    }

    pub fn resume_summary_queries(&self) {
        self.inner.summary_paused.send_replace(false);
    }

    // ── Inspection ───────────────────────────────────────────────────

    /// Number of summary queries that have been started.
    pub fn summary_query_count(&self) -> usize {
        self.inner.summary_queries.load(Ordering::SeqCst)
    }

    pub fn state_changes(&self) -> Vec<(VmGuid, RequestedState)> {
        self.inner.state.lock().state_changes.clone()
    }

    pub fn instance(&self, guid: &VmGuid) -> Option<InstanceSnapshot> {
        self.inner.state.lock().instances.get(guid).cloned()
    }

    fn handle_for(guid: &VmGuid) -> SettingsHandle {
        SettingsHandle::new(format!("{SETTINGS_PREFIX}{guid}"))
    }

    fn guid_for(handle: &SettingsHandle) -> Option<VmGuid> {
        handle.as_str().strip_prefix(SETTINGS_PREFIX).map(VmGuid::new)
    }
}

#[async_trait]
impl Provider for MemoryProvider {
    async fn connect(&self) -> Result<(), ProviderError> {
        match self.inner.state.lock().connect_error.clone() {
            Some(reason) => Err(ProviderError::Connect {
                namespace: NAMESPACE.into(),
                reason,
            }),
            None => Ok(()),
        }
    }

    async fn management_service(&self) -> Result<Option<ManagementService>, ProviderError> {
        let available = self.inner.state.lock().management_available;
        Ok(available.then(|| ManagementService {
            name: "vmms".into(),
        }))
    }

    async fn list_instances(&self, category: &str) -> Result<Vec<InstanceSnapshot>, ProviderError> {
        let state = self.inner.state.lock();
        if state.fail_list {
            return Err(ProviderError::Query("Msvm_ComputerSystem enumeration failed".into()));
        }
        Ok(state
            .instances
            .values()
            .filter(|instance| instance.is_virtual_machine(category))
            .cloned()
            .collect())
    }

    async fn get_instance(&self, guid: &VmGuid) -> Result<Option<InstanceSnapshot>, ProviderError> {
        Ok(self.instance(guid))
    }

    async fn subscribe(&self, kind: ChangeKind) -> Result<NotificationStream, ProviderError> {
        if self.inner.state.lock().failing_subscription == Some(kind) {
            return Err(ProviderError::Subscribe {
                kind,
                reason: format!("{} query rejected", kind.event_class()),
            });
        }
        let rx = match kind {
            ChangeKind::Creation => self.inner.creation.subscribe(),
            ChangeKind::Deletion => self.inner.deletion.subscribe(),
            ChangeKind::Modification => self.inner.modification.subscribe(),
        };
        let stream = BroadcastStream::new(rx).filter_map(move |item| match item {
            Ok(notification) => Some(notification),
            Err(err) => {
                debug!(%kind, error = %err, "notification feed lagged");
                None
            }
        });
        Ok(Box::pin(stream))
    }

    async fn associated_settings(
        &self,
        instance: &InstanceSnapshot,
    ) -> Result<Vec<SettingsHandle>, ProviderError> {
        Ok(vec![Self::handle_for(&instance.guid)])
    }

    async fn query_summary_information(
        &self,
        _fields: &[SummaryField],
        settings: &[SettingsHandle],
    ) -> Result<SummaryResponse, ProviderError> {
        self.inner.summary_queries.fetch_add(1, Ordering::SeqCst);

        let response = {
            let state = self.inner.state.lock();
            if state.fail_summary {
                return Err(ProviderError::Query("GetSummaryInformation failed".into()));
            }
            if state.summary_status == STATUS_COMPLETED {
                let records = settings
                    .iter()
                    .filter_map(Self::guid_for)
                    .map(|guid| {
                        state
                            .metrics
                            .get(&guid)
                            .cloned()
                            .unwrap_or_else(|| SummaryRecord::new(guid))
                    })
                    .collect();
                SummaryResponse::ok(records)
            } else {
                SummaryResponse::failed(state.summary_status)
            }
        };

        let mut paused = self.inner.summary_paused.subscribe();
        if paused.wait_for(|held| !*held).await.is_err() {
            return Err(ProviderError::Closed);
        }
        Ok(response)
    }

    async fn request_state_change(
        &self,
        guid: &VmGuid,
        requested: RequestedState,
    ) -> Result<u32, ProviderError> {
        let (status, change) = {
            let mut state = self.inner.state.lock();
            state.state_changes.push((guid.clone(), requested));
            let status = state.state_change_status;
            let Some(instance) = state.instances.get_mut(guid) else {
                return Err(ProviderError::NotFound(guid.clone()));
            };
            if status != STATUS_COMPLETED {
                return Ok(status);
            }
            let previous = instance.clone();
            instance.enabled_state = requested.settled_state();
            (status, ChangeNotification::modified(Some(previous), instance.clone()))
        };
        self.emit(change);
        Ok(status)
    }
}
