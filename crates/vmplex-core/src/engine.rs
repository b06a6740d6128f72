// ── Synchronization engine ──
//
// Composition root: owns the provider, the store, the reconciler feeds
// and the summary poller, and drives startup and shutdown. One engine per
// process, constructed explicitly and handed to the presentation layer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use strum::Display;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::{Command, CommandResult};
use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::model::{ChangeKind, VmEntry, VmGuid, VmSnapshot};
use crate::poller::{PollOutcome, SummaryPoller};
use crate::provider::{
    NotificationStream, Provider, ProviderError, STATUS_COMPLETED, STATUS_JOB_STARTED,
};
use crate::reconcile::{ChangeFeeds, EventReconciler};
use crate::store::{VmList, VmStore};
use crate::stream::VmStream;

const MANAGEMENT_DENIED: &str = "the management service refused access; \
     the current user is probably not a member of the Hyper-V Administrators group";

/// Lifecycle of an [`Engine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum EngineState {
    Stopped,
    Starting,
    Running,
    Failed,
}

/// The VM synchronization engine.
///
/// Cheaply cloneable; all clones share the same store and tasks.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    provider: Arc<dyn Provider>,
    store: Arc<VmStore>,
    reconciler: EventReconciler,
    poller: SummaryPoller,
    removed_tx: broadcast::Sender<Arc<VmSnapshot>>,
    state: watch::Sender<EngineState>,
    started: AtomicBool,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Engine {
    /// Build an engine around a provider. Does NOT connect; call
    /// [`start()`](Self::start).
    pub fn new(provider: Arc<dyn Provider>, config: EngineConfig) -> Self {
        let store = Arc::new(VmStore::new());
        let (removed_tx, _) = broadcast::channel(config.removal_channel_size.max(1));
        let (state, _) = watch::channel(EngineState::Stopped);
        let reconciler = EventReconciler::new(
            Arc::clone(&store),
            removed_tx.clone(),
            config.managed_category.as_str(),
        );
        let poller = SummaryPoller::new(
            Arc::clone(&provider),
            Arc::clone(&store),
            &config.summary_fields,
            config.managed_category.as_str(),
            config.poll_interval,
        );

        Self {
            inner: Arc::new(EngineInner {
                config,
                provider,
                store,
                reconciler,
                poller,
                removed_tx,
                state,
                started: AtomicBool::new(false),
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Build and start an engine in one step.
    pub async fn connect(
        provider: Arc<dyn Provider>,
        config: EngineConfig,
    ) -> Result<Self, CoreError> {
        let engine = Self::new(provider, config);
        engine.start().await?;
        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Run the startup sequence and spawn the background tasks.
    ///
    /// Each step is fatal: connect, management capability check, the
    /// three change subscriptions, then the initial snapshot. An engine
    /// starts at most once; a failed start leaves it in
    /// [`EngineState::Failed`].
    pub async fn start(&self) -> Result<(), CoreError> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(CoreError::AlreadyStarted);
        }
        self.inner.state.send_replace(EngineState::Starting);

        match self.startup().await {
            Ok(handles) => {
                self.inner.task_handles.lock().await.extend(handles);
                self.inner.state.send_replace(EngineState::Running);
                info!(vms = self.inner.store.len(), "engine running");
                Ok(())
            }
            Err(e) => {
                self.inner.cancel.cancel();
                self.inner.state.send_replace(EngineState::Failed);
                warn!(error = %e, "engine startup failed");
                Err(e)
            }
        }
    }

    async fn startup(&self) -> Result<Vec<JoinHandle<()>>, CoreError> {
        let inner = &self.inner;

        inner
            .provider
            .connect()
            .await
            .map_err(|e| CoreError::ConnectionFailed {
                reason: e.to_string(),
            })?;
        debug!("provider connected");

        match inner.provider.management_service().await {
            Ok(Some(service)) => debug!(service = %service.name, "management service reachable"),
            Ok(None) => {
                return Err(CoreError::ManagementUnavailable {
                    reason: MANAGEMENT_DENIED.into(),
                });
            }
            Err(e) => {
                return Err(CoreError::ManagementUnavailable {
                    reason: e.to_string(),
                });
            }
        }

        let creation = self.subscribe(ChangeKind::Creation).await?;
        let deletion = self.subscribe(ChangeKind::Deletion).await?;
        let modification = self.subscribe(ChangeKind::Modification).await?;
        let feeds = ChangeFeeds::new(creation, modification, deletion);
        debug!("change subscriptions open");

        let instances = inner
            .provider
            .list_instances(&inner.config.managed_category)
            .await
            .map_err(|e| CoreError::SnapshotFailed {
                reason: e.to_string(),
            })?;
        let inserted = inner.store.populate(&instances);
        info!(vms = inserted, "initial snapshot loaded");

        let reconciler = inner.reconciler.clone();
        let mut handles = vec![tokio::spawn(reconciler.run(feeds, inner.cancel.child_token()))];

        if inner.config.initial_poll {
            match inner.poller.poll_once().await {
                Ok(outcome) => debug!(?outcome, "initial summary poll"),
                Err(e) => warn!(error = %e, "initial summary poll failed"),
            }
        }

        let poller = inner.poller.clone();
        handles.push(tokio::spawn(poller.run(inner.cancel.child_token())));

        Ok(handles)
    }

    async fn subscribe(&self, kind: ChangeKind) -> Result<NotificationStream, CoreError> {
        self.inner
            .provider
            .subscribe(kind)
            .await
            .map_err(|e| CoreError::SubscriptionFailed {
                kind: kind.to_string(),
                reason: e.to_string(),
            })
    }

    /// Stop the poller and the notification feeds and wait for them.
    /// Safe to call more than once.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        drop(handles);

        if self.state() != EngineState::Failed {
            self.inner.state.send_replace(EngineState::Stopped);
        }
        debug!("engine stopped");
    }

    pub fn state(&self) -> EngineState {
        *self.inner.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<EngineState> {
        self.inner.state.subscribe()
    }

    // ── Observation ──────────────────────────────────────────────────

    pub fn store(&self) -> &Arc<VmStore> {
        &self.inner.store
    }

    /// Subscribe to the ordered VM list.
    pub fn vms(&self) -> VmStream {
        VmStream::new(self.inner.store.subscribe())
    }

    pub fn snapshot(&self) -> VmList {
        self.inner.store.snapshot()
    }

    /// Subscribe to "VM removed" notices, each carrying the entry's last
    /// state. A slow receiver observes `Lagged` and never stalls the engine.
    pub fn removals(&self) -> broadcast::Receiver<Arc<VmSnapshot>> {
        self.inner.removed_tx.subscribe()
    }

    /// Look up an entry by guid, falling back to its display name.
    pub fn resolve(&self, guid_or_name: &str) -> Option<Arc<VmEntry>> {
        self.inner
            .store
            .get(&VmGuid::new(guid_or_name))
            .or_else(|| self.inner.store.find_by_name(guid_or_name))
    }

    // ── Operations ───────────────────────────────────────────────────

    /// Run one summary round now, outside the regular interval.
    pub async fn poll_now(&self) -> Result<PollOutcome, CoreError> {
        self.ensure_running()?;
        Ok(self.inner.poller.poll_once().await?)
    }

    /// Execute a management command against a mirrored VM.
    ///
    /// The returned snapshot is the entry as it was when the request was
    /// issued. The new state arrives through the modification feed.
    pub async fn execute(&self, command: Command) -> Result<CommandResult, CoreError> {
        self.ensure_running()?;
        let guid = command.guid();
        let entry = self
            .inner
            .store
            .get(guid)
            .ok_or_else(|| CoreError::VmNotFound { guid: guid.clone() })?;
        let before = entry.snapshot();

        let requested = command.requested_state();
        debug!(%guid, operation = command.operation(), ?requested, "requesting state change");
        let status = self
            .inner
            .provider
            .request_state_change(guid, requested)
            .await
            .map_err(|e| match e {
                ProviderError::NotFound(guid) => CoreError::VmNotFound { guid },
                other => CoreError::Provider(other),
            })?;
        if status != STATUS_COMPLETED && status != STATUS_JOB_STARTED {
            return Err(CoreError::OperationFailed {
                operation: command.operation().into(),
                status,
            });
        }

        Ok(CommandResult::from_status(status, before))
    }

    fn ensure_running(&self) -> Result<(), CoreError> {
        if self.state() == EngineState::Running {
            Ok(())
        } else {
            Err(CoreError::EngineStopped)
        }
    }
}
