// ── Event reconciler ──
//
// Applies creation, deletion and modification notifications to the
// store. The three feeds are separate subscriptions with no common
// ordering, so one task drains them with creations first: a deletion or
// modification is never applied before a creation the provider sent
// ahead of it.

use std::sync::Arc;

use futures_util::{FutureExt, StreamExt};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::model::{ChangeKind, ChangeNotification, InstanceSnapshot, VmSnapshot};
use crate::provider::NotificationStream;
use crate::store::VmStore;

/// Applies change notifications to a [`VmStore`].
#[derive(Clone)]
pub struct EventReconciler {
    store: Arc<VmStore>,
    removed_tx: broadcast::Sender<Arc<VmSnapshot>>,
    managed_category: Arc<str>,
}

impl EventReconciler {
    pub fn new(
        store: Arc<VmStore>,
        removed_tx: broadcast::Sender<Arc<VmSnapshot>>,
        managed_category: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            store,
            removed_tx,
            managed_category: managed_category.into(),
        }
    }

    /// Dispatch one notification. Returns `true` if the store changed.
    pub fn apply(&self, notification: &ChangeNotification) -> bool {
        match notification.kind {
            ChangeKind::Creation => self.on_created(&notification.target),
            ChangeKind::Deletion => self.on_deleted(&notification.target),
            ChangeKind::Modification => self.on_modified(&notification.target),
        }
    }

    /// Insert a new entry unless the guid is already mirrored.
    pub fn on_created(&self, instance: &InstanceSnapshot) -> bool {
        if !instance.is_virtual_machine(&self.managed_category) {
            debug!(
                guid = %instance.guid,
                caption = %instance.caption,
                "creation for unmanaged system ignored"
            );
            return false;
        }
        let inserted = self.store.insert_if_absent(instance);
        if inserted {
            debug!(guid = %instance.guid, name = %instance.name, "vm created");
        } else {
            debug!(guid = %instance.guid, "creation for known vm ignored");
        }
        inserted
    }

    /// Remove the entry and announce its last state. Absent guids are a
    /// no-op and announce nothing.
    pub fn on_deleted(&self, instance: &InstanceSnapshot) -> bool {
        let Some(last) = self.store.remove(&instance.guid) else {
            debug!(guid = %instance.guid, "deletion for unknown vm ignored");
            return false;
        };
        debug!(guid = %last.guid, name = %last.name(), "vm removed");
        // Zero receivers is fine; lagging receivers see `Lagged` on their side.
        let _ = self.removed_tx.send(Arc::new(last));
        true
    }

    /// Replace the main-information group of a mirrored entry. A missing
    /// entry means the creation was missed; the update is dropped.
    pub fn on_modified(&self, instance: &InstanceSnapshot) -> bool {
        let applied = self.store.update_main(instance);
        if !applied {
            debug!(guid = %instance.guid, "modification for unknown vm dropped");
        }
        applied
    }

    /// Drain all three feeds on one task until they end or `cancel` fires.
    pub async fn run(self, mut feeds: ChangeFeeds, cancel: CancellationToken) {
        debug!("reconciler started");
        while feeds.is_open() {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                next = next_from(&mut feeds.creation) => {
                    if let Some(n) = feeds.take(ChangeKind::Creation, next) {
                        self.apply(&n);
                    }
                }
                next = next_from(&mut feeds.modification) => {
                    if let Some(n) = feeds.take(ChangeKind::Modification, next) {
                        self.dispatch(&n, &mut feeds);
                    }
                }
                next = next_from(&mut feeds.deletion) => {
                    if let Some(n) = feeds.take(ChangeKind::Deletion, next) {
                        self.dispatch(&n, &mut feeds);
                    }
                }
            }
        }
        debug!("reconciler stopped");
    }

    /// Apply a deletion or modification. When its guid is not mirrored,
    /// the matching creation may already be queued on the creation feed:
    /// apply every creation that is ready first.
    fn dispatch(&self, notification: &ChangeNotification, feeds: &mut ChangeFeeds) {
        if !self.store.contains(&notification.target.guid) {
            feeds.drain_ready_creations(|created| {
                self.apply(&created);
            });
        }
        self.apply(notification);
    }
}

/// The three change subscriptions, drained together by
/// [`EventReconciler::run`]. A closed feed is set to `None`.
pub struct ChangeFeeds {
    creation: Option<NotificationStream>,
    modification: Option<NotificationStream>,
    deletion: Option<NotificationStream>,
}

impl ChangeFeeds {
    pub fn new(
        creation: NotificationStream,
        modification: NotificationStream,
        deletion: NotificationStream,
    ) -> Self {
        Self {
            creation: Some(creation),
            modification: Some(modification),
            deletion: Some(deletion),
        }
    }

    fn is_open(&self) -> bool {
        self.creation.is_some() || self.modification.is_some() || self.deletion.is_some()
    }

    fn slot(&mut self, kind: ChangeKind) -> &mut Option<NotificationStream> {
        match kind {
            ChangeKind::Creation => &mut self.creation,
            ChangeKind::Modification => &mut self.modification,
            ChangeKind::Deletion => &mut self.deletion,
        }
    }

    /// Pass a received item through, or close the feed it came from.
    fn take(
        &mut self,
        kind: ChangeKind,
        next: Option<ChangeNotification>,
    ) -> Option<ChangeNotification> {
        match next {
            Some(notification) => Some(notification),
            None => {
                info!(%kind, "notification feed closed");
                *self.slot(kind) = None;
                None
            }
        }
    }

    fn drain_ready_creations(&mut self, mut f: impl FnMut(ChangeNotification)) {
        let Some(feed) = self.creation.as_mut() else {
            return;
        };
        let mut closed = false;
        while let Some(next) = feed.next().now_or_never() {
            match next {
                Some(notification) => f(notification),
                None => {
                    closed = true;
                    break;
                }
            }
        }
        if closed {
            info!(kind = %ChangeKind::Creation, "notification feed closed");
            self.creation = None;
        }
    }
}

/// Next item of an open feed; a closed feed never resolves.
async fn next_from(feed: &mut Option<NotificationStream>) -> Option<ChangeNotification> {
    match feed {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}
