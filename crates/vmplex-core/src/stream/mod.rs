// ── Reactive VM streams ──
//
// Subscription types for consuming store changes from the presentation
// layer. Field-group updates wake subscribers too, so a list view can
// re-render on fresh metrics without polling.

mod filter;

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

pub use filter::VmFilter;

use crate::store::VmList;

/// A subscription to the VM list.
///
/// Provides both point-in-time snapshot access and change notification
/// via [`changed`](Self::changed) or by converting to a `Stream`.
pub struct VmStream {
    current: VmList,
    receiver: watch::Receiver<VmList>,
}

impl VmStream {
    pub(crate) fn new(mut receiver: watch::Receiver<VmList>) -> Self {
        let current = receiver.borrow_and_update().clone();
        Self { current, receiver }
    }

    /// The snapshot captured at creation or at the last `changed()`.
    pub fn current(&self) -> &VmList {
        &self.current
    }

    /// The latest snapshot (may have changed since creation).
    pub fn latest(&self) -> VmList {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change, returning the new snapshot.
    /// Returns `None` once the store has been dropped.
    pub async fn changed(&mut self) -> Option<VmList> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = snap.clone();
        Some(snap)
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    pub fn into_stream(self) -> VmWatchStream {
        VmWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter yielding a fresh [`VmList`] on every store change.
pub struct VmWatchStream {
    inner: WatchStream<VmList>,
}

impl Stream for VmWatchStream {
    type Item = VmList;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
