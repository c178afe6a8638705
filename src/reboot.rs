//! Reboot tracker (spec §4.2): fires a callback when a peer's reboot
//! id advances past the value it was registered with, or when the peer
//! leaves the known server set entirely. Used to abort transactions
//! and queries whose originating coordinator died or restarted.

use crate::server_id::ServerId;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// `(serverId, rebootId)` pair identifying one process incarnation of
/// a peer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerState {
    pub server_id: ServerId,
    pub reboot_id: u64,
}

impl PeerState {
    pub fn new(server_id: ServerId, reboot_id: u64) -> Self {
        PeerState {
            server_id,
            reboot_id,
        }
    }
}

type Callback = Box<dyn FnOnce() + Send>;

struct Entry {
    id: u64,
    registered_reboot_id: u64,
    callback: Callback,
    fired: Arc<AtomicBool>,
    #[allow(dead_code)]
    description: String,
}

/// Tracks the latest known `(serverId → rebootId)` map and the
/// callbacks armed against specific peer incarnations.
pub struct RebootTracker {
    known: DashMap<ServerId, u64>,
    callbacks: DashMap<ServerId, Vec<Entry>>,
    next_id: AtomicU64,
}

impl Default for RebootTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RebootTracker {
    pub fn new() -> Self {
        RebootTracker {
            known: DashMap::new(),
            callbacks: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers `callback` to fire exactly once when either (a) the
    /// server's reboot id observed next strictly exceeds
    /// `peer.reboot_id`, or (b) the server leaves the known set.
    /// Dropping the returned guard cancels the callback if it has not
    /// yet fired.
    pub fn call_me_on_change(
        self: &Arc<Self>,
        peer: PeerState,
        callback: impl FnOnce() + Send + 'static,
        description: impl Into<String>,
    ) -> CallbackGuard {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let fired = Arc::new(AtomicBool::new(false));
        self.callbacks
            .entry(peer.server_id.clone())
            .or_default()
            .push(Entry {
                id,
                registered_reboot_id: peer.reboot_id,
                callback: Box::new(callback),
                fired: fired.clone(),
                description: description.into(),
            });
        CallbackGuard {
            tracker: self.clone(),
            server_id: peer.server_id,
            id,
            fired,
        }
    }

    fn cancel(&self, server_id: &ServerId, id: u64) {
        if let Some(mut entries) = self.callbacks.get_mut(server_id) {
            entries.retain(|e| e.id != id);
        }
    }

    /// Updates the known `(serverId → rebootId)` map with a fresh
    /// observation from `Supervision/Health` or `Current/ServersRegistered`
    /// and fires any callback whose registered reboot id is now stale.
    /// Callbacks are scheduled on a worker pool, never invoked
    /// synchronously here (spec §4.2).
    pub fn notify_changes(self: &Arc<Self>, observed: &[PeerState]) {
        for peer in observed {
            let previous = self
                .known
                .insert(peer.server_id.clone(), peer.reboot_id);
            if previous.is_some_and(|p| p == peer.reboot_id) {
                continue;
            }
            info!(server = %peer.server_id, reboot_id = peer.reboot_id, "reboot id advanced");
            self.fire_stale(&peer.server_id, peer.reboot_id);
        }
    }

    /// Marks `server_id` as having left the known set, firing every
    /// callback registered against it regardless of reboot id.
    pub fn notify_server_gone(self: &Arc<Self>, server_id: &ServerId) {
        self.known.remove(server_id);
        if let Some((_, entries)) = self.callbacks.remove(server_id) {
            for entry in entries {
                Self::schedule(entry);
            }
        }
    }

    fn fire_stale(self: &Arc<Self>, server_id: &ServerId, new_reboot_id: u64) {
        let Some(mut entries) = self.callbacks.get_mut(server_id) else {
            return;
        };
        let (stale, fresh): (Vec<_>, Vec<_>) = std::mem::take(&mut *entries)
            .into_iter()
            .partition(|e| e.registered_reboot_id < new_reboot_id);
        *entries = fresh;
        drop(entries);
        for entry in stale {
            Self::schedule(entry);
        }
    }

    fn schedule(entry: Entry) {
        if entry.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        tokio::spawn(async move {
            (entry.callback)();
        });
    }
}

/// Guard returned by [`RebootTracker::call_me_on_change`]. Dropping it
/// cancels the callback if it has not yet fired.
pub struct CallbackGuard {
    tracker: Arc<RebootTracker>,
    server_id: ServerId,
    id: u64,
    fired: Arc<AtomicBool>,
}

impl Drop for CallbackGuard {
    fn drop(&mut self) {
        if !self.fired.load(Ordering::SeqCst) {
            self.tracker.cancel(&self.server_id, self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    fn peer(id: &str, reboot: u64) -> PeerState {
        PeerState::new(ServerId::from(id), reboot)
    }

    #[tokio::test]
    async fn fires_on_reboot_increase() {
        let tracker = Arc::new(RebootTracker::new());
        let (tx, rx) = mpsc::channel();
        let _guard = tracker.call_me_on_change(peer("PRMR-a", 1), move || tx.send(()).unwrap(), "t");
        tracker.notify_changes(&[peer("PRMR-a", 2)]);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn does_not_fire_on_equal_reboot_id() {
        let tracker = Arc::new(RebootTracker::new());
        let (tx, rx) = mpsc::channel();
        let _guard = tracker.call_me_on_change(peer("PRMR-a", 1), move || tx.send(()).unwrap(), "t");
        tracker.notify_changes(&[peer("PRMR-a", 1)]);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn fires_when_server_leaves() {
        let tracker = Arc::new(RebootTracker::new());
        let (tx, rx) = mpsc::channel();
        let _guard = tracker.call_me_on_change(peer("PRMR-a", 1), move || tx.send(()).unwrap(), "t");
        tracker.notify_server_gone(&ServerId::from("PRMR-a"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn dropped_guard_cancels_callback() {
        let tracker = Arc::new(RebootTracker::new());
        let (tx, rx) = mpsc::channel::<()>();
        let guard = tracker.call_me_on_change(peer("PRMR-a", 1), move || tx.send(()).unwrap(), "t");
        drop(guard);
        tracker.notify_changes(&[peer("PRMR-a", 2)]);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
    }
}
