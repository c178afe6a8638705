//! Local mirror of the `Plan` and `Current` agency trees, kept fresh by
//! two independent syncer fibers, with raft-index and plan-version
//! waiters and a batching unique-id allocator (spec §4.1).

use super::client::{AgencyClient, RaftIndex};
use crate::error::{CoordError, Result};
use crate::value::Value;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Which tree a waiter or syncer fiber is tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tree {
    Plan,
    Current,
}

struct Mirror {
    value: RwLock<Value>,
    raft_index: AtomicU64,
    version: AtomicU64,
    refreshing: AtomicBool,
}

impl Mirror {
    fn new() -> Self {
        Mirror {
            value: RwLock::new(Value::Null),
            raft_index: AtomicU64::new(0),
            version: AtomicU64::new(0),
            refreshing: AtomicBool::new(false),
        }
    }
}

enum Waiter {
    RaftIndex(RaftIndex, oneshot::Sender<Result<()>>),
    Version(u64, oneshot::Sender<Result<()>>),
}

/// Configuration for the cache's background behavior (part of
/// `CoordConfig`, split out here so it can be unit tested alone).
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub sync_interval: Duration,
    pub read_timeout: Duration,
    pub uniqid_batch_size: u64,
    pub uniqid_low_water_mark: u64,
    pub shutdown_error: CoordError,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            sync_interval: Duration::from_millis(500),
            read_timeout: Duration::from_secs(10),
            uniqid_batch_size: 1000,
            uniqid_low_water_mark: 100,
            shutdown_error: CoordError::ShuttingDown,
        }
    }
}

struct IdBlock {
    next: u64,
    end_exclusive: u64,
}

/// Coordinator-facing read cache for `Plan` and `Current`, plus the
/// unique-id allocator. One instance per process; shared via `Arc`.
pub struct AgencyCache {
    client: Arc<dyn AgencyClient>,
    config: CacheConfig,
    plan: Mirror,
    current: Mirror,
    plan_waiters: Mutex<Vec<Waiter>>,
    current_waiters: Mutex<Vec<Waiter>>,
    shutting_down: AtomicBool,
    id_block: Mutex<IdBlock>,
    id_refilling: AtomicBool,
}

impl AgencyCache {
    pub fn new(client: Arc<dyn AgencyClient>, config: CacheConfig) -> Arc<Self> {
        Arc::new(AgencyCache {
            client,
            config,
            plan: Mirror::new(),
            current: Mirror::new(),
            plan_waiters: Mutex::new(Vec::new()),
            current_waiters: Mutex::new(Vec::new()),
            shutting_down: AtomicBool::new(false),
            id_block: Mutex::new(IdBlock {
                next: 0,
                end_exclusive: 0,
            }),
            id_refilling: AtomicBool::new(false),
        })
    }

    /// Start the two independent syncer fibers. Call once per process.
    pub fn spawn_syncers(self: &Arc<Self>) {
        let plan = self.clone();
        tokio::spawn(async move { plan.sync_loop(Tree::Plan, "/Plan").await });
        let current = self.clone();
        tokio::spawn(async move { current.sync_loop(Tree::Current, "/Current").await });
    }

    async fn sync_loop(self: Arc<Self>, tree: Tree, root: &str) {
        let mirror = self.mirror(tree);
        loop {
            if self.shutting_down.load(Ordering::SeqCst) {
                return;
            }
            if mirror
                .refreshing
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                match self.client.read(&[root], self.config.read_timeout).await {
                    Ok(read) => {
                        let value = read
                            .values
                            .into_iter()
                            .next()
                            .map(|(_, v)| v)
                            .unwrap_or(Value::Null);
                        let version = value
                            .as_object()
                            .and_then(|o| o.get("Version"))
                            .and_then(Value::as_u64)
                            .unwrap_or(0);
                        *mirror.value.write() = value;
                        mirror.raft_index.store(read.raft_index, Ordering::SeqCst);
                        mirror.version.store(version, Ordering::SeqCst);
                        info!(tree = ?tree, raft_index = read.raft_index, version, "synced agency mirror");
                        self.wake_waiters(tree);
                    }
                    Err(err) => {
                        warn!(tree = ?tree, error = %err, "agency sync round failed, will retry");
                    }
                }
                mirror.refreshing.store(false, Ordering::SeqCst);
            } else {
                debug!(tree = ?tree, "skipping sync round, refresh already in flight");
            }
            tokio::time::sleep(self.config.sync_interval).await;
        }
    }

    fn mirror(&self, tree: Tree) -> &Mirror {
        match tree {
            Tree::Plan => &self.plan,
            Tree::Current => &self.current,
        }
    }

    fn waiters(&self, tree: Tree) -> &Mutex<Vec<Waiter>> {
        match tree {
            Tree::Plan => &self.plan_waiters,
            Tree::Current => &self.current_waiters,
        }
    }

    fn wake_waiters(&self, tree: Tree) {
        let mirror = self.mirror(tree);
        let raft_index = mirror.raft_index.load(Ordering::SeqCst);
        let version = mirror.version.load(Ordering::SeqCst);
        let mut waiters = self.waiters(tree).lock();
        let mut remaining = Vec::with_capacity(waiters.len());
        for waiter in waiters.drain(..) {
            match waiter {
                Waiter::RaftIndex(target, tx) if target <= raft_index => {
                    let _ = tx.send(Ok(()));
                }
                Waiter::Version(target, tx) if target <= version => {
                    let _ = tx.send(Ok(()));
                }
                other => remaining.push(other),
            }
        }
        *waiters = remaining;
    }

    /// Read access to the current mirror snapshot.
    pub fn snapshot(&self, tree: Tree) -> Value {
        self.mirror(tree).value.read().clone()
    }

    pub fn raft_index(&self, tree: Tree) -> RaftIndex {
        self.mirror(tree).raft_index.load(Ordering::SeqCst)
    }

    pub fn version(&self, tree: Tree) -> u64 {
        self.mirror(tree).version.load(Ordering::SeqCst)
    }

    /// Completes when the local mirror has observed at least
    /// `raft_index` on the given tree (spec §5, "ordering guarantees").
    pub async fn wait_for(&self, tree: Tree, raft_index: RaftIndex) -> Result<()> {
        if self.mirror(tree).raft_index.load(Ordering::SeqCst) >= raft_index {
            return Ok(());
        }
        let (tx, rx) = oneshot::channel();
        self.waiters(tree).lock().push(Waiter::RaftIndex(raft_index, tx));
        // Re-check after registering: avoids missing a concurrent sync
        // round that completed between the initial check and the push.
        if self.mirror(tree).raft_index.load(Ordering::SeqCst) >= raft_index {
            self.wake_waiters(tree);
        }
        rx.await.unwrap_or(Err(self.config.shutdown_error.clone()))
    }

    pub async fn wait_for_plan_version(&self, version: u64) -> Result<()> {
        if self.plan.version.load(Ordering::SeqCst) >= version {
            return Ok(());
        }
        let (tx, rx) = oneshot::channel();
        self.plan_waiters.lock().push(Waiter::Version(version, tx));
        if self.plan.version.load(Ordering::SeqCst) >= version {
            self.wake_waiters(Tree::Plan);
        }
        rx.await.unwrap_or(Err(self.config.shutdown_error.clone()))
    }

    /// Completes every pending waiter with the configured shutdown
    /// error and stops future sync rounds (spec §5, "cancellation and
    /// timeouts").
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        for waiters in [&self.plan_waiters, &self.current_waiters] {
            let mut waiters = waiters.lock();
            for waiter in waiters.drain(..) {
                let tx = match waiter {
                    Waiter::RaftIndex(_, tx) => tx,
                    Waiter::Version(_, tx) => tx,
                };
                let _ = tx.send(Err(self.config.shutdown_error.clone()));
            }
        }
    }

    /// Reserve `n` consecutive cluster-unique ids. Hands them out from
    /// a locally held block, refilling from the agency in the
    /// background once the block drops below the low-water mark so
    /// the common case never blocks on an agency round trip.
    pub async fn uniqid(self: &Arc<Self>, n: u64) -> Result<u64> {
        if n == 0 {
            return Err(CoordError::Internal("uniqid(0)".into()));
        }
        loop {
            {
                let mut block = self.id_block.lock();
                if block.end_exclusive - block.next >= n {
                    let first = block.next;
                    block.next += n;
                    self.maybe_refill(&block);
                    return Ok(first);
                }
            }
            // Not enough ids locally: refill synchronously. Under
            // concurrent callers this may over-fetch slightly, which is
            // fine — ids are never reused.
            self.refill(n.max(self.config.uniqid_batch_size)).await?;
        }
    }

    fn maybe_refill(self: &Arc<Self>, block: &IdBlock) {
        if block.end_exclusive - block.next >= self.config.uniqid_low_water_mark {
            return;
        }
        if self
            .id_refilling
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let this = self.clone();
        let batch = self.config.uniqid_batch_size;
        tokio::spawn(async move {
            let _ = this.refill(batch).await;
            this.id_refilling.store(false, Ordering::SeqCst);
        });
    }

    async fn refill(&self, n: u64) -> Result<()> {
        let first = self
            .client
            .reserve_ids(n, self.config.read_timeout)
            .await?;
        let mut block = self.id_block.lock();
        if first >= block.end_exclusive {
            block.next = first;
            block.end_exclusive = first + n;
        } else if first + n > block.end_exclusive {
            // Another refill already extended the block past our start;
            // only extend the tail.
            block.end_exclusive = first + n;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agency::mock::MockAgency;
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn wait_for_raft_index_completes_after_sync() {
        let agency = Arc::new(MockAgency::new());
        let cache = AgencyCache::new(agency.clone(), CacheConfig {
            sync_interval: StdDuration::from_millis(10),
            ..CacheConfig::default()
        });
        cache.spawn_syncers();

        let wait = cache.wait_for(Tree::Plan, 1);
        agency
            .seed("/Plan", Value::Object(Default::default()));
        // Trigger a write so the raft index advances past 0.
        let _ = agency
            .write(
                super::super::client::AgencyTransaction::new().then(
                    super::super::client::Mutation::Set {
                        key: "/Plan/Version".into(),
                        value: Value::UInt(1),
                    },
                ),
                StdDuration::from_secs(1),
            )
            .await;
        tokio::time::timeout(StdDuration::from_secs(2), wait)
            .await
            .expect("wait_for should complete")
            .expect("wait_for should not error");
    }

    #[tokio::test]
    async fn shutdown_completes_waiters_with_shutdown_error() {
        let agency = Arc::new(MockAgency::new());
        let cache = AgencyCache::new(agency, CacheConfig::default());
        let wait = cache.wait_for(Tree::Plan, 100);
        cache.shutdown();
        let result = wait.await;
        assert!(matches!(result, Err(CoordError::ShuttingDown)));
    }

    #[tokio::test]
    async fn uniqid_hands_out_disjoint_values() {
        let agency = Arc::new(MockAgency::new());
        let cache = AgencyCache::new(
            agency,
            CacheConfig {
                uniqid_batch_size: 4,
                uniqid_low_water_mark: 1,
                ..CacheConfig::default()
            },
        );
        let a = cache.uniqid(3).await.unwrap();
        let b = cache.uniqid(3).await.unwrap();
        let a_range: Vec<u64> = (a..a + 3).collect();
        let b_range: Vec<u64> = (b..b + 3).collect();
        assert!(a_range.iter().all(|id| !b_range.contains(id)));
    }
}
