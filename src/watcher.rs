//! Current-watcher (spec §4.6): registers a predicate per recognized
//! id (collection or replicated log) against the `Current` tree,
//! collects per-id outcomes under a shared lock, and reports "all
//! reported" or "first error" to the caller.

use crate::model::{CollectionId, CurrentCollection};
use crate::placement::ResponsibleServerList;
use crate::server_id::ServerId;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Outcome of one watched id's predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Pending,
    Ok,
    Error(String),
}

/// Identifies what a watcher entry is tracking, for diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WatchedId {
    Collection(CollectionId),
    ReplicatedLog(u64),
}

/// Collection shards predicate (spec §4.6): ok once every shard has
/// reported error-free and, if `wait_for_sync_replication`, reports
/// exactly the expected server set.
pub fn collection_shards_outcome(
    expected: &BTreeMap<crate::shard_id::ShardId, ResponsibleServerList>,
    current: &CurrentCollection,
    wait_for_sync_replication: bool,
) -> Outcome {
    for (shard_id, want) in expected {
        let Some(report) = current.shards.get(shard_id) else {
            return Outcome::Pending;
        };
        if report.error {
            return Outcome::Error(format!(
                "shard {shard_id} reported error: {:?}",
                report.error_message
            ));
        }
        if wait_for_sync_replication {
            let mut want_servers: Vec<ServerId> = want.0.clone();
            let mut got_servers = report.servers.clone();
            want_servers.sort();
            got_servers.sort();
            if want_servers != got_servers {
                return Outcome::Pending;
            }
        }
    }
    Outcome::Ok
}

/// Replicated-log supervision predicate (spec §4.6): ok once
/// `targetVersion >= written_target_version`; never reports an error —
/// log-layer errors are transient (spec §4.6).
pub fn replicated_log_outcome(observed_target_version: Option<u64>, written_target_version: u64) -> Outcome {
    match observed_target_version {
        Some(v) if v >= written_target_version => Outcome::Ok,
        _ => Outcome::Pending,
    }
}

/// Shared result object gathering per-id outcomes (spec §4.6).
#[derive(Default)]
pub struct CurrentWatcher {
    results: Mutex<BTreeMap<WatchedId, Outcome>>,
}

impl CurrentWatcher {
    pub fn new() -> Arc<Self> {
        Arc::new(CurrentWatcher::default())
    }

    pub fn register(&self, id: WatchedId) {
        self.results.lock().entry(id).or_insert(Outcome::Pending);
    }

    pub fn report(&self, id: WatchedId, outcome: Outcome) {
        self.results.lock().insert(id, outcome);
    }

    /// Returns the first error if any, else `Ok` if all reported, else
    /// `Pending` (spec §4.6, "resultIfAllReported").
    pub fn result_if_all_reported(&self) -> Outcome {
        let results = self.results.lock();
        if results.is_empty() {
            return Outcome::Ok;
        }
        let mut any_pending = false;
        for outcome in results.values() {
            match outcome {
                Outcome::Error(msg) => return Outcome::Error(msg.clone()),
                Outcome::Pending => any_pending = true,
                Outcome::Ok => {}
            }
        }
        if any_pending {
            Outcome::Pending
        } else {
            Outcome::Ok
        }
    }
}
