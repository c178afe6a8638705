//! In-memory `AgencyClient` double used by tests and by examples in
//! this crate's own doc comments. Not part of the public wire
//! contract — a real deployment talks to the actual agency cluster.

use super::client::{
    AgencyClient, AgencyTransaction, Mutation, Precondition, ReadResult, WatchHandle,
};
use crate::error::{CoordError, Result};
use crate::value::Value;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct Watch {
    prefix: String,
    callback: Box<dyn Fn(Value) + Send + Sync>,
}

/// A single-process agency stand-in: a flat key → value map guarded by
/// a mutex, with a monotonic raft index bumped on every successful
/// write. Good enough to exercise the cache, supervision loop, and
/// transaction writer without a network round trip.
pub struct MockAgency {
    store: Mutex<BTreeMap<String, Value>>,
    raft_index: AtomicU64,
    watches: Mutex<Vec<(u64, Watch)>>,
    next_watch_id: AtomicU64,
}

impl Default for MockAgency {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAgency {
    pub fn new() -> Self {
        MockAgency {
            store: Mutex::new(BTreeMap::new()),
            raft_index: AtomicU64::new(0),
            watches: Mutex::new(Vec::new()),
            next_watch_id: AtomicU64::new(1),
        }
    }

    /// Seed a key directly, bypassing transactions — useful for test
    /// fixture setup.
    pub fn seed(&self, key: impl Into<String>, value: Value) {
        self.store.lock().insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.store.lock().get(key).cloned()
    }

    fn check_precondition(&self, store: &BTreeMap<String, Value>, p: &Precondition) -> bool {
        match p {
            Precondition::Equals { key, value } => store.get(key) == Some(value),
            Precondition::Exists { key } => store.contains_key(key),
            Precondition::Absent { key } => !store.contains_key(key),
            Precondition::IntersectionEmpty { key, candidates } => {
                let Some(Value::Array(arr)) = store.get(key) else {
                    return true;
                };
                !arr.iter().any(|v| {
                    v.as_str()
                        .map(|s| candidates.iter().any(|c| c == s))
                        .unwrap_or(false)
                })
            }
        }
    }

    fn apply_mutation(store: &mut BTreeMap<String, Value>, m: Mutation) {
        match m {
            Mutation::Set { key, value } => {
                store.insert(key, value);
            }
            Mutation::Delete { key } => {
                store.remove(&key);
            }
            Mutation::Increment { key } => {
                let next = store.get(&key).and_then(Value::as_u64).unwrap_or(0) + 1;
                store.insert(key, Value::UInt(next));
            }
            Mutation::EmplaceObject { key, field, value } => {
                let entry = store
                    .entry(key)
                    .or_insert_with(|| Value::Object(BTreeMap::new()));
                if let Value::Object(map) = entry {
                    map.insert(field, value);
                }
            }
        }
    }

    fn notify_watches(&self, touched_keys: &[String], store: &BTreeMap<String, Value>) {
        let watches = self.watches.lock();
        for (_, watch) in watches.iter() {
            if touched_keys.iter().any(|k| k.starts_with(&watch.prefix)) {
                if let Some(v) = store.get(&watch.prefix) {
                    (watch.callback)(v.clone());
                }
            }
        }
    }
}

#[async_trait]
impl AgencyClient for MockAgency {
    async fn read(&self, keys: &[&str], _timeout: Duration) -> Result<ReadResult> {
        let store = self.store.lock();
        let values = keys
            .iter()
            .map(|k| (k.to_string(), store.get(*k).cloned().unwrap_or(Value::Null)))
            .collect();
        Ok(ReadResult {
            values,
            raft_index: self.raft_index.load(Ordering::SeqCst),
        })
    }

    async fn write(&self, txn: AgencyTransaction, _timeout: Duration) -> Result<u64> {
        let mut store = self.store.lock();
        for p in &txn.preconditions {
            if !self.check_precondition(&store, p) {
                return Err(CoordError::PreconditionFailed(format!("{p:?}")));
            }
        }
        let mut touched = Vec::new();
        for m in txn.mutations {
            touched.push(match &m {
                Mutation::Set { key, .. }
                | Mutation::Delete { key }
                | Mutation::Increment { key }
                | Mutation::EmplaceObject { key, .. } => key.clone(),
            });
            Self::apply_mutation(&mut store, m);
        }
        let idx = self.raft_index.fetch_add(1, Ordering::SeqCst) + 1;
        self.notify_watches(&touched, &store);
        Ok(idx)
    }

    async fn watch(
        &self,
        prefix: &str,
        callback: Box<dyn Fn(Value) + Send + Sync>,
    ) -> Result<WatchHandle> {
        let id = self.next_watch_id.fetch_add(1, Ordering::SeqCst);
        self.watches.lock().push((
            id,
            Watch {
                prefix: prefix.to_string(),
                callback,
            },
        ));
        Ok(WatchHandle(id))
    }

    async fn unwatch(&self, handle: WatchHandle) -> Result<()> {
        self.watches.lock().retain(|(id, _)| *id != handle.0);
        Ok(())
    }

    async fn reserve_ids(&self, n: u64, _timeout: Duration) -> Result<u64> {
        if n == 0 {
            return Err(CoordError::Internal("reserve_ids(0)".into()));
        }
        let mut store = self.store.lock();
        let key = "/Sync/LatestID".to_string();
        let current = store.get(&key).and_then(Value::as_u64).unwrap_or(0);
        let first = current + 1;
        store.insert(key, Value::UInt(current + n));
        Ok(first)
    }
}

pub fn shared() -> Arc<MockAgency> {
    Arc::new(MockAgency::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read() {
        let agency = MockAgency::new();
        let txn = AgencyTransaction::new().then(Mutation::Set {
            key: "/Plan/Version".into(),
            value: Value::UInt(1),
        });
        agency.write(txn, Duration::from_secs(1)).await.unwrap();
        let read = agency
            .read(&["/Plan/Version"], Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(read.values[0].1, Value::UInt(1));
        assert_eq!(read.raft_index, 1);
    }

    #[tokio::test]
    async fn reserve_ids_hands_out_disjoint_ranges() {
        let agency = MockAgency::new();
        let first = agency.reserve_ids(10, Duration::from_secs(1)).await.unwrap();
        let second = agency.reserve_ids(5, Duration::from_secs(1)).await.unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 11);
    }

    #[tokio::test]
    async fn precondition_failure_is_recoverable() {
        let agency = MockAgency::new();
        let txn = AgencyTransaction::new()
            .require(Precondition::Absent {
                key: "/Plan/Version".into(),
            })
            .then(Mutation::Set {
                key: "/Plan/Version".into(),
                value: Value::UInt(1),
            });
        agency.write(txn.clone(), Duration::from_secs(1)).await.unwrap();
        let err = agency.write(txn, Duration::from_secs(1)).await.unwrap_err();
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn watch_fires_on_change() {
        let agency = MockAgency::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        agency
            .watch(
                "/Plan/Version",
                Box::new(move |v| seen2.lock().push(v)),
            )
            .await
            .unwrap();
        let txn = AgencyTransaction::new().then(Mutation::Set {
            key: "/Plan/Version".into(),
            value: Value::UInt(3),
        });
        agency.write(txn, Duration::from_secs(1)).await.unwrap();
        assert_eq!(seen.lock().as_slice(), &[Value::UInt(3)]);
    }
}
