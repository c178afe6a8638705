use crate::error::{CoordError, Result};
use crate::value::Value;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Raft commit index at which a read or write was observed (spec §4.1).
pub type RaftIndex = u64;

/// A precondition guarding an agency write (spec §4.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Precondition {
    /// The key must currently hold exactly this value.
    Equals { key: String, value: Value },
    /// The key must currently exist (any value).
    Exists { key: String },
    /// The key must currently be absent.
    Absent { key: String },
    /// The set of server ids in `candidates` must not intersect the
    /// array value stored at `key` (used for `cleanedServers` /
    /// `toBeCleanedServers` checks in the transaction writer, §4.5).
    IntersectionEmpty {
        key: String,
        candidates: Vec<String>,
    },
}

/// A single mutation within an agency write transaction (spec §4.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Mutation {
    Set { key: String, value: Value },
    Delete { key: String },
    Increment { key: String },
    /// Insert `value` into the object or array at `key` under `field`
    /// (object) — used for `Target/ReplicatedLogs/.../participants/<id>`
    /// style emplace-writes.
    EmplaceObject {
        key: String,
        field: String,
        value: Value,
    },
}

/// One atomic write: preconditions checked and mutations applied, or
/// nothing happens (spec §4.1, §5 "ordering guarantees").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgencyTransaction {
    pub preconditions: Vec<Precondition>,
    pub mutations: Vec<Mutation>,
}

impl AgencyTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(mut self, p: Precondition) -> Self {
        self.preconditions.push(p);
        self
    }

    pub fn then(mut self, m: Mutation) -> Self {
        self.mutations.push(m);
        self
    }
}

/// Result of a successful read: the subtree values keyed by the path
/// requested, plus the raft index they were read at.
#[derive(Debug, Clone)]
pub struct ReadResult {
    pub values: Vec<(String, Value)>,
    pub raft_index: RaftIndex,
}

/// Typed, versioned access to the hierarchical agency key-value store
/// (spec §4.1). Implementations talk to the real agency over the wire;
/// tests use an in-memory double (see `agency::mock`).
#[async_trait]
pub trait AgencyClient: Send + Sync {
    /// Atomically read one or more subtrees, rooted at the given key
    /// prefixes.
    async fn read(&self, keys: &[&str], timeout: Duration) -> Result<ReadResult>;

    /// Attempt one atomic write. Returns the committed raft index, or
    /// `CoordError::PreconditionFailed` if any precondition did not
    /// hold — a local/recoverable error (spec §7.1): callers re-read
    /// and retry, this is never surfaced to a user.
    async fn write(
        &self,
        txn: AgencyTransaction,
        timeout: Duration,
    ) -> Result<RaftIndex>;

    /// Register `callback` to fire whenever any value under `prefix`
    /// changes. Returns a token that can be used to cancel the watch.
    async fn watch(
        &self,
        prefix: &str,
        callback: Box<dyn Fn(Value) + Send + Sync>,
    ) -> Result<WatchHandle>;

    /// Cancel a previously registered watch.
    async fn unwatch(&self, handle: WatchHandle) -> Result<()>;

    /// Atomically reserve `n` consecutive cluster-unique identifiers
    /// and return the *first* id in the reserved range (spec §4.1,
    /// "unique-id allocator"). Backed by an agency counter distinct
    /// from the `Plan`/`Current` trees.
    async fn reserve_ids(&self, n: u64, timeout: Duration) -> Result<u64>;
}

/// Opaque handle identifying a registered watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchHandle(pub u64);

/// Convenience: turn a `PreconditionFailed`-shaped write outcome into a
/// boolean without forcing every caller to match on the error variant.
pub fn is_precondition_failure(err: &CoordError) -> bool {
    matches!(err, CoordError::PreconditionFailed(_))
}
