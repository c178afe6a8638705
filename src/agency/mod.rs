// Agency client / cache (spec §4.1).
//
// The agency is a small, linearizable, hierarchical key-value store
// external to this crate. `client` defines the trait boundary this
// crate consumes; `mock` is an in-memory stand-in for tests; `cache`
// mirrors `Plan`/`Current` locally with raft-index and plan-version
// waiters plus the batching unique-id allocator.

pub mod cache;
pub mod client;
pub mod mock;

pub use cache::{AgencyCache, CacheConfig, Tree};
pub use client::{
    AgencyClient, AgencyTransaction, Mutation, Precondition, RaftIndex, ReadResult, WatchHandle,
};
