//! Coordination core for a sharded, agency-backed document database
//! (spec §1): cluster metadata, shard placement, collection-group
//! supervision, and the query-dispatch plumbing that turns a plan into
//! per-server requests. Talks to the agency through the
//! [`agency::AgencyClient`] trait boundary; everything upstream of that
//! (storage, the query language, wire protocol) is out of scope.

pub mod agency;
pub mod cluster_info;
pub mod engine_info;
pub mod error;
pub mod health;
pub mod jobs;
pub mod model;
pub mod placement;
pub mod reboot;
pub mod repair;
pub mod server_id;
pub mod shard_id;
pub mod supervision;
pub mod txn_writer;
pub mod value;
pub mod watcher;

pub use error::{CoordError, Result};
pub use server_id::{ServerId, ServerRole};
pub use shard_id::ShardId;

use agency::CacheConfig;
use std::time::Duration;

/// Process-wide configuration (spec's [EXPANSION] Configuration
/// section): agency endpoints, this process's own identity, and the
/// knobs the agency cache and supervision loop run with. Built in code
/// rather than parsed from a file, following the teacher's own
/// `Config`/`DatabaseConfig` pattern.
#[derive(Debug, Clone)]
pub struct CoordConfig {
    /// Agency cluster endpoints, e.g. `["http://agent1:8531", ...]`.
    /// Opaque to this crate beyond being handed to whatever
    /// [`agency::AgencyClient`] implementation is wired in.
    pub agency_endpoints: Vec<String>,
    /// This process's own server id and role (spec §6 prefix rules).
    pub server_id: ServerId,
    pub server_role: ServerRole,
    /// How often the Plan/Current syncer fibers poll the agency
    /// (spec §4.1).
    pub sync_interval: Duration,
    /// Default timeout for a single agency read (spec §4.1, §7 error
    /// kind 1).
    pub agency_read_timeout: Duration,
    /// Default timeout for a single agency write.
    pub agency_write_timeout: Duration,
    /// Default timeout for a registered current-watcher wait
    /// (spec §4.6).
    pub watch_timeout: Duration,
    /// Unique-id allocator batch size and low-water mark
    /// (spec §4.1 "uniqid").
    pub uniqid_batch_size: u64,
    pub uniqid_low_water_mark: u64,
    /// Error returned to callers still waiting on agency operations
    /// once shutdown has begun (spec §7).
    pub shutdown_error: CoordError,
}

impl CoordConfig {
    /// Builds the [`agency::CacheConfig`] this config implies, so
    /// callers wiring up an [`agency::AgencyCache`] don't duplicate the
    /// sync/timeout/uniqid knobs in two places.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            sync_interval: self.sync_interval,
            read_timeout: self.agency_read_timeout,
            uniqid_batch_size: self.uniqid_batch_size,
            uniqid_low_water_mark: self.uniqid_low_water_mark,
            shutdown_error: self.shutdown_error.clone(),
        }
    }
}

impl Default for CoordConfig {
    fn default() -> Self {
        CoordConfig {
            agency_endpoints: vec!["http://localhost:8531".to_string()],
            server_id: ServerId::new(ServerRole::Coordinator, "0001"),
            server_role: ServerRole::Coordinator,
            sync_interval: Duration::from_millis(500),
            agency_read_timeout: Duration::from_secs(10),
            agency_write_timeout: Duration::from_secs(10),
            watch_timeout: Duration::from_secs(30),
            uniqid_batch_size: 1000,
            uniqid_low_water_mark: 100,
            shutdown_error: CoordError::ShuttingDown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_derives_a_consistent_cache_config() {
        let cfg = CoordConfig::default();
        let cache_cfg = cfg.cache_config();
        assert_eq!(cache_cfg.sync_interval, cfg.sync_interval);
        assert_eq!(cache_cfg.uniqid_batch_size, cfg.uniqid_batch_size);
    }

    #[test]
    fn default_server_id_is_a_coordinator() {
        let cfg = CoordConfig::default();
        assert_eq!(cfg.server_id.role(), Some(ServerRole::Coordinator));
    }
}
