use thiserror::Error;

/// Stable numeric error codes (spec §6). These are part of the wire
/// contract: coordinators and DB-servers match on the integer, not the
/// Rust variant name.
pub mod codes {
    pub const CLUSTER_INSUFFICIENT_DBSERVERS: i32 = 1454;
    pub const CLUSTER_DATA_SOURCE_NOT_FOUND: i32 = 1203;
    pub const CLUSTER_COULD_NOT_CREATE_COLLECTION: i32 = 1458;
    pub const CLUSTER_REPAIRS_NOT_ENOUGH_HEALTHY: i32 = 1480;
    pub const CLUSTER_REPAIRS_NO_DBSERVERS: i32 = 1481;
    pub const CLUSTER_REPAIRS_MISMATCHING_SHARDS: i32 = 1482;
    pub const CLUSTER_REPAIRS_MISMATCHING_LEADERS: i32 = 1483;
    pub const CLUSTER_REPAIRS_MISMATCHING_FOLLOWERS: i32 = 1484;
    pub const CLUSTER_REPAIRS_INCONSISTENT_ATTRIBUTES: i32 = 1485;
    pub const CLUSTER_REPAIRS_REPLICATION_FACTOR_VIOLATED: i32 = 1486;
}

/// Crate-wide error type.
///
/// Follows the three-kind taxonomy from spec §7: `PreconditionFailed`
/// and `Stale` are local/recoverable (callers re-read and retry and
/// never surface these to a user), the `Cluster*` family is
/// logical/user-visible (stable code + message, no retry), and
/// `ShuttingDown`/`Internal` are fatal.
#[derive(Error, Debug, Clone)]
pub enum CoordError {
    #[error("not enough healthy DB-servers for the requested replication factor")]
    InsufficientDbServers,

    #[error("data source not found: {0}")]
    DataSourceNotFound(String),

    #[error("could not create collection: {0}")]
    CouldNotCreateCollection(String),

    #[error("shard repair: not enough healthy servers")]
    RepairsNotEnoughHealthy,

    #[error("shard repair: no DB-servers available")]
    RepairsNoDbServers,

    #[error("shard repair: mismatching shards")]
    RepairsMismatchingShards,

    #[error("shard repair: mismatching leaders")]
    RepairsMismatchingLeaders,

    #[error("shard repair: mismatching followers")]
    RepairsMismatchingFollowers,

    #[error("shard repair: inconsistent attributes: {0}")]
    RepairsInconsistentAttributes(String),

    #[error("shard repair: replication factor violated")]
    RepairsReplicationFactorViolated,

    #[error("agency precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("local cache is stale, required raft index not yet reached")]
    Stale,

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("shutting down")]
    ShuttingDown,

    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl CoordError {
    /// The stable numeric code for the variants that are meant to cross
    /// the wire; `None` for the purely local/internal ones.
    pub fn code(&self) -> Option<i32> {
        use codes::*;
        Some(match self {
            CoordError::InsufficientDbServers => CLUSTER_INSUFFICIENT_DBSERVERS,
            CoordError::DataSourceNotFound(_) => CLUSTER_DATA_SOURCE_NOT_FOUND,
            CoordError::CouldNotCreateCollection(_) => CLUSTER_COULD_NOT_CREATE_COLLECTION,
            CoordError::RepairsNotEnoughHealthy => CLUSTER_REPAIRS_NOT_ENOUGH_HEALTHY,
            CoordError::RepairsNoDbServers => CLUSTER_REPAIRS_NO_DBSERVERS,
            CoordError::RepairsMismatchingShards => CLUSTER_REPAIRS_MISMATCHING_SHARDS,
            CoordError::RepairsMismatchingLeaders => CLUSTER_REPAIRS_MISMATCHING_LEADERS,
            CoordError::RepairsMismatchingFollowers => CLUSTER_REPAIRS_MISMATCHING_FOLLOWERS,
            CoordError::RepairsInconsistentAttributes(_) => {
                CLUSTER_REPAIRS_INCONSISTENT_ATTRIBUTES
            }
            CoordError::RepairsReplicationFactorViolated => {
                CLUSTER_REPAIRS_REPLICATION_FACTOR_VIOLATED
            }
            _ => return None,
        })
    }

    /// Whether a caller should re-read and retry rather than surface
    /// this to a user (spec §7, error kind 1).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CoordError::PreconditionFailed(_) | CoordError::Stale)
    }
}

pub type Result<T> = std::result::Result<T, CoordError>;
