//! Target/Plan/Current data model for collection groups, collections,
//! shards, indexes and replicated logs (spec §3, §4.4).
//!
//! Every entity here is a plain, serializable value — the model owns
//! no behavior beyond small accessors and the invariant checks that
//! the supervision loop (`supervision.rs`) consults on every tick.

use crate::placement::{ReplicationFactor, ResponsibleServerList};
use crate::server_id::ServerId;
use crate::shard_id::ShardId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type DbName = String;
pub type GroupId = u64;
pub type LogId = u64;
pub type CollectionId = u64;
pub type IndexId = u64;

/// A shard-group slot inside a collection group; references exactly
/// one replicated log (spec §3, GLOSSARY "sheaf").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sheaf {
    pub index: u32,
    pub log_id: LogId,
}

/// Mutable attributes of a collection group that supervision may
/// rewrite in place (spec §3 table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupAttributes {
    pub replication_factor: ReplicationFactor,
    pub write_concern: u32,
    pub wait_for_sync: bool,
}

/// `Target/CollectionGroups/<db>/<gid>` (spec §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionGroupTarget {
    pub id: GroupId,
    pub attributes: GroupAttributes,
    pub number_of_shards: u32,
    pub collections: Vec<CollectionId>,
    pub version: u64,
}

/// `Plan/CollectionGroups/<db>/<gid>` (spec §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionGroupPlan {
    pub id: GroupId,
    pub attributes: GroupAttributes,
    pub number_of_shards: u32,
    pub collections: Vec<CollectionId>,
    pub sheaves: Vec<Sheaf>,
    pub is_building: bool,
    /// Last `target.version` for which supervision confirmed every
    /// sheaf's log had converged (spec §4.4 step 8).
    pub converged_version: u64,
}

/// `Target/ReplicatedLogs/<db>/<logId>` config knobs (spec §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicatedLogConfig {
    pub write_concern: u32,
    pub replication_factor: u32,
    pub wait_for_sync: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicatedLogTarget {
    pub id: LogId,
    pub participants: Vec<ServerId>,
    pub leader: Option<ServerId>,
    pub config: ReplicatedLogConfig,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicatedLogPlan {
    pub id: LogId,
    pub participants: Vec<ServerId>,
    pub leader: Option<ServerId>,
    pub term: u64,
}

/// `Current/ReplicatedLogs/<db>/<logId>/supervision` (spec §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicatedLogCurrent {
    pub leader: Option<ServerId>,
    pub term: u64,
    pub target_version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollectionType {
    Document,
    Edge,
}

/// Index kind tag (spec §9, "deep inheritance replaced by tagged
/// variants"). Every variant needed by the supervision path is
/// covered; index bodies on the storage/query side are out of scope
/// (spec §1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexKind {
    Primary,
    Edge,
    Hash,
    Skiplist,
    Geo,
    Fulltext,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub id: IndexId,
    pub kind: IndexKind,
    pub fields: Vec<String>,
    pub unique: bool,
    pub sparse: bool,
    pub name: String,
}

/// Whether a collection copies another's placement, and through
/// which attribute (spec §3 invariant 7, GLOSSARY "repairing-dsl").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DslState {
    None,
    Normal(CollectionId),
    Repairing(CollectionId),
}

impl DslState {
    pub fn prototype(&self) -> Option<CollectionId> {
        match self {
            DslState::None => None,
            DslState::Normal(id) | DslState::Repairing(id) => Some(*id),
        }
    }
}

/// A logical collection, target view (spec §3 table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionTarget {
    pub id: CollectionId,
    pub name: String,
    pub group: GroupId,
    pub collection_type: CollectionType,
    pub system: bool,
    pub is_smart: bool,
    pub is_disjoint: bool,
    pub cache_enabled: bool,
    pub shard_keys: Vec<String>,
    pub smart_join_attribute: Option<String>,
    pub smart_graph_attribute: Option<String>,
    pub shadow_collections: Vec<CollectionId>,
    pub distribute_shards_like: Option<CollectionId>,
    pub indexes: Vec<IndexSpec>,
}

/// Plan view of a collection, carrying the materialized shard map and
/// the `isBuilding` gate (spec §3 invariant 5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionPlan {
    pub id: CollectionId,
    pub name: String,
    pub group: GroupId,
    pub collection_type: CollectionType,
    pub system: bool,
    pub is_smart: bool,
    pub is_disjoint: bool,
    pub cache_enabled: bool,
    pub shard_keys: Vec<String>,
    pub smart_join_attribute: Option<String>,
    pub smart_graph_attribute: Option<String>,
    pub shadow_collections: Vec<CollectionId>,
    pub distribute_shards_like: Option<CollectionId>,
    pub repairing_distribute_shards_like: Option<CollectionId>,
    pub indexes: Vec<IndexSpec>,
    pub is_building: bool,
    /// `Plan/Collections/<db>/<cid>/shards/<sid>`, leader first.
    pub deprecated_shard_map: BTreeMap<ShardId, ResponsibleServerList>,
}

impl CollectionPlan {
    /// spec §3 invariant 7: `repairingDistributeShardsLike` and
    /// `distributeShardsLike` are never both set.
    pub fn dsl_state(&self) -> DslState {
        match (
            self.distribute_shards_like,
            self.repairing_distribute_shards_like,
        ) {
            (Some(p), None) => DslState::Normal(p),
            (None, Some(p)) => DslState::Repairing(p),
            (None, None) => DslState::None,
            (Some(_), Some(_)) => {
                // Invariant violation; callers should treat this as a
                // data-model error rather than guess which one wins.
                DslState::None
            }
        }
    }

    pub fn is_visible(&self, current: &CurrentCollection) -> bool {
        if self.is_building {
            return false;
        }
        self.deprecated_shard_map.keys().all(|sid| {
            current
                .shards
                .get(sid)
                .map(|s| !s.error)
                .unwrap_or(false)
        })
    }
}

/// `Current/Collections/<db>/<cid>/<sid>` (spec §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardCurrent {
    pub servers: Vec<ServerId>,
    pub error: bool,
    pub error_num: Option<i32>,
    pub error_message: Option<String>,
    /// Monotonic per-shard report counter (spec §5, "per-shard
    /// ordering").
    pub report_counter: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrentCollection {
    pub shards: BTreeMap<ShardId, ShardCurrent>,
}

/// A database: visible only once its creation has finalized (spec §3
/// table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Database {
    pub name: DbName,
    pub is_building: bool,
    pub groups: Vec<GroupId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(dsl: Option<CollectionId>, repairing: Option<CollectionId>) -> CollectionPlan {
        CollectionPlan {
            id: 1,
            name: "c".into(),
            group: 1,
            collection_type: CollectionType::Document,
            system: false,
            is_smart: false,
            is_disjoint: false,
            cache_enabled: false,
            shard_keys: vec!["_key".into()],
            smart_join_attribute: None,
            smart_graph_attribute: None,
            shadow_collections: vec![],
            distribute_shards_like: dsl,
            repairing_distribute_shards_like: repairing,
            indexes: vec![],
            is_building: false,
            deprecated_shard_map: BTreeMap::new(),
        }
    }

    #[test]
    fn dsl_state_normal() {
        assert_eq!(plan(Some(7), None).dsl_state(), DslState::Normal(7));
    }

    #[test]
    fn dsl_state_repairing() {
        assert_eq!(plan(None, Some(7)).dsl_state(), DslState::Repairing(7));
    }

    #[test]
    fn dsl_state_none() {
        assert_eq!(plan(None, None).dsl_state(), DslState::None);
    }

    #[test]
    fn visible_requires_not_building_and_no_shard_errors() {
        let mut c = plan(None, None);
        c.deprecated_shard_map.insert(
            ShardId::new(1),
            ResponsibleServerList::new(vec![ServerId::from("PRMR-a")]),
        );
        let mut current = CurrentCollection::default();
        assert!(!c.is_visible(&current));

        current.shards.insert(
            ShardId::new(1),
            ShardCurrent {
                servers: vec![ServerId::from("PRMR-a")],
                error: false,
                error_num: None,
                error_message: None,
                report_counter: 1,
            },
        );
        assert!(c.is_visible(&current));

        c.is_building = true;
        assert!(!c.is_visible(&current));
    }
}
