//! Cluster-info facade (spec §4.7): the coordinator-facing, cache-
//! backed read API used on the hot request path. Backed by
//! `dashmap::DashMap` the way the teacher's membership caches are
//! (spec's [EXPANSION] Concurrency primitives note).

use crate::model::{CollectionId, CollectionPlan, CurrentCollection, DbName};
use crate::placement::ResponsibleServerList;
use crate::reboot::RebootTracker;
use crate::server_id::ServerId;
use crate::shard_id::ShardId;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;

/// Snapshot of one database's collections and shard placements, as
/// last observed from the `Plan`/`Current` agency mirrors. Replaced
/// wholesale on every sync round; readers never see a torn mix of old
/// and new shard maps because they always go through a single `Arc`
/// swap (plain field assignment here, guarded by the map's own
/// sharded locks since updates are per-collection).
pub struct ClusterInfo {
    collections_by_id: DashMap<(DbName, CollectionId), Arc<CollectionPlan>>,
    collections_by_name: DashMap<(DbName, String), CollectionId>,
    current_by_id: DashMap<(DbName, CollectionId), Arc<CurrentCollection>>,
    /// Shard -> responsible servers, flattened across all collections
    /// for O(1) lookup on the request path.
    shard_servers: DashMap<ShardId, ResponsibleServerList>,
    /// Which collection a shard belongs to, for shard-group-aware
    /// batch resolution (spec §4.7, `getResponsibleServers`).
    shard_owner: DashMap<ShardId, CollectionId>,
    reboot_tracker: Arc<RebootTracker>,
    next_unique_id: std::sync::atomic::AtomicU64,
}

impl ClusterInfo {
    pub fn new(reboot_tracker: Arc<RebootTracker>) -> Arc<Self> {
        Arc::new(ClusterInfo {
            collections_by_id: DashMap::new(),
            collections_by_name: DashMap::new(),
            current_by_id: DashMap::new(),
            shard_servers: DashMap::new(),
            shard_owner: DashMap::new(),
            reboot_tracker,
            next_unique_id: std::sync::atomic::AtomicU64::new(1),
        })
    }

    /// Replaces the cached view of one collection, e.g. after a
    /// `Plan` sync round (spec §4.7).
    pub fn upsert_collection(&self, db: &DbName, plan: CollectionPlan) {
        let plan = Arc::new(plan);
        for (shard, servers) in &plan.deprecated_shard_map {
            self.shard_servers.insert(shard.clone(), servers.clone());
            self.shard_owner.insert(shard.clone(), plan.id);
        }
        self.collections_by_name
            .insert((db.clone(), plan.name.clone()), plan.id);
        self.collections_by_id
            .insert((db.clone(), plan.id), plan);
    }

    pub fn upsert_current(&self, db: &DbName, cid: CollectionId, current: CurrentCollection) {
        self.current_by_id.insert((db.clone(), cid), Arc::new(current));
    }

    pub fn remove_collection(&self, db: &DbName, cid: CollectionId) {
        if let Some((_, plan)) = self.collections_by_id.remove(&(db.clone(), cid)) {
            self.collections_by_name.remove(&(db.clone(), plan.name.clone()));
            for shard in plan.deprecated_shard_map.keys() {
                self.shard_servers.remove(shard);
                self.shard_owner.remove(shard);
            }
        }
        self.current_by_id.remove(&(db.clone(), cid));
    }

    /// Throwing-equivalent lookup: panics under a Rust API would be
    /// wrong, so this returns a `Result`. `get_collection_nt` is the
    /// non-throwing variant that mirrors the spec's naming.
    pub fn get_collection(&self, db: &DbName, cid: CollectionId) -> crate::error::Result<Arc<CollectionPlan>> {
        self.get_collection_nt(db, cid)
            .ok_or_else(|| crate::error::CoordError::DataSourceNotFound(format!("{db}/{cid}")))
    }

    pub fn get_collection_nt(&self, db: &DbName, cid: CollectionId) -> Option<Arc<CollectionPlan>> {
        self.collections_by_id.get(&(db.clone(), cid)).map(|e| e.clone())
    }

    pub fn get_collection_by_name(&self, db: &DbName, name: &str) -> Option<Arc<CollectionPlan>> {
        let cid = *self.collections_by_name.get(&(db.clone(), name.to_string()))?;
        self.get_collection_nt(db, cid)
    }

    pub fn get_collection_current(&self, db: &DbName, cid: CollectionId) -> Option<Arc<CurrentCollection>> {
        self.current_by_id.get(&(db.clone(), cid)).map(|e| e.clone())
    }

    /// Shard ids for a collection, in version-sort order (spec §4.7,
    /// §6 shard id format).
    pub fn get_shard_list(&self, db: &DbName, cid: CollectionId) -> Vec<ShardId> {
        let Some(plan) = self.get_collection_nt(db, cid) else {
            return vec![];
        };
        let mut shards: Vec<ShardId> = plan.deprecated_shard_map.keys().cloned().collect();
        shards.sort();
        shards
    }

    pub fn get_responsible_server(&self, shard: &ShardId) -> Option<ResponsibleServerList> {
        self.shard_servers.get(shard).map(|e| e.clone())
    }

    /// "NoDelay" variant: returns empty rather than blocking during
    /// failover (spec §4.7) — here that just means "never waits",
    /// since this cache is already non-blocking.
    pub fn get_responsible_server_no_delay(&self, shard: &ShardId) -> ResponsibleServerList {
        self.get_responsible_server(shard).unwrap_or_else(|| ResponsibleServerList::new(vec![]))
    }

    pub fn get_leader_for_shard(&self, shard: &ShardId) -> Option<ServerId> {
        self.get_responsible_server(shard)?.get_leader().cloned()
    }

    pub fn get_leaders_for_shards(&self, shards: &[ShardId], out: &mut HashMap<ShardId, ServerId>) {
        for shard in shards {
            if let Some(leader) = self.get_leader_for_shard(shard) {
                out.insert(shard.clone(), leader);
            }
        }
    }

    /// Resolves a set of shards to one server each, honoring shard-
    /// group relationships: shards belonging to collections in the
    /// same `distributeShardsLike` chain always resolve to the same
    /// choice (spec §4.7). Since every shard in a shard group is
    /// placed on the same server set in the same order by
    /// construction (spec §3 invariant 2), picking the leader per
    /// shard already satisfies this — no extra bookkeeping is needed
    /// beyond reading the shard's own responsible-server list.
    pub fn get_responsible_servers(&self, shards: &[ShardId]) -> HashMap<ShardId, ServerId> {
        let mut out = HashMap::with_capacity(shards.len());
        self.get_leaders_for_shards(shards, &mut out);
        out
    }

    pub fn reboot_tracker(&self) -> Arc<RebootTracker> {
        self.reboot_tracker.clone()
    }

    /// Local id issuance for tests/offline use; production callers go
    /// through `AgencyCache::uniqid` instead, which this facade does
    /// not wrap directly (spec §4.7 names it as a facade method, but
    /// the batching logic lives in the cache, spec §4.1).
    pub fn uniqid(&self, n: u64) -> std::ops::Range<u64> {
        let first = self
            .next_unique_id
            .fetch_add(n, std::sync::atomic::Ordering::SeqCst);
        first..first + n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CollectionType};
    use std::collections::BTreeMap;

    fn sample_plan(id: CollectionId, shard: ShardId, servers: Vec<&str>) -> CollectionPlan {
        let mut map = BTreeMap::new();
        map.insert(
            shard,
            ResponsibleServerList::new(servers.into_iter().map(ServerId::from).collect()),
        );
        CollectionPlan {
            id,
            name: format!("c{id}"),
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
            distribute_shards_like: None,
            repairing_distribute_shards_like: None,
            indexes: vec![],
            is_building: false,
            deprecated_shard_map: map,
        }
    }

    #[test]
    fn lookup_by_id_and_name() {
        let ci = ClusterInfo::new(Arc::new(RebootTracker::new()));
        let db = "myDb".to_string();
        ci.upsert_collection(&db, sample_plan(1, ShardId::new(1), vec!["PRMR-a"]));
        assert!(ci.get_collection_nt(&db, 1).is_some());
        assert_eq!(ci.get_collection_by_name(&db, "c1").unwrap().id, 1);
        assert!(ci.get_collection_nt(&db, 999).is_none());
    }

    #[test]
    fn shard_list_is_version_sorted() {
        let ci = ClusterInfo::new(Arc::new(RebootTracker::new()));
        let db = "myDb".to_string();
        let mut plan = sample_plan(1, ShardId::new(2), vec!["PRMR-a"]);
        plan.deprecated_shard_map.insert(
            ShardId::new(10),
            ResponsibleServerList::new(vec![ServerId::from("PRMR-a")]),
        );
        ci.upsert_collection(&db, plan);
        let shards = ci.get_shard_list(&db, 1);
        assert_eq!(shards, vec![ShardId::new(2), ShardId::new(10)]);
    }

    #[test]
    fn leader_lookup_resolves_first_server() {
        let ci = ClusterInfo::new(Arc::new(RebootTracker::new()));
        let db = "myDb".to_string();
        let shard = ShardId::new(1);
        ci.upsert_collection(&db, sample_plan(1, shard.clone(), vec!["PRMR-a", "PRMR-b"]));
        assert_eq!(ci.get_leader_for_shard(&shard), Some(ServerId::from("PRMR-a")));
    }

    #[test]
    fn remove_collection_clears_shard_cache() {
        let ci = ClusterInfo::new(Arc::new(RebootTracker::new()));
        let db = "myDb".to_string();
        let shard = ShardId::new(1);
        ci.upsert_collection(&db, sample_plan(1, shard.clone(), vec!["PRMR-a"]));
        ci.remove_collection(&db, 1);
        assert!(ci.get_collection_nt(&db, 1).is_none());
        assert!(ci.get_responsible_server(&shard).is_none());
    }

    #[test]
    fn uniqid_hands_out_disjoint_ranges() {
        let ci = ClusterInfo::new(Arc::new(RebootTracker::new()));
        let a = ci.uniqid(3);
        let b = ci.uniqid(2);
        assert_eq!(a.len(), 3);
        assert_eq!(b.start, a.end);
    }
}
