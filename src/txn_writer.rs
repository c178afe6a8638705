//! Agency-transaction writer (spec §4.5): turns a [`supervision::Action`]
//! into one atomic agency write, with the preconditions that make the
//! optimistic-concurrency protocol safe to retry.

use crate::agency::client::{AgencyTransaction, Mutation, Precondition};
use crate::model::{CollectionId, CollectionPlan, DbName, GroupId};
use crate::server_id::ServerId;
use crate::supervision::{Action, NewCollectionSpec, NewGroupSpec};
use crate::value::Value;

fn collection_group_key(db: &DbName, tree: &str, gid: GroupId) -> String {
    format!("{tree}/CollectionGroups/{db}/{gid}")
}

fn replicated_log_key(db: &DbName, tree: &str, log_id: u64) -> String {
    format!("{tree}/ReplicatedLogs/{db}/{log_id}")
}

fn collection_key(db: &DbName, cid: CollectionId) -> String {
    format!("Plan/Collections/{db}/{cid}")
}

/// Cluster-wide preconditions every write carries: the planned server
/// set must not intersect servers pending removal, and the observed
/// `Plan/Version` must still hold (spec §4.5).
fn cluster_wide_preconditions(
    observed_plan_version: u64,
    planned_servers: &[ServerId],
) -> Vec<Precondition> {
    let candidates: Vec<String> = planned_servers.iter().map(|s| s.as_str().to_string()).collect();
    vec![
        Precondition::Equals {
            key: "Plan/Version".into(),
            value: Value::UInt(observed_plan_version),
        },
        Precondition::IntersectionEmpty {
            key: "Target/CleanedServers".into(),
            candidates: candidates.clone(),
        },
        Precondition::IntersectionEmpty {
            key: "Target/ToBeCleanedServers".into(),
            candidates,
        },
    ]
}

fn bump_plan_version() -> Mutation {
    Mutation::Increment {
        key: "Plan/Version".into(),
    }
}

/// Serializes a value to the agency's structured [`Value`] type via
/// `serde_json`, mirroring how `Value::from_json`/`to_json` are used
/// at every other agency boundary in this crate.
fn to_agency_value<T: serde::Serialize>(v: &T) -> Value {
    Value::from_json(&serde_json::to_value(v).unwrap_or(serde_json::Value::Null))
}

/// Builds the one agency transaction for `action`, preconditioned on
/// `observed_plan_version` (spec §4.5). The coordinator identity is
/// recorded on new collections for the reboot-tracker-driven undo path
/// (spec §4.2, §4.5).
pub fn build_transaction(
    db: &DbName,
    action: &Action,
    observed_plan_version: u64,
    coordinator: &ServerId,
    coordinator_reboot_id: u64,
) -> Option<AgencyTransaction> {
    match action {
        Action::AddCollectionGroupToPlan(spec) => Some(add_group_txn(db, spec, observed_plan_version)),
        Action::UpdateReplicatedLogConfig { log_id, config } => {
            let mut txn = AgencyTransaction::new().then(Mutation::Set {
                key: format!("{}/config", replicated_log_key(db, "Target", *log_id)),
                value: to_agency_value(config),
            });
            txn.preconditions.push(Precondition::Exists {
                key: replicated_log_key(db, "Target", *log_id),
            });
            Some(txn)
        }
        Action::AddParticipantToLog { log_id, server } => Some(
            AgencyTransaction::new()
                .require(Precondition::Exists {
                    key: replicated_log_key(db, "Target", *log_id),
                })
                .then(Mutation::EmplaceObject {
                    key: format!("{}/participants", replicated_log_key(db, "Target", *log_id)),
                    field: server.as_str().to_string(),
                    value: Value::Bool(true),
                }),
        ),
        Action::RemoveParticipantFromLog { log_id, server } => Some(
            AgencyTransaction::new()
                .require(Precondition::Exists {
                    key: replicated_log_key(db, "Target", *log_id),
                })
                .then(Mutation::Delete {
                    key: format!(
                        "{}/participants/{}",
                        replicated_log_key(db, "Target", *log_id),
                        server.as_str()
                    ),
                }),
        ),
        Action::AddCollectionToPlan(spec) => Some(add_collection_txn(
            db,
            spec,
            observed_plan_version,
            coordinator,
            coordinator_reboot_id,
        )),
        Action::DropCollectionPlan { id } => Some(
            AgencyTransaction::new()
                .require(Precondition::Exists {
                    key: collection_key(db, *id),
                })
                .then(bump_plan_version())
                .then(Mutation::Delete {
                    key: collection_key(db, *id),
                }),
        ),
        Action::UpdateCollectionShardMap { id, mapping } => {
            let mut txn = AgencyTransaction::new()
                .require(Precondition::Exists {
                    key: collection_key(db, *id),
                })
                .then(bump_plan_version());
            for (shard, servers) in mapping {
                txn = txn.then(Mutation::Set {
                    key: format!("{}/shards/{}", collection_key(db, *id), shard),
                    value: to_agency_value(&servers.0),
                });
            }
            Some(txn)
        }
        Action::UpdateConvergedVersion { version } => Some(AgencyTransaction::new().then(Mutation::Set {
            key: format!("Target/CollectionGroups/{db}/convergedVersion"),
            value: Value::UInt(*version),
        })),
        Action::NoActionRequired | Action::NoActionPossible(_) => None,
    }
}

fn add_group_txn(db: &DbName, spec: &NewGroupSpec, observed_plan_version: u64) -> AgencyTransaction {
    let mut planned_servers = Vec::new();
    for log in &spec.logs {
        planned_servers.extend(log.participants.iter().cloned());
    }

    let mut txn = AgencyTransaction::new();
    for p in cluster_wide_preconditions(observed_plan_version, &planned_servers) {
        txn = txn.require(p);
    }
    txn = txn
        .require(Precondition::Absent {
            key: collection_group_key(db, "Target", spec.group.id),
        })
        .then(bump_plan_version())
        .then(Mutation::Set {
            key: collection_group_key(db, "Target", spec.group.id),
            value: to_agency_value(&spec.group),
        })
        .then(Mutation::Set {
            key: collection_group_key(db, "Plan", spec.group.id),
            value: to_agency_value(&spec.group),
        });
    for log in &spec.logs {
        txn = txn
            .require(Precondition::Absent {
                key: replicated_log_key(db, "Target", log.id),
            })
            .then(Mutation::Set {
                key: replicated_log_key(db, "Target", log.id),
                value: to_agency_value(log),
            });
    }
    txn
}

fn add_collection_txn(
    db: &DbName,
    spec: &NewCollectionSpec,
    observed_plan_version: u64,
    coordinator: &ServerId,
    coordinator_reboot_id: u64,
) -> AgencyTransaction {
    let mut planned_servers = Vec::new();
    for servers in spec.plan.deprecated_shard_map.values() {
        planned_servers.extend(servers.0.iter().cloned());
    }

    let mut txn = AgencyTransaction::new();
    for p in cluster_wide_preconditions(observed_plan_version, &planned_servers) {
        txn = txn.require(p);
    }
    txn.require(Precondition::Exists {
        key: collection_group_key(db, "Plan", spec.plan.group),
    })
    .require(Precondition::Absent {
        key: collection_key(db, spec.plan.id),
    })
    .then(bump_plan_version())
    .then(Mutation::EmplaceObject {
        key: format!("Plan/CollectionGroups/{db}/{}", spec.plan.group),
        field: "collections".into(),
        value: Value::UInt(spec.plan.id),
    })
    .then(Mutation::Set {
        key: collection_key(db, spec.plan.id),
        value: to_agency_value(&spec.plan),
    })
    .then(Mutation::Set {
        key: format!("{}/coordinator", collection_key(db, spec.plan.id)),
        value: Value::String(coordinator.as_str().to_string()),
    })
    .then(Mutation::Set {
        key: format!("{}/coordinatorRebootId", collection_key(db, spec.plan.id)),
        value: Value::UInt(coordinator_reboot_id),
    })
}

/// Deletes every partially-placed entry for a collection whose create
/// timed out, preconditioned on `isBuilding` still being set so a
/// racing finalize never undoes a completed create (spec §4.5).
pub fn undo_collection_create(db: &DbName, cid: CollectionId) -> AgencyTransaction {
    AgencyTransaction::new()
        .require(Precondition::Equals {
            key: format!("{}/isBuilding", collection_key(db, cid)),
            value: Value::Bool(true),
        })
        .then(Mutation::Delete {
            key: collection_key(db, cid),
        })
}

/// Clears `isBuilding` once the current-watcher has observed every
/// shard reporting healthy, preconditioned on the stored body still
/// matching what this crate wrote so any concurrent modification
/// forces a retry instead of silently clobbering it (spec §4.5).
pub fn finish_collection_create(db: &DbName, plan: &CollectionPlan) -> AgencyTransaction {
    AgencyTransaction::new()
        .require(Precondition::Equals {
            key: collection_key(db, plan.id),
            value: to_agency_value(plan),
        })
        .then(Mutation::Set {
            key: format!("{}/isBuilding", collection_key(db, plan.id)),
            value: Value::Bool(false),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        CollectionGroupPlan, GroupAttributes, ReplicatedLogConfig, ReplicatedLogTarget, Sheaf,
    };
    use crate::placement::ReplicationFactor;

    #[test]
    fn add_group_txn_has_absence_precondition_and_version_bump() {
        let spec = NewGroupSpec {
            group: CollectionGroupPlan {
                id: 1,
                attributes: GroupAttributes {
                    replication_factor: ReplicationFactor::Count(2),
                    write_concern: 1,
                    wait_for_sync: false,
                },
                number_of_shards: 1,
                collections: vec![],
                sheaves: vec![Sheaf { index: 0, log_id: 10 }],
                is_building: false,
                converged_version: 0,
            },
            logs: vec![ReplicatedLogTarget {
                id: 10,
                participants: vec![ServerId::from("PRMR-a"), ServerId::from("PRMR-b")],
                leader: Some(ServerId::from("PRMR-a")),
                config: ReplicatedLogConfig {
                    write_concern: 1,
                    replication_factor: 2,
                    wait_for_sync: false,
                },
                version: 1,
            }],
        };
        let action = Action::AddCollectionGroupToPlan(spec);
        let txn = build_transaction(
            &"myDb".to_string(),
            &action,
            5,
            &ServerId::from("CRDN-a"),
            1,
        )
        .unwrap();
        assert!(txn.preconditions.contains(&Precondition::Absent {
            key: "Target/CollectionGroups/myDb/1".into(),
        }));
        assert!(txn.mutations.contains(&bump_plan_version()));
    }

    #[test]
    fn no_action_variants_produce_no_transaction() {
        assert!(build_transaction(
            &"d".to_string(),
            &Action::NoActionRequired,
            1,
            &ServerId::from("CRDN-a"),
            1
        )
        .is_none());
    }

    #[test]
    fn undo_requires_is_building_flag() {
        let txn = undo_collection_create(&"d".to_string(), 7);
        assert!(txn.preconditions.iter().any(|p| matches!(
            p,
            Precondition::Equals { key, value } if key == "Plan/Collections/d/7/isBuilding" && *value == Value::Bool(true)
        )));
    }
}
