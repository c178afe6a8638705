//! Legacy shard repair engine (spec §4.4 "repairing-dsl", §8 scenarios
//! S1-S4; SPEC_FULL.md [EXPANSION] 1). Not present verbatim in
//! `original_source` (the `ClusterRepairs.cpp` file itself was
//! filtered out of the retrieval pack) — this module implements the
//! algorithm the S1-S3 fixtures describe directly: a pure function
//! that, given a shard's current server list and its prototype's
//! server list, emits a minimal sequence of moves, preferring a no-op
//! `FixServerOrder` when only follower order differs.

use crate::error::{CoordError, Result};
use crate::health::ParticipantsHealth;
use crate::model::CollectionId;
use crate::server_id::ServerId;
use crate::shard_id::ShardId;
use std::collections::BTreeSet;

/// One physical replica relocation (spec §6, `MoveShard` job body
/// shape; `is_leader` mirrors §8 property 10).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairMove {
    pub from: ServerId,
    pub to: ServerId,
    pub is_leader: bool,
}

/// A single repair step: either a physical move or a pure metadata
/// reorder of the follower list (spec §3 invariant 3, §4.4 GLOSSARY
/// "repairing-dsl").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairStep {
    Move(RepairMove),
    FixServerOrder {
        followers: Vec<ServerId>,
        proto_followers: Vec<ServerId>,
    },
}

/// Wraps a shard's repair steps in the `BeginRepairs`/`FinishRepairs`
/// bracket the end-to-end scenarios name (spec §8 S1, S2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeginRepairs {
    pub rename: bool,
    pub rf_collection: u32,
    pub rf_proto: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishRepairs {
    pub shards: Vec<(ShardId, ShardId, Vec<ServerId>)>,
    pub rf: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairPlan {
    pub begin: BeginRepairs,
    pub steps: Vec<RepairStep>,
    pub finish: FinishRepairs,
}

/// Plans the repair of one shard (spec §8 S1, S2). `current` and
/// `target` must carry the same server set (spec §3 invariant 1 — a
/// shard in a dsl relation is always placed on the prototype's exact
/// server set); a mismatched set is a
/// `CLUSTER_REPAIRS_MISMATCHING_SHARDS` error, not a repair this
/// engine can perform (spec §6).
pub fn plan_shard_repair(
    current: &[ServerId],
    target: &[ServerId],
    spare: &ServerId,
) -> Result<Vec<RepairStep>> {
    if current.len() != target.len() {
        return Err(CoordError::RepairsMismatchingShards);
    }
    let current_set: BTreeSet<&ServerId> = current.iter().collect();
    let target_set: BTreeSet<&ServerId> = target.iter().collect();
    if current_set != target_set {
        return Err(CoordError::RepairsMismatchingFollowers);
    }
    if current == target {
        return Ok(vec![]);
    }

    // Pure reorder: same leader, same follower set, different order.
    if !current.is_empty() && current[0] == target[0] {
        let mut current_followers = current[1..].to_vec();
        let mut target_followers = target[1..].to_vec();
        current_followers.sort();
        target_followers.sort();
        if current_followers == target_followers {
            return Ok(vec![RepairStep::FixServerOrder {
                followers: current[1..].to_vec(),
                proto_followers: target[1..].to_vec(),
            }]);
        }
    }

    Ok(permutation_moves(current, target, spare)
        .into_iter()
        .map(RepairStep::Move)
        .collect())
}

/// Decomposes the permutation from `current` to `target` into cycles
/// and realizes each with `L + 1` moves through one spare server
/// (spec §8 S1): the spare absorbs the first displaced replica, the
/// rest of the cycle shifts directly server-to-server, and the spare's
/// replica fills the last vacated slot.
fn permutation_moves(current: &[ServerId], target: &[ServerId], spare: &ServerId) -> Vec<RepairMove> {
    let n = current.len();
    // sigma[i] = position the server currently at i must end up at.
    let sigma: Vec<usize> = (0..n)
        .map(|i| target.iter().position(|s| *s == current[i]).unwrap())
        .collect();

    let mut visited = vec![false; n];
    let mut moves = Vec::new();
    // `roster` simulates the evolving server-at-position mapping so we
    // can determine, at the moment of each move, whether `from` is
    // currently the leader (position 0).
    let mut roster: Vec<ServerId> = current.to_vec();

    for start in 0..n {
        if visited[start] || current[start] == target[start] {
            continue;
        }
        // Walk the cycle containing `start`.
        let mut cycle = vec![start];
        let mut i = sigma[start];
        while i != start {
            visited[i] = true;
            cycle.push(i);
            i = sigma[i];
        }
        visited[start] = true;
        let l = cycle.len();
        if l < 2 {
            continue;
        }

        let mut emit = |from: ServerId, to: ServerId, moves: &mut Vec<RepairMove>| {
            let pos = roster.iter().position(|s| *s == from).expect("from must be in roster");
            let is_leader = pos == 0;
            roster[pos] = to.clone();
            moves.push(RepairMove { from, to, is_leader });
        };

        emit(current[cycle[l - 1]].clone(), spare.clone(), &mut moves);
        for k in (1..l).rev() {
            emit(current[cycle[k - 1]].clone(), current[cycle[k]].clone(), &mut moves);
        }
        emit(spare.clone(), current[cycle[0]].clone(), &mut moves);
    }

    moves
}

/// Picks a spare healthy server not already part of `current` or
/// `target` (spec §8 S1 uses `C` as the spare). Returns
/// `CLUSTER_REPAIRS_NOT_ENOUGH_HEALTHY` if none exists.
pub fn pick_spare(
    health: &ParticipantsHealth,
    current: &[ServerId],
    target: &[ServerId],
) -> Result<ServerId> {
    health
        .healthy_participants()
        .into_iter()
        .find(|s| !current.contains(s) && !target.contains(s))
        .ok_or(CoordError::RepairsNotEnoughHealthy)
}

/// Plans repair of one shard-group member collection against its
/// prototype, bracketed with `BeginRepairs`/`FinishRepairs` (spec §8
/// S1, S2). `replication_factor` must match on both sides — a
/// mismatch is `CLUSTER_REPAIRS_REPLICATION_FACTOR_VIOLATED` (spec §6)
/// and, per SPEC_FULL.md's open-question call, is always surfaced as
/// an error rather than silently repaired even when
/// `repairing_distribute_shards_like` is already set.
pub fn plan_group_repair(
    shard: ShardId,
    proto_shard: ShardId,
    current: &[ServerId],
    target: &[ServerId],
    replication_factor: u32,
    health: &ParticipantsHealth,
) -> Result<RepairPlan> {
    if current.len() as u32 != replication_factor || target.len() as u32 != replication_factor {
        return Err(CoordError::RepairsReplicationFactorViolated);
    }
    let spare = pick_spare(health, current, target)?;
    let steps = plan_shard_repair(current, target, &spare)?;
    Ok(RepairPlan {
        begin: BeginRepairs {
            rename: true,
            rf_collection: replication_factor,
            rf_proto: replication_factor,
        },
        steps,
        finish: FinishRepairs {
            shards: vec![(shard, proto_shard, target.to_vec())],
            rf: replication_factor,
        },
    })
}

/// Satellite collections never move regardless of health changes
/// among followers (spec §8 S4, property 11): there is nothing to
/// repair since every healthy data server already holds every shard.
pub fn satellite_needs_no_repair(_collection: CollectionId) -> bool {
    true
}
