//! Even distribution (spec §4.3): spreads leaders and followers evenly
//! around a shuffled ring of healthy servers using two independently
//! advancing cursors, so leader count and total replica count per
//! server are each within ±1 of the ideal (spec §8, property 5).

use super::{PlanningResult, ResponsibleServerList};
use crate::error::{CoordError, Result};
use crate::server_id::ServerId;
use rand::seq::SliceRandom;
use rand::Rng;

/// Inputs to the even-distribution strategy (spec §4.3).
#[derive(Debug, Clone)]
pub struct EvenDistributionRequest {
    pub number_of_shards: u32,
    pub replication_factor: u32,
    pub avoid: Vec<ServerId>,
    pub enforce_replication_factor: bool,
}

/// Plans shard placement by even distribution. Idempotent and
/// re-invocable: it carries no state across calls, so a retry simply
/// re-shuffles and re-plans from scratch (spec §4.3).
pub fn plan(
    available_servers: &[ServerId],
    req: &EvenDistributionRequest,
) -> Result<PlanningResult> {
    plan_with_rng(available_servers, req, &mut rand::rng())
}

/// Same as [`plan`] but with an injectable RNG, so tests can assert on
/// exact cursor behavior without depending on randomness.
pub fn plan_with_rng(
    available_servers: &[ServerId],
    req: &EvenDistributionRequest,
    rng: &mut impl Rng,
) -> Result<PlanningResult> {
    let mut candidates: Vec<ServerId> = available_servers
        .iter()
        .filter(|s| !req.avoid.contains(s))
        .cloned()
        .collect();

    if candidates.len() < req.replication_factor as usize && req.enforce_replication_factor {
        return Err(CoordError::InsufficientDbServers);
    }
    if candidates.is_empty() {
        return Err(CoordError::InsufficientDbServers);
    }

    candidates.shuffle(rng);

    let replication_factor = (req.replication_factor as usize).min(candidates.len());
    let n = candidates.len();
    let mut leader_idx = 0usize;
    let mut follower_idx = 0usize;
    let mut shards = Vec::with_capacity(req.number_of_shards as usize);
    let mut used = std::collections::BTreeSet::new();

    for _ in 0..req.number_of_shards {
        let leader = candidates[leader_idx % n].clone();
        leader_idx += 1;
        used.insert(leader.clone());

        let mut followers = Vec::with_capacity(replication_factor.saturating_sub(1));
        while followers.len() < replication_factor.saturating_sub(1) {
            let candidate = candidates[follower_idx % n].clone();
            follower_idx += 1;
            if candidate == leader {
                continue;
            }
            used.insert(candidate.clone());
            followers.push(candidate);
        }

        let mut servers = Vec::with_capacity(1 + followers.len());
        servers.push(leader);
        servers.extend(followers);
        shards.push(ResponsibleServerList::new(servers));
    }

    Ok(PlanningResult {
        shards,
        servers_used: used.into_iter().collect(),
    })
}
