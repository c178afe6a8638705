//! Satellite placement (spec §4.3, §8 property 11): every shard is
//! placed on every healthy data-bearing server. There is no leader
//! election performed here — the first server in the (stable) input
//! order is recorded as leader, matching the convention that
//! `ResponsibleServerList::get_leader()` is simply the first element.

use super::{PlanningResult, ResponsibleServerList};
use crate::error::{CoordError, Result};
use crate::server_id::ServerId;

/// Plans placement for a satellite collection: `number_of_shards`
/// identical `ResponsibleServerList`s, one per shard, each containing
/// every server in `data_servers`.
pub fn plan(data_servers: &[ServerId], number_of_shards: u32) -> Result<PlanningResult> {
    if data_servers.is_empty() {
        return Err(CoordError::RepairsNoDbServers);
    }
    let list = ResponsibleServerList::new(data_servers.to_vec());
    Ok(PlanningResult {
        shards: (0..number_of_shards).map(|_| list.clone()).collect(),
        servers_used: data_servers.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn servers(n: usize) -> Vec<ServerId> {
        (0..n)
            .map(|i| ServerId::from(format!("PRMR-{i}").as_str()))
            .collect()
    }

    #[test]
    fn every_shard_gets_every_server() {
        let all = servers(3);
        let result = plan(&all, 2).unwrap();
        assert_eq!(result.shards.len(), 2);
        for shard in &result.shards {
            assert_eq!(shard.len(), 3);
            for s in &all {
                assert!(shard.contains(s));
            }
        }
    }

    #[test]
    fn no_servers_fails() {
        assert!(plan(&[], 2).is_err());
    }
}
