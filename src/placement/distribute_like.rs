//! Distribute-shards-like placement (spec §4.3, §8 property 1): a
//! collection copies the per-shard server list of a prototype
//! collection verbatim, so the two always move together.

use super::{PlanningResult, ResponsibleServerList};
use crate::error::{CoordError, Result};

/// Copies the prototype's per-shard placement. Fails if the prototype
/// itself does not exist (`prototype` is `None`) or is itself a
/// follower (`prototype_is_follower`) — `distributeShardsLike` chains
/// are not allowed to nest (spec §4.3).
pub fn plan(
    prototype: Option<&[ResponsibleServerList]>,
    prototype_is_follower: bool,
) -> Result<PlanningResult> {
    let Some(prototype) = prototype else {
        return Err(CoordError::DataSourceNotFound(
            "distributeShardsLike prototype not found".into(),
        ));
    };
    if prototype_is_follower {
        return Err(CoordError::Internal(
            "distributeShardsLike prototype is itself a follower".into(),
        ));
    }
    let mut used = std::collections::BTreeSet::new();
    for shard in prototype {
        used.extend(shard.0.iter().cloned());
    }
    Ok(PlanningResult {
        shards: prototype.to_vec(),
        servers_used: used.into_iter().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server_id::ServerId;

    fn list(servers: &[&str]) -> ResponsibleServerList {
        ResponsibleServerList::new(servers.iter().map(|s| ServerId::from(*s)).collect())
    }

    #[test]
    fn copies_prototype_exactly() {
        let proto = vec![list(&["PRMR-a", "PRMR-b"]), list(&["PRMR-b", "PRMR-a"])];
        let result = plan(Some(&proto), false).unwrap();
        assert_eq!(result.shards, proto);
    }

    #[test]
    fn missing_prototype_fails() {
        assert!(plan(None, false).is_err());
    }

    #[test]
    fn follower_prototype_rejected() {
        let proto = vec![list(&["PRMR-a"])];
        assert!(plan(Some(&proto), true).is_err());
    }
}
