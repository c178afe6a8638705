//! Shard-distribution planner (spec §4.3): pure functions that turn a
//! pool of healthy servers into a list of [`ResponsibleServerList`]s,
//! one per shard index. Three strategies share the same output shape
//! so the supervision loop (§4.4) never needs to know which one
//! produced a given plan.

pub mod distribute_like;
pub mod even;
pub mod satellite;

use crate::server_id::ServerId;
use serde::de::{Error as DeError, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// The ordered server list responsible for one shard: leader first,
/// followers in placement order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponsibleServerList(pub Vec<ServerId>);

impl ResponsibleServerList {
    pub fn new(servers: Vec<ServerId>) -> Self {
        ResponsibleServerList(servers)
    }

    /// First element of the ordered list (spec §9, "ported directly").
    pub fn get_leader(&self) -> Option<&ServerId> {
        self.0.first()
    }

    pub fn followers(&self) -> &[ServerId] {
        if self.0.is_empty() {
            &[]
        } else {
            &self.0[1..]
        }
    }

    pub fn contains(&self, server: &ServerId) -> bool {
        self.0.contains(server)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Replication factor: a fixed count, or the literal `"satellite"`
/// meaning "every data-bearing server" (spec §3, GLOSSARY).
///
/// `#[serde(untagged)]` on a unit variant writes and expects JSON
/// `null`, not the string literal the agency wire actually uses, so
/// this has its own manual `Serialize`/`Deserialize`: `Count(n)` is a
/// bare number, `Satellite` is exactly the string `"satellite"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicationFactor {
    Count(u32),
    Satellite,
}

impl Serialize for ReplicationFactor {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            ReplicationFactor::Count(n) => serializer.serialize_u32(*n),
            ReplicationFactor::Satellite => serializer.serialize_str("satellite"),
        }
    }
}

struct ReplicationFactorVisitor;

impl<'de> Visitor<'de> for ReplicationFactorVisitor {
    type Value = ReplicationFactor;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a non-negative integer or the string \"satellite\"")
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
    where
        E: DeError,
    {
        Ok(ReplicationFactor::Count(v as u32))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
    where
        E: DeError,
    {
        if v < 0 {
            return Err(DeError::invalid_value(
                serde::de::Unexpected::Signed(v),
                &self,
            ));
        }
        Ok(ReplicationFactor::Count(v as u32))
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: DeError,
    {
        if v == "satellite" {
            Ok(ReplicationFactor::Satellite)
        } else {
            Err(DeError::unknown_variant(v, &["satellite"]))
        }
    }
}

impl<'de> Deserialize<'de> for ReplicationFactor {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(ReplicationFactorVisitor)
    }
}

impl ReplicationFactor {
    pub fn is_satellite(&self) -> bool {
        matches!(self, ReplicationFactor::Satellite)
    }

    pub fn as_count(&self) -> Option<u32> {
        match self {
            ReplicationFactor::Count(n) => Some(*n),
            ReplicationFactor::Satellite => None,
        }
    }
}

/// Output of a planning pass: one entry per shard index, plus the set
/// of servers actually used (spec §4.3, "mark the servers actually
/// used").
#[derive(Debug, Clone, Default)]
pub struct PlanningResult {
    pub shards: Vec<ResponsibleServerList>,
    pub servers_used: Vec<ServerId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leader_is_first_element() {
        let list = ResponsibleServerList::new(vec![
            ServerId::from("PRMR-a"),
            ServerId::from("PRMR-b"),
        ]);
        assert_eq!(list.get_leader(), Some(&ServerId::from("PRMR-a")));
        assert_eq!(list.followers(), &[ServerId::from("PRMR-b")]);
    }

    #[test]
    fn empty_list_has_no_leader() {
        let list = ResponsibleServerList::new(vec![]);
        assert_eq!(list.get_leader(), None);
        assert!(list.followers().is_empty());
    }

    #[test]
    fn satellite_serializes_as_the_literal_string() {
        let json = serde_json::to_value(ReplicationFactor::Satellite).unwrap();
        assert_eq!(json, serde_json::json!("satellite"));
        let back: ReplicationFactor = serde_json::from_value(json).unwrap();
        assert_eq!(back, ReplicationFactor::Satellite);
    }

    #[test]
    fn count_serializes_as_a_bare_number() {
        let json = serde_json::to_value(ReplicationFactor::Count(3)).unwrap();
        assert_eq!(json, serde_json::json!(3));
        let back: ReplicationFactor = serde_json::from_value(json).unwrap();
        assert_eq!(back, ReplicationFactor::Count(3));
    }

    #[test]
    fn unknown_string_is_rejected() {
        let err = serde_json::from_value::<ReplicationFactor>(serde_json::json!("oops"));
        assert!(err.is_err());
    }
}
