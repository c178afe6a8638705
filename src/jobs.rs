//! `Target/ToDo/<jobId>` job bodies (spec §6). Only `moveShard` is
//! modeled here — the supervision core emits it, an external job
//! runner (out of scope, spec §1) executes it.

use crate::model::{CollectionId, DbName};
use crate::server_id::ServerId;
use crate::shard_id::ShardId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `Target/ToDo/<jobId>` body for a shard move (spec §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveShardJob {
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub database: DbName,
    pub collection: CollectionId,
    pub shard: ShardId,
    pub from_server: ServerId,
    pub to_server: ServerId,
    pub job_id: String,
    /// ISO-8601 UTC seconds (spec §6).
    pub time_created: DateTime<Utc>,
    pub creator: ServerId,
    pub is_leader: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobType {
    MoveShard,
}

impl MoveShardJob {
    /// Builds a move job with a fresh, opaque job id (spec §6, §8 S6).
    /// `is_leader` must reflect whether `from_server` is currently the
    /// shard's leader (spec §8, property 10).
    pub fn new(
        database: DbName,
        collection: CollectionId,
        shard: ShardId,
        from_server: ServerId,
        to_server: ServerId,
        creator: ServerId,
        is_leader: bool,
        now: DateTime<Utc>,
    ) -> Self {
        MoveShardJob {
            job_type: JobType::MoveShard,
            database,
            collection,
            shard,
            from_server,
            to_server,
            job_id: Uuid::new_v4().to_string(),
            time_created: now,
            creator,
            is_leader,
        }
    }

    /// Agency key this job body is written to, preconditioned on being
    /// absent (spec §4.5, §8 S6).
    pub fn agency_key(&self) -> String {
        format!("Target/ToDo/{}", self.job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn round_trips_through_json_with_exact_shape() {
        let now = Utc.with_ymd_and_hms(2018, 3, 7, 15, 20, 1).unwrap();
        let mut job = MoveShardJob::new(
            "myDb".into(),
            123,
            ShardId::new(1),
            ServerId::from("db-from"),
            ServerId::from("db-to"),
            ServerId::from("CRDN-a"),
            true,
            now,
        );
        job.job_id = "job-1".into();
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["type"], "moveShard");
        assert_eq!(json["database"], "myDb");
        assert_eq!(json["collection"], 123);
        assert_eq!(json["shard"], "s1");
        assert_eq!(json["fromServer"], "db-from");
        assert_eq!(json["toServer"], "db-to");
        assert_eq!(json["isLeader"], true);
        assert_eq!(job.agency_key(), "Target/ToDo/job-1");
    }

    #[test]
    fn job_ids_are_unique() {
        let now = Utc::now();
        let a = MoveShardJob::new(
            "d".into(), 1, ShardId::new(1),
            ServerId::from("a"), ServerId::from("b"), ServerId::from("c"), false, now,
        );
        let b = MoveShardJob::new(
            "d".into(), 1, ShardId::new(1),
            ServerId::from("a"), ServerId::from("b"), ServerId::from("c"), false, now,
        );
        assert_ne!(a.job_id, b.job_id);
    }
}
