//! End-to-end scenarios S1-S6 (spec §8) exercised against the crate's
//! public API rather than through any internal helper.

use chrono::{TimeZone, Utc};
use rustydb_coord::health::{ParticipantFlags, ParticipantsHealth};
use rustydb_coord::jobs::MoveShardJob;
use rustydb_coord::repair::{
    plan_group_repair, plan_shard_repair, satellite_needs_no_repair, BeginRepairs, FinishRepairs,
    RepairMove, RepairStep,
};
use rustydb_coord::{ServerId, ShardId};

fn sid(s: &str) -> ServerId {
    ServerId::from(s)
}

fn healthy_cluster(servers: &[&str]) -> ParticipantsHealth {
    let mut health = ParticipantsHealth::new();
    for s in servers {
        health.update(sid(s), ParticipantFlags { not_is_failed: true, reboot_id: 1 });
    }
    health
}

/// S1 — single swap, three healthy servers.
#[test]
fn s1_single_swap_three_healthy_servers() {
    let health = healthy_cluster(&["A", "B", "C"]);
    let plan = plan_group_repair(
        ShardId::new(11),
        ShardId::new(22),
        &[sid("A"), sid("B")],
        &[sid("B"), sid("A")],
        2,
        &health,
    )
    .expect("three healthy servers is enough to repair a two-way swap");

    assert_eq!(plan.begin, BeginRepairs { rename: true, rf_collection: 2, rf_proto: 2 });
    assert_eq!(
        plan.steps,
        vec![
            RepairStep::Move(RepairMove { from: sid("B"), to: sid("C"), is_leader: false }),
            RepairStep::Move(RepairMove { from: sid("A"), to: sid("B"), is_leader: true }),
            RepairStep::Move(RepairMove { from: sid("C"), to: sid("A"), is_leader: false }),
        ]
    );
    assert_eq!(
        plan.finish,
        FinishRepairs {
            shards: vec![(ShardId::new(11), ShardId::new(22), vec![sid("B"), sid("A")])],
            rf: 2,
        }
    );
}

/// S2 — follower-order fix, four healthy servers. One shard's
/// follower order has drifted from the prototype; the others already
/// match and need no repair at all.
#[test]
fn s2_follower_order_fix_four_healthy_servers() {
    let spare = sid("spare");
    let proto_order = vec![sid("A"), sid("B"), sid("C"), sid("D")];

    let drifted = vec![sid("A"), sid("D"), sid("C"), sid("B")];
    let steps = plan_shard_repair(&drifted, &proto_order, &spare).unwrap();
    assert_eq!(
        steps,
        vec![RepairStep::FixServerOrder {
            followers: vec![sid("D"), sid("C"), sid("B")],
            proto_followers: vec![sid("B"), sid("C"), sid("D")],
        }]
    );

    let already_correct = proto_order.clone();
    let steps = plan_shard_repair(&already_correct, &proto_order, &spare).unwrap();
    assert!(steps.is_empty());
}

/// S3 — not enough healthy servers: replicationFactor=3, only 2
/// healthy data servers. The repair engine must refuse rather than
/// write a partial plan.
#[test]
fn s3_not_enough_healthy_servers_refuses_to_plan() {
    let health = healthy_cluster(&["A", "B"]);
    let err = plan_group_repair(
        ShardId::new(1),
        ShardId::new(2),
        &[sid("A"), sid("B"), sid("X")],
        &[sid("B"), sid("A"), sid("X")],
        3,
        &health,
    )
    .unwrap_err();
    assert_eq!(err.code(), Some(rustydb_coord::error::codes::CLUSTER_REPAIRS_NOT_ENOUGH_HEALTHY));
}

/// S4 — satellite collections never need repair, regardless of health
/// churn among followers.
#[test]
fn s4_satellite_collection_emits_nothing() {
    assert!(satellite_needs_no_repair(7));
}

/// S5 — version-sort sanity across magnitudes and suffixes.
#[test]
fn s5_version_sort_sanity() {
    let mut shards: Vec<ShardId> = [
        "s2", "s10", "s7", "s5", "s1000057", "s1000065", "s100a", "s0100b", "s126", "s129",
        "s254", "s257",
    ]
    .iter()
    .map(|s| ShardId::from_raw(*s))
    .collect();
    shards.sort();

    let expected: Vec<ShardId> = [
        "s2", "s5", "s7", "s10", "s126", "s129", "s254", "s257", "s100a", "s0100b", "s1000057",
        "s1000065",
    ]
    .iter()
    .map(|s| ShardId::from_raw(*s))
    .collect();
    assert_eq!(shards, expected);
}

/// S6 — mover job body round-trip through the exact agency JSON shape.
#[test]
fn s6_mover_job_body_round_trip() {
    let now = Utc.with_ymd_and_hms(2018, 3, 7, 15, 20, 1).unwrap();
    let mut job = MoveShardJob::new(
        "myDb".to_string(),
        123,
        ShardId::new(1),
        sid("db-from"),
        sid("db-to"),
        sid("CRDN-a"),
        true,
        now,
    );
    job.job_id = "job-1".to_string();

    let json = serde_json::to_value(&job).unwrap();
    assert_eq!(json["type"], "moveShard");
    assert_eq!(json["database"], "myDb");
    assert_eq!(json["collection"], 123);
    assert_eq!(json["shard"], "s1");
    assert_eq!(json["fromServer"], "db-from");
    assert_eq!(json["toServer"], "db-to");
    assert_eq!(json["isLeader"], true);
    assert!(json["timeCreated"].as_str().unwrap().starts_with("2018-03-07T15:20:01"));
    assert_eq!(job.agency_key(), "Target/ToDo/job-1");

    let restored: MoveShardJob = serde_json::from_value(json).unwrap();
    assert_eq!(restored, job);
}
