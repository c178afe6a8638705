//! Query-dispatch engine-info builder (spec §4.8). The AQL plan DAG
//! itself is out of scope (spec §1); this module models only the
//! narrow shape the core actually consumes — nodes tagged with their
//! kind and the collections/shards they touch — and the snippet
//! accumulation, per-server serialization, and setup fan-out that
//! turn a shard→server mapping into per-DB-server requests.

use crate::reboot::{PeerState, RebootTracker};
use crate::server_id::ServerId;
use crate::shard_id::ShardId;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

pub type NodeId = u64;

/// Lock mode a snippet needs on a collection it touches (spec §4.8.2,
/// "exclusive ≻ write ≻ read").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AccessMode {
    Read,
    Write,
    Exclusive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Ordinary execution node.
    Plain,
    /// Marks a distribution boundary; a sink `GatherNode` opens a new
    /// snippet (spec §4.8.1).
    Gather,
    /// A graph traversal node; contributes a traverser-engine entry on
    /// every server whose shards intersect its footprint (spec
    /// §4.8.2).
    Graph { shards: Vec<ShardId> },
    /// A remote reference to another snippet — closes the snippet
    /// whose data source it is (spec §4.8.1).
    RemoteSnippet { snippet: usize },
}

#[derive(Debug, Clone)]
pub struct PlanNode {
    pub id: NodeId,
    pub kind: NodeKind,
    /// Collections this node accesses, with lock mode and an optional
    /// shard restriction (spec §4.8.1).
    pub collection_access: Vec<(String, AccessMode, Option<Vec<ShardId>>)>,
    /// This node's data source, if it has exactly one (the plan is a
    /// DAG in general; the builder only needs the immediate parent
    /// chain to decide snippet membership).
    pub source: Option<NodeId>,
}

/// One accumulated snippet: an ordered list of node ids attached while
/// this snippet was the topmost open one on the stack (spec §4.8.1).
#[derive(Debug, Clone, Default)]
pub struct Snippet {
    pub nodes: Vec<NodeId>,
    pub locks: BTreeMap<String, AccessMode>,
    pub shard_restriction: HashMap<String, Vec<ShardId>>,
}

/// Walks the plan, opening a new snippet at each sink `GatherNode`,
/// attaching subsequent nodes to the topmost open snippet, and closing
/// a snippet when its source is itself a remote snippet (spec
/// §4.8.1). `nodes` must be in a topological, source-to-sink order.
pub fn accumulate_snippets(nodes: &[PlanNode]) -> Vec<Snippet> {
    let mut snippets: Vec<Snippet> = vec![Snippet::default()];
    let mut stack: Vec<usize> = vec![0];

    for node in nodes {
        match &node.kind {
            NodeKind::Gather => {
                snippets.push(Snippet::default());
                stack.push(snippets.len() - 1);
            }
            NodeKind::RemoteSnippet { .. } => {
                if stack.len() > 1 {
                    stack.pop();
                }
                continue;
            }
            _ => {}
        }
        let top = *stack.last().unwrap();
        snippets[top].nodes.push(node.id);
        for (collection, mode, shards) in &node.collection_access {
            let entry = snippets[top].locks.entry(collection.clone()).or_insert(*mode);
            if *mode > *entry {
                *entry = *mode;
            }
            if let Some(shards) = shards {
                snippets[top]
                    .shard_restriction
                    .entry(collection.clone())
                    .or_default()
                    .extend(shards.iter().cloned());
            }
        }
    }
    snippets
}

/// One server's share of a query: the snippets it participates in and
/// the traverser engines it must stand up (spec §4.8.2).
#[derive(Debug, Clone, Default)]
pub struct PerServerEngineInfo {
    pub server: Option<ServerId>,
    pub locks: Vec<(String, AccessMode)>,
    pub snippet_ids: Vec<usize>,
    pub traverser_shards: Vec<ShardId>,
    /// Clone aliases introduced when a server owns multiple shards of
    /// the same collection (spec §4.8.2): `(original, alias)` node id
    /// pairs the coordinator must translate back.
    pub node_aliases: Vec<(NodeId, NodeId)>,
}

/// Builds one per-server request per DB-server holding at least one
/// relevant shard (spec §4.8.2). `shard_servers` resolves a shard to
/// its responsible server list (leader first); snippets are attached
/// to every server that owns at least one shard of a collection they
/// restrict to (or every server holding any shard of an unrestricted
/// collection).
pub fn build_per_server_engine_infos(
    snippets: &[Snippet],
    nodes: &[PlanNode],
    shard_servers: impl Fn(&ShardId) -> Vec<ServerId>,
    collection_shards: impl Fn(&str) -> Vec<ShardId>,
) -> HashMap<ServerId, PerServerEngineInfo> {
    let mut by_server: HashMap<ServerId, PerServerEngineInfo> = HashMap::new();
    let mut next_alias: NodeId = nodes.iter().map(|n| n.id).max().unwrap_or(0) + 1;

    for (idx, snippet) in snippets.iter().enumerate() {
        let mut servers_for_snippet: HashSet<ServerId> = HashSet::new();
        for (collection, _) in &snippet.locks {
            let shards = snippet
                .shard_restriction
                .get(collection)
                .cloned()
                .unwrap_or_else(|| collection_shards(collection));
            for shard in shards {
                for server in shard_servers(&shard) {
                    servers_for_snippet.insert(server);
                }
            }
        }

        for server in servers_for_snippet {
            let entry = by_server.entry(server.clone()).or_insert_with(|| PerServerEngineInfo {
                server: Some(server.clone()),
                ..Default::default()
            });
            entry.snippet_ids.push(idx);
            for (collection, mode) in &snippet.locks {
                match entry.locks.iter_mut().find(|(c, _)| c == collection) {
                    Some((_, m)) if *m < *mode => *m = *mode,
                    Some(_) => {}
                    None => entry.locks.push((collection.clone(), *mode)),
                }
            }
            // Cloning for multi-shard ownership: if this server owns
            // more than one shard of a restricted collection, record
            // one alias per extra shard so the coordinator can
            // translate results back (spec §4.8.2).
            for collection in snippet.shard_restriction.keys() {
                let owned: Vec<ShardId> = snippet.shard_restriction[collection]
                    .iter()
                    .filter(|s| shard_servers(s).first() == Some(&server) || shard_servers(s).contains(&server))
                    .cloned()
                    .collect();
                if owned.len() > 1 {
                    for node_id in &snippet.nodes[1..] {
                        entry.node_aliases.push((*node_id, next_alias));
                        next_alias += 1;
                    }
                }
            }
        }

        for node in nodes.iter().filter(|n| snippet.nodes.contains(&n.id)) {
            if let NodeKind::Graph { shards } = &node.kind {
                for shard in shards {
                    for server in shard_servers(shard) {
                        let entry = by_server.entry(server.clone()).or_insert_with(|| PerServerEngineInfo {
                            server: Some(server.clone()),
                            ..Default::default()
                        });
                        if !entry.traverser_shards.contains(shard) {
                            entry.traverser_shards.push(shard.clone());
                        }
                    }
                }
            }
        }
    }

    by_server
}

/// Sort order for the locking section: exclusive before write before
/// read (spec §4.8.2).
pub fn sort_locks(locks: &mut [(String, AccessMode)]) {
    locks.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
}

/// One DB-server's setup response (spec §4.8.3).
#[derive(Debug, Clone)]
pub struct SetupResponse {
    pub server: ServerId,
    pub global_query_id: String,
    pub reboot_id: u64,
    /// `(remoteNodeId, shardId) -> queryId`.
    pub per_shard_query_ids: HashMap<(NodeId, ShardId), String>,
}

/// Boundary the real builder talks to a DB-server through; tests use
/// an in-memory double.
#[async_trait]
pub trait DbServerTransport: Send + Sync {
    async fn setup(&self, server: &ServerId, info: &PerServerEngineInfo, deadline: Duration)
        -> Result<SetupResponse, String>;
    async fn shutdown(&self, server: &ServerId, global_query_id: &str);
}

/// Drives setup fan-out across every server holding relevant shards,
/// in parallel with a deadline (spec §4.8.3). On any failure, shuts
/// down every server that already returned a query id and arms a
/// reboot-tracker callback per registered server so a mid-query reboot
/// triggers a full shutdown (spec §4.8.4). The setup calls themselves
/// run concurrently via `futures::future::join_all`, the way the
/// teacher's connection-pool warmup fans out health probes.
pub async fn setup_fan_out(
    transport: &dyn DbServerTransport,
    per_server: &HashMap<ServerId, PerServerEngineInfo>,
    deadline: Duration,
    reboot_tracker: &Arc<RebootTracker>,
    on_reboot: impl Fn(ServerId) + Send + Sync + Clone + 'static,
) -> Result<HashMap<ServerId, SetupResponse>, String> {
    let calls = per_server.iter().map(|(server, info)| async move {
        let result = transport.setup(server, info, deadline).await;
        (server.clone(), result)
    });
    let outcomes = futures::future::join_all(calls).await;

    let mut responses = HashMap::new();
    let mut failed = None;
    for (server, result) in outcomes {
        match result {
            Ok(resp) => {
                let cb = on_reboot.clone();
                let server_for_cb = server.clone();
                // Leaked: this call doesn't own the query's lifetime,
                // so the guard can't be dropped here without
                // immediately deregistering the callback it just armed.
                std::mem::forget(reboot_tracker.call_me_on_change(
                    PeerState::new(server.clone(), resp.reboot_id),
                    move || cb(server_for_cb),
                    "engine-info liveness",
                ));
                responses.insert(server, resp);
            }
            Err(err) if failed.is_none() => failed = Some(err),
            Err(_) => {}
        }
    }

    if let Some(err) = failed {
        let shutdowns = responses
            .iter()
            .map(|(server, resp)| transport.shutdown(server, &resp.global_query_id));
        futures::future::join_all(shutdowns).await;
        return Err(err);
    }

    Ok(responses)
}
