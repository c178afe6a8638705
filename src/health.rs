//! Participant health view (spec §4.3 input), mirroring
//! `/arango/Supervision/Health` locally. The placement planner and
//! the supervision `check()` function only ever see this snapshot —
//! neither talks to `RebootTracker` or the agency directly.

use crate::server_id::ServerId;
use std::collections::HashMap;

/// Health flags for one participant as last observed under
/// `Supervision/Health/<serverId>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParticipantFlags {
    /// `true` unless Supervision has marked the server `FAILED`.
    pub not_is_failed: bool,
    pub reboot_id: u64,
}

/// Snapshot of every known participant's health, refreshed each
/// supervision tick from the agency's `Supervision/Health` subtree.
#[derive(Debug, Clone, Default)]
pub struct ParticipantsHealth {
    health: HashMap<ServerId, ParticipantFlags>,
}

impl ParticipantsHealth {
    pub fn new() -> Self {
        ParticipantsHealth::default()
    }

    pub fn from_map(health: HashMap<ServerId, ParticipantFlags>) -> Self {
        ParticipantsHealth { health }
    }

    pub fn update(&mut self, server: ServerId, flags: ParticipantFlags) {
        self.health.insert(server, flags);
    }

    pub fn remove(&mut self, server: &ServerId) {
        self.health.remove(server);
    }

    pub fn flags(&self, server: &ServerId) -> Option<ParticipantFlags> {
        self.health.get(server).copied()
    }

    pub fn is_healthy(&self, server: &ServerId) -> bool {
        self.health
            .get(server)
            .map(|f| f.not_is_failed)
            .unwrap_or(false)
    }

    pub fn reboot_id(&self, server: &ServerId) -> Option<u64> {
        self.health.get(server).map(|f| f.reboot_id)
    }

    /// Servers currently not marked `FAILED`, in arbitrary order — the
    /// candidate pool for shard placement (spec §4.3).
    pub fn healthy_participants(&self) -> Vec<ServerId> {
        self.health
            .iter()
            .filter(|(_, f)| f.not_is_failed)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.health.len()
    }

    pub fn is_empty(&self) -> bool {
        self.health.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(healthy: bool, reboot_id: u64) -> ParticipantFlags {
        ParticipantFlags {
            not_is_failed: healthy,
            reboot_id,
        }
    }

    #[test]
    fn healthy_participants_excludes_failed() {
        let mut health = ParticipantsHealth::new();
        health.update(ServerId::from("PRMR-a"), flags(true, 1));
        health.update(ServerId::from("PRMR-b"), flags(false, 1));
        let healthy = health.healthy_participants();
        assert_eq!(healthy, vec![ServerId::from("PRMR-a")]);
    }

    #[test]
    fn unknown_server_is_not_healthy() {
        let health = ParticipantsHealth::new();
        assert!(!health.is_healthy(&ServerId::from("PRMR-z")));
        assert_eq!(health.reboot_id(&ServerId::from("PRMR-z")), None);
    }

    #[test]
    fn remove_drops_participant() {
        let mut health = ParticipantsHealth::new();
        health.update(ServerId::from("PRMR-a"), flags(true, 1));
        health.remove(&ServerId::from("PRMR-a"));
        assert!(!health.is_healthy(&ServerId::from("PRMR-a")));
    }
}
