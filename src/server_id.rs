use serde::{Deserialize, Serialize};
use std::fmt;

/// Role encoded in a server id's prefix (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServerRole {
    DbServer,
    Coordinator,
    Agent,
}

impl ServerRole {
    fn prefix(self) -> &'static str {
        match self {
            ServerRole::DbServer => "PRMR-",
            ServerRole::Coordinator => "CRDN-",
            ServerRole::Agent => "AGNT-",
        }
    }
}

/// A cluster server id, e.g. `PRMR-3fa1…`. Opaque beyond its role
/// prefix; the core never parses the UUID portion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(String);

impl ServerId {
    pub fn new(role: ServerRole, uuid: &str) -> Self {
        ServerId(format!("{}{}", role.prefix(), uuid))
    }

    pub fn from_raw(raw: impl Into<String>) -> Self {
        ServerId(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn role(&self) -> Option<ServerRole> {
        if self.0.starts_with("PRMR-") {
            Some(ServerRole::DbServer)
        } else if self.0.starts_with("CRDN-") {
            Some(ServerRole::Coordinator)
        } else if self.0.starts_with("AGNT-") {
            Some(ServerRole::Agent)
        } else {
            None
        }
    }

    pub fn is_db_server(&self) -> bool {
        matches!(self.role(), Some(ServerRole::DbServer))
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServerId {
    fn from(s: &str) -> Self {
        ServerId(s.to_string())
    }
}

impl From<String> for ServerId {
    fn from(s: String) -> Self {
        ServerId(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_from_prefix() {
        let a = ServerId::from("PRMR-abc");
        assert_eq!(a.role(), Some(ServerRole::DbServer));
        assert!(a.is_db_server());

        let c = ServerId::from("CRDN-abc");
        assert_eq!(c.role(), Some(ServerRole::Coordinator));
        assert!(!c.is_db_server());

        let g = ServerId::from("AGNT-abc");
        assert_eq!(g.role(), Some(ServerRole::Agent));
    }

    #[test]
    fn unrecognized_prefix_has_no_role() {
        let u = ServerId::from("bogus-abc");
        assert_eq!(u.role(), None);
        assert!(!u.is_db_server());
    }

    #[test]
    fn new_applies_prefix() {
        let s = ServerId::new(ServerRole::DbServer, "0001");
        assert_eq!(s.as_str(), "PRMR-0001");
    }
}
