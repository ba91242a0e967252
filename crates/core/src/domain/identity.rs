use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity reserved for entries written by the workflow itself.
pub const SYSTEM_IDENTITY: &str = "system";

/// Directory identity of a person (their corporate email address).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdentityId(pub String);

impl IdentityId {
    /// Identities compare case-insensitively, so they are stored trimmed and lowercased.
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(value.as_ref().trim().to_ascii_lowercase())
    }

    pub fn system() -> Self {
        Self(SYSTEM_IDENTITY.to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_system(&self) -> bool {
        self.0 == SYSTEM_IDENTITY
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: IdentityId,
    pub display_name: String,
}

impl Actor {
    pub fn new(id: impl AsRef<str>, display_name: impl Into<String>) -> Self {
        Self { id: IdentityId::new(id), display_name: display_name.into() }
    }

    pub fn system() -> Self {
        Self { id: IdentityId::system(), display_name: "System".to_owned() }
    }
}

#[cfg(test)]
mod tests {
    use super::{Actor, IdentityId};

    #[test]
    fn identities_are_normalized() {
        assert_eq!(IdentityId::new("  E@Corp.com "), IdentityId("e@corp.com".to_owned()));
        assert_eq!(Actor::new("Mgr@Corp.com", "Meera").id.as_str(), "mgr@corp.com");
    }

    #[test]
    fn system_identity_is_reserved() {
        assert!(Actor::system().id.is_system());
        assert!(!IdentityId::new("e@corp.com").is_system());
    }
}
