use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::identity::{Actor, IdentityId};

/// Account-level capabilities granted administratively.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Poc,
    Vendor,
    Admin,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Poc => "poc",
            Self::Vendor => "vendor",
            Self::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "poc" => Some(Self::Poc),
            "vendor" => Some(Self::Vendor),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// Who may act on a request. `Originator` and `Manager` are relative to the request's
/// originator; the rest map onto account capabilities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Originator,
    Manager,
    Poc,
    Vendor,
    Admin,
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Originator => "originator",
            Self::Manager => "manager of the originator",
            Self::Poc => "POC",
            Self::Vendor => "vendor",
            Self::Admin => "admin",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

/// Read-only view of the employee directory and account records.
///
/// Implementations must answer from current directory state on every call; callers rely on
/// revocations taking effect for the very next transition.
#[async_trait]
pub trait RoleResolver: Send + Sync {
    async fn is_manager_of(
        &self,
        identity: &IdentityId,
        employee: &IdentityId,
    ) -> Result<bool, DirectoryError>;

    async fn has_capability(
        &self,
        identity: &IdentityId,
        capability: Capability,
    ) -> Result<bool, DirectoryError>;

    async fn lookup(&self, identity: &IdentityId) -> Result<Option<Actor>, DirectoryError>;

    async fn manager_of(&self, employee: &IdentityId) -> Result<Option<Actor>, DirectoryError>;

    async fn holders_of(&self, capability: Capability) -> Result<Vec<Actor>, DirectoryError>;
}

pub async fn holds_role<R>(
    resolver: &R,
    actor: &IdentityId,
    role: ActorRole,
    originator: &IdentityId,
) -> Result<bool, DirectoryError>
where
    R: RoleResolver + ?Sized,
{
    match role {
        ActorRole::Originator => Ok(actor == originator),
        ActorRole::Manager => resolver.is_manager_of(actor, originator).await,
        ActorRole::Poc => resolver.has_capability(actor, Capability::Poc).await,
        ActorRole::Vendor => resolver.has_capability(actor, Capability::Vendor).await,
        ActorRole::Admin => resolver.has_capability(actor, Capability::Admin).await,
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub identity: IdentityId,
    pub display_name: String,
    pub manager: Option<IdentityId>,
    pub capabilities: BTreeSet<Capability>,
    pub active: bool,
}

impl DirectoryEntry {
    pub fn employee(identity: impl AsRef<str>, display_name: impl Into<String>) -> Self {
        Self {
            identity: IdentityId::new(identity),
            display_name: display_name.into(),
            manager: None,
            capabilities: BTreeSet::new(),
            active: true,
        }
    }

    pub fn reporting_to(mut self, manager: impl AsRef<str>) -> Self {
        self.manager = Some(IdentityId::new(manager));
        self
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    fn actor(&self) -> Actor {
        Actor { id: self.identity.clone(), display_name: self.display_name.clone() }
    }
}

#[derive(Default)]
pub struct InMemoryDirectory {
    entries: RwLock<HashMap<IdentityId, DirectoryEntry>>,
}

impl InMemoryDirectory {
    pub fn with_entries(entries: impl IntoIterator<Item = DirectoryEntry>) -> Self {
        let directory = Self::default();
        for entry in entries {
            directory.upsert(entry);
        }
        directory
    }

    pub fn upsert(&self, entry: DirectoryEntry) {
        let mut entries = match self.entries.write() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.insert(entry.identity.clone(), entry);
    }

    pub fn grant(&self, identity: &IdentityId, capability: Capability) {
        self.modify(identity, |entry| {
            entry.capabilities.insert(capability);
        });
    }

    pub fn revoke(&self, identity: &IdentityId, capability: Capability) {
        self.modify(identity, |entry| {
            entry.capabilities.remove(&capability);
        });
    }

    pub fn deactivate(&self, identity: &IdentityId) {
        self.modify(identity, |entry| entry.active = false);
    }

    fn modify(&self, identity: &IdentityId, change: impl FnOnce(&mut DirectoryEntry)) {
        let mut entries = match self.entries.write() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(entry) = entries.get_mut(identity) {
            change(entry);
        }
    }

    fn active_entry(&self, identity: &IdentityId) -> Option<DirectoryEntry> {
        let entries = match self.entries.read() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.get(identity).filter(|entry| entry.active).cloned()
    }
}

#[async_trait]
impl RoleResolver for InMemoryDirectory {
    async fn is_manager_of(
        &self,
        identity: &IdentityId,
        employee: &IdentityId,
    ) -> Result<bool, DirectoryError> {
        if self.active_entry(identity).is_none() {
            return Ok(false);
        }
        Ok(self
            .active_entry(employee)
            .and_then(|entry| entry.manager)
            .is_some_and(|manager| &manager == identity))
    }

    async fn has_capability(
        &self,
        identity: &IdentityId,
        capability: Capability,
    ) -> Result<bool, DirectoryError> {
        Ok(self
            .active_entry(identity)
            .is_some_and(|entry| entry.capabilities.contains(&capability)))
    }

    async fn lookup(&self, identity: &IdentityId) -> Result<Option<Actor>, DirectoryError> {
        Ok(self.active_entry(identity).map(|entry| entry.actor()))
    }

    async fn manager_of(&self, employee: &IdentityId) -> Result<Option<Actor>, DirectoryError> {
        let Some(manager) = self.active_entry(employee).and_then(|entry| entry.manager) else {
            return Ok(None);
        };
        Ok(self.active_entry(&manager).map(|entry| entry.actor()))
    }

    async fn holders_of(&self, capability: Capability) -> Result<Vec<Actor>, DirectoryError> {
        let entries = match self.entries.read() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut holders: Vec<Actor> = entries
            .values()
            .filter(|entry| entry.active && entry.capabilities.contains(&capability))
            .map(DirectoryEntry::actor)
            .collect();
        holders.sort_by(|left, right| left.id.cmp(&right.id));
        Ok(holders)
    }
}
