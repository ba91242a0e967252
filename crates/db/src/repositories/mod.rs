use async_trait::async_trait;
use thiserror::Error;

use tripflow_core::domain::{HumanId, IdentityId, RequestStatus, TravelRequest, TravelRequestId};
use tripflow_core::AuditEntry;

pub mod directory;
pub mod memory;
pub mod travel_request;

pub use directory::SqlRoleResolver;
pub use memory::InMemoryTravelRequestRepository;
pub use travel_request::SqlTravelRequestRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("travel request `{0}` was not found")]
    NotFound(String),
    #[error("travel request `{request_id}` is no longer at version {expected_version}")]
    VersionConflict { request_id: String, expected_version: u64 },
    #[error("travel request `{0}` already exists")]
    Duplicate(String),
    #[error("append-only history of travel request `{0}` would be rewritten")]
    HistoryRewrite(String),
}

/// Storage for the travel request aggregate.
///
/// Audit entries, vendor messages and chat messages are append-only: `update` persists the
/// entries beyond what is already stored and refuses a request that would drop any of them.
#[async_trait]
pub trait TravelRequestRepository: Send + Sync {
    async fn insert(&self, request: &TravelRequest) -> Result<(), RepositoryError>;

    async fn find_by_id(
        &self,
        id: &TravelRequestId,
    ) -> Result<Option<TravelRequest>, RepositoryError>;

    async fn find_by_human_id(
        &self,
        human_id: &HumanId,
    ) -> Result<Option<TravelRequest>, RepositoryError>;

    /// Compare-and-swap on `version`. Returns the stored request with its new version.
    async fn update(
        &self,
        request: TravelRequest,
        expected_version: u64,
    ) -> Result<TravelRequest, RepositoryError>;

    /// Atomically increments and returns the daily counter behind human ids.
    async fn next_human_sequence(&self, year: i32, day_of_year: u32)
        -> Result<u32, RepositoryError>;

    async fn list_by_status(
        &self,
        status: RequestStatus,
    ) -> Result<Vec<TravelRequest>, RepositoryError>;

    async fn list_for_originators(
        &self,
        originators: &[IdentityId],
    ) -> Result<Vec<TravelRequest>, RepositoryError>;

    async fn audit_trail(&self, id: &TravelRequestId) -> Result<Vec<AuditEntry>, RepositoryError>;
}
