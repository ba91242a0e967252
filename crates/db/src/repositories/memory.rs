use std::collections::HashMap;

use tokio::sync::RwLock;

use tripflow_core::domain::{HumanId, IdentityId, RequestStatus, TravelRequest, TravelRequestId};
use tripflow_core::AuditEntry;

use super::{RepositoryError, TravelRequestRepository};

#[derive(Default)]
pub struct InMemoryTravelRequestRepository {
    requests: RwLock<HashMap<String, TravelRequest>>,
    sequences: RwLock<HashMap<(i32, u32), u32>>,
}

impl InMemoryTravelRequestRepository {
    async fn sorted(&self, keep: impl Fn(&TravelRequest) -> bool) -> Vec<TravelRequest> {
        let requests = self.requests.read().await;
        let mut matching: Vec<TravelRequest> =
            requests.values().filter(|request| keep(request)).cloned().collect();
        matching.sort_by(|left, right| {
            left.created_at
                .cmp(&right.created_at)
                .then_with(|| left.human_id.0.cmp(&right.human_id.0))
        });
        matching
    }
}

/// True when `next` keeps every element of `stored` in place and only adds to the end.
pub(crate) fn extends<T: PartialEq>(stored: &[T], next: &[T]) -> bool {
    next.len() >= stored.len() && next[..stored.len()] == *stored
}

#[async_trait::async_trait]
impl TravelRequestRepository for InMemoryTravelRequestRepository {
    async fn insert(&self, request: &TravelRequest) -> Result<(), RepositoryError> {
        let mut requests = self.requests.write().await;
        let clash = requests.contains_key(&request.id.0)
            || requests.values().any(|existing| existing.human_id == request.human_id);
        if clash {
            return Err(RepositoryError::Duplicate(request.id.0.clone()));
        }
        requests.insert(request.id.0.clone(), request.clone());
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &TravelRequestId,
    ) -> Result<Option<TravelRequest>, RepositoryError> {
        let requests = self.requests.read().await;
        Ok(requests.get(&id.0).cloned())
    }

    async fn find_by_human_id(
        &self,
        human_id: &HumanId,
    ) -> Result<Option<TravelRequest>, RepositoryError> {
        let requests = self.requests.read().await;
        Ok(requests.values().find(|request| &request.human_id == human_id).cloned())
    }

    async fn update(
        &self,
        mut request: TravelRequest,
        expected_version: u64,
    ) -> Result<TravelRequest, RepositoryError> {
        let mut requests = self.requests.write().await;
        let stored = requests
            .get(&request.id.0)
            .ok_or_else(|| RepositoryError::NotFound(request.id.0.clone()))?;

        if stored.version != expected_version {
            return Err(RepositoryError::VersionConflict {
                request_id: request.id.0.clone(),
                expected_version,
            });
        }
        let append_only = extends(&stored.audit_trail, &request.audit_trail)
            && extends(&stored.vendor_messages, &request.vendor_messages)
            && extends(&stored.chat_messages, &request.chat_messages);
        if !append_only {
            return Err(RepositoryError::HistoryRewrite(request.id.0.clone()));
        }

        request.version = expected_version + 1;
        requests.insert(request.id.0.clone(), request.clone());
        Ok(request)
    }

    async fn next_human_sequence(
        &self,
        year: i32,
        day_of_year: u32,
    ) -> Result<u32, RepositoryError> {
        let mut sequences = self.sequences.write().await;
        let value = sequences.entry((year, day_of_year)).or_insert(0);
        *value += 1;
        Ok(*value)
    }

    async fn list_by_status(
        &self,
        status: RequestStatus,
    ) -> Result<Vec<TravelRequest>, RepositoryError> {
        Ok(self.sorted(|request| request.status == status).await)
    }

    async fn list_for_originators(
        &self,
        originators: &[IdentityId],
    ) -> Result<Vec<TravelRequest>, RepositoryError> {
        Ok(self.sorted(|request| originators.contains(&request.originator.id)).await)
    }

    async fn audit_trail(&self, id: &TravelRequestId) -> Result<Vec<AuditEntry>, RepositoryError> {
        let requests = self.requests.read().await;
        requests
            .get(&id.0)
            .map(|request| request.audit_trail.clone())
            .ok_or_else(|| RepositoryError::NotFound(id.0.clone()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use tripflow_core::domain::{
        Actor, HumanId, IdentityId, RequestStatus, StageTimestamps, TravelRequest,
        TravelRequestId, TripDetails,
    };
    use tripflow_core::AuditEntry;

    use crate::repositories::{
        InMemoryTravelRequestRepository, RepositoryError, TravelRequestRepository,
    };

    fn request(id: &str, sequence: u32) -> TravelRequest {
        let created_at = Utc
            .with_ymd_and_hms(2025, 3, 1, 9, 0, sequence)
            .single()
            .expect("valid timestamp");
        let originator = Actor::new("e@corp.com", "Esha");
        TravelRequest {
            id: TravelRequestId(id.to_owned()),
            human_id: HumanId::format(2025, 60, sequence).expect("human id"),
            status: RequestStatus::Pending,
            originator: originator.clone(),
            created_by: originator,
            trip_details: TripDetails::one_way(
                "Mumbai",
                "Goa",
                NaiveDate::from_ymd_opt(2025, 3, 10).expect("date"),
                "Offsite",
            ),
            stages: StageTimestamps::default(),
            audit_trail: Vec::new(),
            vendor_messages: Vec::new(),
            chat_messages: Vec::new(),
            version: 1,
            created_at,
            updated_at: created_at,
        }
    }

    #[tokio::test]
    async fn update_bumps_version_and_rejects_stale_writes() {
        let repo = InMemoryTravelRequestRepository::default();
        let original = request("r1", 1);
        repo.insert(&original).await.expect("insert");

        let mut approved = original.clone();
        approved.status = RequestStatus::ManagerApproved;
        approved.audit_trail.push(AuditEntry::new(
            &Actor::new("mgr@corp.com", "Meera"),
            "approved",
            Utc::now(),
        ));
        let stored = repo.update(approved, 1).await.expect("first write wins");
        assert_eq!(stored.version, 2);

        let mut rejected = original.clone();
        rejected.status = RequestStatus::Rejected;
        let error = repo.update(rejected, 1).await.expect_err("stale write");
        assert!(matches!(error, RepositoryError::VersionConflict { expected_version: 1, .. }));

        let current = repo.find_by_id(&original.id).await.expect("find").expect("exists");
        assert_eq!(current.status, RequestStatus::ManagerApproved);
        assert_eq!(repo.audit_trail(&original.id).await.expect("trail").len(), 1);
    }

    #[tokio::test]
    async fn history_cannot_shrink() {
        let repo = InMemoryTravelRequestRepository::default();
        let mut original = request("r1", 1);
        original.audit_trail.push(AuditEntry::system("imported", Utc::now()));
        repo.insert(&original).await.expect("insert");

        let mut truncated = original.clone();
        truncated.audit_trail.clear();
        let error = repo.update(truncated, 1).await.expect_err("history rewrite");
        assert!(matches!(error, RepositoryError::HistoryRewrite(_)));
    }

    #[tokio::test]
    async fn unknown_request_update_is_not_found() {
        let repo = InMemoryTravelRequestRepository::default();
        let error = repo.update(request("ghost", 1), 1).await.expect_err("missing");
        assert!(matches!(error, RepositoryError::NotFound(ref id) if id == "ghost"));
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let repo = InMemoryTravelRequestRepository::default();
        repo.insert(&request("r1", 1)).await.expect("insert");
        let error = repo.insert(&request("r2", 1)).await.expect_err("same human id");
        assert!(matches!(error, RepositoryError::Duplicate(_)));
    }

    #[tokio::test]
    async fn sequences_are_per_day() {
        let repo = InMemoryTravelRequestRepository::default();
        assert_eq!(repo.next_human_sequence(2025, 60).await.expect("seq"), 1);
        assert_eq!(repo.next_human_sequence(2025, 60).await.expect("seq"), 2);
        assert_eq!(repo.next_human_sequence(2025, 61).await.expect("seq"), 1);
    }

    #[tokio::test]
    async fn listings_are_ordered_by_creation() {
        let repo = InMemoryTravelRequestRepository::default();
        repo.insert(&request("r2", 2)).await.expect("insert");
        repo.insert(&request("r1", 1)).await.expect("insert");
        let mut other = request("r3", 3);
        other.originator = Actor::new("x@corp.com", "Xavier");
        repo.insert(&other).await.expect("insert");

        let pending = repo.list_by_status(RequestStatus::Pending).await.expect("list");
        let ids: Vec<&str> = pending.iter().map(|request| request.id.0.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r2", "r3"]);

        let esha = repo
            .list_for_originators(&[IdentityId::new("e@corp.com")])
            .await
            .expect("list");
        assert_eq!(esha.len(), 2);
        assert!(repo
            .find_by_human_id(&HumanId::format(2025, 60, 3).expect("human id"))
            .await
            .expect("find")
            .is_some());
    }
}
