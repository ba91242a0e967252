//! Both repository implementations must honour the same storage contract; the workflow
//! service is tested against the in-memory one and deployed against SQLite.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use tripflow_core::domain::{
    Actor, HumanId, IdentityId, RequestStatus, TravelRequest, TravelRequestId, TripDetails,
};
use tripflow_core::{ActorRole, ApprovalFlow, NewRequest, WorkflowAction};
use tripflow_db::{
    connect_with_settings, migrations, InMemoryTravelRequestRepository, RepositoryError,
    SqlTravelRequestRepository, TravelRequestRepository,
};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).single().expect("valid timestamp")
}

fn employee() -> Actor {
    Actor::new("esha.employee@tripflow.dev", "Esha Employee")
}

fn manager() -> Actor {
    Actor::new("meera.manager@tripflow.dev", "Meera Manager")
}

fn opened(sequence: u32) -> TravelRequest {
    ApprovalFlow::default()
        .open(
            NewRequest {
                id: TravelRequestId::generate(),
                human_id: HumanId::format(2025, 60, sequence).expect("human id"),
                originator: employee(),
                trip_details: TripDetails::one_way(
                    "Mumbai",
                    "Goa",
                    NaiveDate::from_ymd_opt(2025, 3, 14).expect("date"),
                    "Quarterly offsite",
                ),
            },
            now(),
        )
        .expect("open request")
        .request
}

async fn sql_repository() -> SqlTravelRequestRepository {
    let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    SqlTravelRequestRepository::new(pool)
}

async fn approval_is_compare_and_swap(repository: &dyn TravelRequestRepository) {
    let request = opened(1);
    repository.insert(&request).await.expect("insert");

    let loaded = repository
        .find_by_human_id(&request.human_id)
        .await
        .expect("lookup")
        .expect("request stored");
    assert_eq!(loaded.id, request.id);

    let outcome = ApprovalFlow::default()
        .apply(&loaded, &manager(), ActorRole::Manager, &WorkflowAction::ManagerApprove, now())
        .expect("approve");
    let stored = repository.update(outcome.request.clone(), loaded.version).await.expect("update");
    assert_eq!(stored.version, loaded.version + 1);
    assert_eq!(stored.status, RequestStatus::ManagerApproved);

    let stale = repository.update(outcome.request, loaded.version).await;
    assert!(matches!(stale, Err(RepositoryError::VersionConflict { .. })));

    let trail = repository.audit_trail(&request.id).await.expect("trail");
    assert_eq!(trail, stored.audit_trail);
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].sender_id, manager().id);
}

async fn history_cannot_shrink(repository: &dyn TravelRequestRepository) {
    let request = opened(2);
    repository.insert(&request).await.expect("insert");
    let outcome = ApprovalFlow::default()
        .apply(&request, &manager(), ActorRole::Manager, &WorkflowAction::ManagerApprove, now())
        .expect("approve");
    let mut stored = repository.update(outcome.request, request.version).await.expect("update");

    let version = stored.version;
    stored.audit_trail.clear();
    let rewrite = repository.update(stored, version).await;
    assert!(matches!(rewrite, Err(RepositoryError::HistoryRewrite(_))));

    let reloaded =
        repository.find_by_id(&request.id).await.expect("lookup").expect("request stored");
    assert_eq!(reloaded.version, version);
    assert_eq!(reloaded.audit_trail.len(), 1);
}

async fn sequences_and_listings(repository: &dyn TravelRequestRepository) {
    assert_eq!(repository.next_human_sequence(2025, 60).await.expect("seq"), 1);
    assert_eq!(repository.next_human_sequence(2025, 60).await.expect("seq"), 2);
    assert_eq!(repository.next_human_sequence(2025, 61).await.expect("seq"), 1);

    let pending = opened(3);
    repository.insert(&pending).await.expect("insert");

    let listed = repository.list_by_status(RequestStatus::Pending).await.expect("list");
    assert!(listed.iter().any(|request| request.id == pending.id));

    let mine = repository.list_for_originators(&[employee().id]).await.expect("mine");
    assert!(mine.iter().any(|request| request.id == pending.id));
    let nobody = repository
        .list_for_originators(&[IdentityId::new("nobody@tripflow.dev")])
        .await
        .expect("nobody");
    assert!(nobody.is_empty());
    assert!(repository.list_for_originators(&[]).await.expect("empty").is_empty());
}

#[tokio::test]
async fn sqlite_repository_honours_the_contract() {
    approval_is_compare_and_swap(&sql_repository().await).await;
    history_cannot_shrink(&sql_repository().await).await;
    sequences_and_listings(&sql_repository().await).await;
}

#[tokio::test]
async fn in_memory_repository_honours_the_contract() {
    approval_is_compare_and_swap(&InMemoryTravelRequestRepository::default()).await;
    history_cannot_shrink(&InMemoryTravelRequestRepository::default()).await;
    sequences_and_listings(&InMemoryTravelRequestRepository::default()).await;
}
