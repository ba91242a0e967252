use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use tracing::{info, warn};

use tripflow_core::domain::{
    Actor, Attachment, ChatMessage, HumanId, IdentityId, RequestStatus, TravelRequest,
    TravelRequestId, TripDetails, TripDetailsPatch,
};
use tripflow_core::{
    holds_role, ActorRole, ApplicationError, ApprovalFlow, AuditEntry, Capability,
    DirectoryError, DomainError, NewRequest, NotificationDispatcher, RoleResolver,
    TransitionOutcome, WorkflowAction, WorkflowPolicy, CREATE_ON_BEHALF_ROLE,
};
use tripflow_db::{RepositoryError, TravelRequestRepository};

use crate::routing::NotificationRouter;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Entry point for every actor-facing operation on travel requests.
///
/// Each transition loads the request, checks the state precondition, checks the actor's
/// capability against the directory, applies the pure transition and persists it with a
/// version check. Notifications are routed in the background only after the write has
/// committed. Actor display names always come from the directory, never from the caller.
#[derive(Clone)]
pub struct TravelWorkflowService {
    repository: Arc<dyn TravelRequestRepository>,
    directory: Arc<dyn RoleResolver>,
    router: NotificationRouter,
    flow: ApprovalFlow,
    clock: Clock,
}

impl TravelWorkflowService {
    pub fn new(
        repository: Arc<dyn TravelRequestRepository>,
        directory: Arc<dyn RoleResolver>,
        dispatcher: NotificationDispatcher,
        policy: WorkflowPolicy,
    ) -> Self {
        let router = NotificationRouter::spawn(directory.clone(), dispatcher);
        Self {
            repository,
            directory,
            router,
            flow: ApprovalFlow::new(policy),
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Waits until every notification produced by transitions that have already returned
    /// has been routed and handed to the sink.
    pub async fn flush_notifications(&self) {
        self.router.flush().await;
    }

    pub async fn create_request(
        &self,
        originator: &Actor,
        trip_details: TripDetails,
    ) -> Result<TravelRequest, ApplicationError> {
        let now = self.now();
        let originator = self.identify(originator).await?;
        trip_details.validate()?;
        let new = self.allocate(originator.clone(), trip_details, now).await?;
        let outcome = self.flow.open(new, now)?;
        self.insert(outcome, "travel_request.created", &originator, now).await
    }

    pub async fn create_on_behalf(
        &self,
        poc: &Actor,
        originator: &IdentityId,
        trip_details: TripDetails,
    ) -> Result<TravelRequest, ApplicationError> {
        let now = self.now();
        let poc = self.identify(poc).await?;
        let directory = self.directory.as_ref();
        let allowed = holds_role(directory, &poc.id, CREATE_ON_BEHALF_ROLE, originator)
            .await
            .map_err(directory_error)?;
        if !allowed {
            return Err(forbidden(&poc, &[CREATE_ON_BEHALF_ROLE]));
        }

        trip_details.validate()?;
        let employee =
            self.directory.lookup(originator).await.map_err(directory_error)?.ok_or_else(|| {
                ApplicationError::Domain(DomainError::Validation(format!(
                    "`{originator}` is not an active employee"
                )))
            })?;

        let new = self.allocate(employee, trip_details, now).await?;
        let outcome = self.flow.open_on_behalf(new, &poc, now)?;
        self.insert(outcome, "travel_request.raised_on_behalf", &poc, now).await
    }

    pub async fn manager_approve(
        &self,
        request_id: &TravelRequestId,
        actor: &Actor,
    ) -> Result<TravelRequest, ApplicationError> {
        self.transition(request_id, actor, WorkflowAction::ManagerApprove).await
    }

    pub async fn manager_reject(
        &self,
        request_id: &TravelRequestId,
        actor: &Actor,
    ) -> Result<TravelRequest, ApplicationError> {
        self.transition(request_id, actor, WorkflowAction::ManagerReject).await
    }

    pub async fn poc_edit(
        &self,
        request_id: &TravelRequestId,
        actor: &Actor,
        patch: TripDetailsPatch,
    ) -> Result<TravelRequest, ApplicationError> {
        self.transition(request_id, actor, WorkflowAction::PocEdit { patch }).await
    }

    pub async fn poc_approve(
        &self,
        request_id: &TravelRequestId,
        actor: &Actor,
    ) -> Result<TravelRequest, ApplicationError> {
        self.transition(request_id, actor, WorkflowAction::PocApprove).await
    }

    pub async fn poc_reject(
        &self,
        request_id: &TravelRequestId,
        actor: &Actor,
        reason: impl Into<String>,
    ) -> Result<TravelRequest, ApplicationError> {
        self.transition(request_id, actor, WorkflowAction::PocReject { reason: reason.into() })
            .await
    }

    pub async fn vendor_respond(
        &self,
        request_id: &TravelRequestId,
        actor: &Actor,
        message: impl Into<String>,
        attachments: Vec<Attachment>,
    ) -> Result<TravelRequest, ApplicationError> {
        let action = WorkflowAction::VendorRespond { message: message.into(), attachments };
        self.transition(request_id, actor, action).await
    }

    pub async fn send_chat_message(
        &self,
        request_id: &TravelRequestId,
        actor: &Actor,
        message: impl Into<String>,
    ) -> Result<TravelRequest, ApplicationError> {
        let action = WorkflowAction::SendChatMessage { message: message.into() };
        self.transition(request_id, actor, action).await
    }

    /// Runs any action from the transition table. The named methods above are thin wrappers.
    pub async fn transition(
        &self,
        request_id: &TravelRequestId,
        caller: &Actor,
        action: WorkflowAction,
    ) -> Result<TravelRequest, ApplicationError> {
        let current = self.load(request_id).await?;
        let rule = self.flow.rule_for(current.status, action.kind())?;
        let actor = self.identify(caller).await?;

        let mut acting_as = None;
        for role in rule.roles {
            let held =
                holds_role(self.directory.as_ref(), &actor.id, *role, &current.originator.id)
                    .await
                    .map_err(directory_error)?;
            if held {
                acting_as = Some(*role);
                break;
            }
        }
        let Some(acting_as) = acting_as else {
            warn!(
                event_name = "travel_request.forbidden",
                request_id = %current.id,
                human_id = %current.human_id,
                action = action.kind().as_str(),
                actor = %actor.id,
                "actor lacks the capability for this transition"
            );
            return Err(forbidden(&actor, rule.roles));
        };

        let now = self.now();
        let outcome = self.flow.apply(&current, &actor, acting_as, &action, now)?;
        let TransitionOutcome { from, request, notifications, .. } = outcome;
        let stored = self
            .repository
            .update(request, current.version)
            .await
            .map_err(repository_error)?;

        info!(
            event_name = "travel_request.transitioned",
            request_id = %stored.id,
            human_id = %stored.human_id,
            action = action.kind().as_str(),
            from = from.map(|status| status.as_str()).unwrap_or("none"),
            to = stored.status.as_str(),
            actor = %actor.id,
            acting_as = %acting_as,
            version = stored.version,
            "travel request transitioned"
        );

        self.router.submit(&stored, notifications, now);
        Ok(stored)
    }

    pub async fn get_request(
        &self,
        request_id: &TravelRequestId,
    ) -> Result<TravelRequest, ApplicationError> {
        self.load(request_id).await
    }

    pub async fn find_by_human_id(
        &self,
        human_id: &HumanId,
    ) -> Result<TravelRequest, ApplicationError> {
        self.repository
            .find_by_human_id(human_id)
            .await
            .map_err(repository_error)?
            .ok_or_else(|| ApplicationError::NotFound(human_id.to_string()))
    }

    pub async fn get_audit_trail(
        &self,
        request_id: &TravelRequestId,
    ) -> Result<Vec<AuditEntry>, ApplicationError> {
        self.repository.audit_trail(request_id).await.map_err(repository_error)
    }

    /// The conversation is visible to the originator and to the vendor holding the thread.
    pub async fn get_chat_messages(
        &self,
        request_id: &TravelRequestId,
        viewer: &IdentityId,
    ) -> Result<Vec<ChatMessage>, ApplicationError> {
        let request = self.load(request_id).await?;
        let on_thread = request.thread_vendor().is_some_and(|(vendor, _)| vendor == viewer);
        if !request.is_originator(viewer) && !on_thread {
            return Err(ApplicationError::Forbidden(format!(
                "`{viewer}` is not a participant in this conversation"
            )));
        }
        Ok(request.chat_messages)
    }

    /// Pending requests raised by the manager's direct reports, checked against the directory
    /// as it stands now.
    pub async fn pending_for_manager(
        &self,
        manager: &IdentityId,
    ) -> Result<Vec<TravelRequest>, ApplicationError> {
        let pending =
            self.repository.list_by_status(RequestStatus::Pending).await.map_err(repository_error)?;

        let mut mine = Vec::new();
        for request in pending {
            let reports = self
                .directory
                .is_manager_of(manager, &request.originator.id)
                .await
                .map_err(directory_error)?;
            if reports {
                mine.push(request);
            }
        }
        Ok(mine)
    }

    pub async fn queue_for_poc(
        &self,
        actor: &IdentityId,
    ) -> Result<Vec<TravelRequest>, ApplicationError> {
        self.require_capability(actor, Capability::Poc).await?;
        self.repository
            .list_by_status(RequestStatus::ManagerApproved)
            .await
            .map_err(repository_error)
    }

    pub async fn queue_for_vendor(
        &self,
        actor: &IdentityId,
    ) -> Result<Vec<TravelRequest>, ApplicationError> {
        self.require_capability(actor, Capability::Vendor).await?;
        self.repository.list_by_status(RequestStatus::Approved).await.map_err(repository_error)
    }

    pub async fn my_requests(
        &self,
        originator: &IdentityId,
    ) -> Result<Vec<TravelRequest>, ApplicationError> {
        self.repository
            .list_for_originators(std::slice::from_ref(originator))
            .await
            .map_err(repository_error)
    }

    async fn require_capability(
        &self,
        actor: &IdentityId,
        capability: Capability,
    ) -> Result<(), ApplicationError> {
        let held =
            self.directory.has_capability(actor, capability).await.map_err(directory_error)?;
        if held {
            Ok(())
        } else {
            Err(ApplicationError::Forbidden(format!(
                "`{actor}` does not hold the {} capability",
                capability.as_str()
            )))
        }
    }

    /// Replaces the caller-supplied actor with the directory's record. Unknown and
    /// deactivated identities may not act at all.
    async fn identify(&self, actor: &Actor) -> Result<Actor, ApplicationError> {
        let known = self.directory.lookup(&actor.id).await.map_err(directory_error)?;
        known.ok_or_else(|| {
            warn!(
                event_name = "travel_request.unknown_actor",
                actor = %actor.id,
                "actor is not an active directory identity"
            );
            ApplicationError::Forbidden(format!(
                "`{}` is not an active directory identity",
                actor.id
            ))
        })
    }

    async fn load(&self, request_id: &TravelRequestId) -> Result<TravelRequest, ApplicationError> {
        self.repository
            .find_by_id(request_id)
            .await
            .map_err(repository_error)?
            .ok_or_else(|| ApplicationError::NotFound(request_id.to_string()))
    }

    async fn allocate(
        &self,
        originator: Actor,
        trip_details: TripDetails,
        now: DateTime<Utc>,
    ) -> Result<NewRequest, ApplicationError> {
        let sequence = self
            .repository
            .next_human_sequence(now.year(), now.ordinal())
            .await
            .map_err(repository_error)?;
        Ok(NewRequest {
            id: TravelRequestId::generate(),
            human_id: HumanId::format(now.year(), now.ordinal(), sequence)?,
            originator,
            trip_details,
        })
    }

    async fn insert(
        &self,
        outcome: TransitionOutcome,
        event_name: &'static str,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<TravelRequest, ApplicationError> {
        let TransitionOutcome { request, notifications, .. } = outcome;
        self.repository.insert(&request).await.map_err(repository_error)?;

        info!(
            event_name,
            request_id = %request.id,
            human_id = %request.human_id,
            status = request.status.as_str(),
            originator = %request.originator.id,
            actor = %actor.id,
            "travel request created"
        );

        self.router.submit(&request, notifications, now);
        Ok(request)
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}

fn forbidden(actor: &Actor, roles: &[ActorRole]) -> ApplicationError {
    let required = roles.iter().map(ToString::to_string).collect::<Vec<_>>().join(" or ");
    ApplicationError::Forbidden(format!("`{}` must act as {required}", actor.id))
}

pub(crate) fn repository_error(error: RepositoryError) -> ApplicationError {
    match error {
        RepositoryError::VersionConflict { request_id, expected_version } => {
            ApplicationError::Conflict { request_id, expected_version }
        }
        RepositoryError::NotFound(id) => ApplicationError::NotFound(id),
        other => ApplicationError::Persistence(other.to_string()),
    }
}

pub(crate) fn directory_error(error: DirectoryError) -> ApplicationError {
    ApplicationError::Directory(error.to_string())
}
