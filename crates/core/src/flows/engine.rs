use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audit::{messages, AuditEntry};
use crate::domain::identity::{Actor, IdentityId};
use crate::domain::travel_request::{
    Attachment, ChatMessage, HumanId, RequestStatus, StageTimestamps, TravelRequest,
    TravelRequestId, VendorMessage,
};
use crate::domain::trip::{TripDetails, TripDetailsPatch};
use crate::errors::DomainError;
use crate::flows::states::{
    ActionKind, NotificationIntent, Recipient, TransitionOutcome, TransitionRule, WorkflowAction,
    TRANSITION_TABLE,
};
use crate::notifications::NotificationCategory;
use crate::roles::{ActorRole, Capability};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("cannot {action} a travel request in status {}", .state.as_str())]
    InvalidTransition { state: RequestStatus, action: ActionKind },
    #[error("`{actor}` is not a participant in this conversation")]
    NotParticipant { actor: String },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowPolicy {
    /// Tell the originator's manager when a POC raises a request that skips their approval.
    pub notify_manager_on_bypass: bool,
}

/// Input for both creation paths. The id and human id are allocated by the caller.
#[derive(Clone, Debug, PartialEq)]
pub struct NewRequest {
    pub id: TravelRequestId,
    pub human_id: HumanId,
    pub originator: Actor,
    pub trip_details: TripDetails,
}

/// The approval state machine. Every method is a pure function of its inputs: capability
/// checks against the directory and persistence happen around it, never inside.
#[derive(Clone, Debug, Default)]
pub struct ApprovalFlow {
    policy: WorkflowPolicy,
}

impl ApprovalFlow {
    pub fn new(policy: WorkflowPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> WorkflowPolicy {
        self.policy
    }

    pub fn rule_for(
        &self,
        state: RequestStatus,
        action: ActionKind,
    ) -> Result<&'static TransitionRule, TransitionError> {
        TRANSITION_TABLE
            .iter()
            .find(|rule| rule.from == state && rule.action == action)
            .ok_or(TransitionError::InvalidTransition { state, action })
    }

    pub fn open(
        &self,
        new: NewRequest,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, DomainError> {
        new.trip_details.validate()?;
        let originator_id = new.originator.id.clone();
        let request = assemble(new, None, RequestStatus::Pending, StageTimestamps::default(), now);

        let notifications = vec![intent(
            Recipient::ManagerOf(originator_id),
            NotificationCategory::ManagerApprovalRequired,
            &request,
            format!("{} requests approval for a trip", request.originator.display_name),
        )];

        Ok(TransitionOutcome { from: None, request, audit_entry: None, notifications })
    }

    /// A POC raises a request for an employee. The manager stage is recorded as bypassed and
    /// the request starts in `ManagerApproved`.
    pub fn open_on_behalf(
        &self,
        new: NewRequest,
        poc: &Actor,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, DomainError> {
        new.trip_details.validate()?;
        if new.originator.id == poc.id {
            return Err(DomainError::Validation(
                "a request raised on behalf of someone must name a different originator"
                    .to_owned(),
            ));
        }

        let stages = StageTimestamps {
            manager_approved_at: Some(now),
            manager_bypassed: true,
            ..StageTimestamps::default()
        };
        let originator_id = new.originator.id.clone();
        let mut request =
            assemble(new, Some(poc.clone()), RequestStatus::ManagerApproved, stages, now);

        let entry = AuditEntry::new(
            poc,
            messages::raised_on_behalf(
                &poc.display_name,
                poc.id.as_str(),
                &request.originator.display_name,
            ),
            now,
        );
        request.audit_trail.push(entry.clone());

        let mut notifications = vec![intent(
            Recipient::Identity(originator_id.clone()),
            NotificationCategory::RaisedOnBehalf,
            &request,
            format!("{} raised a travel request on your behalf", poc.display_name),
        )];
        if self.policy.notify_manager_on_bypass {
            notifications.push(intent(
                Recipient::ManagerOf(originator_id),
                NotificationCategory::RaisedOnBehalf,
                &request,
                format!(
                    "{} raised a travel request for {} without manager approval",
                    poc.display_name, request.originator.display_name
                ),
            ));
        }

        Ok(TransitionOutcome { from: None, request, audit_entry: Some(entry), notifications })
    }

    /// Applies `action` taken by `actor`, who the caller has verified holds `acting_as` for
    /// this request.
    pub fn apply(
        &self,
        current: &TravelRequest,
        actor: &Actor,
        acting_as: ActorRole,
        action: &WorkflowAction,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, DomainError> {
        let rule = self.rule_for(current.status, action.kind())?;
        if !rule.roles.contains(&acting_as) {
            return Err(DomainError::InvariantViolation(format!(
                "{acting_as} cannot {}",
                rule.action
            )));
        }

        let mut request = current.clone();
        request.status = rule.to;
        request.updated_at = now;
        let name = actor.display_name.as_str();

        let (message, notifications) = match action {
            WorkflowAction::ManagerApprove => {
                request.stages.manager_approved_at = Some(now);
                request.stages.manager_approved_by = Some(actor.id.clone());
                let notifications = vec![intent(
                    Recipient::Pool(Capability::Poc),
                    NotificationCategory::PocReviewRequired,
                    &request,
                    format!("Approved by manager {name}; ready for travel desk review"),
                )];
                (Some(messages::manager_approved(name)), notifications)
            }
            WorkflowAction::ManagerReject => {
                request.stages.manager_rejected_at = Some(now);
                let notifications = vec![intent(
                    Recipient::Identity(request.originator.id.clone()),
                    NotificationCategory::RequestRejected,
                    &request,
                    format!("Rejected by your manager {name}"),
                )];
                (Some(messages::manager_rejected(name)), notifications)
            }
            WorkflowAction::PocEdit { patch } => {
                let fields = edit_trip(&mut request, patch, now)?;
                (Some(messages::poc_edited(name, &fields)), Vec::new())
            }
            WorkflowAction::PocApprove => {
                request.stages.poc_approved_at = Some(now);
                request.stages.poc_approved_by = Some(actor.id.clone());
                let notifications = vec![
                    intent(
                        Recipient::Pool(Capability::Vendor),
                        NotificationCategory::VendorQuoteRequired,
                        &request,
                        format!(
                            "{} to {} on {}",
                            request.trip_details.origin,
                            request.trip_details.destination,
                            request.trip_details.departure_date
                        ),
                    ),
                    intent(
                        Recipient::Identity(request.originator.id.clone()),
                        NotificationCategory::RequestApproved,
                        &request,
                        format!("Approved by POC {name}; vendors have been asked for options"),
                    ),
                ];
                (Some(messages::poc_approved(name)), notifications)
            }
            WorkflowAction::PocReject { reason } => {
                let reason = require_text("reason", reason)?;
                request.stages.poc_rejected_at = Some(now);
                request.stages.poc_rejection_reason = Some(reason.to_owned());
                let notifications = vec![intent(
                    Recipient::Identity(request.originator.id.clone()),
                    NotificationCategory::RequestRejected,
                    &request,
                    format!("Rejected by POC {name}: {reason}"),
                )];
                (Some(messages::poc_rejected(name, reason)), notifications)
            }
            WorkflowAction::VendorRespond { message, attachments } => {
                let message = require_text("message", message)?;
                validate_attachments(attachments)?;
                request.vendor_messages.push(VendorMessage {
                    vendor_id: actor.id.clone(),
                    vendor_name: actor.display_name.clone(),
                    message: message.to_owned(),
                    attachments: attachments.clone(),
                    created_at: now,
                });
                let body = format!("Vendor {name} responded to the request");
                let notifications = vec![
                    intent(
                        Recipient::Identity(request.originator.id.clone()),
                        NotificationCategory::VendorResponded,
                        &request,
                        body.clone(),
                    ),
                    intent(
                        Recipient::ManagerOf(request.originator.id.clone()),
                        NotificationCategory::VendorResponded,
                        &request,
                        body,
                    ),
                ];
                (Some(messages::vendor_responded(name, attachments.len())), notifications)
            }
            WorkflowAction::SendChatMessage { message } => {
                let message = require_text("message", message)?;
                let recipient = chat_counterpart(current, actor, acting_as)?;
                request.chat_messages.push(ChatMessage {
                    sender_id: actor.id.clone(),
                    sender_name: actor.display_name.clone(),
                    recipient_id: recipient.clone(),
                    message: message.to_owned(),
                    created_at: now,
                });
                let notifications = vec![intent(
                    Recipient::Identity(recipient),
                    NotificationCategory::ChatMessage,
                    &request,
                    format!("New message from {name}"),
                )];
                (None, notifications)
            }
        };

        let audit_entry = message.map(|message| AuditEntry::new(actor, message, now));
        if let Some(entry) = &audit_entry {
            request.audit_trail.push(entry.clone());
        }

        Ok(TransitionOutcome { from: Some(current.status), request, audit_entry, notifications })
    }
}

fn assemble(
    new: NewRequest,
    created_by: Option<Actor>,
    status: RequestStatus,
    stages: StageTimestamps,
    now: DateTime<Utc>,
) -> TravelRequest {
    TravelRequest {
        id: new.id,
        human_id: new.human_id,
        status,
        created_by: created_by.unwrap_or_else(|| new.originator.clone()),
        originator: new.originator,
        trip_details: new.trip_details,
        stages,
        audit_trail: Vec::new(),
        vendor_messages: Vec::new(),
        chat_messages: Vec::new(),
        version: 1,
        created_at: now,
        updated_at: now,
    }
}

fn edit_trip(
    request: &mut TravelRequest,
    patch: &TripDetailsPatch,
    now: DateTime<Utc>,
) -> Result<Vec<&'static str>, DomainError> {
    let (details, fields) = patch.apply_to(&request.trip_details)?;
    request.trip_details = details;
    if request.stages.poc_edited_at.is_none() {
        request.stages.poc_edited_at = Some(now);
    }
    Ok(fields)
}

/// The originator talks to the vendor holding the thread; a vendor talks to the originator.
/// Only one vendor may hold the thread.
fn chat_counterpart(
    request: &TravelRequest,
    actor: &Actor,
    acting_as: ActorRole,
) -> Result<IdentityId, DomainError> {
    let thread_vendor = request.thread_vendor().map(|(vendor, _)| vendor.clone());
    match acting_as {
        ActorRole::Originator => thread_vendor.ok_or_else(|| {
            DomainError::Transition(TransitionError::InvalidTransition {
                state: request.status,
                action: ActionKind::SendChatMessage,
            })
        }),
        _ => match thread_vendor {
            Some(vendor) if vendor != actor.id => {
                Err(TransitionError::NotParticipant { actor: actor.id.to_string() }.into())
            }
            _ => Ok(request.originator.id.clone()),
        },
    }
}

fn require_text<'a>(field: &str, value: &'a str) -> Result<&'a str, DomainError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::Validation(format!("{field} is required")));
    }
    Ok(trimmed)
}

fn validate_attachments(attachments: &[Attachment]) -> Result<(), DomainError> {
    for (index, attachment) in attachments.iter().enumerate() {
        if attachment.file_name.trim().is_empty() || attachment.storage_ref.trim().is_empty() {
            return Err(DomainError::Validation(format!(
                "attachments[{index}] needs a file name and a storage reference"
            )));
        }
    }
    Ok(())
}

fn intent(
    recipient: Recipient,
    category: NotificationCategory,
    request: &TravelRequest,
    body: String,
) -> NotificationIntent {
    NotificationIntent {
        recipient,
        category,
        title: format!("{} {}", request.human_id, category.headline()),
        body,
    }
}
