use std::fmt;

use serde::{Deserialize, Serialize};

use crate::audit::AuditEntry;
use crate::domain::identity::IdentityId;
use crate::domain::travel_request::{Attachment, RequestStatus, TravelRequest};
use crate::domain::trip::TripDetailsPatch;
use crate::notifications::NotificationCategory;
use crate::roles::{ActorRole, Capability};

/// An action taken against an existing travel request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum WorkflowAction {
    ManagerApprove,
    ManagerReject,
    PocEdit { patch: TripDetailsPatch },
    PocApprove,
    PocReject { reason: String },
    VendorRespond { message: String, attachments: Vec<Attachment> },
    SendChatMessage { message: String },
}

impl WorkflowAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::ManagerApprove => ActionKind::ManagerApprove,
            Self::ManagerReject => ActionKind::ManagerReject,
            Self::PocEdit { .. } => ActionKind::PocEdit,
            Self::PocApprove => ActionKind::PocApprove,
            Self::PocReject { .. } => ActionKind::PocReject,
            Self::VendorRespond { .. } => ActionKind::VendorRespond,
            Self::SendChatMessage { .. } => ActionKind::SendChatMessage,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    CreateOnBehalf,
    ManagerApprove,
    ManagerReject,
    PocEdit,
    PocApprove,
    PocReject,
    VendorRespond,
    SendChatMessage,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateOnBehalf => "create_on_behalf",
            Self::ManagerApprove => "manager_approve",
            Self::ManagerReject => "manager_reject",
            Self::PocEdit => "poc_edit",
            Self::PocApprove => "poc_approve",
            Self::PocReject => "poc_reject",
            Self::VendorRespond => "vendor_respond",
            Self::SendChatMessage => "send_chat_message",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One edge of the approval graph. `roles` lists every role allowed to take the edge; an actor
/// needs to hold only one of them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionRule {
    pub from: RequestStatus,
    pub action: ActionKind,
    pub roles: &'static [ActorRole],
    pub to: RequestStatus,
}

pub const TRANSITION_TABLE: &[TransitionRule] = &[
    TransitionRule {
        from: RequestStatus::Pending,
        action: ActionKind::ManagerApprove,
        roles: &[ActorRole::Manager],
        to: RequestStatus::ManagerApproved,
    },
    TransitionRule {
        from: RequestStatus::Pending,
        action: ActionKind::ManagerReject,
        roles: &[ActorRole::Manager],
        to: RequestStatus::Rejected,
    },
    TransitionRule {
        from: RequestStatus::ManagerApproved,
        action: ActionKind::PocEdit,
        roles: &[ActorRole::Poc],
        to: RequestStatus::ManagerApproved,
    },
    TransitionRule {
        from: RequestStatus::ManagerApproved,
        action: ActionKind::PocApprove,
        roles: &[ActorRole::Poc],
        to: RequestStatus::Approved,
    },
    TransitionRule {
        from: RequestStatus::ManagerApproved,
        action: ActionKind::PocReject,
        roles: &[ActorRole::Poc],
        to: RequestStatus::PocRejected,
    },
    TransitionRule {
        from: RequestStatus::Approved,
        action: ActionKind::VendorRespond,
        roles: &[ActorRole::Vendor],
        to: RequestStatus::Approved,
    },
    TransitionRule {
        from: RequestStatus::Approved,
        action: ActionKind::SendChatMessage,
        roles: &[ActorRole::Originator, ActorRole::Vendor],
        to: RequestStatus::Approved,
    },
];

/// Creation on behalf of an employee is not an edge between two stored states, so its
/// capability lives outside the table.
pub const CREATE_ON_BEHALF_ROLE: ActorRole = ActorRole::Poc;

/// Who a notification goes to, before the directory turns it into concrete identities.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Recipient {
    Identity(IdentityId),
    ManagerOf(IdentityId),
    Pool(Capability),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationIntent {
    pub recipient: Recipient,
    pub category: NotificationCategory,
    pub title: String,
    pub body: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TransitionOutcome {
    pub from: Option<RequestStatus>,
    pub request: TravelRequest,
    /// Chat messages and plain creation leave the trail untouched.
    pub audit_entry: Option<AuditEntry>,
    pub notifications: Vec<NotificationIntent>,
}
