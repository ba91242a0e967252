pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod notifications;
pub mod roles;

pub use audit::AuditEntry;
pub use domain::{
    Actor, Attachment, ChatMessage, HumanId, IdentityId, RequestStatus, StageTimestamps,
    TravelClass, TravelMode, TravelRequest, TravelRequestId, TripDetails, TripDetailsPatch,
    TripLeg, TripType, VendorMessage,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{
    ActionKind, ApprovalFlow, NewRequest, NotificationIntent, Recipient, TransitionError,
    TransitionOutcome, TransitionRule, WorkflowAction, WorkflowPolicy, CREATE_ON_BEHALF_ROLE,
    TRANSITION_TABLE,
};
pub use notifications::{
    InMemoryNotificationSink, Notification, NotificationCategory, NotificationDispatcher,
    NotificationError, NotificationSink, TracingNotificationSink,
};
pub use roles::{
    holds_role, ActorRole, Capability, DirectoryEntry, DirectoryError, InMemoryDirectory,
    RoleResolver,
};
