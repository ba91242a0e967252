pub mod engine;
pub mod states;

pub use engine::{ApprovalFlow, NewRequest, TransitionError, WorkflowPolicy};
pub use states::{
    ActionKind, NotificationIntent, Recipient, TransitionOutcome, TransitionRule, WorkflowAction,
    CREATE_ON_BEHALF_ROLE, TRANSITION_TABLE,
};
