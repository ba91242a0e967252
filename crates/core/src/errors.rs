use thiserror::Error;

use crate::flows::TransitionError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(DomainError),
    #[error("travel request `{0}` was not found")]
    NotFound(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error(
        "travel request `{request_id}` was modified concurrently \
         (expected version {expected_version})"
    )]
    Conflict { request_id: String, expected_version: u64 },
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("directory failure: {0}")]
    Directory(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl From<DomainError> for ApplicationError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Transition(TransitionError::NotParticipant { actor }) => {
                Self::Forbidden(format!("`{actor}` is not a participant in this conversation"))
            }
            other => Self::Domain(other),
        }
    }
}

impl From<TransitionError> for ApplicationError {
    fn from(value: TransitionError) -> Self {
        Self::from(DomainError::from(value))
    }
}

impl ApplicationError {
    /// True when the caller should refetch the request and re-decide: the request is no
    /// longer in the state the action requires, or it changed underneath the caller.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::Domain(DomainError::Transition(TransitionError::InvalidTransition { .. }))
                | Self::Conflict { .. }
        )
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence(_) | Self::Directory(_))
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The travel request does not exist.",
            Self::Forbidden { .. } => "You are not allowed to perform this action.",
            Self::Conflict { .. } => {
                "The travel request has changed. Refresh it and decide again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn retryable(&self) -> bool {
        matches!(self, Self::ServiceUnavailable { .. })
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let unassigned = || "unassigned".to_owned();
        match value {
            ApplicationError::Domain(DomainError::Transition(error)) => {
                Self::Conflict { message: error.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::Domain(DomainError::Validation(message))
            | ApplicationError::Domain(DomainError::InvariantViolation(message)) => {
                Self::BadRequest { message, correlation_id: unassigned() }
            }
            ApplicationError::NotFound(id) => Self::NotFound {
                message: format!("travel request `{id}` was not found"),
                correlation_id: unassigned(),
            },
            ApplicationError::Forbidden(message) => {
                Self::Forbidden { message, correlation_id: unassigned() }
            }
            error @ ApplicationError::Conflict { .. } => {
                Self::Conflict { message: error.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::Persistence(message) | ApplicationError::Directory(message) => {
                Self::ServiceUnavailable { message, correlation_id: unassigned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: unassigned() }
            }
        }
    }
}
