//! Application layer for travel requests: the transition contract around the approval state
//! machine, plus the read models each actor works from.

mod routing;
pub mod service;

pub use service::{Clock, TravelWorkflowService};
