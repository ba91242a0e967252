//! Append-only audit trail entries and the wording of every workflow event.
//!
//! Entries are embedded in the travel request and persisted in the same write as the state
//! change they describe. Nothing in the workflow edits or removes an entry once appended.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::identity::{Actor, IdentityId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub sender_id: IdentityId,
    pub sender_name: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(sender: &Actor, message: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            sender_id: sender.id.clone(),
            sender_name: sender.display_name.clone(),
            message: message.into(),
            created_at,
        }
    }

    pub fn system(message: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self::new(&Actor::system(), message, created_at)
    }

    pub fn is_system(&self) -> bool {
        self.sender_id.is_system()
    }
}

pub mod messages {
    pub fn manager_approved(manager: &str) -> String {
        format!("Request approved by manager {manager} and forwarded to the travel desk.")
    }

    pub fn manager_rejected(manager: &str) -> String {
        format!("Request rejected by manager {manager}.")
    }

    pub fn raised_on_behalf(poc: &str, poc_id: &str, originator: &str) -> String {
        format!(
            "Request raised by POC {poc} ({poc_id}) on behalf of {originator}. \
             Manager approval stage bypassed; request starts as manager approved."
        )
    }

    pub fn poc_edited(poc: &str, fields: &[&str]) -> String {
        format!("Trip details edited by POC {poc}: {}.", fields.join(", "))
    }

    pub fn poc_approved(poc: &str) -> String {
        format!("Request approved by POC {poc} and released to travel vendors.")
    }

    pub fn poc_rejected(poc: &str, reason: &str) -> String {
        format!("Request rejected by POC {poc}. Reason: {reason}")
    }

    pub fn vendor_responded(vendor: &str, attachments: usize) -> String {
        match attachments {
            0 => format!("Vendor {vendor} responded."),
            1 => format!("Vendor {vendor} responded with 1 attachment."),
            n => format!("Vendor {vendor} responded with {n} attachments."),
        }
    }
}
