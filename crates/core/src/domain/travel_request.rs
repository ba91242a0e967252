use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::AuditEntry;
use crate::domain::identity::{Actor, IdentityId};
use crate::domain::trip::TripDetails;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TravelRequestId(pub String);

impl TravelRequestId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for TravelRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Display identifier, `TR-<year>-<day of year, 4 digits><sequence, 3 digits>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HumanId(pub String);

impl HumanId {
    /// Highest per-day sequence that still fits the three-digit suffix.
    pub const MAX_DAILY_SEQUENCE: u32 = 999;

    pub fn format(year: i32, day_of_year: u32, sequence: u32) -> Result<Self, DomainError> {
        if !(1..=Self::MAX_DAILY_SEQUENCE).contains(&sequence) {
            return Err(DomainError::InvariantViolation(format!(
                "request sequence {sequence} for day {day_of_year} of {year} does not fit a \
                 human id; at most {} requests can be numbered per day",
                Self::MAX_DAILY_SEQUENCE
            )));
        }
        Ok(Self(format!("TR-{year}-{day_of_year:04}{sequence:03}")))
    }
}

impl fmt::Display for HumanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    ManagerApproved,
    Approved,
    Rejected,
    PocRejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::ManagerApproved => "manager_approved",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::PocRejected => "poc_rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "manager_approved" => Some(Self::ManagerApproved),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "poc_rejected" => Some(Self::PocRejected),
            _ => None,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected | Self::PocRejected)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub file_name: String,
    /// Reference into the external document store.
    pub storage_ref: String,
    #[serde(default)]
    pub content_type: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorMessage {
    pub vendor_id: IdentityId,
    pub vendor_name: String,
    pub message: String,
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender_id: IdentityId,
    pub sender_name: String,
    pub recipient_id: IdentityId,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Per-stage markers. Every timestamp is written by the transition that reaches the stage
/// and never overwritten afterwards.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTimestamps {
    pub manager_approved_at: Option<DateTime<Utc>>,
    pub manager_approved_by: Option<IdentityId>,
    pub manager_rejected_at: Option<DateTime<Utc>>,
    pub manager_bypassed: bool,
    pub poc_edited_at: Option<DateTime<Utc>>,
    pub poc_approved_at: Option<DateTime<Utc>>,
    pub poc_approved_by: Option<IdentityId>,
    pub poc_rejected_at: Option<DateTime<Utc>>,
    pub poc_rejection_reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TravelRequest {
    pub id: TravelRequestId,
    pub human_id: HumanId,
    pub status: RequestStatus,
    pub originator: Actor,
    pub created_by: Actor,
    pub trip_details: TripDetails,
    pub stages: StageTimestamps,
    pub audit_trail: Vec<AuditEntry>,
    pub vendor_messages: Vec<VendorMessage>,
    pub chat_messages: Vec<ChatMessage>,
    /// Optimistic concurrency token; bumped by the repository on every committed write.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TravelRequest {
    pub fn is_originator(&self, identity: &IdentityId) -> bool {
        &self.originator.id == identity
    }

    /// The vendor holding the conversation with the originator. Once a vendor has spoken in
    /// the chat it keeps the thread; before that the first vendor to respond holds it.
    pub fn thread_vendor(&self) -> Option<(&IdentityId, &str)> {
        self.chat_messages
            .iter()
            .find(|message| message.sender_id != self.originator.id)
            .map(|message| (&message.sender_id, message.sender_name.as_str()))
            .or_else(|| {
                self.vendor_messages
                    .first()
                    .map(|message| (&message.vendor_id, message.vendor_name.as_str()))
            })
    }
}
