//! Fire-and-forget notification delivery.
//!
//! Transitions hand their notifications to a [`NotificationDispatcher`], which queues them on a
//! bounded channel drained by a background worker. Nothing on the workflow path ever waits on
//! or fails because of a sink.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::identity::IdentityId;
use crate::domain::travel_request::{HumanId, TravelRequest, TravelRequestId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    ManagerApprovalRequired,
    RaisedOnBehalf,
    PocReviewRequired,
    VendorQuoteRequired,
    RequestApproved,
    RequestRejected,
    VendorResponded,
    ChatMessage,
}

impl NotificationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ManagerApprovalRequired => "manager_approval_required",
            Self::RaisedOnBehalf => "raised_on_behalf",
            Self::PocReviewRequired => "poc_review_required",
            Self::VendorQuoteRequired => "vendor_quote_required",
            Self::RequestApproved => "request_approved",
            Self::RequestRejected => "request_rejected",
            Self::VendorResponded => "vendor_responded",
            Self::ChatMessage => "chat_message",
        }
    }

    pub fn headline(&self) -> &'static str {
        match self {
            Self::ManagerApprovalRequired => "awaits your approval",
            Self::RaisedOnBehalf => "was raised on your behalf",
            Self::PocReviewRequired => "awaits travel desk review",
            Self::VendorQuoteRequired => "is open for vendor quotes",
            Self::RequestApproved => "was approved",
            Self::RequestRejected => "was rejected",
            Self::VendorResponded => "has a vendor response",
            Self::ChatMessage => "has a new message",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub recipient: IdentityId,
    pub category: NotificationCategory,
    pub title: String,
    pub body: String,
    pub request_id: TravelRequestId,
    pub human_id: HumanId,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        recipient: IdentityId,
        category: NotificationCategory,
        title: impl Into<String>,
        body: impl Into<String>,
        request: &TravelRequest,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            recipient,
            category,
            title: title.into(),
            body: body.into(),
            request_id: request.id.clone(),
            human_id: request.human_id.clone(),
            created_at,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NotificationError {
    #[error("notification transport failed: {0}")]
    Transport(String),
    #[error("notification rejected by receiver: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotificationError>;
}

#[derive(Clone, Default)]
pub struct InMemoryNotificationSink {
    delivered: Arc<Mutex<Vec<Notification>>>,
}

impl InMemoryNotificationSink {
    pub fn delivered(&self) -> Vec<Notification> {
        match self.delivered.lock() {
            Ok(delivered) => delivered.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn delivered_to(&self, recipient: &IdentityId) -> Vec<Notification> {
        self.delivered().into_iter().filter(|n| &n.recipient == recipient).collect()
    }

    pub fn clear(&self) {
        match self.delivered.lock() {
            Ok(mut delivered) => delivered.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

#[async_trait]
impl NotificationSink for InMemoryNotificationSink {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotificationError> {
        match self.delivered.lock() {
            Ok(mut delivered) => delivered.push(notification.clone()),
            Err(poisoned) => poisoned.into_inner().push(notification.clone()),
        }
        Ok(())
    }
}

/// Logs notifications instead of sending them. Used when no transport is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotificationSink;

#[async_trait]
impl NotificationSink for TracingNotificationSink {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotificationError> {
        info!(
            event_name = "notification.delivered",
            notification_id = %notification.id,
            recipient = %notification.recipient,
            category = notification.category.as_str(),
            request_id = %notification.request_id,
            human_id = %notification.human_id,
            title = %notification.title,
            "notification logged"
        );
        Ok(())
    }
}

enum Command {
    Deliver(Notification),
    Flush(oneshot::Sender<()>),
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    sender: mpsc::Sender<Command>,
}

impl NotificationDispatcher {
    /// Starts the delivery worker on the current tokio runtime.
    pub fn spawn(sink: Arc<dyn NotificationSink>, capacity: usize) -> Self {
        let (sender, mut receiver) = mpsc::channel(capacity.max(1));

        tokio::spawn(async move {
            while let Some(command) = receiver.recv().await {
                match command {
                    Command::Deliver(notification) => {
                        if let Err(error) = sink.deliver(&notification).await {
                            warn!(
                                event_name = "notification.delivery_failed",
                                notification_id = %notification.id,
                                recipient = %notification.recipient,
                                human_id = %notification.human_id,
                                error = %error,
                                "notification delivery failed"
                            );
                        }
                    }
                    Command::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
        });

        Self { sender }
    }

    /// Enqueues without waiting. A full or closed queue drops the notification with a warning.
    pub fn dispatch(&self, notification: Notification) {
        let notification_id = notification.id.clone();
        match self.sender.try_send(Command::Deliver(notification)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => warn!(
                event_name = "notification.dropped",
                notification_id = %notification_id,
                reason = "queue_full",
                "notification queue is full; dropping notification"
            ),
            Err(mpsc::error::TrySendError::Closed(_)) => warn!(
                event_name = "notification.dropped",
                notification_id = %notification_id,
                reason = "queue_closed",
                "notification worker stopped; dropping notification"
            ),
        }
    }

    /// Resolves once every notification enqueued before the call has been attempted.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.sender.send(Command::Flush(ack)).await.is_ok() {
            let _ = done.await;
        }
    }
}
