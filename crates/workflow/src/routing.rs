use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use tripflow_core::domain::TravelRequest;
use tripflow_core::{
    Notification, NotificationDispatcher, NotificationIntent, Recipient, RoleResolver,
};

enum Command {
    Route { request: TravelRequest, intents: Vec<NotificationIntent>, now: DateTime<Utc> },
    Flush(oneshot::Sender<()>),
}

/// Resolves notification intents against the directory on its own task and hands the
/// resulting notifications to the dispatcher.
///
/// Submitting never waits on the directory, so a slow lookup cannot hold up the transition
/// that produced the intents. Intents are routed in submission order.
#[derive(Clone)]
pub(crate) struct NotificationRouter {
    sender: mpsc::UnboundedSender<Command>,
    dispatcher: NotificationDispatcher,
}

impl NotificationRouter {
    pub(crate) fn spawn(
        directory: Arc<dyn RoleResolver>,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let worker_dispatcher = dispatcher.clone();

        tokio::spawn(async move {
            while let Some(command) = receiver.recv().await {
                match command {
                    Command::Route { request, intents, now } => {
                        route(directory.as_ref(), &worker_dispatcher, &request, intents, now)
                            .await;
                    }
                    Command::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
        });

        Self { sender, dispatcher }
    }

    pub(crate) fn submit(
        &self,
        request: &TravelRequest,
        intents: Vec<NotificationIntent>,
        now: DateTime<Utc>,
    ) {
        if intents.is_empty() {
            return;
        }
        let command = Command::Route { request: request.clone(), intents, now };
        if self.sender.send(command).is_err() {
            warn!(
                event_name = "notification.dropped",
                request_id = %request.id,
                human_id = %request.human_id,
                reason = "router_stopped",
                "notification router stopped; dropping intents"
            );
        }
    }

    /// Resolves once every intent submitted before the call has been routed and the
    /// resulting notifications have been attempted.
    pub(crate) async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.sender.send(Command::Flush(ack)).is_ok() {
            let _ = done.await;
        }
        self.dispatcher.flush().await;
    }
}

/// Directory failures and recipients that resolve to nobody are logged and skipped.
async fn route(
    directory: &dyn RoleResolver,
    dispatcher: &NotificationDispatcher,
    request: &TravelRequest,
    intents: Vec<NotificationIntent>,
    now: DateTime<Utc>,
) {
    for intent in intents {
        let recipients = match &intent.recipient {
            Recipient::Identity(identity) => Ok(vec![identity.clone()]),
            Recipient::ManagerOf(employee) => directory
                .manager_of(employee)
                .await
                .map(|manager| manager.into_iter().map(|actor| actor.id).collect()),
            Recipient::Pool(capability) => directory
                .holders_of(*capability)
                .await
                .map(|holders| holders.into_iter().map(|actor| actor.id).collect::<Vec<_>>()),
        };

        let recipients = match recipients {
            Ok(recipients) => recipients,
            Err(error) => {
                warn!(
                    event_name = "notification.routing_failed",
                    request_id = %request.id,
                    human_id = %request.human_id,
                    category = intent.category.as_str(),
                    error = %error,
                    "could not resolve notification recipients"
                );
                continue;
            }
        };

        if recipients.is_empty() {
            warn!(
                event_name = "notification.unrouted",
                request_id = %request.id,
                human_id = %request.human_id,
                category = intent.category.as_str(),
                "notification has no recipients"
            );
            continue;
        }

        for recipient in recipients {
            dispatcher.dispatch(Notification::new(
                recipient,
                intent.category,
                intent.title.clone(),
                intent.body.clone(),
                request,
                now,
            ));
        }
    }
}
