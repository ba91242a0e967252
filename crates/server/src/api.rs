//! JSON routes over [`TravelWorkflowService`].
//!
//! Authentication happens upstream; the gateway forwards the caller as `x-actor-id`. Display
//! names are taken from the directory. An optional `x-correlation-id` is echoed in error
//! bodies.
//!
//! - `POST /api/v1/requests`                          raise a request for yourself
//! - `POST /api/v1/requests/on-behalf`                POC raises a request for an employee
//! - `GET  /api/v1/requests/mine`                     requests you raised
//! - `GET  /api/v1/requests/{id}`                     one request
//! - `GET  /api/v1/requests/{id}/audit`               ordered audit trail
//! - `GET  /api/v1/requests/{id}/chat`                vendor conversation (participants only)
//! - `POST /api/v1/requests/{id}/manager/approve`
//! - `POST /api/v1/requests/{id}/manager/reject`
//! - `POST /api/v1/requests/{id}/poc/edit`
//! - `POST /api/v1/requests/{id}/poc/approve`
//! - `POST /api/v1/requests/{id}/poc/reject`
//! - `POST /api/v1/requests/{id}/vendor/respond`
//! - `POST /api/v1/requests/{id}/chat`
//! - `GET  /api/v1/queues/manager|poc|vendor`         work queues per role

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use tripflow_core::domain::{
    Actor, Attachment, ChatMessage, IdentityId, TravelRequest, TravelRequestId, TripDetails,
    TripDetailsPatch,
};
use tripflow_core::{ApplicationError, AuditEntry, InterfaceError};
use tripflow_workflow::TravelWorkflowService;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct ApiState {
    service: TravelWorkflowService,
}

pub fn router(service: TravelWorkflowService) -> Router {
    Router::new()
        .route("/api/v1/requests", post(create_request))
        .route("/api/v1/requests/on-behalf", post(create_on_behalf))
        .route("/api/v1/requests/mine", get(my_requests))
        .route("/api/v1/requests/{id}", get(get_request))
        .route("/api/v1/requests/{id}/audit", get(get_audit_trail))
        .route("/api/v1/requests/{id}/chat", get(get_chat_messages).post(send_chat_message))
        .route("/api/v1/requests/{id}/manager/approve", post(manager_approve))
        .route("/api/v1/requests/{id}/manager/reject", post(manager_reject))
        .route("/api/v1/requests/{id}/poc/edit", post(poc_edit))
        .route("/api/v1/requests/{id}/poc/approve", post(poc_approve))
        .route("/api/v1/requests/{id}/poc/reject", post(poc_reject))
        .route("/api/v1/requests/{id}/vendor/respond", post(vendor_respond))
        .route("/api/v1/queues/manager", get(manager_queue))
        .route("/api/v1/queues/poc", get(poc_queue))
        .route("/api/v1/queues/vendor", get(vendor_queue))
        .with_state(ApiState { service })
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateRequestBody {
    pub trip_details: TripDetails,
}

#[derive(Debug, Deserialize)]
pub struct CreateOnBehalfBody {
    pub originator: String,
    pub trip_details: TripDetails,
}

#[derive(Debug, Deserialize)]
pub struct RejectBody {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct VendorResponseBody {
    pub message: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    pub detail: String,
    pub retryable: bool,
    pub correlation_id: String,
}

/// Failure of a route, already mapped to the interface taxonomy.
#[derive(Debug)]
pub struct ApiError(InterfaceError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, detail, correlation_id) = match &self.0 {
            InterfaceError::BadRequest { message, correlation_id } => {
                (StatusCode::BAD_REQUEST, "bad_request", message, correlation_id)
            }
            InterfaceError::NotFound { message, correlation_id } => {
                (StatusCode::NOT_FOUND, "not_found", message, correlation_id)
            }
            InterfaceError::Forbidden { message, correlation_id } => {
                (StatusCode::FORBIDDEN, "forbidden", message, correlation_id)
            }
            InterfaceError::Conflict { message, correlation_id } => {
                (StatusCode::CONFLICT, "conflict", message, correlation_id)
            }
            InterfaceError::ServiceUnavailable { message, correlation_id } => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", message, correlation_id)
            }
            InterfaceError::Internal { message, correlation_id } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", message, correlation_id)
            }
        };

        if status.is_server_error() {
            warn!(
                event_name = "api.request_failed",
                correlation_id = %correlation_id,
                error = %self.0,
                "request failed"
            );
        }

        let body = ErrorBody {
            error: kind,
            message: self.0.user_message().to_owned(),
            detail: detail.clone(),
            retryable: self.0.retryable(),
            correlation_id: correlation_id.clone(),
        };
        (status, Json(body)).into_response()
    }
}

struct Caller {
    actor: Actor,
    correlation_id: String,
}

impl Caller {
    fn fail(&self, error: ApplicationError) -> ApiError {
        ApiError(error.into_interface(self.correlation_id.clone()))
    }
}

fn correlation_id(headers: &HeaderMap) -> String {
    header(headers, CORRELATION_ID_HEADER).unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

fn caller(headers: &HeaderMap) -> Result<Caller, ApiError> {
    let correlation_id = correlation_id(headers);
    let Some(id) = header(headers, ACTOR_ID_HEADER) else {
        return Err(ApiError(InterfaceError::Forbidden {
            message: format!("missing `{ACTOR_ID_HEADER}` header"),
            correlation_id,
        }));
    };
    Ok(Caller { actor: Actor::new(id.clone(), id), correlation_id })
}

fn request_id(raw: String) -> TravelRequestId {
    TravelRequestId(raw)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn create_request(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<CreateRequestBody>,
) -> Result<(StatusCode, Json<TravelRequest>), ApiError> {
    let caller = caller(&headers)?;
    let request = state
        .service
        .create_request(&caller.actor, body.trip_details)
        .await
        .map_err(|error| caller.fail(error))?;
    Ok((StatusCode::CREATED, Json(request)))
}

async fn create_on_behalf(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<CreateOnBehalfBody>,
) -> Result<(StatusCode, Json<TravelRequest>), ApiError> {
    let caller = caller(&headers)?;
    let request = state
        .service
        .create_on_behalf(&caller.actor, &IdentityId::new(&body.originator), body.trip_details)
        .await
        .map_err(|error| caller.fail(error))?;
    Ok((StatusCode::CREATED, Json(request)))
}

async fn my_requests(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<Vec<TravelRequest>>, ApiError> {
    let caller = caller(&headers)?;
    let requests =
        state.service.my_requests(&caller.actor.id).await.map_err(|error| caller.fail(error))?;
    Ok(Json(requests))
}

async fn get_request(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<TravelRequest>, ApiError> {
    let caller = caller(&headers)?;
    let request =
        state.service.get_request(&request_id(id)).await.map_err(|error| caller.fail(error))?;
    Ok(Json(request))
}

async fn get_audit_trail(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Vec<AuditEntry>>, ApiError> {
    let caller = caller(&headers)?;
    let trail =
        state.service.get_audit_trail(&request_id(id)).await.map_err(|error| caller.fail(error))?;
    Ok(Json(trail))
}

async fn get_chat_messages(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    let caller = caller(&headers)?;
    let messages = state
        .service
        .get_chat_messages(&request_id(id), &caller.actor.id)
        .await
        .map_err(|error| caller.fail(error))?;
    Ok(Json(messages))
}

async fn send_chat_message(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<ChatBody>,
) -> Result<Json<TravelRequest>, ApiError> {
    let caller = caller(&headers)?;
    let request = state
        .service
        .send_chat_message(&request_id(id), &caller.actor, body.message)
        .await
        .map_err(|error| caller.fail(error))?;
    Ok(Json(request))
}

async fn manager_approve(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<TravelRequest>, ApiError> {
    let caller = caller(&headers)?;
    let request = state
        .service
        .manager_approve(&request_id(id), &caller.actor)
        .await
        .map_err(|error| caller.fail(error))?;
    Ok(Json(request))
}

async fn manager_reject(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<TravelRequest>, ApiError> {
    let caller = caller(&headers)?;
    let request = state
        .service
        .manager_reject(&request_id(id), &caller.actor)
        .await
        .map_err(|error| caller.fail(error))?;
    Ok(Json(request))
}

async fn poc_edit(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(patch): Json<TripDetailsPatch>,
) -> Result<Json<TravelRequest>, ApiError> {
    let caller = caller(&headers)?;
    let request = state
        .service
        .poc_edit(&request_id(id), &caller.actor, patch)
        .await
        .map_err(|error| caller.fail(error))?;
    Ok(Json(request))
}

async fn poc_approve(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<TravelRequest>, ApiError> {
    let caller = caller(&headers)?;
    let request = state
        .service
        .poc_approve(&request_id(id), &caller.actor)
        .await
        .map_err(|error| caller.fail(error))?;
    Ok(Json(request))
}

async fn poc_reject(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<RejectBody>,
) -> Result<Json<TravelRequest>, ApiError> {
    let caller = caller(&headers)?;
    let request = state
        .service
        .poc_reject(&request_id(id), &caller.actor, body.reason)
        .await
        .map_err(|error| caller.fail(error))?;
    Ok(Json(request))
}

async fn vendor_respond(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<VendorResponseBody>,
) -> Result<Json<TravelRequest>, ApiError> {
    let caller = caller(&headers)?;
    let request = state
        .service
        .vendor_respond(&request_id(id), &caller.actor, body.message, body.attachments)
        .await
        .map_err(|error| caller.fail(error))?;
    Ok(Json(request))
}

async fn manager_queue(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<Vec<TravelRequest>>, ApiError> {
    let caller = caller(&headers)?;
    let requests = state
        .service
        .pending_for_manager(&caller.actor.id)
        .await
        .map_err(|error| caller.fail(error))?;
    Ok(Json(requests))
}

async fn poc_queue(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<Vec<TravelRequest>>, ApiError> {
    let caller = caller(&headers)?;
    let requests =
        state.service.queue_for_poc(&caller.actor.id).await.map_err(|error| caller.fail(error))?;
    Ok(Json(requests))
}

async fn vendor_queue(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<Vec<TravelRequest>>, ApiError> {
    let caller = caller(&headers)?;
    let requests = state
        .service
        .queue_for_vendor(&caller.actor.id)
        .await
        .map_err(|error| caller.fail(error))?;
    Ok(Json(requests))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request, StatusCode},
        Router,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use tripflow_core::{
        Capability, DirectoryEntry, InMemoryDirectory, InMemoryNotificationSink,
        NotificationDispatcher, WorkflowPolicy,
    };
    use tripflow_db::InMemoryTravelRequestRepository;
    use tripflow_workflow::TravelWorkflowService;

    use super::router;

    fn app() -> Router {
        let directory = InMemoryDirectory::with_entries([
            DirectoryEntry::employee("mgr@corp.com", "Meera"),
            DirectoryEntry::employee("e@corp.com", "Esha").reporting_to("mgr@corp.com"),
            DirectoryEntry::employee("poc@corp.com", "Priya").with_capability(Capability::Poc),
        ]);
        let dispatcher =
            NotificationDispatcher::spawn(Arc::new(InMemoryNotificationSink::default()), 16);
        let service = TravelWorkflowService::new(
            Arc::new(InMemoryTravelRequestRepository::default()),
            Arc::new(directory),
            dispatcher,
            WorkflowPolicy::default(),
        );
        router(service)
    }

    async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        actor: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(actor) = actor {
            builder = builder.header("x-actor-id", actor).header("x-correlation-id", "corr-1");
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        };

        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, value)
    }

    fn trip() -> Value {
        json!({
            "trip_details": {
                "trip_type": "one_way",
                "origin": "Mumbai",
                "destination": "Goa",
                "departure_date": "2025-03-01",
                "mode": "flight",
                "travel_class": "economy",
                "purpose": "Client workshop"
            }
        })
    }

    #[tokio::test]
    async fn create_and_approve_over_http() {
        let app = app();

        let (status, created) =
            call(&app, Method::POST, "/api/v1/requests", Some("e@corp.com"), Some(trip())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["status"], "pending");
        let id = created["id"].as_str().expect("id").to_owned();

        let approve = format!("/api/v1/requests/{id}/manager/approve");
        let (status, approved) =
            call(&app, Method::POST, &approve, Some("mgr@corp.com"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(approved["status"], "manager_approved");

        let (status, error) = call(&app, Method::POST, &approve, Some("mgr@corp.com"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(error["error"], "conflict");
        assert_eq!(error["correlation_id"], "corr-1");
        assert_eq!(error["retryable"], false);

        let (status, trail) = call(
            &app,
            Method::GET,
            &format!("/api/v1/requests/{id}/audit"),
            Some("e@corp.com"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(trail.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn wrong_actor_is_forbidden_and_missing_actor_is_refused() {
        let app = app();
        let (_, created) =
            call(&app, Method::POST, "/api/v1/requests", Some("e@corp.com"), Some(trip())).await;
        let id = created["id"].as_str().expect("id").to_owned();

        let approve = format!("/api/v1/requests/{id}/manager/approve");
        let (status, error) = call(&app, Method::POST, &approve, Some("poc@corp.com"), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(error["error"], "forbidden");

        let (status, _) = call(&app, Method::POST, &approve, None, None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn unknown_request_and_invalid_payload_map_to_client_errors() {
        let app = app();

        let (status, error) =
            call(&app, Method::GET, "/api/v1/requests/missing", Some("e@corp.com"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(error["error"], "not_found");

        let mut invalid = trip();
        invalid["trip_details"]["destination"] = json!("Mumbai");
        let (status, error) =
            call(&app, Method::POST, "/api/v1/requests", Some("e@corp.com"), Some(invalid)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error["error"], "bad_request");
    }

    #[tokio::test]
    async fn poc_queue_lists_requests_awaiting_review() {
        let app = app();
        let (_, created) =
            call(&app, Method::POST, "/api/v1/requests", Some("e@corp.com"), Some(trip())).await;
        let id = created["id"].as_str().expect("id").to_owned();
        call(
            &app,
            Method::POST,
            &format!("/api/v1/requests/{id}/manager/approve"),
            Some("mgr@corp.com"),
            None,
        )
        .await;

        let (status, queue) =
            call(&app, Method::GET, "/api/v1/queues/poc", Some("poc@corp.com"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(queue.as_array().map(Vec::len), Some(1));

        let (status, _) =
            call(&app, Method::GET, "/api/v1/queues/poc", Some("e@corp.com"), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
