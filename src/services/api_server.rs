// src/services/api_server.rs
//! API Server for the DID lifecycle
//!
//! Thin axum binding over [`DidCoordinator`]. Every response uses the same
//! JSON envelope `{ statusCode, success, message, data, error }`.
//!
//! Endpoints:
//! - `PUT  /subjects/:subject_id` enrol a subject
//! - `POST /dids` register a DID
//! - `GET  /dids/:subject_id` resolve
//! - `POST /dids/:subject_id/revoke`
//! - `POST /dids/:subject_id/reconcile`
//!
//! The caller is identified by the `x-actor-id` and `x-issuer-address`
//! headers. Authenticating those headers is left to the deployment.

use crate::error::{ErrorKind, LifecycleError, Step};
use crate::models::subject::{Caller, Subject};
use crate::services::did_coordinator::DidCoordinator;
use crate::storage::subjects::SubjectDirectory;
use axum::{
    extract::{Json, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;

pub const ACTOR_HEADER: &str = "x-actor-id";
pub const ISSUER_HEADER: &str = "x-issuer-address";

/// Request payload for enrolling a subject
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnrolSubjectRequest {
    #[serde(default)]
    display_name: Option<String>,
}

/// Request payload for registering a DID
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterDIDRequest {
    subject_id: String,
}

/// Request payload for revoking a DID
#[derive(Serialize, Deserialize)]
struct RevokeDIDRequest {
    reason: String,
}

/// Machine-readable part of a failed response
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    kind: ErrorKind,
    step: Option<Step>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

/// Response envelope shared by every endpoint
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ApiResponse<T: Serialize> {
    status_code: u16,
    success: bool,
    message: String,
    data: Option<T>,
    error: Option<ErrorBody>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(message: impl Into<String>, data: T) -> Response {
        let body = ApiResponse {
            status_code: StatusCode::OK.as_u16(),
            success: true,
            message: message.into(),
            data: Some(data),
            error: None,
        };
        (StatusCode::OK, Json(body)).into_response()
    }
}

fn failure(status: StatusCode, message: String, error: ErrorBody) -> Response {
    let body: ApiResponse<()> = ApiResponse {
        status_code: status.as_u16(),
        success: false,
        message,
        data: None,
        error: Some(error),
    };
    (status, Json(body)).into_response()
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Unauthorized => StatusCode::FORBIDDEN,
        ErrorKind::AlreadyExists | ErrorKind::Inconsistent => StatusCode::CONFLICT,
        ErrorKind::LedgerWriteFailed | ErrorKind::LedgerReadFailed => StatusCode::BAD_GATEWAY,
        ErrorKind::StorageUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::StorageTimeout | ErrorKind::LedgerTimeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::IndexWriteFailed | ErrorKind::IndexReadFailed => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for LifecycleError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = status_for(kind);
        if status.is_server_error() {
            error!("request failed: {}", self);
        }

        let details = match &self {
            LifecycleError::Inconsistent(discrepancy) => serde_json::to_value(discrepancy).ok(),
            LifecycleError::AlreadyExists(record) => serde_json::to_value(record).ok(),
            _ => None,
        };
        let error = ErrorBody {
            kind,
            step: Some(self.step()),
            details,
        };
        failure(status, self.to_string(), error)
    }
}

/// Caller identity from request headers. A missing actor is `anonymous`.
fn caller_from(headers: &HeaderMap) -> Caller {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };
    Caller::new(
        header(ACTOR_HEADER).unwrap_or_else(|| "anonymous".to_string()),
        header(ISSUER_HEADER),
    )
}

/// API server state
#[derive(Clone)]
pub struct ApiServer {
    coordinator: Arc<DidCoordinator>,

    /// Subject enrolment goes straight to the directory
    subjects: Arc<dyn SubjectDirectory>,

    request_timeout: Duration,
}

impl ApiServer {
    pub fn new(
        coordinator: Arc<DidCoordinator>,
        subjects: Arc<dyn SubjectDirectory>,
        request_timeout: Duration,
    ) -> Self {
        ApiServer {
            coordinator,
            subjects,
            request_timeout,
        }
    }

    /// Builds the router with all endpoints and the request timeout layer.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/subjects/:subject_id", put(Self::enrol_subject_handler))
            .route("/dids", post(Self::register_did_handler))
            .route("/dids/:subject_id", get(Self::resolve_did_handler))
            .route("/dids/:subject_id/revoke", post(Self::revoke_did_handler))
            .route("/dids/:subject_id/reconcile", post(Self::reconcile_did_handler))
            .layer(TimeoutLayer::new(self.request_timeout))
            .with_state(Arc::new(self.clone()))
    }

    /// Serves requests on `addr` until `shutdown` resolves.
    pub async fn run(
        &self,
        addr: SocketAddr,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("API server listening on http://{}", addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
    }

    /// Enrols a subject so a DID can be registered for it
    ///
    /// # Endpoint
    /// PUT /subjects/:subject_id
    ///
    /// # Request Body
    /// `{ "displayName": "..." }`, all fields optional
    async fn enrol_subject_handler(
        Path(subject_id): Path<String>,
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<EnrolSubjectRequest>,
    ) -> Response {
        let mut subject = Subject::new(subject_id);
        subject.display_name = payload.display_name;

        match state.subjects.upsert_subject(&subject).await {
            Ok(()) => ApiResponse::ok("Subject enrolled", subject),
            Err(e) => {
                error!("enrolling subject {} failed: {}", subject.id, e);
                failure(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("enrolling subject {} failed: {}", subject.id, e),
                    ErrorBody {
                        kind: ErrorKind::IndexWriteFailed,
                        step: None,
                        details: None,
                    },
                )
            }
        }
    }

    /// Registers a DID for a subject
    ///
    /// # Endpoint
    /// POST /dids
    ///
    /// # Request Body
    /// `{ "subjectId": "..." }`
    ///
    /// # Responses
    /// - 200 OK: `{ did, documentCID }`, also for a subject that already
    ///   holds a DID unless the server rejects re-registration
    /// - 403 Forbidden: caller is not an on-chain issuer
    /// - 404 Not Found: unknown subject
    /// - 502/503/504: ledger or document store failed; the error names the step
    async fn register_did_handler(
        State(state): State<Arc<ApiServer>>,
        headers: HeaderMap,
        Json(payload): Json<RegisterDIDRequest>,
    ) -> Response {
        let caller = caller_from(&headers);
        match state.coordinator.register(&payload.subject_id, &caller).await {
            Ok(registration) => ApiResponse::ok("DID registered", registration),
            Err(e) => e.into_response(),
        }
    }

    /// Resolves a subject's DID
    ///
    /// # Endpoint
    /// GET /dids/:subject_id
    ///
    /// # Responses
    /// - 200 OK: `{ did, documentCID, onChainDID }`
    /// - 404 Not Found: no DID for the subject
    /// - 409 Conflict: index and ledger disagree, both views in `error.details`
    async fn resolve_did_handler(
        Path(subject_id): Path<String>,
        State(state): State<Arc<ApiServer>>,
    ) -> Response {
        match state.coordinator.resolve(&subject_id).await {
            Ok(resolution) => ApiResponse::ok("DID resolved", resolution),
            Err(e) => e.into_response(),
        }
    }

    /// Revokes a subject's DID
    ///
    /// # Endpoint
    /// POST /dids/:subject_id/revoke
    ///
    /// # Request Body
    /// `{ "reason": "..." }`
    async fn revoke_did_handler(
        Path(subject_id): Path<String>,
        State(state): State<Arc<ApiServer>>,
        headers: HeaderMap,
        Json(payload): Json<RevokeDIDRequest>,
    ) -> Response {
        let caller = caller_from(&headers);
        match state.coordinator.revoke(&subject_id, &payload.reason, &caller).await {
            Ok(revocation) => ApiResponse::ok("DID revoked", revocation),
            Err(e) => e.into_response(),
        }
    }

    /// POST /dids/:subject_id/reconcile
    async fn reconcile_did_handler(
        Path(subject_id): Path<String>,
        State(state): State<Arc<ApiServer>>,
    ) -> Response {
        match state.coordinator.reconcile(&subject_id).await {
            Ok(outcome) => ApiResponse::ok("Index reconciled", outcome),
            Err(e) => e.into_response(),
        }
    }
}
