use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use mockable::Clock;
use serde::Deserialize;
use serde_json::json;

use super::domain::{Action, Actor, ApplicationId, Decision, LoanRequest, Role};
use super::engine::{ExecuteRequest, WorkflowEngine};
use super::error::WorkflowError;
use super::events::AuditSink;
use super::repository::{ApplicationRepository, RepositoryError};

pub const USER_HEADER: &str = "x-user-id";
pub const ROLE_HEADER: &str = "x-user-role";

/// Body of `POST /api/v1/pinjaman/:application_id/actions`.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionPayload {
    pub action: Action,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub decision: Option<Decision>,
}

/// Router exposing submit, status, permission, action, and queue endpoints.
pub fn pinjaman_router<R, A, C>(engine: Arc<WorkflowEngine<R, A, C>>) -> Router
where
    R: ApplicationRepository + 'static,
    A: AuditSink + 'static,
    C: Clock + Send + Sync + 'static,
{
    Router::new()
        .route("/api/v1/pinjaman", post(submit_handler::<R, A, C>))
        .route(
            "/api/v1/pinjaman/:application_id",
            get(status_handler::<R, A, C>),
        )
        .route(
            "/api/v1/pinjaman/:application_id/permissions",
            get(permissions_handler::<R, A, C>),
        )
        .route(
            "/api/v1/pinjaman/:application_id/actions",
            post(execute_handler::<R, A, C>),
        )
        .route("/api/v1/work-queue", get(queue_handler::<R, A, C>))
        .with_state(engine)
}

impl IntoResponse for WorkflowError {
    fn into_response(self) -> Response {
        let status = match &self {
            WorkflowError::NotFound(_) => StatusCode::NOT_FOUND,
            WorkflowError::Forbidden { .. } => StatusCode::FORBIDDEN,
            WorkflowError::InvalidTransition { .. }
            | WorkflowError::Terminal(_)
            | WorkflowError::Conflict { .. }
            | WorkflowError::NotLockHolder { .. }
            | WorkflowError::NotLocked => StatusCode::CONFLICT,
            WorkflowError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            WorkflowError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
            WorkflowError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = json!({
            "error": self.kind(),
            "message": self.to_string(),
        });
        (status, Json(payload)).into_response()
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Read the pre-verified caller identity supplied by the session layer.
pub(crate) fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, Response> {
    let user_id = header_value(headers, USER_HEADER);
    let role = header_value(headers, ROLE_HEADER).and_then(Role::parse);

    match (user_id, role) {
        (Some(user_id), Some(role)) => Ok(Actor::new(user_id, role)),
        _ => {
            let payload = json!({
                "error": "unauthenticated",
                "message": format!("{USER_HEADER} and {ROLE_HEADER} headers are required"),
            });
            Err((StatusCode::UNAUTHORIZED, Json(payload)).into_response())
        }
    }
}

pub(crate) async fn submit_handler<R, A, C>(
    State(engine): State<Arc<WorkflowEngine<R, A, C>>>,
    headers: HeaderMap,
    Json(request): Json<LoanRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    A: AuditSink + 'static,
    C: Clock + Send + Sync + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    match engine.submit(&actor, request) {
        Ok(application) => (StatusCode::CREATED, Json(application.status_view())).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn status_handler<R, A, C>(
    State(engine): State<Arc<WorkflowEngine<R, A, C>>>,
    Path(application_id): Path<String>,
) -> Response
where
    R: ApplicationRepository + 'static,
    A: AuditSink + 'static,
    C: Clock + Send + Sync + 'static,
{
    match engine.get(&ApplicationId(application_id)) {
        Ok(application) => (StatusCode::OK, Json(application.status_view())).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn permissions_handler<R, A, C>(
    State(engine): State<Arc<WorkflowEngine<R, A, C>>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    R: ApplicationRepository + 'static,
    A: AuditSink + 'static,
    C: Clock + Send + Sync + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    let id = ApplicationId(application_id);
    match engine.permissions(&id, &actor) {
        Ok(permissions) => {
            let payload = json!({
                "application_id": id,
                "user_id": actor.user_id,
                "role": actor.role,
                "permissions": permissions,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn execute_handler<R, A, C>(
    State(engine): State<Arc<WorkflowEngine<R, A, C>>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<ActionPayload>,
) -> Response
where
    R: ApplicationRepository + 'static,
    A: AuditSink + 'static,
    C: Clock + Send + Sync + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    let request = ExecuteRequest {
        application_id: ApplicationId(application_id),
        action: payload.action,
        actor,
        note: payload.note,
        decision: payload.decision,
    };

    match engine.execute(request) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn queue_handler<R, A, C>(
    State(engine): State<Arc<WorkflowEngine<R, A, C>>>,
    headers: HeaderMap,
) -> Response
where
    R: ApplicationRepository + 'static,
    A: AuditSink + 'static,
    C: Clock + Send + Sync + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    match engine.work_queue(&actor) {
        Ok(applications) => {
            let views: Vec<_> = applications
                .iter()
                .map(|application| application.status_view())
                .collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Err(err) => err.into_response(),
    }
}
