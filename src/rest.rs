//! Request/response mirror of the session surface.
//!
//! Mounted alongside the socket gateway over the same coordinator and
//! connection manager, so a poll created or ended here broadcasts and runs its
//! countdown exactly as one created over the socket. Responses use a
//! `{"success": ..., "data": ...}` envelope; failures map the session error
//! taxonomy onto HTTP statuses.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::error::SessionError;
use crate::gateway::protocol::ServerEvent;
use crate::gateway::{spawn_poll_timer, GatewayContext};
use crate::poll::CloseReason;
use crate::validation;

pub fn router() -> Router<GatewayContext> {
    Router::new()
        .route("/api/polls", get(session_stats).post(create_poll))
        .route(
            "/api/polls/current",
            get(current_poll).delete(end_current_poll),
        )
        .route("/api/polls/history", get(poll_history))
        .route("/api/polls/stats", get(session_stats))
        .route("/api/polls/validate-name", post(validate_name))
        .route("/api/polls/{id}/vote", post(submit_vote))
}

/// A session error carried to an HTTP response.
struct ApiError(SessionError);

impl From<SessionError> for ApiError {
    fn from(error: SessionError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            SessionError::InvalidArgument(_) | SessionError::InvalidOption => {
                StatusCode::BAD_REQUEST
            }
            SessionError::NoActivePoll => StatusCode::NOT_FOUND,
            SessionError::PollInProgress(_)
            | SessionError::AlreadyVoted
            | SessionError::PollClosed
            | SessionError::NameTaken(_) => StatusCode::CONFLICT,
            SessionError::NotRegistered | SessionError::NotPresenter => StatusCode::FORBIDDEN,
        };
        let body = json!({ "success": false, "error": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

fn envelope(data: impl Serialize) -> Json<serde_json::Value> {
    Json(json!({ "success": true, "data": data }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatePollRequest {
    question: String,
    options: Vec<String>,
    #[serde(default)]
    time_limit_secs: Option<u64>,
}

async fn create_poll(
    State(ctx): State<GatewayContext>,
    Json(request): Json<CreatePollRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let question = validation::validate_question(&request.question)?;
    let options = validation::validate_options(&request.options)?;
    let time_limit_secs = validation::validate_time_limit(request.time_limit_secs)?;
    let snapshot = ctx.coordinator.create_poll(&question, options, time_limit_secs)?;

    ctx.connections.broadcast(&ServerEvent::PollStarted {
        poll: snapshot.clone(),
    });
    spawn_poll_timer(ctx.clone(), snapshot.id);
    Ok((StatusCode::CREATED, envelope(snapshot)))
}

async fn current_poll(State(ctx): State<GatewayContext>) -> Result<impl IntoResponse, ApiError> {
    let snapshot = ctx.coordinator.current_poll().ok_or(SessionError::NoActivePoll)?;
    Ok(envelope(snapshot))
}

async fn poll_history(State(ctx): State<GatewayContext>) -> impl IntoResponse {
    envelope(ctx.coordinator.history())
}

async fn session_stats(State(ctx): State<GatewayContext>) -> impl IntoResponse {
    envelope(ctx.coordinator.stats())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidateNameRequest {
    name: String,
}

async fn validate_name(
    State(ctx): State<GatewayContext>,
    Json(request): Json<ValidateNameRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = validation::validate_respondent_name(&request.name)?;
    ctx.coordinator.name_available(&name)?;
    Ok(envelope(json!({ "name": name })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VoteRequest {
    option_id: usize,
    name: String,
}

async fn submit_vote(
    State(ctx): State<GatewayContext>,
    Path(poll_id): Path<Uuid>,
    Json(request): Json<VoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = validation::validate_respondent_name(&request.name)?;
    let outcome = ctx
        .coordinator
        .submit_vote_by_name(poll_id, &name, request.option_id)?;

    ctx.connections.broadcast(&ServerEvent::PollResults {
        poll: outcome.snapshot.clone(),
    });
    if outcome.auto_closed {
        ctx.connections.broadcast(&ServerEvent::PollEnded {
            poll: outcome.snapshot.clone(),
            reason: CloseReason::AllVoted.to_string(),
        });
    }
    Ok(envelope(outcome.snapshot))
}

async fn end_current_poll(
    State(ctx): State<GatewayContext>,
) -> Result<impl IntoResponse, ApiError> {
    let (snapshot, reason) = ctx.coordinator.end_current_poll()?;
    ctx.connections.broadcast(&ServerEvent::PollEnded {
        poll: snapshot.clone(),
        reason: reason.to_string(),
    });
    Ok(envelope(json!({ "poll": snapshot, "reason": reason.to_string() })))
}
