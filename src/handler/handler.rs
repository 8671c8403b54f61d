use super::{parse_digit, DigitRequest, TargetNumberRequest};
use crate::app::AppState;
use crate::call::SessionClosed;
use crate::callrecord::CallRecordUpdate;
use crate::provider::{InitiateRequest, InitiateResponse};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::{error, info, warn};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/calls/initiate", post(initiate_call))
        .route("/calls", get(list_calls))
        .route("/calls/{uuid}", get(get_call).patch(update_call))
        .route("/session", get(get_session))
        .route("/session/target", post(set_target_number))
        .route("/session/initiate", post(session_initiate))
        .route("/session/answer", post(session_answer))
        .route("/session/hangup", post(session_hang_up))
        .route("/session/digit", post(session_digit))
}

fn internal_error(e: anyhow::Error) -> Response {
    error!("call record store error: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": e.to_string()})),
    )
        .into_response()
}

fn accepted(result: Result<(), SessionClosed>) -> Response {
    match result {
        Ok(()) => (StatusCode::ACCEPTED, Json(json!({"accepted": true}))).into_response(),
        Err(e) => {
            warn!("session action rejected: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"accepted": false, "error": e.to_string()})),
            )
                .into_response()
        }
    }
}

async fn initiate_call(
    State(state): State<AppState>,
    Json(req): Json<InitiateRequest>,
) -> Response {
    if req.target_number.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(InitiateResponse::failed("targetNumber is required")),
        )
            .into_response();
    }
    let resp = state.telephony.initiate_call(&req.target_number).await;
    info!(
        target_number = %req.target_number,
        success = resp.success,
        simulation = resp.simulation,
        "initiate call"
    );
    let status = if resp.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    (status, Json(resp)).into_response()
}

async fn list_calls(State(state): State<AppState>) -> Response {
    match state.records.list().await {
        Ok(records) => Json(json!({ "calls": records })).into_response(),
        Err(e) => internal_error(e),
    }
}

async fn get_call(State(state): State<AppState>, Path(uuid): Path<String>) -> Response {
    match state.records.get(&uuid).await {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => internal_error(e),
    }
}

async fn update_call(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
    Json(update): Json<CallRecordUpdate>,
) -> Response {
    match state.records.update(&uuid, update).await {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => internal_error(e),
    }
}

async fn get_session(State(state): State<AppState>) -> Response {
    Json(state.session.snapshot()).into_response()
}

async fn set_target_number(
    State(state): State<AppState>,
    Json(req): Json<TargetNumberRequest>,
) -> Response {
    accepted(state.session.set_target_number(req.target_number))
}

async fn session_initiate(State(state): State<AppState>) -> Response {
    accepted(state.session.initiate())
}

async fn session_answer(State(state): State<AppState>) -> Response {
    accepted(state.session.answer())
}

async fn session_hang_up(State(state): State<AppState>) -> Response {
    accepted(state.session.hang_up())
}

async fn session_digit(
    State(state): State<AppState>,
    Json(req): Json<DigitRequest>,
) -> Response {
    match parse_digit(&req.digit) {
        Ok(digit) => accepted(state.session.send_digit(digit)),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(json!({"accepted": false, "error": e.to_string()})),
        )
            .into_response(),
    }
}
