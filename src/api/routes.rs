//! API route definitions.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::analysis::{AnalyzeError, DetectionSubmission, SubmitError};
use crate::correlate::SignalBundle;
use crate::api::state::AppState;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/detections", post(submit_detection))
        .route("/analysis", get(run_analysis))
        .route("/correlation", post(run_correlation))
        .route("/alerts", get(list_alerts))
        .route("/subjects/{subject_id}/profile", get(subject_profile))
}

fn envelope(data: Value) -> Json<Value> {
    Json(json!({
        "data": data,
        "meta": {
            "timestamp": Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

fn error_body(status: StatusCode, message: String) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "error": message })))
}

async fn health() -> Json<Value> {
    envelope(json!({ "status": "ok" }))
}

async fn submit_detection(
    State(state): State<AppState>,
    Json(submission): Json<DetectionSubmission>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    match state.engine.submit_detection(submission).await {
        Ok(id) => Ok((StatusCode::CREATED, envelope(json!({ "id": id })))),
        Err(SubmitError::Input(err)) => {
            Err(error_body(StatusCode::BAD_REQUEST, err.to_string()))
        }
        Err(SubmitError::Store(err)) => {
            Err(error_body(StatusCode::SERVICE_UNAVAILABLE, err.to_string()))
        }
    }
}

#[derive(Debug, Deserialize)]
struct AnalysisQuery {
    subject_id: Option<String>,
    #[serde(default = "default_window_hours")]
    window_hours: u32,
}

fn default_window_hours() -> u32 {
    24
}

async fn run_analysis(
    State(state): State<AppState>,
    Query(query): Query<AnalysisQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let result = state
        .engine
        .analyze(query.subject_id.as_deref(), query.window_hours)
        .await;

    match result {
        Ok(result) => Ok(envelope(serde_json::to_value(result).unwrap_or(Value::Null))),
        Err(AnalyzeError::InvalidArgument(message)) => {
            Err(error_body(StatusCode::BAD_REQUEST, message))
        }
        Err(AnalyzeError::Store(err)) => {
            Err(error_body(StatusCode::SERVICE_UNAVAILABLE, err.to_string()))
        }
    }
}

#[derive(Debug, Deserialize)]
struct CorrelationRequest {
    timestamp: Option<DateTime<Utc>>,
    #[serde(flatten)]
    signals: SignalBundle,
}

async fn run_correlation(
    State(state): State<AppState>,
    Json(request): Json<CorrelationRequest>,
) -> Json<Value> {
    let at = request.timestamp.unwrap_or_else(Utc::now);
    let report = state.engine.correlate_event(request.signals, at).await;
    envelope(serde_json::to_value(report).unwrap_or(Value::Null))
}

#[derive(Debug, Deserialize)]
struct AlertsQuery {
    #[serde(default = "default_alert_limit")]
    limit: usize,
}

fn default_alert_limit() -> usize {
    50
}

async fn list_alerts(
    State(state): State<AppState>,
    Query(query): Query<AlertsQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match state.engine.recent_alerts(query.limit).await {
        Ok(alerts) => {
            let total = alerts.len();
            Ok(envelope(json!({ "alerts": alerts, "total": total })))
        }
        Err(err) => Err(error_body(StatusCode::SERVICE_UNAVAILABLE, err.to_string())),
    }
}

async fn subject_profile(
    State(state): State<AppState>,
    Path(subject_id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match state.engine.subject_profile(&subject_id).await {
        Some(profile) => Ok(envelope(
            serde_json::to_value(profile).unwrap_or(Value::Null),
        )),
        None => Err(error_body(
            StatusCode::NOT_FOUND,
            format!("no detections recorded for subject '{subject_id}'"),
        )),
    }
}
