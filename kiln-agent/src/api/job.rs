//! Job API Handlers
//!
//! Synchronous and callback-based job execution.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use kiln_core::domain::job::JobRequest;
use kiln_core::dto::job::JobAccepted;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::service::{CallbackNotifier, spawn_job};

/// POST /jobs/execute
/// Runs a job and returns its result
///
/// With a `callback_url` the job runs in the background, the response is
/// `202 Accepted` and the result is POSTed to the callback when done.
pub async fn execute_job(
    State(state): State<AppState>,
    payload: Result<Json<JobRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    tracing::info!("Received job execution request: job_id={}", request.job_id);

    let Some(callback_url) = request.callback_url.clone() else {
        let result = spawn_job(state.executor.clone(), request).await;
        return Ok(Json(result).into_response());
    };

    CallbackNotifier::validate_url(&callback_url)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let job_id = request.job_id;
    let executor = state.executor.clone();
    let notifier = state.notifier.clone();
    tokio::spawn(async move {
        let result = spawn_job(executor, request).await;
        if let Err(e) = notifier.deliver(&callback_url, &result).await {
            tracing::error!("{}", e);
        }
    });

    Ok((StatusCode::ACCEPTED, Json(JobAccepted::new(job_id))).into_response())
}
