use axum::{body::Bytes, extract::State, response::Response};
use tracing::debug;

use super::super::AppState;
use super::super::errors::ApiError;
use super::specs::accept_spec;
use crate::core::models::assignment::AssignmentSpec;

/// Creates a job spec from a legacy assignment document.
pub async fn create(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let assignment: AssignmentSpec =
        serde_json::from_slice(&body).map_err(ApiError::bad_request)?;
    let spec = assignment
        .convert_to_job_spec()
        .map_err(ApiError::bad_request)?;
    debug!(
        "Converted assignment with {} subtask(s)",
        assignment.assignment.subtasks.len()
    );
    accept_spec(&state, spec).await
}
