use axum::{
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::info;

use super::super::AppState;
use super::super::errors::ApiError;
use super::super::jsonapi::{self, MEDIA_TYPE};
use super::super::presenters::JobRunPresenter;
use super::specs::not_found_or_internal;
use crate::core::models;

/// Records a pending run of a spec for the execution engine to pick up.
pub async fn create(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let spec = state.store.find_job(&id).await.map_err(not_found_or_internal)?;

    let now = models::now();
    if !spec.started(now) {
        return Err(ApiError::bad_request("Job spec has not started yet"));
    }
    if spec.ended(now) {
        return Err(ApiError::bad_request("Job spec has ended"));
    }

    let run = state
        .store
        .create_job_run(&spec.id)
        .await
        .map_err(ApiError::internal)?;
    info!("Recorded run {} for job spec {}", run.id, spec.id);

    let doc = jsonapi::marshal_one(&JobRunPresenter::new(run)).map_err(ApiError::internal)?;
    let body = serde_json::to_vec(&doc).map_err(ApiError::internal)?;
    Ok((StatusCode::OK, [(header::CONTENT_TYPE, MEDIA_TYPE)], body).into_response())
}
