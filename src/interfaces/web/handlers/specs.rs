use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::info;

use super::super::AppState;
use super::super::errors::ApiError;
use super::super::jsonapi::{self, Document, MEDIA_TYPE};
use super::super::pagination::{PageQuery, PageRequest, paginated_response};
use super::super::presenters::JobSpecPresenter;
use crate::core::models::JobSpec;
use crate::core::store::{SortOrder, StoreError};
use crate::core::validation::validate_job;

pub(crate) const SPECS_PATH: &str = "/v2/specs";

/// Lists job specs one page at a time, e.g. `/v2/specs?size=1&page=2&sort=-createdAt`.
pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Response, ApiError> {
    let request = PageRequest::parse(&query, &state.pagination)?;
    let order = SortOrder::from_query(query.sort.as_deref());

    let result = state
        .store
        .jobs_sorted(order, request.offset, request.size)
        .await
        .map(|(jobs, count)| {
            let presented: Vec<_> = jobs
                .into_iter()
                .map(JobSpecPresenter::without_runs)
                .collect();
            (presented, count)
        });

    paginated_response(SPECS_PATH, request, query.sort.as_deref(), result)
}

/// Validates, saves and hands off a new job spec.
pub async fn create(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let spec: JobSpec = serde_json::from_slice(&body).map_err(ApiError::bad_request)?;
    accept_spec(&state, spec).await
}

/// The validate → add → marshal chain shared by every creation route.
pub(crate) async fn accept_spec(state: &AppState, mut spec: JobSpec) -> Result<Response, ApiError> {
    validate_job(&spec, state.store.as_ref())
        .await
        .map_err(ApiError::bad_request)?;
    state
        .acceptor
        .add_job(&mut spec)
        .await
        .map_err(ApiError::internal)?;
    info!("Created job spec {}", spec.id);

    let doc = jsonapi::marshal_one(&JobSpecPresenter::without_runs(spec))
        .map_err(ApiError::internal)?;
    let body = serde_json::to_vec(&doc).map_err(ApiError::internal)?;
    Ok((StatusCode::OK, [(header::CONTENT_TYPE, MEDIA_TYPE)], body).into_response())
}

/// Returns a job spec with its full run history.
pub async fn show(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Document>, ApiError> {
    let spec = state.store.find_job(&id).await.map_err(not_found_or_internal)?;
    let runs = state
        .store
        .job_runs_for(&spec.id)
        .await
        .map_err(ApiError::internal)?;

    let doc = jsonapi::marshal_one(&JobSpecPresenter::with_runs(spec, runs))
        .map_err(ApiError::internal)?;
    Ok(Json(doc))
}

pub(crate) fn not_found_or_internal(err: StoreError) -> ApiError {
    if err.is_not_found() {
        ApiError::NotFound("JobSpec not found")
    } else {
        ApiError::internal(err)
    }
}
