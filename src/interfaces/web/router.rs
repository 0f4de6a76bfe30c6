use axum::{
    Router,
    body::Body,
    http::{HeaderValue, Method, Request, header},
    middleware,
    middleware::Next,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use super::AppState;
use super::handlers::{assignments, runs, specs};

fn build_cors(state: &AppState) -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        format!("http://{}:{}", state.api_host, state.api_port),
        format!("http://127.0.0.1:{}", state.api_port),
        format!("http://localhost:{}", state.api_port),
    ]
    .iter()
    .chain(state.allowed_origins.iter())
    .filter_map(|o| o.parse().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any)
}

pub fn build_api_router(state: AppState) -> Router {
    Router::new()
        .route("/v2/specs", get(specs::index).post(specs::create))
        .route("/v2/specs/{id}", get(specs::show))
        .route("/v2/specs/{id}/runs", post(runs::create))
        .route("/v1/assignments", post(assignments::create))
        .route("/v2/logs", get(super::sse_logs_endpoint))
        .layer(middleware::from_fn(security_headers))
        .layer(build_cors(&state))
        .with_state(state)
}

async fn security_headers(req: Request<Body>, next: Next) -> axum::response::Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
    );
    response
}
