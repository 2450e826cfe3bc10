use std::time::Duration;

use axum::Router;
use axum::error_handling::HandleErrorLayer;
use axum::http::{HeaderValue, header};
use axum::routing::{get, post};
use tower::timeout::TimeoutLayer;
use tower::{BoxError, ServiceBuilder};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::routes::{health, task_types, tasks};
use crate::state::AppState;

async fn handle_timeout(err: BoxError) -> ApiError {
    if err.is::<tower::timeout::error::Elapsed>() {
        ApiError::Timeout
    } else {
        ApiError::BadRequest(err.to_string())
    }
}

/// Every route of the broker's HTTP boundary.
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/task-types", get(task_types::list))
        .route("/task-types/register", post(task_types::register))
        .route("/task-types/{name}", get(task_types::get))
        .route("/task-types/{name}/deactivate", post(task_types::deactivate))
        .route("/tasks", post(tasks::create).get(tasks::list))
        .route("/tasks/claim", post(tasks::claim))
        .route("/tasks/{id}", get(tasks::get))
        .route("/tasks/{id}/complete", post(tasks::complete))
        .route("/tasks/{id}/progress", post(tasks::progress))
        .route("/tasks/{id}/history", get(tasks::history))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(SetResponseHeaderLayer::overriding(
                    header::CACHE_CONTROL,
                    HeaderValue::from_static("no-store"),
                ))
                .layer(HandleErrorLayer::new(handle_timeout))
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .with_state(state)
}
