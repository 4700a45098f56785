mod middleware;
mod worker;

use std::time::Duration;

use axum::{Router, http::StatusCode, middleware as axum_middleware, routing::get};

use crate::application::delivery::WorkerService;

pub use middleware::RequestContext;

pub const FRONT_WORKER_PATH: &str = "/service-worker.js";
pub const ADMIN_WORKER_PATH: &str = "/admin/service-worker.js";

#[derive(Clone)]
pub struct HttpState {
    pub worker: WorkerService,
    pub compile_timeout: Duration,
}

impl HttpState {
    pub fn new(worker: WorkerService) -> Self {
        let compile_timeout = worker.worker().compile_timeout;
        Self {
            worker,
            compile_timeout,
        }
    }
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route(FRONT_WORKER_PATH, get(worker::front_worker))
        .route(ADMIN_WORKER_PATH, get(worker::admin_worker))
        .route("/_health", get(health))
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}
