use axum::routing::{get, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handler::{self, AppState};

/// Build the axum router with all keyscope endpoints.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handler::health_handler))
        .route("/v3/separator", get(handler::separator_handler))
        .route("/v3/connect", post(handler::connect_handler))
        .route("/v3/get", get(handler::get_handler))
        .route("/v3/getpath", get(handler::get_path_handler))
        .route("/v3/put", put(handler::put_handler))
        .route("/v3/delete", post(handler::delete_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
