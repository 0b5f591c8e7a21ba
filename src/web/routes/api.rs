//! REST API route definitions.

use axum::{
    routing::{get, post},
    Router,
};

use crate::web::handlers::{recording, tree};
use crate::web::state::WebAppState;

/// Build the API router with all REST endpoints.
pub fn api_routes() -> Router<WebAppState> {
    Router::new()
        // Recording routes
        .route("/recording/status", get(recording::get_status))
        .route("/recording/start", post(recording::start_recording))
        .route("/recording/stop", post(recording::stop_recording))
        // Tree routes
        .route("/tree", get(tree::get_tree))
        .route("/refresh", post(tree::refresh))
}
