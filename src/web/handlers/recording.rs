use axum::{extract::State, Json};

use crate::recorder::{Recording, RecordingStatus};
use crate::web::error::WebError;
use crate::web::state::WebAppState;

pub async fn get_status(State(state): State<WebAppState>) -> Json<RecordingStatus> {
    Json(state.hub().status().await)
}

pub async fn start_recording(
    State(state): State<WebAppState>,
) -> Result<Json<RecordingStatus>, WebError> {
    let status = state.hub().start_recording().await?;
    Ok(Json(status))
}

/// Stops the session and returns the finished recording.
pub async fn stop_recording(
    State(state): State<WebAppState>,
) -> Result<Json<Recording>, WebError> {
    let recording = state.hub().stop_recording().await?;
    Ok(Json(recording))
}
