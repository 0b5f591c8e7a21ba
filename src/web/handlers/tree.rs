use axum::{extract::State, Json};
use serde::Serialize;

use crate::sync::RefreshOutcome;
use crate::tree::{NodeId, TreeNode};
use crate::web::error::WebError;
use crate::web::state::WebAppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub outcome: &'static str,
    pub changed_node_ids: Vec<NodeId>,
    pub recorded: bool,
}

impl From<RefreshOutcome> for RefreshResponse {
    fn from(outcome: RefreshOutcome) -> Self {
        match outcome {
            RefreshOutcome::NoTree => Self {
                outcome: "noTree",
                changed_node_ids: Vec::new(),
                recorded: false,
            },
            RefreshOutcome::Unchanged => Self {
                outcome: "unchanged",
                changed_node_ids: Vec::new(),
                recorded: false,
            },
            RefreshOutcome::Changed {
                changed_node_ids,
                recorded,
            } => Self {
                outcome: "changed",
                changed_node_ids,
                recorded,
            },
        }
    }
}

pub async fn get_tree(State(state): State<WebAppState>) -> Result<Json<TreeNode>, WebError> {
    state
        .hub()
        .current_tree()
        .await
        .map(Json)
        .ok_or_else(|| WebError::NotFound("no tree has been captured yet".into()))
}

pub async fn refresh(State(state): State<WebAppState>) -> Result<Json<RefreshResponse>, WebError> {
    let outcome = state.hub().refresh().await?;
    Ok(Json(outcome.into()))
}
