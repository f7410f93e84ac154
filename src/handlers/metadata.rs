use crate::router::LaasState;
use axum::{Json, extract::State};
use serde_json::Value;

/// GET /metadata.json
pub async fn metadata(State(state): State<LaasState>) -> Json<Value> {
    Json(state.settings.metadata.clone())
}
