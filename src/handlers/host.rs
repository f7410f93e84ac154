use crate::middleware::auth::RequireSession;
use crate::{LaasError, router::LaasState};
use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};

/// GET /api/host/{name} -> public view of a host; management credentials are never included.
pub async fn get_host(
    State(state): State<LaasState>,
    _session: RequireSession,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, LaasError> {
    let host = state
        .hosts
        .get(&name)
        .await?
        .ok_or_else(|| LaasError::NotFound(format!("host {name}")))?;
    Ok(Json(host))
}
