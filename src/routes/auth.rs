use axum::{Json, Router, extract::State, routing::post};
use validator::Validate;

use crate::{
    dto::auth::{CredentialResponse, IssueCredentialRequest, RefreshCredentialRequest},
    error::AppError,
    state::SharedState,
};

/// Routes issuing and refreshing session credentials.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/auth/credentials", post(issue_credential))
        .route("/auth/refresh", post(refresh_credential))
}

/// Issue a signed credential for a claimed identity.
#[utoipa::path(
    post,
    path = "/auth/credentials",
    tag = "auth",
    request_body = IssueCredentialRequest,
    responses(
        (status = 200, description = "Credential issued", body = CredentialResponse),
        (status = 400, description = "Invalid request body")
    )
)]
pub async fn issue_credential(
    State(state): State<SharedState>,
    Json(payload): Json<IssueCredentialRequest>,
) -> Result<Json<CredentialResponse>, AppError> {
    payload.validate()?;
    let issued = state
        .credentials()
        .issue(&payload.user_id, payload.role)?;
    Ok(Json(issued.into()))
}

/// Re-issue a credential from a still-valid token.
#[utoipa::path(
    post,
    path = "/auth/refresh",
    tag = "auth",
    request_body = RefreshCredentialRequest,
    responses(
        (status = 200, description = "Credential refreshed", body = CredentialResponse),
        (status = 401, description = "Token invalid or expired")
    )
)]
pub async fn refresh_credential(
    State(state): State<SharedState>,
    Json(payload): Json<RefreshCredentialRequest>,
) -> Result<Json<CredentialResponse>, AppError> {
    payload.validate()?;
    let issued = state.credentials().refresh(&payload.token)?;
    Ok(Json(issued.into()))
}
