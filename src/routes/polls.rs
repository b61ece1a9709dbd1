use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::poll::{PollResultsResponse, PollSnapshot},
    error::AppError,
    services::{credential_service::Identity, poll_service},
    state::SharedState,
};

/// Read-only poll routes; all mutation goes through the websocket gateway.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/polls", get(list_polls))
        .route("/polls/{id}", get(get_poll))
        .route("/polls/{id}/results", get(get_results))
}

/// List polls visible to the caller.
#[utoipa::path(
    get,
    path = "/polls",
    tag = "polls",
    responses(
        (status = 200, description = "Visible polls, newest first", body = [PollSnapshot]),
        (status = 401, description = "Missing or invalid credential")
    )
)]
pub async fn list_polls(
    State(state): State<SharedState>,
    identity: Identity,
) -> Result<Json<Vec<PollSnapshot>>, AppError> {
    let polls = poll_service::list_polls(&state, &identity).await?;
    Ok(Json(polls.into_iter().map(Into::into).collect()))
}

/// Fetch a single poll.
#[utoipa::path(
    get,
    path = "/polls/{id}",
    tag = "polls",
    params(("id" = Uuid, Path, description = "Poll identifier")),
    responses(
        (status = 200, description = "The poll", body = PollSnapshot),
        (status = 404, description = "Poll not found or not visible")
    )
)]
pub async fn get_poll(
    State(state): State<SharedState>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<PollSnapshot>, AppError> {
    let poll = poll_service::fetch_poll(&state, &identity, id).await?;
    Ok(Json(poll.into()))
}

/// Fetch aggregated results for a poll.
#[utoipa::path(
    get,
    path = "/polls/{id}/results",
    tag = "polls",
    params(("id" = Uuid, Path, description = "Poll identifier")),
    responses(
        (status = 200, description = "Aggregated results", body = PollResultsResponse),
        (status = 401, description = "Results not visible to the caller yet"),
        (status = 404, description = "Poll not found or not visible")
    )
)]
pub async fn get_results(
    State(state): State<SharedState>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<PollResultsResponse>, AppError> {
    let poll = poll_service::fetch_results(&state, &identity, id).await?;
    Ok(Json(poll.into()))
}
