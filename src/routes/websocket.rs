use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;

use crate::{error::AppError, services::gateway_service, state::SharedState};

#[derive(Debug, Deserialize)]
pub(crate) struct WsQuery {
    token: String,
}

#[utoipa::path(
    get,
    path = "/ws",
    tag = "gateway",
    params(("token" = String, Query, description = "Bearer token issued by /auth/credentials")),
    responses(
        (status = 101, description = "Switching protocols to WebSocket"),
        (status = 401, description = "Missing or invalid credential")
    )
)]
/// Upgrade the HTTP connection into a poll room session.
///
/// The credential travels as a query parameter because browsers cannot set
/// headers on websocket handshakes; it is verified before the upgrade, so an
/// unauthenticated client never gets a socket.
pub async fn ws_handler(
    State(state): State<SharedState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, AppError> {
    let identity = state.credentials().verify(&query.token)?;

    let shared_state = state.clone();
    Ok(ws.on_upgrade(move |socket| {
        gateway_service::handle_socket(shared_state, socket, identity)
    }))
}

/// Configure the WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/ws", get(ws_handler))
}
