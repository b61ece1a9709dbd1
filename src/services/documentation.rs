use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Pollroom.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::auth::issue_credential,
        crate::routes::auth::refresh_credential,
        crate::routes::polls::list_polls,
        crate::routes::polls::get_poll,
        crate::routes::polls::get_results,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::auth::IssueCredentialRequest,
            crate::dto::auth::RefreshCredentialRequest,
            crate::dto::auth::CredentialResponse,
            crate::dto::poll::CreatePollRequest,
            crate::dto::poll::PollSnapshot,
            crate::dto::poll::PollResultsResponse,
            crate::dto::ws::ClientAction,
            crate::dto::ws::ServerEvent,
            crate::dao::models::PollState,
            crate::services::credential_service::Role,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Session credential endpoints"),
        (name = "polls", description = "Poll read endpoints"),
        (name = "gateway", description = "WebSocket operations for the poll room"),
    )
)]
pub struct ApiDoc;
