use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{services::documentation::ApiDoc, state::SharedState};

/// Serve the Swagger UI for the poll room API at `/docs`, backed by the
/// generated OpenAPI document.
pub fn router(state: SharedState) -> Router<SharedState> {
    let openapi = ApiDoc::openapi();
    let ui: Router<SharedState> = SwaggerUi::new("/docs")
        .url("/api-doc/openapi.json", openapi)
        .into();

    ui.with_state(state)
}
