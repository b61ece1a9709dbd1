use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dto::format_system_time,
    services::credential_service::{IssuedCredential, Role},
};

/// Request body for issuing a session credential.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct IssueCredentialRequest {
    /// Stable identifier the credential should be bound to.
    #[validate(length(min = 1, max = 128, message = "user_id must be 1 to 128 characters"))]
    pub user_id: String,
    /// Role the caller claims.
    pub role: Role,
}

/// Request body for refreshing a still-valid credential.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RefreshCredentialRequest {
    /// The current bearer token.
    #[validate(length(min = 1, message = "token must not be empty"))]
    pub token: String,
}

/// A signed credential handed back to the client.
#[derive(Debug, Serialize, ToSchema)]
pub struct CredentialResponse {
    /// Bearer token to present on subsequent requests.
    pub token: String,
    /// RFC 3339 instant after which the token stops verifying.
    pub expires_at: String,
}

impl From<IssuedCredential> for CredentialResponse {
    fn from(value: IssuedCredential) -> Self {
        Self {
            token: value.token,
            expires_at: format_system_time(value.expires_at),
        }
    }
}
