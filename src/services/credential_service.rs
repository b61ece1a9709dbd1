//! Opaque session credentials binding a user identity to a role.
//!
//! The gateway and the lifecycle engine only ever see the verified
//! [`Identity`]; raw tokens stop at the boundary.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::{extract::FromRequestParts, http::request::Parts};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{error::AppError, error::ServiceError, state::SharedState};

/// Role carried by a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Can create, activate, and end polls; sees drafts and teacher events.
    Teacher,
    /// Can vote; sees live polls and public events.
    Student,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Teacher => f.write_str("teacher"),
            Role::Student => f.write_str("student"),
        }
    }
}

/// Verified identity attached to a connection or request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Stable user identifier.
    pub user_id: String,
    /// Role the credential was issued for.
    pub role: Role,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    role: Role,
    iat: u64,
    exp: u64,
}

/// A freshly issued credential and its expiry instant.
#[derive(Debug, Clone)]
pub struct IssuedCredential {
    /// Signed bearer token.
    pub token: String,
    /// Moment after which the token stops verifying.
    pub expires_at: SystemTime,
}

/// Issues and verifies signed session credentials.
pub struct CredentialService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl CredentialService {
    /// Build a credential service from a shared secret and token lifetime.
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
            ttl,
        }
    }

    /// Issue a credential binding `user_id` to `role`.
    pub fn issue(&self, user_id: &str, role: Role) -> Result<IssuedCredential, ServiceError> {
        let now = unix_now();
        let expires_in = self.ttl.as_secs();
        let claims = Claims {
            sub: user_id.to_owned(),
            role,
            iat: now,
            exp: now + expires_in,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding)
            .map_err(|err| ServiceError::Unauthorized(format!("failed to sign token: {err}")))?;

        Ok(IssuedCredential {
            token,
            expires_at: UNIX_EPOCH + Duration::from_secs(claims.exp),
        })
    }

    /// Verify a bearer token, returning the identity it binds.
    pub fn verify(&self, token: &str) -> Result<Identity, ServiceError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|_| ServiceError::Unauthorized("invalid credential".into()))?;

        Ok(Identity {
            user_id: data.claims.sub,
            role: data.claims.role,
        })
    }

    /// Re-issue a credential for the identity carried by a still-valid token.
    pub fn refresh(&self, token: &str) -> Result<IssuedCredential, ServiceError> {
        let identity = self.verify(token)?;
        self.issue(&identity.user_id, identity.role)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

impl FromRequestParts<SharedState> for Identity {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("missing `Authorization` header".into()))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Unauthorized("expected a bearer token".into()))?;

        state.credentials().verify(token).map_err(AppError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> CredentialService {
        CredentialService::new("unit-test-secret", Duration::from_secs(3600))
    }

    #[test]
    fn issued_credential_round_trips() {
        let service = service();
        let issued = service.issue("student-7", Role::Student).unwrap();
        let identity = service.verify(&issued.token).unwrap();
        assert_eq!(identity.user_id, "student-7");
        assert_eq!(identity.role, Role::Student);
    }

    #[test]
    fn tampered_token_is_rejected() {
        let service = service();
        let issued = service.issue("teacher-1", Role::Teacher).unwrap();
        let mut tampered = issued.token.clone();
        tampered.pop();
        tampered.push('x');
        assert!(service.verify(&tampered).is_err());
    }

    #[test]
    fn foreign_secret_is_rejected() {
        let issued = service().issue("teacher-1", Role::Teacher).unwrap();
        let other = CredentialService::new("different-secret", Duration::from_secs(3600));
        assert!(other.verify(&issued.token).is_err());
    }

    #[test]
    fn refresh_preserves_identity() {
        let service = service();
        let issued = service.issue("teacher-2", Role::Teacher).unwrap();
        let refreshed = service.refresh(&issued.token).unwrap();
        let identity = service.verify(&refreshed.token).unwrap();
        assert_eq!(identity.user_id, "teacher-2");
        assert_eq!(identity.role, Role::Teacher);
    }
}
