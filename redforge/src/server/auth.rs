//! Bearer token authentication and role gating

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::ForgeError;
use crate::server::state::ServerState;

/// Caller role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    ReadOnly,
    Operator,
    Admin,
    /// Machine caller, counts as admin
    Service,
}

impl Role {
    fn rank(&self) -> u8 {
        match self {
            Role::ReadOnly => 0,
            Role::Operator => 1,
            Role::Admin | Role::Service => 2,
        }
    }

    /// Whether this role grants at least `required`
    pub fn allows(&self, required: Role) -> bool {
        self.rank() >= required.rank()
    }
}

/// Token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    #[serde(default)]
    pub name: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
}

/// Decode and verify an HS256 token
pub fn verify_token(token: &str, secret: &SecretString) -> Result<Claims, ForgeError> {
    let secret = secret.expose_secret();
    if secret.is_empty() {
        return Err(ForgeError::Unauthorized(
            "Authentication is not configured".to_string(),
        ));
    }

    let mut validation = Validation::new(Algorithm::HS256);
    validation.required_spec_claims.clear();
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| {
        debug!("Rejected token: {}", e);
        ForgeError::Unauthorized("Invalid token".to_string())
    })?;
    Ok(data.claims)
}

/// The authenticated caller of a request
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub claims: Claims,
}

impl AuthUser {
    /// Fail with `Forbidden` unless the caller holds `role`
    pub fn require(&self, role: Role) -> Result<(), ForgeError> {
        if self.claims.role.allows(role) {
            Ok(())
        } else {
            Err(ForgeError::Forbidden(
                "Insufficient role for this operation".to_string(),
            ))
        }
    }

    /// `User <id> (<name>)` for activity messages
    pub fn describe(&self) -> String {
        format!("User {} ({})", self.claims.sub, self.claims.name)
    }
}

impl FromRequestParts<Arc<ServerState>> for AuthUser {
    type Rejection = ForgeError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<ServerState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ForgeError::Unauthorized("Missing bearer token".to_string()))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ForgeError::Unauthorized("Missing bearer token".to_string()))?;

        let claims = verify_token(token.trim(), &state.auth_secret)?;
        Ok(AuthUser { claims })
    }
}
