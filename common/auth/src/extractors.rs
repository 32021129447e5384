use axum::http::{header::AUTHORIZATION, HeaderMap};

use crate::claims::Claims;
use crate::error::{AuthError, AuthResult};

/// Verified caller identity, placed in request extensions by the permission
/// guard. Handlers take it with `Extension<AuthContext>`.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub claims: Claims,
}

impl AuthContext {
    pub fn has_permission(&self, permission: &str) -> bool {
        self.claims.has_permission(permission)
    }

    pub fn subject(&self) -> Option<&str> {
        self.claims.subject.as_deref()
    }

    pub fn into_claims(self) -> Claims {
        self.claims
    }
}

/// Pull the raw token out of an `Authorization: Bearer <token>` header.
///
/// The scheme keyword is matched case-sensitively and exactly one token must
/// follow it.
pub fn extract_bearer(headers: &HeaderMap) -> AuthResult<String> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingAuthorization)?;

    let raw = value
        .to_str()
        .map_err(|_| AuthError::InvalidAuthorization("header is not visible ASCII"))?;

    let mut parts = raw.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) => Ok(token.to_owned()),
        (Some("Bearer"), None, _) => Err(AuthError::InvalidAuthorization("token not found")),
        (Some("Bearer"), Some(_), Some(_)) => Err(AuthError::InvalidAuthorization(
            "authorization header must be a single bearer token",
        )),
        _ => Err(AuthError::InvalidAuthorization(
            "authorization header must start with \"Bearer\"",
        )),
    }
}
