use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};

use crate::error::{AuthError, AuthResult};
use crate::extractors::{extract_bearer, AuthContext};
use crate::permissions::check_permission;
use crate::verifier::JwtVerifier;

/// Run the full pipeline for one request: extract the bearer token, verify
/// it, then check `permission` against the verified claims.
pub async fn authorize(
    verifier: &JwtVerifier,
    headers: &HeaderMap,
    permission: &str,
) -> AuthResult<AuthContext> {
    let token = extract_bearer(headers)?;
    authorize_token(verifier, &token, permission).await
}

/// Verify an already extracted bearer token and check `permission`.
pub async fn authorize_token(
    verifier: &JwtVerifier,
    token: &str,
    permission: &str,
) -> AuthResult<AuthContext> {
    let claims = verifier.verify(token).await?;
    check_permission(&claims, permission)?;
    Ok(AuthContext { claims })
}

/// Middleware state binding a verifier to the permission one route needs.
#[derive(Clone)]
pub struct PermissionGuard {
    verifier: Arc<JwtVerifier>,
    permission: &'static str,
}

impl PermissionGuard {
    pub fn new(verifier: Arc<JwtVerifier>, permission: &'static str) -> Self {
        Self {
            verifier,
            permission,
        }
    }

    pub fn permission(&self) -> &'static str {
        self.permission
    }

    pub async fn authorize(&self, headers: &HeaderMap) -> AuthResult<AuthContext> {
        authorize(&self.verifier, headers, self.permission).await
    }

    pub async fn authorize_token(&self, token: &str) -> AuthResult<AuthContext> {
        authorize_token(&self.verifier, token, self.permission).await
    }
}

/// Axum middleware enforcing a [`PermissionGuard`].
///
/// `E` is the boundary's error type; it decides how a rejection is rendered.
/// On success the [`AuthContext`] is inserted into request extensions and the
/// inner handler runs once; on failure it never runs.
///
/// ```ignore
/// let guard = PermissionGuard::new(verifier, "post:drinks");
/// post(create_drink).route_layer(from_fn_with_state(guard, require_permission::<ApiError>))
/// ```
pub async fn require_permission<E>(
    State(guard): State<PermissionGuard>,
    mut request: Request,
    next: Next,
) -> Result<Response, E>
where
    E: From<AuthError> + IntoResponse + Send + 'static,
{
    // no borrow of `request` may live across the await below
    let token = extract_bearer(request.headers());
    let outcome = match token {
        Ok(token) => guard.authorize_token(&token).await,
        Err(err) => Err(err),
    };

    let context = match outcome {
        Ok(context) => context,
        Err(err) => {
            if err.is_infrastructure() {
                warn!(permission = guard.permission(), error = %err, "authorization unavailable");
            } else {
                debug!(permission = guard.permission(), code = err.code(), error = %err, "request rejected");
            }
            return Err(E::from(err));
        }
    };

    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}
