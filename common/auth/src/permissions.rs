use crate::claims::Claims;
use crate::error::{AuthError, AuthResult};

/// Confirm that verified `claims` grant `required`.
///
/// A token with no `permissions` claim at all is a token-format problem
/// (400); a list without the permission is a refusal (403).
pub fn check_permission(claims: &Claims, required: &str) -> AuthResult<()> {
    let granted = claims
        .permissions
        .as_deref()
        .ok_or(AuthError::MissingPermissions)?;

    if granted.iter().any(|permission| permission == required) {
        Ok(())
    } else {
        Err(AuthError::PermissionDenied(required.to_string()))
    }
}
