use axum::http::StatusCode;
use jsonwebtoken::errors::ErrorKind;
use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

/// Every way the authorization pipeline can reject a request.
///
/// The core never renders these; the HTTP boundary reads `status_code`,
/// `code` and the `Display` text (the human description) and builds its own
/// response body.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authorization header is expected")]
    MissingAuthorization,
    #[error("authorization header is malformed: {0}")]
    InvalidAuthorization(&'static str),
    #[error("malformed token: {0}")]
    MalformedToken(String),
    #[error("token header missing alg")]
    MissingAlgorithm,
    #[error("token alg '{found}' does not match expected '{expected}'")]
    AlgorithmMismatch { expected: String, found: String },
    #[error("token header missing kid")]
    MissingKeyId,
    #[error("unable to find the appropriate key for kid '{0}'")]
    UnknownKeyId(String),
    #[error("token verification failed: {0}")]
    Verification(String),
    #[error("token expired")]
    TokenExpired,
    #[error("incorrect claims, please check the audience and issuer")]
    InvalidClaims,
    #[error("malformed claim payload: {0}")]
    MalformedClaims(String),
    #[error("permissions not included in JWT")]
    MissingPermissions,
    #[error("permission '{0}' not found")]
    PermissionDenied(String),
    #[error("failed to parse decoding key for kid '{0}': {1}")]
    KeyParse(String, String),
    #[error("failed to fetch JWKS: {0}")]
    JwksFetch(String),
    #[error("failed to parse JWKS response: {0}")]
    JwksDecode(String),
    #[error("JWKS entry missing key id (kid)")]
    JwksMissingKid,
    #[error("JWKS key '{0}' missing required RSA components")]
    JwksMissingComponents(String),
    #[error("JWKS key '{kid}' uses unsupported key type '{kty}'")]
    JwksUnsupportedKey { kid: String, kty: String },
    #[error("JWKS key '{kid}' uses unsupported alg '{alg}'")]
    JwksUnsupportedAlg { kid: String, alg: String },
    #[error("JWKS at {0} contains no usable signing keys")]
    JwksNoUsableKeys(String),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MalformedToken(_)
            | AuthError::MalformedClaims(_)
            | AuthError::MissingPermissions => StatusCode::BAD_REQUEST,
            AuthError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            AuthError::KeyParse(_, _)
            | AuthError::JwksFetch(_)
            | AuthError::JwksDecode(_)
            | AuthError::JwksMissingKid
            | AuthError::JwksMissingComponents(_)
            | AuthError::JwksUnsupportedKey { .. }
            | AuthError::JwksUnsupportedAlg { .. }
            | AuthError::JwksNoUsableKeys(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AuthError::MissingAuthorization
            | AuthError::InvalidAuthorization(_)
            | AuthError::MissingAlgorithm
            | AuthError::AlgorithmMismatch { .. }
            | AuthError::MissingKeyId
            | AuthError::UnknownKeyId(_)
            | AuthError::Verification(_)
            | AuthError::TokenExpired
            | AuthError::InvalidClaims => StatusCode::UNAUTHORIZED,
        }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingAuthorization => "authorization_header_missing",
            AuthError::InvalidAuthorization(_)
            | AuthError::MalformedToken(_)
            | AuthError::MissingAlgorithm
            | AuthError::AlgorithmMismatch { .. }
            | AuthError::MissingKeyId
            | AuthError::UnknownKeyId(_) => "invalid_header",
            AuthError::Verification(_) => "invalid_token",
            AuthError::TokenExpired => "token_expired",
            AuthError::InvalidClaims
            | AuthError::MalformedClaims(_)
            | AuthError::MissingPermissions => "invalid_claims",
            AuthError::PermissionDenied(_) => "unauthorized",
            AuthError::KeyParse(_, _)
            | AuthError::JwksFetch(_)
            | AuthError::JwksDecode(_)
            | AuthError::JwksMissingKid
            | AuthError::JwksMissingComponents(_)
            | AuthError::JwksUnsupportedKey { .. }
            | AuthError::JwksUnsupportedAlg { .. }
            | AuthError::JwksNoUsableKeys(_) => "jwks_unavailable",
        }
    }

    pub fn description(&self) -> String {
        self.to_string()
    }

    /// True for failures caused by the key-set infrastructure rather than by
    /// the presented credential.
    pub fn is_infrastructure(&self) -> bool {
        self.status_code().is_server_error()
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(value: jsonwebtoken::errors::Error) -> Self {
        match value.kind() {
            ErrorKind::ExpiredSignature => Self::TokenExpired,
            ErrorKind::InvalidAudience
            | ErrorKind::InvalidIssuer
            | ErrorKind::MissingRequiredClaim(_) => Self::InvalidClaims,
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => Self::MalformedToken(value.to_string()),
            _ => Self::Verification(value.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(
            AuthError::MissingAuthorization.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::MalformedToken("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AuthError::UnknownKeyId("kid".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AuthError::TokenExpired.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::InvalidClaims.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AuthError::MissingPermissions.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AuthError::PermissionDenied("delete:drinks".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AuthError::JwksFetch("timeout".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert!(AuthError::JwksDecode("eof".into()).is_infrastructure());
        assert!(!AuthError::TokenExpired.is_infrastructure());
    }

    #[test]
    fn jsonwebtoken_kinds_are_classified() {
        let expired: AuthError = jsonwebtoken::errors::Error::from(ErrorKind::ExpiredSignature).into();
        assert!(matches!(expired, AuthError::TokenExpired));

        let audience: AuthError = jsonwebtoken::errors::Error::from(ErrorKind::InvalidAudience).into();
        assert!(matches!(audience, AuthError::InvalidClaims));

        let signature: AuthError = jsonwebtoken::errors::Error::from(ErrorKind::InvalidSignature).into();
        assert_eq!(signature.code(), "invalid_token");
        assert_eq!(signature.status_code(), StatusCode::UNAUTHORIZED);
    }
}
