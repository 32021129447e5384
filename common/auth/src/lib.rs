pub mod claims;
pub mod config;
pub mod error;
pub mod extractors;
pub mod guards;
pub mod jwks;
pub mod permissions;
pub mod verifier;

#[cfg(test)]
mod test_support;

pub use claims::Claims;
pub use config::JwtConfig;
pub use error::{AuthError, AuthResult};
pub use extractors::{extract_bearer, AuthContext};
pub use guards::{authorize, authorize_token, require_permission, PermissionGuard};
pub use jsonwebtoken::Algorithm;
pub use jwks::JwksFetcher;
pub use permissions::check_permission;
pub use verifier::{InMemoryKeyStore, JwtVerifier, JwtVerifierBuilder};
