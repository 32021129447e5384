use jsonwebtoken::Algorithm;

/// Runtime configuration for JWT verification.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Expected issuer claim (iss).
    pub issuer: String,
    /// Expected audience claim (aud).
    pub audience: String,
    /// Signing algorithm every accepted token must use. The token header's
    /// `alg` is only compared against this, never used to pick a verifier.
    pub algorithm: Algorithm,
    /// Allowable clock skew in seconds when validating exp/nbf.
    pub leeway_seconds: u32,
}

impl JwtConfig {
    /// Construct config with sensible defaults (RS256, 30 second leeway).
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
            algorithm: Algorithm::RS256,
            leeway_seconds: 30,
        }
    }

    /// Adjust the allowed leeway.
    pub fn with_leeway(mut self, seconds: u32) -> Self {
        self.leeway_seconds = seconds;
        self
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Issuer URL for an Auth0-style tenant domain (`https://<domain>/`).
    pub fn issuer_for_domain(domain: &str) -> String {
        format!("https://{}/", domain.trim_end_matches('/'))
    }

    /// Well-known JWKS location for an Auth0-style tenant domain.
    pub fn jwks_url_for_domain(domain: &str) -> String {
        format!(
            "https://{}/.well-known/jwks.json",
            domain.trim_end_matches('/')
        )
    }
}
