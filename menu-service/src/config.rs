use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use common_auth::{Algorithm, JwtConfig};

const MIN_JWKS_REFRESH_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    /// `None` runs the service on the in-memory store.
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub jwks_url: Option<String>,
    pub jwks_timeout: Duration,
    pub jwks_refresh: Duration,
    /// Minimum gap between JWKS fetches caused by unknown key ids.
    pub jwks_miss_cooldown: Duration,
    pub dev_public_key_pem: Option<String>,
    /// Empty allows any origin.
    pub cors_allowed_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).and_then(|value| normalize_optional(&value));

        let host: IpAddr = var("HOST")
            .unwrap_or_else(|| "0.0.0.0".to_string())
            .parse()
            .context("HOST must be an IP address")?;
        let port = parse_or(&var, "PORT", 8090u16)?;

        let domain = var("AUTH0_DOMAIN");
        let issuer = var("JWT_ISSUER")
            .or_else(|| domain.as_deref().map(JwtConfig::issuer_for_domain))
            .ok_or_else(|| anyhow!("JWT_ISSUER or AUTH0_DOMAIN must be set"))?;
        let audience = var("API_AUDIENCE")
            .or_else(|| var("JWT_AUDIENCE"))
            .ok_or_else(|| anyhow!("API_AUDIENCE or JWT_AUDIENCE must be set"))?;

        let algorithm = match var("JWT_ALGORITHM") {
            Some(value) => parse_algorithm(&value)?,
            None => Algorithm::RS256,
        };
        let leeway = parse_or(&var, "JWT_LEEWAY_SECONDS", 30u32)?;
        let jwt = JwtConfig::new(issuer, audience)
            .with_algorithm(algorithm)
            .with_leeway(leeway);

        let jwks_url = var("JWT_JWKS_URL")
            .or_else(|| domain.as_deref().map(JwtConfig::jwks_url_for_domain));
        let dev_public_key_pem = var("JWT_DEV_PUBLIC_KEY_PEM").map(|pem| pem.replace("\\n", "\n"));
        if jwks_url.is_none() && dev_public_key_pem.is_none() {
            bail!("no signing keys configured: set AUTH0_DOMAIN, JWT_JWKS_URL or JWT_DEV_PUBLIC_KEY_PEM");
        }

        let jwks_timeout = Duration::from_secs(parse_or(&var, "JWKS_TIMEOUT_SECONDS", 5u64)?);
        let jwks_refresh = Duration::from_secs(
            parse_or(&var, "JWKS_REFRESH_SECONDS", 300u64)?.max(MIN_JWKS_REFRESH_SECS),
        );

        let jwks_miss_cooldown =
            Duration::from_secs(parse_or(&var, "JWKS_MISS_COOLDOWN_SECONDS", 10u64)?);

        let cors_allowed_origins = var("CORS_ALLOWED_ORIGINS")
            .map(|value| {
                value
                    .split(',')
                    .filter_map(normalize_optional)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        Ok(Self {
            host,
            port,
            database_url: var("DATABASE_URL"),
            jwt,
            jwks_url,
            jwks_timeout,
            jwks_refresh,
            jwks_miss_cooldown,
            dev_public_key_pem,
            cors_allowed_origins,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::from((self.host, self.port))
    }
}

fn normalize_optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(value) => value
            .parse()
            .with_context(|| format!("Failed to parse {key}")),
        None => Ok(default),
    }
}

/// Only RSA-family algorithms can be verified against a JWKS of RSA keys.
fn parse_algorithm(value: &str) -> Result<Algorithm> {
    let algorithm =
        Algorithm::from_str(value).map_err(|_| anyhow!("unknown JWT_ALGORITHM '{value}'"))?;
    match algorithm {
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => Ok(algorithm),
        _ => bail!("JWT_ALGORITHM '{value}' is not an RSA signing algorithm"),
    }
}
