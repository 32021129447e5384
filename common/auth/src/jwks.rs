use std::str::FromStr;
use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{AuthError, AuthResult};

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Downloads the issuer's published key set.
#[derive(Clone)]
pub struct JwksFetcher {
    client: Client,
    url: String,
}

impl JwksFetcher {
    pub fn new(url: impl Into<String>) -> AuthResult<Self> {
        Self::with_timeout(url, DEFAULT_FETCH_TIMEOUT)
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> AuthResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AuthError::JwksFetch(err.to_string()))?;
        Ok(Self::with_client(client, url))
    }

    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch the key set and turn every signing key into a decoding key for
    /// `algorithm`. Encryption keys (`"use": "enc"`) are skipped, as are
    /// entries of another key type or alg; only a set with no usable key left
    /// is an error.
    pub async fn fetch(&self, algorithm: Algorithm) -> AuthResult<Vec<(String, DecodingKey)>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|err| AuthError::JwksFetch(err.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::JwksFetch(format!(
                "HTTP {} from {}",
                response.status(),
                self.url
            )));
        }

        let body: JwksResponse = response
            .json()
            .await
            .map_err(|err| AuthError::JwksDecode(err.to_string()))?;

        let mut keys = Vec::new();
        for entry in body.keys {
            match entry.into_decoding_key(algorithm) {
                Ok(Some(key)) => keys.push(key),
                Ok(None) => {}
                Err(err) => {
                    warn!(error = %err, jwks_url = %self.url, "skipping unusable JWKS entry");
                }
            }
        }

        if keys.is_empty() {
            return Err(AuthError::JwksNoUsableKeys(self.url.clone()));
        }
        Ok(keys)
    }
}

#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<JwkEntry>,
}

#[derive(Debug, Deserialize)]
struct JwkEntry {
    kid: Option<String>,
    kty: Option<String>,
    alg: Option<String>,
    #[serde(rename = "use")]
    key_use: Option<String>,
    n: Option<String>,
    e: Option<String>,
}

impl JwkEntry {
    /// `Ok(None)` for encryption keys, which are never used to verify.
    fn into_decoding_key(self, algorithm: Algorithm) -> AuthResult<Option<(String, DecodingKey)>> {
        let kid = self.kid.ok_or(AuthError::JwksMissingKid)?;
        if self.key_use.as_deref() == Some("enc") {
            debug!(kid = %kid, "skipping encryption key in JWKS");
            return Ok(None);
        }

        let kty = self.kty.unwrap_or_else(|| "RSA".to_string());
        if kty != "RSA" {
            return Err(AuthError::JwksUnsupportedKey { kid, kty });
        }

        if let Some(alg) = self.alg {
            if Algorithm::from_str(&alg).ok() != Some(algorithm) {
                return Err(AuthError::JwksUnsupportedAlg { kid, alg });
            }
        }

        let (Some(modulus), Some(exponent)) = (self.n, self.e) else {
            return Err(AuthError::JwksMissingComponents(kid));
        };

        let key = DecodingKey::from_rsa_components(&modulus, &exponent)
            .map_err(|err| AuthError::KeyParse(kid.clone(), err.to_string()))?;
        Ok(Some((kid, key)))
    }
}
