use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::claims::Claims;
use crate::config::JwtConfig;
use crate::error::{AuthError, AuthResult};
use crate::jwks::JwksFetcher;

type KeyMap = HashMap<String, DecodingKey>;

/// Minimum gap between successful JWKS fetches triggered by unknown `kid`s.
pub const DEFAULT_MISS_REFRESH_COOLDOWN: Duration = Duration::from_secs(10);

#[derive(Default)]
struct KeySet {
    /// Statically configured keys; merged into every refreshed snapshot.
    pinned: KeyMap,
    active: Arc<KeyMap>,
}

/// Thread-safe store for decoding keys loaded from JWKS/PEM sources.
///
/// Writers build a complete map and swap it in, so a reader only ever sees
/// a whole key set. Keys added with [`insert_key`](Self::insert_key) or
/// [`insert_rsa_pem`](Self::insert_rsa_pem) are pinned and survive
/// [`replace_all`](Self::replace_all).
#[derive(Clone, Default)]
pub struct InMemoryKeyStore {
    inner: Arc<RwLock<KeySet>>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self) -> Arc<KeyMap> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .active
            .clone()
    }

    pub fn insert_key(&self, kid: impl Into<String>, key: DecodingKey) {
        let kid = kid.into();
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = KeyMap::clone(&guard.active);
        next.insert(kid.clone(), key.clone());
        guard.pinned.insert(kid, key);
        guard.active = Arc::new(next);
    }

    pub fn insert_rsa_pem(&self, kid: impl Into<String>, pem: &[u8]) -> AuthResult<()> {
        let kid = kid.into();
        let key = DecodingKey::from_rsa_pem(pem)
            .map_err(|err| AuthError::KeyParse(kid.clone(), err.to_string()))?;
        self.insert_key(kid, key);
        Ok(())
    }

    pub fn get(&self, kid: &str) -> Option<DecodingKey> {
        self.snapshot().get(kid).cloned()
    }

    pub fn contains(&self, kid: &str) -> bool {
        self.snapshot().contains_key(kid)
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Swap in a freshly fetched key set. Pinned keys win over fetched keys
    /// with the same `kid`.
    pub fn replace_all<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (String, DecodingKey)>,
    {
        let mut next: KeyMap = entries.into_iter().collect();
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        next.extend(
            guard
                .pinned
                .iter()
                .map(|(kid, key)| (kid.clone(), key.clone())),
        );
        guard.active = Arc::new(next);
    }
}

/// Header fields read before the signature is trusted.
#[derive(Debug, Deserialize)]
struct UnverifiedHeader {
    #[serde(default)]
    alg: Option<String>,
    #[serde(default)]
    kid: Option<String>,
}

/// Checks that `token` is three base64url segments with JSON header and
/// payload objects, and returns the header.
fn inspect(token: &str) -> AuthResult<UnverifiedHeader> {
    let mut segments = token.split('.');
    let (Some(header), Some(payload), Some(signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(AuthError::MalformedToken(
            "expected three dot-separated segments".to_string(),
        ));
    };

    let header: UnverifiedHeader = decode_segment(header, "header")?;
    decode_segment::<Map<String, Value>>(payload, "payload")?;
    URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|err| AuthError::MalformedToken(format!("signature is not base64url: {err}")))?;

    Ok(header)
}

fn decode_segment<T: DeserializeOwned>(segment: &str, name: &str) -> AuthResult<T> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|err| AuthError::MalformedToken(format!("{name} is not base64url: {err}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|err| AuthError::MalformedToken(format!("{name} is not a JSON object: {err}")))
}

#[derive(Default)]
struct RefreshState {
    last_success: Option<Instant>,
}

impl RefreshState {
    fn within(&self, cooldown: Duration) -> bool {
        self.last_success
            .is_some_and(|at| at.elapsed() < cooldown)
    }
}

#[derive(Clone)]
pub struct JwtVerifier {
    config: JwtConfig,
    store: InMemoryKeyStore,
    jwks: Option<JwksFetcher>,
    refresh: Arc<Mutex<RefreshState>>,
    miss_cooldown: Duration,
}

impl JwtVerifier {
    pub fn new(config: JwtConfig) -> Self {
        Self::with_store(config, InMemoryKeyStore::new())
    }

    pub fn with_store(config: JwtConfig, store: InMemoryKeyStore) -> Self {
        Self {
            config,
            store,
            jwks: None,
            refresh: Arc::default(),
            miss_cooldown: DEFAULT_MISS_REFRESH_COOLDOWN,
        }
    }

    pub fn builder(config: JwtConfig) -> JwtVerifierBuilder {
        JwtVerifierBuilder::new(config)
    }

    pub fn config(&self) -> &JwtConfig {
        &self.config
    }

    pub fn store(&self) -> &InMemoryKeyStore {
        &self.store
    }

    pub fn jwks_fetcher(&self) -> Option<&JwksFetcher> {
        self.jwks.as_ref()
    }

    /// Verify a raw bearer token and return its claims.
    ///
    /// Structural problems are reported before any key lookup, so a garbage
    /// token never triggers a JWKS fetch.
    pub async fn verify(&self, token: &str) -> AuthResult<Claims> {
        let header = inspect(token)?;

        let alg = header.alg.ok_or(AuthError::MissingAlgorithm)?;
        if Algorithm::from_str(&alg).ok() != Some(self.config.algorithm) {
            return Err(AuthError::AlgorithmMismatch {
                expected: format!("{:?}", self.config.algorithm),
                found: alg,
            });
        }

        let kid = header.kid.ok_or(AuthError::MissingKeyId)?;
        let key = self.resolve_key(&kid).await?;

        let token_data = decode::<Value>(token, &key, &self.validation())?;
        let claims = Claims::try_from(token_data.claims)?;
        debug!(kid = %kid, "verified JWT successfully");
        Ok(claims)
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(self.config.algorithm);
        validation.set_issuer(&[self.config.issuer.as_str()]);
        validation.set_audience(&[self.config.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        validation.leeway = self.config.leeway_seconds.into();
        validation
    }

    /// Cached key for `kid`, refreshing the JWKS once on a miss unless a
    /// fetch already succeeded within the miss cooldown.
    async fn resolve_key(&self, kid: &str) -> AuthResult<DecodingKey> {
        if let Some(key) = self.store.get(kid) {
            return Ok(key);
        }
        if self.jwks.is_none() {
            return Err(AuthError::UnknownKeyId(kid.to_string()));
        }

        let mut state = self.refresh.lock().await;
        // a concurrent miss may have refreshed while we waited
        if let Some(key) = self.store.get(kid) {
            return Ok(key);
        }
        if state.within(self.miss_cooldown) {
            debug!(kid, "kid not cached and JWKS refreshed recently; not refetching");
            return Err(AuthError::UnknownKeyId(kid.to_string()));
        }

        debug!(kid, "kid not cached, refreshing JWKS");
        self.refresh_locked(&mut state).await?;
        self.store
            .get(kid)
            .ok_or_else(|| AuthError::UnknownKeyId(kid.to_string()))
    }

    /// Refetch the JWKS regardless of the miss cooldown. Returns the number
    /// of fetched keys; a failed fetch leaves the cached set untouched.
    pub async fn refresh_jwks(&self) -> AuthResult<usize> {
        let mut state = self.refresh.lock().await;
        self.refresh_locked(&mut state).await
    }

    async fn refresh_locked(&self, state: &mut RefreshState) -> AuthResult<usize> {
        let fetcher = match &self.jwks {
            Some(fetcher) => fetcher,
            None => return Ok(0),
        };

        let keys = fetcher.fetch(self.config.algorithm).await?;
        let count = keys.len();
        self.store.replace_all(keys);
        state.last_success = Some(Instant::now());
        Ok(count)
    }
}

pub struct JwtVerifierBuilder {
    config: JwtConfig,
    store: InMemoryKeyStore,
    jwks: Option<JwksFetcher>,
    miss_cooldown: Duration,
}

impl JwtVerifierBuilder {
    fn new(config: JwtConfig) -> Self {
        Self {
            config,
            store: InMemoryKeyStore::new(),
            jwks: None,
            miss_cooldown: DEFAULT_MISS_REFRESH_COOLDOWN,
        }
    }

    pub fn with_store(mut self, store: InMemoryKeyStore) -> Self {
        self.store = store;
        self
    }

    pub fn with_decoding_key(self, kid: impl Into<String>, key: DecodingKey) -> Self {
        self.store.insert_key(kid, key);
        self
    }

    pub fn with_rsa_pem(self, kid: impl Into<String>, pem: &[u8]) -> AuthResult<Self> {
        self.store.insert_rsa_pem(kid, pem)?;
        Ok(self)
    }

    pub fn with_jwks_url(self, url: impl Into<String>) -> AuthResult<Self> {
        Ok(self.with_jwks_fetcher(JwksFetcher::new(url)?))
    }

    pub fn with_jwks_fetcher(mut self, fetcher: JwksFetcher) -> Self {
        self.jwks = Some(fetcher);
        self
    }

    pub fn with_miss_refresh_cooldown(mut self, cooldown: Duration) -> Self {
        self.miss_cooldown = cooldown;
        self
    }

    /// Build the verifier and warm the key cache. A failed warm-up is logged
    /// and left to the first cache miss to retry.
    pub async fn build(self) -> JwtVerifier {
        let verifier = JwtVerifier {
            config: self.config,
            store: self.store,
            jwks: self.jwks,
            refresh: Arc::default(),
            miss_cooldown: self.miss_cooldown,
        };

        if let Some(fetcher) = verifier.jwks_fetcher() {
            let url = fetcher.url().to_owned();
            match verifier.refresh_jwks().await {
                Ok(count) => debug!(count, jwks_url = %url, "loaded JWKS keys"),
                Err(err) => warn!(error = %err, jwks_url = %url, "initial JWKS fetch failed"),
            }
        }

        verifier
    }
}
