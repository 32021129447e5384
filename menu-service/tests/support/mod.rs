#![allow(dead_code)]

use std::sync::{Arc, OnceLock};

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use common_auth::{InMemoryKeyStore, JwksFetcher, JwtConfig, JwtVerifier};
use http_body_util::BodyExt;
use jsonwebtoken::{encode, Algorithm, DecodingKey, EncodingKey, Header};
use menu_service::store::{DrinkStore, InMemoryDrinkStore};
use menu_service::{build_router, AppState};
use rsa::pkcs1::{EncodeRsaPrivateKey, EncodeRsaPublicKey, LineEnding};
use rsa::rand_core::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde_json::{json, Value};
use tower::ServiceExt;

pub const ISSUER: &str = "https://coffee.test/";
pub const AUDIENCE: &str = "drinks";
pub const KID: &str = "test-key";

pub struct KeyMaterial {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub modulus: String,
    pub exponent: String,
    pub public_pem: String,
}

pub fn keys() -> &'static KeyMaterial {
    static MATERIAL: OnceLock<KeyMaterial> = OnceLock::new();
    MATERIAL.get_or_init(|| {
        let mut rng = OsRng;
        let private_key = RsaPrivateKey::new(&mut rng, 2048).expect("key generation");
        let public_key = private_key.to_public_key();
        let private_pem = private_key.to_pkcs1_pem(LineEnding::LF).expect("private pem");
        let public_pem = public_key.to_pkcs1_pem(LineEnding::LF).expect("public pem");

        KeyMaterial {
            encoding: EncodingKey::from_rsa_pem(private_pem.as_bytes()).expect("encoding key"),
            decoding: DecodingKey::from_rsa_pem(public_pem.as_bytes()).expect("decoding key"),
            modulus: URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
            exponent: URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
            public_pem,
        }
    })
}

pub fn sign(kid: &str, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    encode(&header, claims, &keys().encoding).expect("sign token")
}

pub fn claims(permissions: &[&str]) -> Value {
    let now = Utc::now().timestamp();
    json!({
        "iss": ISSUER,
        "aud": AUDIENCE,
        "sub": "auth0|manager",
        "iat": now,
        "exp": now + 600,
        "permissions": permissions,
    })
}

pub fn bearer(permissions: &[&str]) -> String {
    format!("Bearer {}", sign(KID, &claims(permissions)))
}

pub struct TestApp {
    pub router: Router,
    pub drinks: Arc<InMemoryDrinkStore>,
}

impl TestApp {
    /// Verifier preloaded with the test key; no JWKS endpoint.
    pub fn new() -> Self {
        let store = InMemoryKeyStore::new();
        store.insert_key(KID, keys().decoding.clone());
        let verifier = JwtVerifier::with_store(JwtConfig::new(ISSUER, AUDIENCE), store);
        Self::with_verifier(verifier)
    }

    /// Verifier with an empty cache backed by `jwks_url`.
    pub async fn with_jwks(jwks_url: String) -> Self {
        let verifier = JwtVerifier::builder(JwtConfig::new(ISSUER, AUDIENCE))
            .with_jwks_fetcher(JwksFetcher::new(jwks_url).expect("client"))
            .build()
            .await;
        Self::with_verifier(verifier)
    }

    fn with_verifier(verifier: JwtVerifier) -> Self {
        Self::with_shared_verifier(Arc::new(verifier))
    }

    pub fn with_shared_verifier(verifier: Arc<JwtVerifier>) -> Self {
        let drinks = Arc::new(InMemoryDrinkStore::new());
        let store: Arc<dyn DrinkStore> = drinks.clone();
        let state = AppState::new(store, verifier);
        Self {
            router: build_router(state),
            drinks,
        }
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        authorization: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(value) = authorization {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).expect("request"))
            .await
            .expect("response");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        let value = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, value)
    }
}

pub fn jwks_body(kid: &str) -> Value {
    json!({
        "keys": [{
            "kid": kid,
            "kty": "RSA",
            "alg": "RS256",
            "use": "sig",
            "n": keys().modulus,
            "e": keys().exponent
        }]
    })
}
