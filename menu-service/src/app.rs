use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::middleware;
use axum::routing::{delete, get, patch, post, MethodRouter};
use axum::Router;
use common_auth::{require_permission, JwksFetcher, JwtVerifier, PermissionGuard};
use tokio::time::{interval, MissedTickBehavior};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{debug, info, warn};

use crate::api_error::ApiError;
use crate::app_state::AppState;
use crate::config::Config;
use crate::drink_handlers::{
    create_drink, delete_drink, health, list_drinks, list_drinks_detail, not_found, update_drink,
};
use crate::permissions::{DELETE_DRINKS, GET_DRINKS_DETAIL, PATCH_DRINKS, POST_DRINKS};

/// `kid` under which `JWT_DEV_PUBLIC_KEY_PEM` is pinned, next to any JWKS keys.
pub const DEV_KEY_ID: &str = "local-dev";

/// Wrap `route` so it only runs for callers holding `permission`.
fn guarded(
    route: MethodRouter<AppState>,
    verifier: &Arc<JwtVerifier>,
    permission: &'static str,
) -> MethodRouter<AppState> {
    let guard = PermissionGuard::new(verifier.clone(), permission);
    route.route_layer(middleware::from_fn_with_state(
        guard,
        require_permission::<ApiError>,
    ))
}

pub fn build_router(state: AppState) -> Router {
    let verifier = state.jwt_verifier.clone();

    Router::new()
        .route("/healthz", get(health))
        .route(
            "/drinks",
            get(list_drinks).merge(guarded(post(create_drink), &verifier, POST_DRINKS)),
        )
        .route(
            "/drinks-detail",
            guarded(get(list_drinks_detail), &verifier, GET_DRINKS_DETAIL),
        )
        .route(
            "/drinks/:id",
            guarded(patch(update_drink), &verifier, PATCH_DRINKS)
                .merge(guarded(delete(delete_drink), &verifier, DELETE_DRINKS)),
        )
        .fallback(not_found)
        .with_state(state)
}

pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origin = if allowed_origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(
            allowed_origins
                .iter()
                .filter_map(|origin| origin.parse::<HeaderValue>().ok())
                .collect::<Vec<_>>(),
        )
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([ACCEPT, CONTENT_TYPE, AUTHORIZATION])
}

pub async fn build_jwt_verifier(config: &Config) -> anyhow::Result<Arc<JwtVerifier>> {
    let mut builder = JwtVerifier::builder(config.jwt.clone())
        .with_miss_refresh_cooldown(config.jwks_miss_cooldown);

    if let Some(url) = &config.jwks_url {
        info!(jwks_url = %url, "Configuring JWKS fetcher");
        let fetcher = JwksFetcher::with_timeout(url.clone(), config.jwks_timeout)
            .context("failed to build JWKS client")?;
        builder = builder.with_jwks_fetcher(fetcher);
    }

    if let Some(pem) = &config.dev_public_key_pem {
        warn!(kid = DEV_KEY_ID, "Using JWT_DEV_PUBLIC_KEY_PEM for verification; do not enable in production");
        builder = builder
            .with_rsa_pem(DEV_KEY_ID, pem.as_bytes())
            .map_err(anyhow::Error::from)?;
    }

    let verifier = builder.build().await;
    info!(keys = verifier.store().len(), "JWT verifier initialised");
    Ok(Arc::new(verifier))
}

pub fn spawn_jwks_refresh(verifier: Arc<JwtVerifier>, every: Duration) {
    let Some(fetcher) = verifier.jwks_fetcher() else {
        return;
    };

    let url = fetcher.url().to_owned();
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately and the builder already loaded keys
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match verifier.refresh_jwks().await {
                Ok(count) => {
                    debug!(count, jwks_url = %url, "Refreshed JWKS keys");
                }
                Err(err) => {
                    warn!(error = %err, jwks_url = %url, "Failed to refresh JWKS keys");
                }
            }
        }
    });
}
