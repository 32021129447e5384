use std::sync::Arc;

use anyhow::Context;
use menu_service::app::{build_jwt_verifier, build_router, cors_layer, spawn_jwks_refresh};
use menu_service::config::Config;
use menu_service::store::{DrinkStore, InMemoryDrinkStore, PgDrinkStore};
use menu_service::AppState;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;

    let drinks: Arc<dyn DrinkStore> = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(url)
                .await
                .context("failed to connect to DATABASE_URL")?;
            // Ensure database schema is up to date before serving traffic
            sqlx::migrate!("./migrations").run(&pool).await?;
            Arc::new(PgDrinkStore::new(pool))
        }
        None => {
            warn!("DATABASE_URL not set; drinks are kept in memory and lost on restart");
            Arc::new(InMemoryDrinkStore::new())
        }
    };

    let jwt_verifier = build_jwt_verifier(&config).await?;
    spawn_jwks_refresh(jwt_verifier.clone(), config.jwks_refresh);

    let state = AppState::new(drinks, jwt_verifier);
    let app = build_router(state).layer(cors_layer(&config.cors_allowed_origins));

    let addr = config.addr();
    info!(%addr, "starting menu-service");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
