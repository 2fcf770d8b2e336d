mod config;
mod db;
mod dtos;
mod error;
mod handler;
mod models;
mod routes;
mod service;

use std::sync::Arc;

use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use config::{Config, StoreBackend};
use db::{db::DBClient, memory::MemoryStore, ReferralStore};
use dotenv::dotenv;
use routes::create_router;
use service::{
    affiliate_service::AffiliateService, downline_service::DownlineService,
    report_service::ReportService,
};
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::filter::LevelFilter;

#[derive(Debug, Clone)]
pub struct AppState<S: ReferralStore> {
    pub affiliate_service: AffiliateService<S>,
    pub downline_service: DownlineService<S>,
    pub report_service: ReportService<S>,
}

impl<S: ReferralStore> AppState<S> {
    pub fn new(config: &Config, store: S) -> Self {
        AppState {
            affiliate_service: AffiliateService::new(store.clone(), config.registration_settings()),
            downline_service: DownlineService::new(store.clone()),
            report_service: ReportService::new(store),
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::DEBUG)
        .init();

    dotenv().ok();

    let config = Config::init();

    match config.store_backend {
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on restart");
            serve(config, MemoryStore::new()).await;
        }
        StoreBackend::Postgres => {
            let Some(database_url) = config.database_url.clone() else {
                tracing::error!("🔥 DATABASE_URL must be set for the postgres backend");
                std::process::exit(1);
            };

            let pool = match PgPoolOptions::new()
                .max_connections(config.db_max_connections)
                .connect(&database_url)
                .await
            {
                Ok(pool) => {
                    tracing::info!("✅ Connection to the database is successful!");
                    pool
                }
                Err(err) => {
                    tracing::error!("🔥 Failed to connect to the database: {:?}", err);
                    std::process::exit(1);
                }
            };

            let db_client = DBClient::new(pool);
            if let Err(err) = db_client.migrate().await {
                tracing::error!("🔥 Failed to run migrations: {:?}", err);
                std::process::exit(1);
            }

            let (size, idle) = db_client.pool_status();
            tracing::info!("Database pool ready: {} connections, {} idle", size, idle);

            serve(config, db_client).await;
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_headers([AUTHORIZATION, ACCEPT, CONTENT_TYPE])
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
}

async fn serve<S: ReferralStore>(config: Config, store: S) {
    let cors = cors_layer(&config.allowed_origins);
    let app_state = AppState::new(&config, store);

    let app = create_router(Arc::new(app_state)).layer(cors);

    let listener = match tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!("🔥 Failed to bind port {}: {}", config.port, err);
            std::process::exit(1);
        }
    };

    tracing::info!("🚀 Server is running on http://localhost:{}", config.port);

    if let Err(err) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", err);
    }
}
