mod campaigns;
mod config;
mod db;
mod discovery;
mod errors;
mod leads;
mod messaging;
mod models;
mod routes;
mod state;
#[cfg(test)]
mod test_support;

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::campaigns::dispatch::PgDispatchStore;
use crate::config::Config;
use crate::db::create_pool;
use crate::discovery::places::PlacesClient;
use crate::messaging::whatsapp::WhatsAppClient;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("prospector_api={}", &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Prospector API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url, config.db_max_connections).await?;

    let http_timeout = Duration::from_secs(config.http_timeout_secs);

    // Google Places: without a key, discovery serves sample leads
    let places = PlacesClient::new(
        config.google_places_api_key.clone(),
        config.places_base_url.clone(),
        config.search_radius_meters,
        http_timeout,
    )?;
    if places.is_configured() {
        info!(
            "Places client initialized (radius: {}m)",
            places.radius_meters()
        );
    } else {
        warn!("GOOGLE_PLACES_API_KEY not set; lead discovery runs in mock mode");
    }

    // WhatsApp gateway
    let whatsapp = WhatsAppClient::new(config.evolution.clone(), http_timeout)?;
    if !whatsapp.is_configured() {
        warn!("Evolution API not configured; /api/chat/send will fail");
    }

    let state = AppState {
        dispatch: PgDispatchStore::new(db.clone()),
        db,
        places,
        whatsapp,
    };

    let app = build_router(state)
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.request_timeout_secs,
        )))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the dashboard host is fixed

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
