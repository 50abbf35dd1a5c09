use axum::{
    middleware as axum_mw,
    routing::{get, post, put},
    Router,
};
use http::{header, HeaderValue};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

mod config;
mod db;
mod error;
mod middleware;
mod models;
mod routes;
mod services;
mod store;


use config::{Config, StoreBackend};
use middleware::rate_limit::RateLimiter;
use services::change_feed::ChangeFeed;
use services::ledger::Ledger;
use store::{LedgerStore, MemoryStore, PgStore};

#[derive(Clone)]
pub struct AppState {
    pub ledger: Ledger,
    pub config: Arc<Config>,
    pub rate_limiter: RateLimiter,
    pub write_rate_limiter: RateLimiter,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn LedgerStore>) -> Self {
        let feed = ChangeFeed::new(config.ledger.feed_capacity);
        let ledger = Ledger::new(store, feed, config.ledger.bookings_page_size);
        let rate_limiter =
            RateLimiter::new(config.rate_limit.max_requests, config.rate_limit.window_secs);
        let write_rate_limiter =
            RateLimiter::new(config.rate_limit.write_max, config.rate_limit.window_secs);

        Self {
            ledger,
            config: Arc::new(config),
            rate_limiter,
            write_rate_limiter,
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| o.parse::<HeaderValue>().ok())
        .collect();
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(AllowOrigin::list(allowed))
    }
}

fn build_router(state: AppState) -> Router {
    // --- Team-scoped routes (the team id is the only credential) ---
    let team_routes = Router::new()
        .route("/", post(routes::teams::create_team))
        .route("/:teamId", get(routes::teams::get_team))
        .route(
            "/:teamId/players",
            get(routes::players::list_players).post(routes::players::add_player),
        )
        .route(
            "/:teamId/players/:playerId",
            put(routes::players::rename_player).delete(routes::players::delete_player),
        )
        .route("/:teamId/rotation", get(routes::rotation::get_rotation))
        .route("/:teamId/rotation/skip", post(routes::rotation::skip))
        .route(
            "/:teamId/bookings",
            get(routes::bookings::list_bookings).post(routes::bookings::create_booking),
        )
        .route(
            "/:teamId/bookings/:bookingId",
            put(routes::bookings::edit_booking).delete(routes::bookings::delete_booking),
        )
        .route("/:teamId/statistics", get(routes::statistics::get_statistics))
        .route("/:teamId/reconcile", post(routes::statistics::reconcile))
        .route("/:teamId/events", get(routes::events::stream_team_events))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::write_rate_limit,
        ));

    // --- Compose full API ---
    let api = Router::new()
        .route("/resolve", get(routes::teams::resolve))
        .nest("/teams", team_routes);

    Router::new()
        .nest("/api/v1", api)
        .route("/health", get(routes::health::health))
        // Global middleware
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::localization::locale_detector,
        ))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::rate_limit,
        ))
        // Balances change with every booking
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
    tracing::info!("Shutting down");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .json()
        .init();

    let store: Arc<dyn LedgerStore> = match config.store {
        StoreBackend::Postgres => Arc::new(PgStore::new(db::create_pool(&config).await?)),
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(
        env = %config.app_env,
        store = ?config.store,
        %addr,
        "Next-up API initialized (Rust/Axum)"
    );

    let state = AppState::new(config, store);
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    Ok(())
}
