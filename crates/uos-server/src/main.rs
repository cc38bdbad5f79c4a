#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod api;
mod middleware;

use api::chat::{poll_chat, submit_chat};
use api::market::{dexscreener_history, dexscreener_pairs, price_history, trust_analysis};
use api::state::AppState;
use axum::{
    Router,
    http::{Method, header},
    routing::get,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use uos_core::AppCore;
use uos_core::config::AppConfig;

#[derive(serde::Serialize)]
struct Health {
    status: String,
}

async fn health() -> axum::Json<Health> {
    axum::Json(Health {
        status: "universal os backend is working!".to_string(),
    })
}

#[tokio::main]
async fn main() {
    // Initialize tracing logger
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,uos_server=debug".into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    tracing::info!("Starting Universal OS backend server");

    let config = AppConfig::load().expect("Failed to load configuration");
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    let core = Arc::new(AppCore::new(config).expect("Failed to initialize app core"));
    core.executor.start().await;

    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    let app = Router::new()
        .route("/health", get(health))
        // Chat intake and polling
        .route("/chat", get(poll_chat).post(submit_chat))
        // Market data endpoints
        .route("/trust", get(trust_analysis))
        .route("/dexscreener", get(dexscreener_pairs))
        .route("/dexscreener/history", get(dexscreener_history))
        .route("/price-history", get(price_history))
        .layer(cors)
        .with_state(AppState::new(core));

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("Failed to bind server address");

    tracing::info!("Universal OS backend running on http://{}", bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
