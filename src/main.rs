use anyhow::Context;
use axum::extract::State;
use axum::{http::Method, response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

mod config;
mod database;
mod dtos;
mod errors;
mod handlers;
mod middleware;
mod models;
mod routes;
mod services;
mod state;

use config::AppConfig;
use database::connection::get_db_client;
use database::memory::MemoryStore;
use database::mongo::MongoStore;
use database::store::AuthStore;
use services::email_service::{HttpMailer, LogMailer, Mailer};
use services::key_lock::KeyLocks;
use services::token_service::TokenService;
use services::AuthContext;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let app_state = initialize_app_state(&config).await?;

    let app = build_router(app_state);
    start_server(app, &config).await
}

async fn initialize_app_state(config: &AppConfig) -> anyhow::Result<AppState> {
    let store: Arc<dyn AuthStore> = match &config.database_url {
        Some(url) => {
            let db = get_db_client(url, &config.database_name)
                .await
                .context("failed to connect to MongoDB")?;
            Arc::new(MongoStore::new(db).await.context("failed to prepare collections")?)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let mailer: Arc<dyn Mailer> = match &config.email {
        Some(email) => {
            tracing::info!("Email delivery via {}", email.api_url);
            Arc::new(HttpMailer::new(email))
        }
        None => {
            tracing::warn!("Email API not configured, OTP emails will be dropped");
            Arc::new(LogMailer)
        }
    };

    Ok(AppState::new(AuthContext {
        store,
        mailer,
        tokens: TokenService::new(&config.jwt_secret, config.session_ttl),
        locks: KeyLocks::new(),
        policy: config.policy,
        bcrypt_cost: config.bcrypt_cost,
    }))
}

fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .allow_credentials(false);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/auth", routes::auth::routes(app_state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(app_state)
}

async fn start_server(app: Router, config: &AppConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.host, config.port))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;

    tracing::info!("Server starting on {}", addr);
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let database = match state.store.ping().await {
        Ok(()) => "connected",
        Err(e) => {
            tracing::warn!("Health check ping failed: {}", e);
            "disconnected"
        }
    };

    Json(json!({
        "status": "healthy",
        "database": database,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
