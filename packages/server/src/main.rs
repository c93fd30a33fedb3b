use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use arena_server::assistant::{Assistant, DisabledAssistant, OpenAiAssistant};
use arena_server::config::AppConfig;
use arena_server::database::init_db;
use arena_server::judge::{DisabledJudge, HttpJudge, Judge};
use arena_server::{recovery, seed};
use arena_server::state::AppState;
use arena_server::utils::rate_limit::RateLimiter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn")),
        )
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;

    let db = init_db(&config.database.url)
        .await
        .context("Failed to connect to database")?;
    seed::seed_role_permissions(&db).await?;
    seed::ensure_indexes(&db).await?;
    seed::ensure_bootstrap_admin(&db, &config.auth).await?;
    recovery::fail_interrupted_submissions(&db).await?;

    let judge: Arc<dyn Judge> = if config.judge.enabled {
        info!(url = %config.judge.url, "Using HTTP judge");
        Arc::new(HttpJudge::new(config.judge.clone())?)
    } else {
        warn!("Judge disabled, submissions will be refused");
        Arc::new(DisabledJudge)
    };

    let assistant: Arc<dyn Assistant> = if config.assistant.enabled {
        info!(model = %config.assistant.model, "Assistant enabled");
        Arc::new(OpenAiAssistant::new(&config.assistant)?)
    } else {
        Arc::new(DisabledAssistant)
    };

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let state = AppState {
        db,
        config: Arc::new(config),
        judge,
        assistant,
        run_limiter: Arc::new(RateLimiter::per_minute()),
    };

    let app = arena_server::build_router(state);

    info!("Server running at http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C, shutting down");
}
