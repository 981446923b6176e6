//! Consensus Service - dual-track proposal voting
//!
//! Proposals pass only when both the synthient track and the human track
//! reach consensus on their own. Either track's veto blocks the proposal.
//!
//! PIPELINE: every vote flows through the same steps:
//! - Ingestion: validate, then record under the proposal's lock
//! - Tally: recompute both tracks (threshold + veto)
//! - State machine: derive status and next action
//! - Audit: append a hash-chained entry once the lock is released

mod audit;
mod auth;
mod config;
mod consensus;
mod error;
mod models;
mod proposal;
mod routes;
mod state;

use crate::config::Settings;
use crate::routes::create_router;
use crate::state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Settings::load reads .env before tracing picks up RUST_LOG
    let settings = Settings::load()?;

    init_tracing();

    info!("🚀 Starting Consensus Service...");
    info!(
        "📋 Configuration loaded (threshold: {}, zeroth-gate open: {})",
        settings.consensus.approval_threshold, settings.consensus.zeroth_gate_open
    );

    let state = AppState::from_config(&settings.consensus)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open audit trail: {}", e))?;
    let state = Arc::new(state);

    let app = create_router(state, &settings);

    let addr = SocketAddr::from((settings.server.host, settings.server.port));

    info!("🌐 Server listening on http://{}", addr);
    info!("");
    info!("📚 API Endpoints:");
    info!("   GET  /health                           - Liveness check");
    info!("   POST /consensus/create                 - Create a proposal");
    info!("   POST /consensus/vote/{{proposalId}}      - Cast a vote");
    info!("   GET  /consensus/tally/{{proposalId}}     - Tally for one proposal");
    info!("   GET  /consensus/proposals?status=      - List proposals");
    info!("   GET  /consensus/proposals/{{proposalId}} - One proposal");
    info!("   GET  /consensus/vote-tallies           - Role-filtered tallies");
    info!("   GET  /consensus/metrics                - Aggregate track metrics");
    info!("   GET  /consensus/audit/{{proposalId}}     - Audit trail");
    info!("");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 Server shutdown complete");
    Ok(())
}

/// Initialize tracing; `LOG_FORMAT=json` selects line-delimited JSON output
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,consensus_service=debug,tower_http=debug"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        registry
            .with(fmt::layer().json().with_current_span(true).with_target(true))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .compact(),
            )
            .init();
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("📴 Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("📴 Received terminate signal, initiating graceful shutdown...");
        },
    }
}
