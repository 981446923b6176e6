//! Route definitions and router setup
//!
//! Configures all API routes and middleware.

mod consensus;

use crate::auth::identity_middleware;
use crate::config::Settings;
use crate::state::SharedState;
use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::MakeRequestUuid,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
    ServiceBuilderExt,
};
use tracing::Level;

/// Create the application router with all routes and middleware
pub fn create_router(state: SharedState, settings: &Settings) -> Router {
    let cors = build_cors_layer(settings);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let middleware_stack = ServiceBuilder::new()
        .set_x_request_id(MakeRequestUuid)
        .layer(trace_layer)
        .layer(CompressionLayer::new())
        .layer(cors)
        .propagate_x_request_id();

    // Every consensus route sees the resolved caller
    let consensus_routes = Router::new()
        .route("/create", post(consensus::create_proposal))
        .route("/vote/{proposal_id}", post(consensus::cast_vote))
        .route("/tally/{proposal_id}", get(consensus::get_tally))
        .route("/proposals", get(consensus::list_proposals))
        .route("/proposals/{proposal_id}", get(consensus::get_proposal))
        .route("/vote-tallies", get(consensus::vote_tallies))
        .route("/metrics", get(consensus::consensus_metrics))
        .route("/audit/{proposal_id}", get(consensus::audit_log))
        .route_layer(middleware::from_fn_with_state(state.clone(), identity_middleware));

    Router::new()
        .route("/health", get(health_check))
        .nest("/consensus", consensus_routes)
        .layer(middleware_stack)
        .with_state(state)
}

/// Build CORS layer from settings
fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<HeaderValue> = settings
        .cors
        .allowed_origins
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();

    let allowed_headers = [
        header::CONTENT_TYPE,
        header::ACCEPT,
        HeaderName::from_static(crate::auth::ACTOR_ID_HEADER),
        HeaderName::from_static(crate::auth::ACTOR_ROLE_HEADER),
    ];
    let exposed_headers = [
        HeaderName::from_static(consensus::PROPOSAL_STATE_HEADER),
        HeaderName::from_static(consensus::CONSENSUS_REACHED_HEADER),
    ];

    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(allowed_headers)
        .expose_headers(exposed_headers)
        .max_age(Duration::from_secs(3600));

    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(origins)
    }
}

/// Health check endpoint
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "success": true,
        "message": "Consensus service is running.",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}
