//! HTTP surface.
//!
//! User actions authenticate with a bearer session token. Webhooks
//! authenticate with an HMAC-SHA256 signature over the raw body in
//! `x-webhook-signature`.

pub mod auth;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod state;
pub mod webhooks;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Build the application router
pub fn router(state: AppState, request_timeout: Duration) -> Router {
    let user_routes = Router::new()
        .route("/api/signup", post(handlers::signup))
        .route("/api/me", get(handlers::me))
        .route("/api/me/boosters", get(handlers::my_boosters))
        .route("/api/me/conversions", get(handlers::my_conversions))
        .route("/api/tasks", get(handlers::task_board))
        .route("/api/tasks/complete", post(handlers::complete_task))
        .route("/api/claim", post(handlers::claim))
        .route("/api/referral", post(handlers::referral));

    let webhook_routes = Router::new()
        .route("/api/webhooks/booster", post(webhooks::booster))
        .route("/api/webhooks/presale", post(webhooks::presale))
        .route("/api/webhooks/task", post(webhooks::external_task))
        .route("/api/webhooks/wallet", post(webhooks::wallet))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::webhook_signature,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(user_routes)
        .merge(webhook_routes)
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .with_state(state)
}
