pub mod dashboard;
pub mod deals;
pub mod health;
pub mod referrals;

use crate::config::Config;
use crate::db::Repository;
use crate::engine::DealStateMachine;
use axum::{
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Config,
    pub machine: DealStateMachine,
}

impl AppState {
    pub fn new(repo: Arc<Repository>, config: Config) -> Self {
        Self {
            machine: DealStateMachine::new(config.default_terminated_reason),
            repo,
            config,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/referrals", post(referrals::create_referral))
        .route("/v1/referrals/:id", get(referrals::get_referral))
        .route(
            "/v1/referrals/:id/status",
            post(referrals::advance_referral_status),
        )
        .route(
            "/v1/referrals/:id/pre-approval",
            post(referrals::submit_pre_approval),
        )
        .route(
            "/v1/referrals/:id/deals",
            get(deals::list_deals).post(deals::create_deal),
        )
        .route(
            "/v1/deals/:id",
            patch(deals::patch_deal).delete(deals::delete_deal),
        )
        .route("/v1/dashboard/summary", get(dashboard::get_summary))
        .layer(cors)
        .with_state(state)
}
