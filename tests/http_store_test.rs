//! Drives the HTTP deal store and the controller against a live server.

use dealdesk::api;
use dealdesk::config::Config;
use dealdesk::db::init_db;
use dealdesk::domain::{
    BasisPoints, ContractDetails, DealStatus, ReferralId, ReferralStatus, TerminatedReason,
};
use dealdesk::engine::{DealStateMachine, Role, TransitionContext};
use dealdesk::orchestration::{Confirmation, DealController, WriteOutcome};
use dealdesk::store::{DealStore, HttpDealStore, StoreError};
use std::sync::Arc;
use tempfile::TempDir;

struct LiveServer {
    base_url: String,
    repo: Arc<dealdesk::Repository>,
    _temp: TempDir,
}

async fn spawn_server() -> LiveServer {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(dealdesk::Repository::new(pool));

    let config = Config {
        port: 0,
        database_path: db_path,
        pre_approval_fee_rate: BasisPoints(100),
        default_terminated_reason: TerminatedReason::ChangedMind,
    };
    let app = api::create_router(api::AppState::new(repo.clone(), config));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    LiveServer {
        base_url: format!("http://{}", addr),
        repo,
        _temp: temp_dir,
    }
}

async fn seed_referral(server: &LiveServer, id: &str) -> dealdesk::Referral {
    let referral = dealdesk::Referral::new(ReferralId::new(id));
    server.repo.insert_referral(&referral).await.unwrap();
    referral
}

#[tokio::test]
async fn test_controller_round_trip_over_http() {
    let server = spawn_server().await;
    let store = Arc::new(HttpDealStore::new(&server.base_url));
    let referral_id = ReferralId::new("r1");
    seed_referral(&server, "r1").await;

    // Price the referral first so later statuses pass the pricing check.
    let response = store
        .advance_referral_status(
            &referral_id,
            ReferralStatus::UnderContract,
            Some(ContractDetails {
                address: "12 Elm St".to_string(),
                price: "300000".to_string(),
                commission_percent: "3".to_string(),
                referral_fee_percent: "25".to_string(),
            }),
        )
        .await
        .unwrap();
    assert_eq!(response.referral_fee_due.as_deref(), Some("$2,250.00"));

    let controller = DealController::load(
        store.clone(),
        DealStateMachine::default(),
        response.referral,
    )
    .await
    .unwrap();
    assert!(controller.deals().is_empty());

    let created = controller
        .set_status(None, DealStatus::UnderContract, &TransitionContext::default())
        .await
        .unwrap();
    let WriteOutcome::Created(deal_id) = created else {
        panic!("expected a created deal, got {:?}", created);
    };

    controller
        .set_status(
            Some(&deal_id),
            DealStatus::Closed,
            &TransitionContext::for_role(Role::Agent),
        )
        .await
        .unwrap();
    controller.set_used_afc(&deal_id, true).await.unwrap();

    // A fresh read sees what the controller wrote.
    let reloaded = DealController::load(
        store.clone(),
        DealStateMachine::default(),
        controller.referral(),
    )
    .await
    .unwrap();
    let deal = reloaded.effective_deal(&deal_id).unwrap();
    assert_eq!(deal.status, DealStatus::Closed);
    assert_eq!(deal.expected_amount_cents.as_i64(), 225_000);
    assert!(deal.used_afc);

    assert_eq!(
        controller
            .delete_deal(&deal_id, Confirmation::Confirmed)
            .await,
        Ok(WriteOutcome::Deleted)
    );
    assert!(store.list_deals(&referral_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_http_errors_map_to_store_errors() {
    let server = spawn_server().await;
    let store = HttpDealStore::new(&server.base_url);

    let result = store
        .update_deal(&dealdesk::DealId::new("ghost"), &Default::default())
        .await;
    assert!(matches!(result, Err(StoreError::NotFound(_))));

    let result = store.list_deals(&ReferralId::new("ghost")).await;
    assert!(matches!(result, Err(StoreError::NotFound(_))));
}

#[tokio::test]
async fn test_pre_approval_over_http() {
    let server = spawn_server().await;
    let store = HttpDealStore::new(&server.base_url);
    seed_referral(&server, "r1").await;

    let response = store
        .submit_pre_approval(&ReferralId::new("r1"), "250000")
        .await
        .unwrap();
    assert_eq!(response.fee, "$2,500.00");
    assert_eq!(response.fee_cents.as_i64(), 250_000);
}
