use axum::http::StatusCode;
use dealdesk::api;
use dealdesk::config::Config;
use dealdesk::db::init_db;
use dealdesk::domain::{
    BasisPoints, Cents, DealPatch, DealStatus, Referral, ReferralId, ReferralStatus,
    TerminatedReason,
};
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

struct TestApp {
    app: axum::Router,
    repo: Arc<dealdesk::Repository>,
    _temp: TempDir,
}

async fn setup_test_app() -> TestApp {
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

    TestApp {
        app: api::create_router(api::AppState::new(repo.clone(), config)),
        repo,
        _temp: temp_dir,
    }
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let req = axum::http::Request::builder()
        .method("GET")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();

    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

fn patch(status: DealStatus, expected: i64, received: i64) -> DealPatch {
    DealPatch {
        status: Some(status),
        expected_amount_cents: Some(Cents(expected)),
        received_amount_cents: Some(Cents(received)),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_empty_dashboard() {
    let test_app = setup_test_app().await;
    let (status, body) = get(test_app.app, "/v1/dashboard/summary").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["dealCount"], 0);
    assert_eq!(body["realizedRevenueCents"], 0);
    assert_eq!(body["pipelineRevenue"], "$0.00");
    assert_eq!(body["dealsByStatus"]["under_contract"], 0);
}

#[tokio::test]
async fn test_dashboard_aggregates_across_referrals() {
    let test_app = setup_test_app().await;
    let repo = &test_app.repo;

    for id in ["r1", "r2"] {
        repo.insert_referral(&Referral::new(ReferralId::new(id)))
            .await
            .unwrap();
    }
    repo.update_referral_status(&ReferralId::new("r2"), ReferralStatus::Closed)
        .await
        .unwrap();

    repo.insert_deal(&ReferralId::new("r1"), &patch(DealStatus::Paid, 225_000, 0))
        .await
        .unwrap();
    repo.insert_deal(
        &ReferralId::new("r2"),
        &patch(DealStatus::PastAppraisal, 120_000, 0),
    )
    .await
    .unwrap();

    let (status, body) = get(test_app.app, "/v1/dashboard/summary").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["dealCount"], 2);
    assert_eq!(body["activeDealCount"], 2);
    assert_eq!(body["dealsByStatus"]["paid"], 1);
    assert_eq!(body["dealsByStatus"]["past_appraisal"], 1);
    assert_eq!(body["realizedRevenueCents"], 225_000);
    assert_eq!(body["realizedRevenue"], "$2,250.00");
    assert_eq!(body["pipelineRevenueCents"], 120_000);
    assert_eq!(body["referralsByStatus"]["new"], 1);
    assert_eq!(body["referralsByStatus"]["closed"], 1);
}
