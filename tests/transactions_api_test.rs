//! HTTP surface tests for the transaction API, running the full router
//! against in-memory stores and a mock marketplace.

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use bigdecimal::BigDecimal;
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use payment_service::adapters::{InMemoryFingerprintStore, InMemoryTransactionStore};
use payment_service::domain::{PaymentMethod, Transaction, TransactionStatus};
use payment_service::marketplace::MarketplaceClient;
use payment_service::metrics::{Metrics, SharedMetrics};
use payment_service::ports::TransactionStore;
use payment_service::rate_limit::WebhookRateLimiter;
use payment_service::services::{
    spawn_worker, FraudService, HttpNotifier, TransactionService, WebhookProcessor,
};
use payment_service::{create_app, signature, AppState};

const WEBHOOK_SECRET: &str = "integration-secret";

struct TestApp {
    app: Router,
    store: Arc<InMemoryTransactionStore>,
    marketplace: mockito::ServerGuard,
}

async fn test_app() -> TestApp {
    let marketplace = mockito::Server::new_async().await;

    let store = Arc::new(InMemoryTransactionStore::new());
    let fingerprints = Arc::new(InMemoryFingerprintStore::new());
    let metrics: SharedMetrics = Arc::new(Metrics::new());

    let marketplace_client = MarketplaceClient::new(marketplace.url(), 2);
    let fraud = spawn_worker(FraudService::new(store.clone(), metrics.clone()));
    let transactions = TransactionService::new(
        store.clone(),
        fingerprints,
        marketplace_client.clone(),
        fraud,
        metrics.clone(),
        "https://starkscan.co/tx/".to_string(),
    );
    // Notification delivery is exercised elsewhere; point it at a closed port.
    let notifier = Arc::new(HttpNotifier::new("http://127.0.0.1:1".to_string(), 1));
    let webhooks = Arc::new(WebhookProcessor::new(
        store.clone(),
        notifier,
        metrics.clone(),
        WEBHOOK_SECRET.to_string(),
    ));

    let state = AppState {
        transactions,
        webhooks,
        rate_limiter: Arc::new(WebhookRateLimiter::new(100, 60)),
        marketplace: marketplace_client,
        metrics,
        db: None,
    };

    TestApp {
        app: create_app(state),
        store,
        marketplace,
    }
}

fn peer() -> ConnectInfo<SocketAddr> {
    ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000)))
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .extension(peer())
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn patch_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("PATCH")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .extension(peer())
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .extension(peer())
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, bytes.to_vec())
}

fn as_json(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

fn create_payload(nft_id: Uuid, receiver_id: Uuid) -> Value {
    json!({
        "nftId": nft_id,
        "receiverId": receiver_id,
        "auctionId": Uuid::new_v4(),
        "amount": "2.5",
        "paymentMethod": "CRYPTO",
    })
}

async fn mock_owner(
    server: &mut mockito::ServerGuard,
    nft_id: Uuid,
    seller_id: Uuid,
) -> mockito::Mock {
    server
        .mock("GET", format!("/api/nfts/{nft_id}/owner").as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "sellerId": seller_id }).to_string())
        .create_async()
        .await
}

fn seeded(buyer_id: Uuid, nft_id: Uuid, status: TransactionStatus) -> Transaction {
    let mut tx = Transaction::new(
        buyer_id,
        Uuid::new_v4(),
        buyer_id,
        nft_id,
        Uuid::new_v4(),
        BigDecimal::from_str("2.5").unwrap(),
        PaymentMethod::Crypto,
        None,
        None,
        None,
        None,
    );
    tx.status = status;
    tx
}

#[tokio::test]
async fn create_persists_pending_transaction_with_resolved_seller() {
    let mut harness = test_app().await;
    let nft_id = Uuid::new_v4();
    let receiver_id = Uuid::new_v4();
    let seller_id = Uuid::new_v4();
    mock_owner(&mut harness.marketplace, nft_id, seller_id).await;

    let (status, body) = send(
        &harness.app,
        post_json("/api/transactions", &create_payload(nft_id, receiver_id)),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    let body = as_json(&body);
    assert_eq!(body["status"], "PENDING");

    let id = Uuid::parse_str(body["id"].as_str().unwrap()).unwrap();
    let stored = harness.store.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(stored.seller_id, seller_id);
    assert_eq!(stored.buyer_id, receiver_id);
    assert_eq!(stored.nft_id, nft_id);
    assert_eq!(stored.status, TransactionStatus::Pending);
}

#[tokio::test]
async fn create_derives_explorer_url_from_transaction_hash() {
    let mut harness = test_app().await;
    let nft_id = Uuid::new_v4();
    mock_owner(&mut harness.marketplace, nft_id, Uuid::new_v4()).await;

    let mut payload = create_payload(nft_id, Uuid::new_v4());
    payload["transactionHash"] = json!("0xdeadbeef");

    let (status, body) = send(&harness.app, post_json("/api/transactions", &payload)).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(
        as_json(&body)["blockchainExplorerUrl"],
        "https://starkscan.co/tx/0xdeadbeef"
    );
}

#[tokio::test]
async fn create_rejects_amount_below_minimum_precision() {
    let harness = test_app().await;
    let mut payload = create_payload(Uuid::new_v4(), Uuid::new_v4());
    payload["amount"] = json!("0.000000001");

    let (status, body) = send(&harness.app, post_json("/api/transactions", &payload)).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let body = as_json(&body);
    assert!(body["type"].as_str().unwrap().ends_with("/validation"));
    assert_eq!(body["status"], 422);
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn create_fails_loudly_when_seller_lookup_is_down() {
    let mut harness = test_app().await;
    let nft_id = Uuid::new_v4();
    let receiver_id = Uuid::new_v4();
    harness
        .marketplace
        .mock("GET", format!("/api/nfts/{nft_id}/owner").as_str())
        .with_status(500)
        .create_async()
        .await;

    let (status, body) = send(
        &harness.app,
        post_json("/api/transactions", &create_payload(nft_id, receiver_id)),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    let body = as_json(&body);
    assert!(body["type"]
        .as_str()
        .unwrap()
        .ends_with("/seller-resolution"));

    // Nothing may be persisted on a failed resolution.
    let rows = harness.store.find_by_buyer(receiver_id, 10).await.unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn same_key_and_body_replays_byte_identical_response() {
    let mut harness = test_app().await;
    let nft_id = Uuid::new_v4();
    let receiver_id = Uuid::new_v4();
    let owner = harness
        .marketplace
        .mock("GET", format!("/api/nfts/{nft_id}/owner").as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "sellerId": Uuid::new_v4() }).to_string())
        .expect(1)
        .create_async()
        .await;

    let mut payload = create_payload(nft_id, receiver_id);
    payload["idempotencyKey"] = json!("order-41");

    let (first_status, first_body) =
        send(&harness.app, post_json("/api/transactions", &payload)).await;
    let (second_status, second_body) =
        send(&harness.app, post_json("/api/transactions", &payload)).await;

    assert_eq!(first_status, StatusCode::CREATED);
    assert_eq!(second_status, StatusCode::CREATED);
    assert_eq!(first_body, second_body);

    // The second call replays the snapshot: one row, one seller lookup.
    owner.assert_async().await;
    let rows = harness.store.find_by_buyer(receiver_id, 10).await.unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn same_key_with_different_body_conflicts() {
    let mut harness = test_app().await;
    let nft_id = Uuid::new_v4();
    let receiver_id = Uuid::new_v4();
    mock_owner(&mut harness.marketplace, nft_id, Uuid::new_v4()).await;

    let mut payload = create_payload(nft_id, receiver_id);
    payload["idempotencyKey"] = json!("order-42");
    let (status, _) = send(&harness.app, post_json("/api/transactions", &payload)).await;
    assert_eq!(status, StatusCode::CREATED);

    payload["amount"] = json!("9.9");
    let (status, body) = send(&harness.app, post_json("/api/transactions", &payload)).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(as_json(&body)["type"]
        .as_str()
        .unwrap()
        .ends_with("/idempotency-conflict"));

    let rows = harness.store.find_by_buyer(receiver_id, 10).await.unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn idempotency_key_header_replays_like_body_key() {
    let mut harness = test_app().await;
    let nft_id = Uuid::new_v4();
    let receiver_id = Uuid::new_v4();
    mock_owner(&mut harness.marketplace, nft_id, Uuid::new_v4()).await;

    let payload = create_payload(nft_id, receiver_id);
    let request = |payload: &Value| {
        Request::builder()
            .method("POST")
            .uri("/api/transactions")
            .header(header::CONTENT_TYPE, "application/json")
            .header("Idempotency-Key", "order-43")
            .extension(peer())
            .body(Body::from(payload.to_string()))
            .unwrap()
    };

    let (_, first_body) = send(&harness.app, request(&payload)).await;
    let (status, second_body) = send(&harness.app, request(&payload)).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first_body, second_body);
    let rows = harness.store.find_by_buyer(receiver_id, 10).await.unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn get_unknown_transaction_is_a_problem_404() {
    let harness = test_app().await;
    let id = Uuid::new_v4();

    let (status, body) = send(&harness.app, get(&format!("/api/transactions/{id}"))).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    let body = as_json(&body);
    assert!(body["type"].as_str().unwrap().ends_with("/not-found"));
    assert_eq!(body["title"], "Resource Not Found");
    assert!(body["detail"].as_str().unwrap().contains(&id.to_string()));
}

#[tokio::test]
async fn filter_combines_criteria_and_pages() {
    let harness = test_app().await;
    let buyer = Uuid::new_v4();
    let nft = Uuid::new_v4();

    harness
        .store
        .insert(&seeded(buyer, nft, TransactionStatus::Pending))
        .await
        .unwrap();
    harness
        .store
        .insert(&seeded(buyer, Uuid::new_v4(), TransactionStatus::Pending))
        .await
        .unwrap();
    harness
        .store
        .insert(&seeded(buyer, Uuid::new_v4(), TransactionStatus::Pending))
        .await
        .unwrap();
    harness
        .store
        .insert(&seeded(Uuid::new_v4(), nft, TransactionStatus::Completed))
        .await
        .unwrap();

    let (status, body) = send(
        &harness.app,
        get(&format!("/api/transactions?userId={buyer}&page=0&size=2")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let page = as_json(&body);
    assert_eq!(page["content"].as_array().unwrap().len(), 2);
    assert_eq!(page["totalElements"], 3);
    assert_eq!(page["totalPages"], 2);
    assert_eq!(page["page"], 0);
    assert_eq!(page["size"], 2);

    let (_, body) = send(
        &harness.app,
        get(&format!("/api/transactions?userId={buyer}&status=COMPLETED")),
    )
    .await;
    assert_eq!(as_json(&body)["totalElements"], 0);

    let (_, body) = send(&harness.app, get(&format!("/api/transactions?nftId={nft}"))).await;
    assert_eq!(as_json(&body)["totalElements"], 2);
}

#[tokio::test]
async fn escrow_patch_moves_pending_transaction_into_escrow() {
    let harness = test_app().await;
    let tx = seeded(Uuid::new_v4(), Uuid::new_v4(), TransactionStatus::Pending);
    harness.store.insert(&tx).await.unwrap();

    let (status, body) = send(
        &harness.app,
        patch_json(
            &format!("/api/transactions/{}/escrow", tx.id),
            &json!({
                "releaseDate": Utc::now() + Duration::days(7),
                "conditions": "release on delivery",
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(as_json(&body)["status"], "ESCROW");

    let stored = harness.store.find_by_id(tx.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Escrow);
    let escrow = stored.escrow_details.unwrap();
    assert_eq!(escrow.conditions, "release on delivery");
    assert!(!escrow.is_disputed);
}

#[tokio::test]
async fn escrow_patch_is_rejected_from_a_terminal_state() {
    let harness = test_app().await;
    let tx = seeded(Uuid::new_v4(), Uuid::new_v4(), TransactionStatus::Completed);
    harness.store.insert(&tx).await.unwrap();

    let (status, body) = send(
        &harness.app,
        patch_json(
            &format!("/api/transactions/{}/escrow", tx.id),
            &json!({
                "releaseDate": Utc::now() + Duration::days(7),
                "conditions": "too late",
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(as_json(&body)["type"]
        .as_str()
        .unwrap()
        .ends_with("/invalid-state-transition"));
    let stored = harness.store.find_by_id(tx.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Completed);
}

#[tokio::test]
async fn escrow_release_date_must_be_in_the_future() {
    let harness = test_app().await;
    let tx = seeded(Uuid::new_v4(), Uuid::new_v4(), TransactionStatus::Pending);
    harness.store.insert(&tx).await.unwrap();

    let (status, _) = send(
        &harness.app,
        patch_json(
            &format!("/api/transactions/{}/escrow", tx.id),
            &json!({
                "releaseDate": Utc::now() - Duration::days(1),
                "conditions": "already past",
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn health_reports_disabled_database_without_a_pool() {
    let harness = test_app().await;

    let (status, body) = send(&harness.app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    let body = as_json(&body);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["db"], "disabled");
    assert!(body["marketplace_circuit"].is_string());
}

#[tokio::test]
async fn metrics_endpoint_exposes_service_counters() {
    let harness = test_app().await;

    let (status, body) = send(&harness.app, get("/metrics")).await;

    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("payment_transactions_created_total"));
    assert!(text.contains("payment_webhook_events_total"));
}

#[tokio::test]
async fn problem_docs_describe_known_slugs() {
    let harness = test_app().await;

    let (status, body) = send(&harness.app, get("/problems/validation")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body.is_empty());

    let (status, _) = send(&harness.app, get("/problems/unknown-slug")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn full_lifecycle_create_escrow_then_confirmed_webhook() {
    let mut harness = test_app().await;
    let nft_id = Uuid::new_v4();
    mock_owner(&mut harness.marketplace, nft_id, Uuid::new_v4()).await;

    let mut payload = create_payload(nft_id, Uuid::new_v4());
    payload["amount"] = json!("1.23");
    payload["transactionHash"] = json!("0xfeedface");
    let (status, body) = send(&harness.app, post_json("/api/transactions", &payload)).await;
    assert_eq!(status, StatusCode::CREATED);
    let body = as_json(&body);
    assert_eq!(body["status"], "PENDING");
    let id = body["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &harness.app,
        patch_json(
            &format!("/api/transactions/{id}/escrow"),
            &json!({
                "releaseDate": Utc::now() + Duration::days(14),
                "conditions": "release on confirmed delivery",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(as_json(&body)["status"], "ESCROW");

    let event = json!({
        "txHash": "0xfeedface",
        "status": "COMPLETED",
        "blockTimestamp": Utc::now(),
        "blockNumber": 42,
        "logs": [],
    });
    // Sign exactly the bytes the processor will canonicalize.
    let event: payment_service::domain::StarknetTransactionEvent =
        serde_json::from_value(event).unwrap();
    let bytes = serde_json::to_vec(&event).unwrap();
    let sig = signature::sign(WEBHOOK_SECRET, &bytes);

    let (status, _) = send(
        &harness.app,
        Request::builder()
            .method("POST")
            .uri("/api/transactions/webhook")
            .header(header::CONTENT_TYPE, "application/json")
            .header("X-Starknet-Signature", sig)
            .extension(peer())
            .body(Body::from(bytes))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, body) = send(&harness.app, get(&format!("/api/transactions/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(as_json(&body)["status"], "COMPLETED");

    let stored = harness
        .store
        .find_by_id(Uuid::parse_str(&id).unwrap())
        .await
        .unwrap()
        .unwrap();
    let escrow = stored.escrow_details.unwrap();
    assert_eq!(escrow.conditions, "release on confirmed delivery");
}
