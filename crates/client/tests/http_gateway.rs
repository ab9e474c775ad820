use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;

use kiradopay_auth::{Hs256JwtValidator, JwtClaims, Scope};
use kiradopay_client::{
    BufferedReceipt, GatewayError, HttpLedgerGateway, LedgerGateway, ReceiptBuffer,
    SqliteReceiptBuffer, SyncManager,
};
use kiradopay_core::{EventCode, ItemCode, ReceiptId, UserId};
use kiradopay_ledger::{ReceiptInput, RecordInput};

const SECRET: &str = "client-test-secret";

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let app = kiradopay_api::app::build_dev_app(SECRET);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn token() -> String {
    let now = Utc::now();
    Hs256JwtValidator::new(SECRET.as_bytes().to_vec())
        .issue(&JwtClaims {
            sub: UserId::new("register-7"),
            name: None,
            email: None,
            scopes: vec![Scope::READ, Scope::WRITE],
            issued_at: now - ChronoDuration::seconds(5),
            expires_at: now + ChronoDuration::minutes(10),
        })
        .unwrap()
}

fn expo() -> EventCode {
    EventCode::parse("EXPO24").unwrap()
}

fn sale(item: &str, count: i64, total: i64) -> ReceiptInput {
    ReceiptInput {
        total,
        client_id: None,
        records: vec![RecordInput {
            item_code: ItemCode::parse(item).unwrap(),
            count,
            dedication: false,
        }],
    }
}

async fn seed(srv: &TestServer, token: &str) {
    let client = reqwest::Client::new();
    for code in ["A", "B"] {
        let res = client
            .post(format!("{}/items", srv.base_url))
            .bearer_auth(token)
            .json(&json!({ "code": code, "name": format!("Item {code}") }))
            .send()
            .await
            .unwrap();
        assert!(res.status().is_success());
    }
    let res = client
        .post(format!("{}/events", srv.base_url))
        .bearer_auth(token)
        .json(&json!({ "code": "EXPO24", "name": "Expo 2024", "date": "2024-11-03" }))
        .send()
        .await
        .unwrap();
    assert!(res.status().is_success());
    let res = client
        .patch(format!("{}/events/EXPO24", srv.base_url))
        .bearer_auth(token)
        .json(&json!({ "items": ["A"] }))
        .send()
        .await
        .unwrap();
    assert!(res.status().is_success());
}

fn gateway(srv: &TestServer, token: Option<String>) -> HttpLedgerGateway {
    HttpLedgerGateway::new(srv.base_url.clone(), token, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn gateway_round_trips_the_ledger() {
    let srv = TestServer::spawn().await;
    let token = token();
    seed(&srv, &token).await;
    let gateway = gateway(&srv, Some(token));

    let event = gateway.get_event(&expo()).await.unwrap();
    assert_eq!(event.item_codes(), vec![ItemCode::parse("A").unwrap()]);
    assert_eq!(gateway.list_events().await.unwrap().len(), 1);

    let created = gateway
        .create_receipts(&expo(), &[sale("A", 2, 1000)])
        .await
        .unwrap();
    assert_eq!(created[0].user_id, UserId::new("register-7"));
    assert_eq!(gateway.list_receipts(&expo()).await.unwrap(), created);

    let deleted = gateway
        .delete_receipts(&expo(), &[created[0].id, ReceiptId::new()])
        .await
        .unwrap();
    assert_eq!(deleted, 1);
}

#[tokio::test]
async fn server_rejections_are_classified() {
    let srv = TestServer::spawn().await;
    let token = token();
    seed(&srv, &token).await;

    match gateway(&srv, None).list_events().await.unwrap_err() {
        GatewayError::Auth { status, .. } => assert_eq!(status, 401),
        other => panic!("Expected Auth error, got {other:?}"),
    }

    let gateway = gateway(&srv, Some(token));
    match gateway
        .create_receipts(&expo(), &[sale("B", 1, 300)])
        .await
        .unwrap_err()
    {
        GatewayError::Conflict(msg) => assert_eq!(msg, "item not displayed: B"),
        other => panic!("Expected Conflict error, got {other:?}"),
    }

    let missing = EventCode::parse("NOPE").unwrap();
    assert!(matches!(
        gateway.get_event(&missing).await,
        Err(GatewayError::NotFound(_))
    ));
    assert!(matches!(
        gateway.create_receipts(&expo(), &[sale("A", 0, 0)]).await,
        Err(GatewayError::Validation(_))
    ));
}

#[tokio::test]
async fn buffered_sales_sync_over_http_exactly_once() {
    let srv = TestServer::spawn().await;
    let token = token();
    seed(&srv, &token).await;

    let buffer = SqliteReceiptBuffer::in_memory().await.unwrap();
    let first = BufferedReceipt::new(expo(), sale("A", 1, 500));
    let second = BufferedReceipt::new(expo(), sale("A", 3, 1500));
    buffer.append(first.clone()).await.unwrap();
    buffer.append(second.clone()).await.unwrap();

    let manager = SyncManager::new(gateway(&srv, Some(token)), buffer);
    let report = manager.sync_event(&expo()).await.unwrap();
    assert_eq!(report.confirmed, vec![first.local_id, second.local_id]);
    assert_eq!(report.remaining, 0);

    // A second sync has nothing left to send.
    let report = manager.sync_event(&expo()).await.unwrap();
    assert!(report.confirmed.is_empty());

    let view = manager.view(&expo()).await.unwrap();
    assert_eq!(view.len(), 2);
    assert!(view.iter().all(|r| r.on_server));
    assert_eq!(view[0].local_id, Some(first.local_id));
}
