use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::json;

use walletd_api::app::{self, services};
use walletd_auth::{Hs256Authenticator, OwnerClaims};
use walletd_core::OwnerId;
use walletd_infra::AppConfig;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(jwt_secret: &str) -> Self {
        // Same router as prod, in-memory adapters, ephemeral port.
        let config = AppConfig::from_lookup(|key| match key {
            "JWT_SECRET" => Some(jwt_secret.to_string()),
            "WALLETD_REQUEST_TIMEOUT_MS" => Some("5000".to_string()),
            _ => None,
        })
        .expect("valid test config");
        let services = Arc::new(services::in_memory(&config));
        let authenticator = Arc::new(Hs256Authenticator::new(config.jwt_secret.as_bytes()));
        let router = app::build_app(services, authenticator);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self { base_url, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(jwt_secret: &str, owner: &str) -> String {
    let now = Utc::now();
    let claims = OwnerClaims {
        sub: OwnerId::parse(owner).unwrap(),
        issued_at: now - ChronoDuration::seconds(1),
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .expect("failed to encode jwt")
}

async fn init_wallet(client: &reqwest::Client, srv: &TestServer, owner: &str, name: &str) -> serde_json::Value {
    let res = client
        .post(srv.url("/api/v1/init"))
        .json(&json!({ "customer_id": owner, "name": name }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    res.json().await.unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn("test-secret").await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn auth_required_for_owner_endpoints() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/api/v1/wallet")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], "fail");
    assert_eq!(body["data"]["error"], "unauthenticated");

    // Signed with a different secret.
    let forged = mint_jwt("other-secret", "alice");
    let res = client
        .get(srv.url("/api/v1/wallet"))
        .bearer_auth(forged)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn owner_context_is_derived_from_token() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let res = reqwest::Client::new()
        .get(srv.url("/whoami"))
        .bearer_auth(mint_jwt(jwt_secret, "alice"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["data"]["owner_id"], "alice");
    assert_eq!(body["data"]["backend"], "in_memory");
}

#[tokio::test]
async fn deposit_withdraw_and_replay() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;
    let client = reqwest::Client::new();

    let created = init_wallet(&client, &srv, "alice", "Alice").await;
    assert_eq!(created["status"], "success");
    assert_eq!(created["data"]["wallet"]["status"], "enabled");
    assert_eq!(created["data"]["wallet"]["balance"], 0);
    let wallet_id = created["data"]["wallet"]["id"].as_str().unwrap().to_string();

    let token = mint_jwt(jwt_secret, "alice");

    let res = client
        .post(srv.url("/api/v1/wallet/deposits"))
        .bearer_auth(&token)
        .json(&json!({ "reference_id": "seed", "amount": 100 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["data"]["deposit"]["deposited_by"], "alice");
    assert_eq!(body["data"]["deposit"]["status"], "success");

    // Overdraw: recorded as failed, reported as 422.
    let res = client
        .post(srv.url("/api/v1/wallet/withdrawals"))
        .bearer_auth(&token)
        .json(&json!({ "reference_id": "r1", "amount": 150 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["data"]["error"], "insufficient_funds");

    let withdraw = || {
        client
            .post(srv.url("/api/v1/wallet/withdrawals"))
            .bearer_auth(&token)
            .json(&json!({ "reference_id": "r2", "amount": 50 }))
            .send()
    };
    let first: serde_json::Value = withdraw().await.unwrap().json().await.unwrap();
    let again = withdraw().await.unwrap();
    assert_eq!(again.status(), StatusCode::CREATED);
    let again: serde_json::Value = again.json().await.unwrap();
    assert_eq!(first, again);
    assert_eq!(again["data"]["withdrawal"]["balance"], 50);

    // Same reference, different amount.
    let res = client
        .post(srv.url("/api/v1/wallet/withdrawals"))
        .bearer_auth(&token)
        .json(&json!({ "reference_id": "r2", "amount": 10 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = client
        .get(srv.url("/api/v1/wallet"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["data"]["wallet"]["balance"], 50);

    let res = client
        .get(srv.url(&format!("/api/v1/wallets/{wallet_id}/reconciliation")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["data"]["consistent"], true);
    assert_eq!(body["data"]["cached"], 50);
}

#[tokio::test]
async fn invalid_amounts_are_bad_requests() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;
    let client = reqwest::Client::new();
    init_wallet(&client, &srv, "alice", "Alice").await;

    let res = client
        .post(srv.url("/api/v1/wallet/deposits"))
        .bearer_auth(mint_jwt(jwt_secret, "alice"))
        .json(&json!({ "reference_id": "neg", "amount": -5 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["data"]["error"], "bad_input");
}

#[tokio::test]
async fn disable_and_enable_status_codes() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;
    let client = reqwest::Client::new();
    let token = mint_jwt(jwt_secret, "bob");

    // No wallet yet.
    let res = client
        .get(srv.url("/api/v1/wallet"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    init_wallet(&client, &srv, "bob", "Bob").await;

    let res = client
        .post(srv.url("/api/v1/init"))
        .json(&json!({ "customer_id": "bob" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = client
        .post(srv.url("/api/v1/wallet"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["data"]["error"], "already_enabled");

    let res = client
        .patch(srv.url("/api/v1/wallet"))
        .bearer_auth(&token)
        .json(&json!({ "is_disabled": false }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .patch(srv.url("/api/v1/wallet"))
        .bearer_auth(&token)
        .json(&json!({ "is_disabled": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["data"]["wallet"]["status"], "disabled");
    assert!(body["data"]["wallet"]["disabled_at"].is_string());

    // Disabled wallets read as 404 and refuse money movement.
    let res = client
        .get(srv.url("/api/v1/wallet"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["data"]["error"], "disabled");

    let res = client
        .post(srv.url("/api/v1/wallet/deposits"))
        .bearer_auth(&token)
        .json(&json!({ "reference_id": "d1", "amount": 5 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .post(srv.url("/api/v1/wallet"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn list_wallets_pages_with_owner_profiles() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;
    let client = reqwest::Client::new();

    for i in 0..3 {
        init_wallet(&client, &srv, &format!("owner-{i}"), &format!("Owner {i}")).await;
        // Distinct creation instants at cursor precision.
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    let token = mint_jwt(jwt_secret, "owner-0");

    let res = client
        .get(srv.url("/api/v1/wallets?num=2"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    let wallets = body["data"]["wallets"].as_array().unwrap();
    assert_eq!(wallets.len(), 2);
    assert_eq!(wallets[0]["owned_by"]["name"], "Owner 0");
    assert_eq!(wallets[1]["owned_by"]["id"], "owner-1");
    let cursor = body["data"]["next_cursor"].as_str().unwrap().to_string();
    assert!(!cursor.is_empty());

    let res = client
        .get(srv.url(&format!("/api/v1/wallets?num=2&cursor={cursor}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    let wallets = body["data"]["wallets"].as_array().unwrap();
    assert_eq!(wallets.len(), 1);
    assert_eq!(wallets[0]["owned_by"]["name"], "Owner 2");
    assert_eq!(body["data"]["next_cursor"], "");

    let res = client
        .get(srv.url("/api/v1/wallets?cursor=garbage!"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["data"]["error"], "bad_cursor");
}

#[tokio::test]
async fn get_wallet_by_id() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;
    let client = reqwest::Client::new();
    let created = init_wallet(&client, &srv, "carol", "Carol").await;
    let id = created["data"]["wallet"]["id"].as_str().unwrap();
    let token = mint_jwt(jwt_secret, "carol");

    let res = client
        .get(srv.url(&format!("/api/v1/wallets/{id}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["data"]["wallet"]["owned_by"], "carol");

    let res = client
        .get(srv.url("/api/v1/wallets/not-a-uuid"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .get(srv.url(&format!("/api/v1/wallets/{}", walletd_core::WalletId::new())))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}
