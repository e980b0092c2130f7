//! End-to-end flows against a running API.
//!
//! These tests require:
//! - A migrated and seeded `PostgreSQL` database (`fm-cli migrate && fm-cli seed --demo`)
//! - The API server running (`cargo run -p freshmilk-api`)
//!
//! Run with: `cargo test -p freshmilk-integration-tests -- --ignored`

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use freshmilk_integration_tests::api_base_url;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use uuid::Uuid;

/// Register a throwaway customer and return its access token.
async fn register_customer(client: &Client) -> String {
    let base_url = api_base_url();
    let username = format!("it_{}", &Uuid::new_v4().simple().to_string()[..12]);
    let resp = client
        .post(format!("{base_url}/api/v1/auth/register"))
        .json(&json!({
            "username": username,
            "password": "milk-and-honey-42",
            "password_confirm": "milk-and-honey-42",
        }))
        .send()
        .await
        .expect("Failed to register");

    assert!(resp.status().is_success(), "register: {}", resp.status());
    let body: Value = resp.json().await.expect("register body");
    body["access"].as_str().expect("access token").to_owned()
}

#[tokio::test]
#[ignore = "Requires running API server and seeded database"]
async fn test_register_then_profile() {
    let client = Client::new();
    let token = register_customer(&client).await;

    let resp = client
        .get(format!("{}/api/v1/users/me", api_base_url()))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to fetch profile");

    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["member_level"], "regular");
    assert_eq!(body["points"], 0);
}

#[tokio::test]
#[ignore = "Requires running API server and seeded database"]
async fn test_wrong_password_is_rejected() {
    let client = Client::new();
    let resp = client
        .post(format!("{}/api/v1/auth/login", api_base_url()))
        .json(&json!({"username": "nobody-here", "password": "definitely-wrong"}))
        .send()
        .await
        .expect("Failed to send login");

    assert!(resp.status().is_client_error());
}

#[tokio::test]
#[ignore = "Requires running API server and seeded database"]
async fn test_browse_and_fill_cart() {
    let client = Client::new();
    let base_url = api_base_url();
    let token = register_customer(&client).await;

    let products: Value = client
        .get(format!("{base_url}/api/v1/products"))
        .send()
        .await
        .expect("Failed to list products")
        .json()
        .await
        .unwrap();
    let Some(product_id) = products["results"][0]["id"].as_i64() else {
        // Nothing seeded with --demo; nothing to buy
        return;
    };

    let resp = client
        .post(format!("{base_url}/api/v1/cart"))
        .bearer_auth(&token)
        .json(&json!({"product_id": product_id, "quantity": 2}))
        .send()
        .await
        .expect("Failed to add to cart");
    assert!(resp.status().is_success());

    let summary: Value = client
        .get(format!("{base_url}/api/v1/cart/summary"))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to fetch cart summary")
        .json()
        .await
        .unwrap();
    assert_eq!(summary["total_count"], 2);
}

#[tokio::test]
#[ignore = "Requires running API server and seeded database"]
async fn test_customer_cannot_reach_admin() {
    let client = Client::new();
    let token = register_customer(&client).await;

    let resp = client
        .get(format!("{}/api/v1/admin/users", api_base_url()))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}
