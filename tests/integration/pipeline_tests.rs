//! Thumbnail pipeline tests.
//!
//! Tests verify:
//! - Custom tiers and heights added at runtime drive generation
//! - Tier changes gate existing thumbnails immediately
//! - Regeneration and reconciliation after upgrades and downgrades
//! - The upload height floor follows the configured heights

use axum::http::StatusCode;
use serde_json::Value;
use uuid::Uuid;

use tiered_images::{AccountTier, BASIC_TIER, PREMIUM_TIER};

use super::test_utils::{body_bytes, dimensions_of, get, json_body, path_of, png_bytes, upload_request, TestServer};

fn heights(image: &Value) -> Vec<u64> {
    let mut heights: Vec<u64> = image["thumbnails"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["height"].as_u64().unwrap())
        .collect();
    heights.sort();
    heights
}

async fn fetch_image(server: &TestServer, id: &str, user: &tiered_images::UserId) -> Value {
    let response = server
        .send(get(&format!("/api/images/{}", id), Some(user)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    json_body(response).await
}

#[tokio::test]
async fn test_custom_tier_with_custom_height() {
    let server = TestServer::new().await;
    let catalog = &server.services.catalog;

    catalog.add_thumbnail_spec(100).await.unwrap();
    catalog
        .add_tier(AccountTier::new("thumbs-only"))
        .await
        .unwrap();
    catalog.link("thumbs-only", 100).await.unwrap();
    let user = server.user("dana", "thumbs-only").await;

    let json = server.upload(&user, png_bytes(300, 400)).await;
    assert_eq!(heights(&json), vec![100]);
    assert_eq!(json["thumbnails"][0]["width"], 75);
    assert!(json.get("image_url").is_none());

    let url = path_of(json["thumbnails"][0]["url"].as_str().unwrap());
    let response = server.send(get(&url, None)).await;
    assert_eq!(dimensions_of(&body_bytes(response).await), (75, 100));
}

#[tokio::test]
async fn test_new_height_raises_upload_floor() {
    let server = TestServer::new().await;
    let user = server.user("alice", BASIC_TIER).await;

    server.upload(&user, png_bytes(300, 400)).await;

    server
        .services
        .catalog
        .add_thumbnail_spec(800)
        .await
        .unwrap();

    let response = server
        .send(upload_request(Some(&user), png_bytes(300, 400)))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["error"], "image_too_small");
    assert!(json["message"].as_str().unwrap().contains("800"));

    server.upload(&user, png_bytes(600, 800)).await;
}

#[tokio::test]
async fn test_downgrade_gates_existing_thumbnails() {
    let server = TestServer::new().await;
    let user = server.user("bob", PREMIUM_TIER).await;
    let json = server.upload(&user, png_bytes(300, 400)).await;
    let id = json["id"].as_str().unwrap().to_string();

    let large = json["thumbnails"]
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["height"] == 400)
        .map(|t| path_of(t["url"].as_str().unwrap()))
        .unwrap();

    server
        .services
        .catalog
        .bind_user(user.clone(), BASIC_TIER)
        .await
        .unwrap();

    // Effective immediately, without regeneration
    let view = fetch_image(&server, &id, &user).await;
    assert_eq!(heights(&view), vec![200]);
    assert!(view.get("image_url").is_none());

    assert_eq!(
        server.send(get(&large, None)).await.status(),
        StatusCode::FORBIDDEN
    );
    assert_eq!(
        server
            .send(get(&format!("/img/{}/", id), None))
            .await
            .status(),
        StatusCode::FORBIDDEN
    );

    // Reconciling purges the stale height
    let image = server
        .services
        .records
        .image(Uuid::parse_str(&id).unwrap())
        .await
        .unwrap();
    let removed = server.services.orchestrator.reconcile(&image).await.unwrap();
    assert_eq!(removed, vec![400]);
    assert_eq!(
        server.send(get(&large, None)).await.status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(server.store.len().await, 2);
}

#[tokio::test]
async fn test_upgrade_then_regenerate() {
    let server = TestServer::new().await;
    let user = server.user("alice", BASIC_TIER).await;
    let json = server.upload(&user, png_bytes(300, 400)).await;
    let id = json["id"].as_str().unwrap().to_string();

    server
        .services
        .catalog
        .bind_user(user.clone(), PREMIUM_TIER)
        .await
        .unwrap();

    // Upgrading alone does not create the missing height
    let view = fetch_image(&server, &id, &user).await;
    assert_eq!(heights(&view), vec![200]);
    assert!(view.get("image_url").is_some());

    let image = server
        .services
        .records
        .image(Uuid::parse_str(&id).unwrap())
        .await
        .unwrap();
    let report = server.services.orchestrator.regenerate(&image).await.unwrap();
    assert!(report.is_complete());
    assert_eq!(report.assets.len(), 2);

    let view = fetch_image(&server, &id, &user).await;
    assert_eq!(heights(&view), vec![200, 400]);
    assert_eq!(view["thumbnails"][0]["id"], json["thumbnails"][0]["id"]);
}

#[tokio::test]
async fn test_unlinked_height_disappears_from_custom_tier() {
    let server = TestServer::new().await;
    let catalog = &server.services.catalog;

    catalog.add_thumbnail_spec(300).await.unwrap();
    catalog.add_tier(AccountTier::new("studio").with_original_access(true)).await.unwrap();
    catalog.link("studio", 200).await.unwrap();
    catalog.link("studio", 300).await.unwrap();
    let user = server.user("erin", "studio").await;

    let json = server.upload(&user, png_bytes(300, 400)).await;
    let id = json["id"].as_str().unwrap().to_string();
    assert_eq!(heights(&json), vec![200, 300]);

    catalog.unlink("studio", 300).await.unwrap();
    let view = fetch_image(&server, &id, &user).await;
    assert_eq!(heights(&view), vec![200]);
}

#[tokio::test]
async fn test_unbound_user_sees_nothing_gated() {
    let server = TestServer::new().await;
    let user = server.user("frank", PREMIUM_TIER).await;
    let json = server.upload(&user, png_bytes(300, 400)).await;
    let id = json["id"].as_str().unwrap().to_string();

    server.services.catalog.unbind_user(&user).await;

    let view = fetch_image(&server, &id, &user).await;
    assert!(heights(&view).is_empty());
    assert!(view.get("image_url").is_none());
    assert!(view.get("expiring_images").is_none());

    assert_eq!(
        server
            .send(get(&format!("/img/{}/", id), None))
            .await
            .status(),
        StatusCode::FORBIDDEN
    );
}
