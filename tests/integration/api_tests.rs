//! API integration tests for image upload, retrieval and error handling.
//!
//! Tests verify:
//! - Upload validation (identity, decodability, minimum height, body limit)
//! - What each built-in tier sees in the image JSON
//! - Serving originals and thumbnails with the right headers
//! - Ownership rules for reading, replacing and deleting images

use axum::http::StatusCode;
use serde_json::Value;
use uuid::Uuid;

use tiered_images::{RouterConfig, BASIC_TIER, ENTERPRISE_TIER, PREMIUM_TIER};

use super::test_utils::{
    body_bytes, delete, dimensions_of, get, jpeg_bytes, json_body, path_of, png_bytes, put_bytes,
    upload_request, TestServer,
};

fn thumbnail_heights(image: &Value) -> Vec<u64> {
    let mut heights: Vec<u64> = image["thumbnails"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["height"].as_u64().unwrap())
        .collect();
    heights.sort();
    heights
}

fn thumbnail_url(image: &Value, height: u64) -> String {
    let thumb = image["thumbnails"]
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["height"].as_u64() == Some(height))
        .unwrap();
    path_of(thumb["url"].as_str().unwrap())
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_check() {
    let server = TestServer::new().await;

    let response = server.send(get("/health", None)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

// =============================================================================
// Upload
// =============================================================================

#[tokio::test]
async fn test_upload_requires_identity() {
    let server = TestServer::new().await;

    let response = server.send(upload_request(None, png_bytes(300, 400))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let json = json_body(response).await;
    assert_eq!(json["error"], "unauthenticated");
    assert_eq!(json["status"], 401);
}

#[tokio::test]
async fn test_basic_upload_gets_only_small_thumbnail() {
    let server = TestServer::new().await;
    let user = server.user("alice", BASIC_TIER).await;

    let json = server.upload(&user, png_bytes(300, 400)).await;

    assert_eq!(json["width"], 300);
    assert_eq!(json["height"], 400);
    assert_eq!(thumbnail_heights(&json), vec![200]);
    assert_eq!(json["thumbnails"][0]["width"], 150);
    assert!(json.get("image_url").is_none());
    assert!(json.get("expiring_images").is_none());
    assert!(json.get("failed_heights").is_none());
}

#[tokio::test]
async fn test_premium_upload_sees_original_and_both_heights() {
    let server = TestServer::new().await;
    let user = server.user("bob", PREMIUM_TIER).await;

    let json = server.upload(&user, png_bytes(451, 600)).await;

    assert_eq!(thumbnail_heights(&json), vec![200, 400]);
    let id = json["id"].as_str().unwrap();
    assert_eq!(
        json["image_url"].as_str().unwrap(),
        format!("http://images.test/img/{}/", id)
    );
    assert!(json.get("expiring_images").is_none());

    let widths: Vec<u64> = json["thumbnails"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["width"].as_u64().unwrap())
        .collect();
    assert!(widths.contains(&150));
    assert!(widths.contains(&300));
}

#[tokio::test]
async fn test_enterprise_upload_lists_empty_links() {
    let server = TestServer::new().await;
    let user = server.user("carol", ENTERPRISE_TIER).await;

    let json = server.upload(&user, png_bytes(300, 400)).await;
    assert_eq!(json["expiring_images"], Value::Array(vec![]));
}

#[tokio::test]
async fn test_upload_too_small() {
    let server = TestServer::new().await;
    let user = server.user("alice", BASIC_TIER).await;

    // Shorter than the largest configured height (400), even for a basic user
    let response = server.send(upload_request(Some(&user), png_bytes(300, 399))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = json_body(response).await;
    assert_eq!(json["error"], "image_too_small");
    assert!(server.store.is_empty().await);
}

#[tokio::test]
async fn test_upload_not_an_image() {
    let server = TestServer::new().await;
    let user = server.user("alice", BASIC_TIER).await;

    let response = server
        .send(upload_request(Some(&user), "definitely not pixels".into()))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid_image");

    let response = server.send(upload_request(Some(&user), "".into())).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(server.store.is_empty().await);
}

#[tokio::test]
async fn test_upload_body_limit() {
    let server =
        TestServer::with_config(RouterConfig::new().with_tracing(false).with_max_upload_bytes(1024))
            .await;
    let user = server.user("alice", BASIC_TIER).await;

    let response = server.send(upload_request(Some(&user), png_bytes(300, 400))).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

// =============================================================================
// Serving
// =============================================================================

#[tokio::test]
async fn test_serve_original_and_thumbnail() {
    let server = TestServer::new().await;
    let user = server.user("bob", PREMIUM_TIER).await;
    let original = png_bytes(300, 400);
    let json = server.upload(&user, original.clone()).await;

    let response = server
        .send(get(&path_of(json["image_url"].as_str().unwrap()), None))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("content-type").unwrap(), "image/png");
    assert_eq!(
        response.headers().get("cache-control").unwrap(),
        "public, max-age=3600"
    );
    assert_eq!(body_bytes(response).await, original);

    let response = server.send(get(&thumbnail_url(&json, 400), None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("content-type").unwrap(), "image/png");
    assert_eq!(dimensions_of(&body_bytes(response).await), (300, 400));

    let response = server.send(get(&thumbnail_url(&json, 200), None)).await;
    assert_eq!(dimensions_of(&body_bytes(response).await), (150, 200));
}

#[tokio::test]
async fn test_jpeg_source_yields_jpeg_thumbnails() {
    let server = TestServer::new().await;
    let user = server.user("alice", BASIC_TIER).await;
    let json = server.upload(&user, jpeg_bytes(600, 800)).await;

    let response = server.send(get(&thumbnail_url(&json, 200), None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("content-type").unwrap(), "image/jpeg");
    assert_eq!(dimensions_of(&body_bytes(response).await), (150, 200));
}

#[tokio::test]
async fn test_cache_max_age_is_configurable() {
    let server =
        TestServer::with_config(RouterConfig::new().with_tracing(false).with_cache_max_age(60))
            .await;
    let user = server.user("alice", BASIC_TIER).await;
    let json = server.upload(&user, png_bytes(300, 400)).await;

    let response = server.send(get(&thumbnail_url(&json, 200), None)).await;
    assert_eq!(
        response.headers().get("cache-control").unwrap(),
        "public, max-age=60"
    );
}

#[tokio::test]
async fn test_basic_original_is_forbidden() {
    let server = TestServer::new().await;
    let user = server.user("alice", BASIC_TIER).await;
    let json = server.upload(&user, png_bytes(300, 400)).await;
    let id = json["id"].as_str().unwrap();

    // The URL exists even though the API does not hand it out
    let response = server.send(get(&format!("/img/{}/", id), None)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let json = json_body(response).await;
    assert_eq!(json["error"], "forbidden");
    assert!(json["message"]
        .as_str()
        .unwrap()
        .contains("Upgrade your account tier"));
}

#[tokio::test]
async fn test_asset_urls_reject_malformed_ids() {
    let server = TestServer::new().await;

    for uri in [
        "/img/not-a-uuid/",
        "/img/thumb/123/",
        "/img/temp/00000000-0000-0000-0000-000000000000/",
    ] {
        let response = server.send(get(uri, None)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);
    }

    let response = server
        .send(get(&format!("/img/{}/", Uuid::new_v4()), None))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_asset_url_without_trailing_slash() {
    let server = TestServer::new().await;
    let user = server.user("bob", PREMIUM_TIER).await;
    let json = server.upload(&user, png_bytes(300, 400)).await;
    let id = json["id"].as_str().unwrap();

    let response = server.send(get(&format!("/img/{}", id), None)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

// =============================================================================
// Listing and Ownership
// =============================================================================

#[tokio::test]
async fn test_list_only_own_images_newest_first() {
    let server = TestServer::new().await;
    let alice = server.user("alice", BASIC_TIER).await;
    let bob = server.user("bob", BASIC_TIER).await;

    let first = server.upload(&alice, png_bytes(300, 400)).await;
    server.clock.advance(chrono::Duration::seconds(5));
    let second = server.upload(&alice, png_bytes(300, 500)).await;
    server.upload(&bob, png_bytes(300, 400)).await;

    let response = server.send(get("/api/images", Some(&alice))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let list = json_body(response).await;
    let ids: Vec<&str> = list
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["id"].as_str().unwrap())
        .collect();
    assert_eq!(
        ids,
        vec![second["id"].as_str().unwrap(), first["id"].as_str().unwrap()]
    );
}

#[tokio::test]
async fn test_get_image_of_other_user_is_not_found() {
    let server = TestServer::new().await;
    let alice = server.user("alice", BASIC_TIER).await;
    let bob = server.user("bob", BASIC_TIER).await;
    let json = server.upload(&alice, png_bytes(300, 400)).await;
    let uri = format!("/api/images/{}", json["id"].as_str().unwrap());

    let response = server.send(get(&uri, Some(&alice))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["id"], json["id"]);

    let response = server.send(get(&uri, Some(&bob))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = server.send(get(&uri, None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_replace_regenerates_thumbnails() {
    let server = TestServer::new().await;
    let user = server.user("bob", PREMIUM_TIER).await;
    let json = server.upload(&user, png_bytes(300, 400)).await;
    let uri = format!("/api/images/{}", json["id"].as_str().unwrap());
    let small_url = thumbnail_url(&json, 200);

    server.clock.advance(chrono::Duration::seconds(10));
    let response = server
        .send(put_bytes(&uri, Some(&user), jpeg_bytes(800, 800)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let replaced = json_body(response).await;

    assert_eq!(replaced["id"], json["id"]);
    assert_eq!(replaced["width"], 800);
    assert_eq!(replaced["created_at"], json["created_at"]);
    assert_ne!(replaced["updated_at"], json["updated_at"]);
    assert_eq!(thumbnail_heights(&replaced), vec![200, 400]);

    // Same thumbnail identity, new content
    assert_eq!(thumbnail_url(&replaced, 200), small_url);
    let response = server.send(get(&small_url, None)).await;
    assert_eq!(response.headers().get("content-type").unwrap(), "image/jpeg");
    assert_eq!(dimensions_of(&body_bytes(response).await), (200, 200));

    // Old original and old thumbnails are gone from storage
    assert_eq!(server.store.len().await, 3);
}

#[tokio::test]
async fn test_replace_by_other_user_is_forbidden() {
    let server = TestServer::new().await;
    let alice = server.user("alice", BASIC_TIER).await;
    let bob = server.user("bob", BASIC_TIER).await;
    let json = server.upload(&alice, png_bytes(300, 400)).await;
    let uri = format!("/api/images/{}", json["id"].as_str().unwrap());

    let response = server
        .send(put_bytes(&uri, Some(&bob), png_bytes(300, 400)))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = server
        .send(put_bytes(&uri, Some(&alice), png_bytes(300, 100)))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_image_cascades() {
    let server = TestServer::new().await;
    let alice = server.user("alice", PREMIUM_TIER).await;
    let bob = server.user("bob", PREMIUM_TIER).await;
    let json = server.upload(&alice, png_bytes(300, 400)).await;
    let uri = format!("/api/images/{}", json["id"].as_str().unwrap());
    let thumb = thumbnail_url(&json, 200);

    let response = server.send(delete(&uri, Some(&bob))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = server.send(delete(&uri, Some(&alice))).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    assert_eq!(
        server.send(get(&uri, Some(&alice))).await.status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        server.send(get(&thumb, None)).await.status(),
        StatusCode::NOT_FOUND
    );
    assert!(server.store.is_empty().await);

    let response = server.send(delete(&uri, Some(&alice))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
