use std::sync::Arc;

use anyhow::Result;
use assert_json_diff::assert_json_eq;
use chrono::Utc;
use link_resolver::{
    analytics::device::DeviceType,
    config::Config,
    store::memory::MemoryStore,
    utils::test_utils::{insert_link, insert_link_with_id, insert_team},
};
use reqwest::StatusCode;
use serde_json::{json, Value};

use crate::helpers::*;

pub mod helpers;

#[tokio::test]
async fn should_return_200_for_liveness_check() -> Result<()> {
    let server_handle = ServerHandle::for_store(Arc::new(MemoryStore::new())).await;

    let response = reqwest::get(server_handle.url("/_liveness")).await?;

    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn should_return_200_for_readiness_check() -> Result<()> {
    let server_handle = ServerHandle::for_store(Arc::new(MemoryStore::new())).await;

    let response = reqwest::get(server_handle.url("/_readiness")).await?;

    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn should_resolve_slug_and_short_id() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let team = insert_team(&store, "Acme", Some("acme"));
    let link = insert_link(&store, &team.id, Some(42), "https://example.com/42");
    let server_handle = ServerHandle::for_store(store.clone()).await;

    let response = reqwest::get(server_handle.url("/open/acme-42")).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await?;
    assert_json_eq!(
        body,
        json!({
            "type": "single",
            "link": {
                "id": link.id,
                "shortId": 42,
                "title": "Link to https://example.com/42",
                "targetUrl": "https://example.com/42"
            },
            "logoUrl": "https://cdn.example.com/acme.png",
            "teamName": "Acme",
            "teamSlug": "acme",
            "backgroundColor": "#ffffff",
            "textColor": "#111111",
            "highlightColor": "#ff6600"
        })
    );
    Ok(())
}

#[tokio::test]
async fn should_return_identical_bodies_for_path_and_url_forms() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let team = insert_team(&store, "Acme", None);
    insert_link(&store, &team.id, Some(41), "https://example.com/41");
    insert_link(&store, &team.id, Some(42), "https://example.com/42");
    let server_handle = ServerHandle::for_store(store.clone()).await;
    let client = reqwest::Client::new();

    let from_path: Value = client
        .get(server_handle.url("/open/acme-42"))
        .send()
        .await?
        .json()
        .await?;

    let response = client
        .post(server_handle.url("/open/resolve"))
        .json(&json!({ "url": "https://go.example.com/open/acme-42" }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let from_url: Value = response.json().await?;

    assert_json_eq!(from_path, from_url);
    assert_eq!(from_path["link"]["targetUrl"], "https://example.com/42");
    assert_eq!(store.analytics_events().len(), 2);
    Ok(())
}

#[tokio::test]
async fn should_prefer_path_short_id_over_query_id() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let team = insert_team(&store, "Acme", Some("acme"));
    insert_link(&store, &team.id, Some(7), "https://example.com/7");
    insert_link(&store, &team.id, Some(42), "https://example.com/42");
    let server_handle = ServerHandle::for_store(store).await;

    let response = reqwest::Client::new()
        .post(server_handle.url("/open/resolve"))
        .json(&json!({ "url": "https://example.com/open/acme-42?id=7" }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await?;
    assert_eq!(body["link"]["shortId"], 42);
    assert_eq!(body["link"]["targetUrl"], "https://example.com/42");
    Ok(())
}

#[tokio::test]
async fn should_resolve_bare_link_id() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let team = insert_team(&store, "Acme", Some("acme"));
    insert_link_with_id(
        &store,
        "xk3fa9",
        &team.id,
        None,
        "https://example.com/raw",
        Utc::now(),
    );
    let server_handle = ServerHandle::for_store(store).await;

    let body: Value = reqwest::get(server_handle.url("/open/xk3fa9"))
        .await?
        .json()
        .await?;

    assert_eq!(body["type"], "single");
    assert_eq!(body["link"]["id"], "xk3fa9");
    assert_eq!(body["link"]["shortId"], Value::Null);
    assert_eq!(body["link"]["targetUrl"], "https://example.com/raw");
    Ok(())
}

#[tokio::test]
async fn should_list_team_links_for_bare_slug() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let team = insert_team(&store, "Acme", Some("acme"));
    let first = insert_link(&store, &team.id, Some(1), "https://example.com/1");
    let second = insert_link(&store, &team.id, Some(2), "https://example.com/2");
    let third = insert_link(&store, &team.id, Some(3), "https://example.com/3");
    let server_handle = ServerHandle::for_store(store.clone()).await;

    let response = reqwest::get(server_handle.url("/open/acme")).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await?;
    assert_eq!(body["type"], "list");
    assert_eq!(body["teamName"], "Acme");
    let ids: Vec<&str> = body["links"]
        .as_array()
        .unwrap()
        .iter()
        .map(|link| link["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![third.id.as_str(), second.id.as_str(), first.id.as_str()]);
    assert!(store.analytics_events().is_empty());
    Ok(())
}

#[tokio::test]
async fn should_return_404_without_mutation_for_unknown_team() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    insert_team(&store, "Acme", Some("acme"));
    let server_handle = ServerHandle::for_store(store.clone()).await;

    let response = reqwest::get(server_handle.url("/open/unknown-99")).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body: Value = response.json().await?;
    assert_json_eq!(
        body,
        json!({ "error": "team_not_found", "message": "Team not found" })
    );
    assert_eq!(store.mutation_count(), 0);
    Ok(())
}

#[tokio::test]
async fn should_return_404_for_team_without_links() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    insert_team(&store, "Acme", Some("acme"));
    let server_handle = ServerHandle::for_store(store).await;

    let response = reqwest::get(server_handle.url("/open/acme")).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body: Value = response.json().await?;
    assert_eq!(body["error"], "no_links_for_team");
    Ok(())
}

#[tokio::test]
async fn should_return_400_for_bad_resolve_requests() -> Result<()> {
    let server_handle = ServerHandle::for_store(Arc::new(MemoryStore::new())).await;
    let client = reqwest::Client::new();

    for (body, message) in [
        (json!({}), "Request URL is required"),
        (json!({ "url": "   " }), "Request URL is required"),
        (json!({ "url": "not a url" }), "Invalid request URL"),
        (json!({ "url": "https://example.com/" }), "Link identifier is required"),
        (json!({ "url": 42 }), "Invalid request body"),
    ] {
        let response = client
            .post(server_handle.url("/open/resolve"))
            .json(&body)
            .send()
            .await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");

        let error: Value = response.json().await?;
        assert_eq!(error["error"], "invalid_request");
        assert_eq!(error["message"], message);
    }
    Ok(())
}

#[tokio::test]
async fn should_return_503_when_storage_is_not_configured() -> Result<()> {
    let config = Config::default_for_test();
    assert!(config.database_url.is_none());
    let server_handle = ServerHandle::for_config(config).await;

    let response = reqwest::get(server_handle.url("/open/acme-42")).await?;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body: Value = response.json().await?;
    assert_json_eq!(
        body,
        json!({
            "error": "storage_unavailable",
            "message": "Database not configured or unreachable"
        })
    );
    Ok(())
}

#[tokio::test]
async fn should_return_503_when_storage_goes_away() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let team = insert_team(&store, "Acme", Some("acme"));
    insert_link(&store, &team.id, Some(1), "https://example.com/1");
    let server_handle = ServerHandle::for_store(store.clone()).await;

    store.set_unavailable(true);
    let response = reqwest::get(server_handle.url("/open/acme-1")).await?;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    Ok(())
}

#[tokio::test]
async fn should_resolve_when_analytics_writes_fail() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let team = insert_team(&store, "Acme", Some("acme"));
    insert_link(&store, &team.id, Some(1), "https://example.com/1");
    store.fail_analytics_writes(true);
    let server_handle = ServerHandle::for_store(store.clone()).await;

    let response = reqwest::get(server_handle.url("/open/acme-1")).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await?;
    assert_eq!(body["link"]["targetUrl"], "https://example.com/1");
    assert!(store.analytics_events().is_empty());
    Ok(())
}

#[tokio::test]
async fn should_record_click_details() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let team = insert_team(&store, "Acme", Some("acme"));
    let link = insert_link(&store, &team.id, Some(1), "https://example.com/1");
    let server_handle = ServerHandle::for_store(store.clone()).await;

    let response = reqwest::Client::new()
        .get(server_handle.url("/open/acme-1"))
        .header("user-agent", "Googlebot/2.1 (+http://www.google.com/bot.html)")
        .header("referer", "https://search.example.com")
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let events = store.analytics_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].link_id, link.id);
    assert_eq!(events[0].device, DeviceType::Bot);
    assert_eq!(
        events[0].referrer.as_deref(),
        Some("https://search.example.com")
    );
    Ok(())
}

#[tokio::test]
async fn should_serve_legacy_shape() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let team = insert_team(&store, "Acme", Some("acme"));
    insert_link(&store, &team.id, Some(42), "https://example.com/42");
    let server_handle = ServerHandle::for_store(store.clone()).await;

    let response = reqwest::get(server_handle.url("/v0/open/acme-42")).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await?;
    assert_json_eq!(
        body,
        json!({
            "targetUrl": "https://example.com/42",
            "logoUrl": "https://cdn.example.com/acme.png",
            "teamName": "Acme",
            "backgroundColor": "#ffffff",
            "textColor": "#111111",
            "highlightColor": "#ff6600"
        })
    );
    assert_eq!(store.analytics_events().len(), 1);

    // no listing on the legacy route
    let response = reqwest::get(server_handle.url("/v0/open/acme")).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    Ok(())
}
