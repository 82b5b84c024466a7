//! End-to-end tests over a real listening server: health, resolution,
//! quota and the streaming generation endpoint.

mod common;

use common::{StubMirror, StubProvider, TestServer};
use futures::StreamExt;
use serde_json::{json, Value};
use std::sync::Arc;

#[tokio::test]
async fn test_health() {
    let server = TestServer::spawn().await;
    let response = reqwest::get(format!("{}/health", server.base_url))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_resolve_rejects_missing_params() {
    let server = TestServer::spawn().await;
    let response = reqwest::get(format!("{}/api/resolve?artist=X", server.base_url))
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_resolve_miss_without_backends() {
    let server = TestServer::spawn().await;
    let response = reqwest::get(format!(
        "{}/api/resolve?artist=Daft%20Punk&title=Around%20The%20World",
        server.base_url
    ))
    .await
    .unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["found"], json!(false));
    assert!(body["media"].is_null());
}

#[tokio::test]
async fn test_resolve_hit_through_mirror() {
    let server = TestServer::spawn_with(vec![], vec![Arc::new(StubMirror)]).await;
    let client = reqwest::Client::new();
    let url = format!(
        "{}/api/resolve?artist=Moderat&title=A%20New%20Error",
        server.base_url
    );

    let body: Value = client.get(&url).send().await.unwrap().json().await.unwrap();
    assert_eq!(body["found"], json!(true));
    assert_eq!(body["media"]["provenance"], json!("mirror-a"));
    assert_eq!(body["media"]["duration_secs"], json!(180));

    // Second call is served from the cache.
    let again: Value = client.get(&url).send().await.unwrap().json().await.unwrap();
    assert_eq!(again["media"]["provenance"], json!("cache"));
}

#[tokio::test]
async fn test_resolve_batch_alignment() {
    let server = TestServer::spawn_with(vec![], vec![Arc::new(StubMirror)]).await;
    let client = reqwest::Client::new();

    let body = json!({
        "pairs": [
            {"artist": "A", "title": "One"},
            {"artist": "B", "title": "Two"}
        ]
    });
    let response: Value = client
        .post(format!("{}/api/resolve/batch", server.base_url))
        .json(&body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let results = response["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| !r.is_null()));
}

#[tokio::test]
async fn test_quota_endpoints() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let status: Value = client
        .get(format!("{}/api/quota/search", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["available"], json!(true));
    assert_eq!(status["remaining"], json!(10_000));
    assert_eq!(status["cost"], json!(100));

    let unknown = client
        .get(format!("{}/api/quota/video", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), 404);
}

#[tokio::test]
async fn test_generate_rejects_unknown_provider() {
    let providers: Vec<Arc<dyn setforge_server::generation::TrackListProvider>> =
        vec![Arc::new(StubProvider {
            id: "alpha".to_string(),
            track_count: 2,
            fail: false,
        })];
    let server = TestServer::spawn_with(providers, vec![]).await;

    let response = reqwest::Client::new()
        .post(format!("{}/api/generate", server.base_url))
        .json(&json!({
            "prompt": "test",
            "track_count": 2,
            "roster": ["nonexistent"]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

/// Collect SSE `data:` payloads until the connection closes.
async fn collect_events(response: reqwest::Response) -> Vec<Value> {
    let mut events = Vec::new();
    let mut buffer = String::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        buffer.push_str(&String::from_utf8_lossy(&chunk.unwrap()));
    }
    for line in buffer.lines() {
        if let Some(payload) = line.strip_prefix("data: ") {
            if let Ok(value) = serde_json::from_str(payload) {
                events.push(value);
            }
        }
    }
    events
}

#[tokio::test]
async fn test_generate_streams_race_events() {
    let providers: Vec<Arc<dyn setforge_server::generation::TrackListProvider>> = vec![
        Arc::new(StubProvider {
            id: "alpha".to_string(),
            track_count: 2,
            fail: false,
        }),
        Arc::new(StubProvider {
            id: "beta".to_string(),
            track_count: 2,
            fail: true,
        }),
    ];
    let server = TestServer::spawn_with(providers, vec![Arc::new(StubMirror)]).await;

    let response = reqwest::Client::new()
        .post(format!("{}/api/generate", server.base_url))
        .json(&json!({"prompt": "warehouse techno", "track_count": 2}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let events = collect_events(response).await;
    let types: Vec<&str> = events
        .iter()
        .map(|e| e["type"].as_str().unwrap())
        .collect();

    assert_eq!(types[0], "started");
    assert!(types.contains(&"primary-result"));
    assert!(types.contains(&"provider-failed"));
    assert_eq!(types.last().unwrap(), &"complete");

    let primary = events
        .iter()
        .find(|e| e["type"] == "primary-result")
        .unwrap();
    assert_eq!(primary["provider"], json!("alpha"));
    assert_eq!(primary["tracks"].as_array().unwrap().len(), 2);

    let enriched: Vec<&Value> = events
        .iter()
        .filter(|e| e["type"] == "track-enriched")
        .collect();
    assert_eq!(enriched.len(), 2);
    assert!(enriched.iter().all(|e| !e["media"].is_null()));

    let complete = events.last().unwrap();
    assert_eq!(complete["primary"], json!("alpha"));
    assert_eq!(complete["failed"], json!(["beta"]));
}

#[tokio::test]
async fn test_generate_all_failed() {
    let providers: Vec<Arc<dyn setforge_server::generation::TrackListProvider>> =
        vec![Arc::new(StubProvider {
            id: "alpha".to_string(),
            track_count: 0,
            fail: true,
        })];
    let server = TestServer::spawn_with(providers, vec![]).await;

    let response = reqwest::Client::new()
        .post(format!("{}/api/generate", server.base_url))
        .json(&json!({"prompt": "anything", "track_count": 3}))
        .send()
        .await
        .unwrap();
    let events = collect_events(response).await;

    let last = events.last().unwrap();
    assert_eq!(last["type"], json!("all-failed"));
    assert!(last["errors"]["alpha"]
        .as_str()
        .unwrap()
        .contains("stub down"));
}
