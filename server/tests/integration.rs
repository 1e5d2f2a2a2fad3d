//! Integration tests for the speech server

mod common;

use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::json;
use tower::ServiceExt;

use common::*;
use tts_core::OrchestratorEvent;

#[tokio::test]
async fn test_health_check() {
    let app = create_test_app(false).await;
    for uri in ["/health", "/healthz", "/api/health"] {
        let (status, body) = get(&app.router, uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!("ok"));
    }
}

#[tokio::test]
async fn test_request_id_header() {
    let app = create_test_app(false).await;
    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let id = response.headers().get("x-request-id").unwrap().to_str().unwrap();
    assert_eq!(id.len(), 36);
}

#[tokio::test]
async fn test_list_voices_in_file_order() {
    let app = create_test_app(true).await;
    let (status, body) = get(&app.router, "/voices").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(["expr-voice-2-f", "expr-voice-3-m"]));
}

#[tokio::test]
async fn test_status_after_load() {
    let app = create_test_app(true).await;
    let (status, body) = get(&app.router, "/api/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], json!(true));
    assert_eq!(body["load_state"], json!("ready"));
    assert_eq!(body["playback"], json!("idle"));
    assert_eq!(body["selected_voice"], json!("expr-voice-2-f"));
}

#[tokio::test]
async fn test_speak_before_ready_is_unavailable() {
    let app = create_test_app(false).await;
    let (status, body) = post_json(&app.router, "/speak", json!({ "text": "Hello there." })).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], json!(503));
}

#[tokio::test]
async fn test_speak_accepts_and_streams_events() {
    let app = create_test_app(true).await;
    let mut events = app.host.subscribe();

    let (status, body) = post_json(
        &app.router,
        "/speak",
        json!({ "text": "## Hi\nHow are **you** today? Good.", "speed": 1.2 }),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["clauses"], json!(3));
    assert_eq!(body["generation"], json!(0));

    let mut pauses = Vec::new();
    while pauses.len() < 3 {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("event in time")
            .expect("host alive");
        if let OrchestratorEvent::Chunk { pause_ms, .. } = event {
            pauses.push(pause_ms);
        }
    }
    assert_eq!(pauses, vec![180, 250, 180]);

    let (_, metrics) = get(&app.router, "/metrics").await;
    assert_eq!(metrics["speak"]["request_count"], json!(1));
}

#[tokio::test]
async fn test_speak_validation() {
    let app = create_test_app(true).await;

    let (status, _) = post_json(&app.router, "/speak", json!({ "text": "" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post_json(&app.router, "/speak", json!({ "text": "Hi", "speed": 3.0 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post_json(&app.router, "/speak", json!({ "text": "🎉🎉" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) =
        post_json(&app.router, "/speak", json!({ "text": "Hi", "voice": "nobody" })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = post_json(&app.router, "/speak", json!({ "text": "a".repeat(6000) })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_set_voice() {
    let app = create_test_app(true).await;

    let (status, body) = post_json(&app.router, "/voice", json!({ "name": "expr-voice-3-m" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["selected_voice"], json!("expr-voice-3-m"));

    let (status, _) = post_json(&app.router, "/voice", json!({ "name": "missing" })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = post_json(&app.router, "/voice", json!({ "name": "bad name" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_flush_bumps_generation() {
    let app = create_test_app(true).await;

    let (status, body) = post_json(&app.router, "/flush", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["generation"], json!(1));

    let (_, body) = post_json(&app.router, "/api/speak", json!({ "text": "Again." })).await;
    assert_eq!(body["generation"], json!(1));
}
