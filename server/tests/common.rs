//! Common utilities for integration tests

use std::path::Path;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use tower::ServiceExt;

use server::host::{spawn_host, HostHandle};
use server::metrics::AppMetrics;
use server::{build_router, AppState};
use tts_core::engine::SpeechModel;
use tts_core::{EngineError, Encoder, NullSink, Orchestrator, PipelineConfig, RuleBasedPhonemizer};

/// Stand-in model: a short tone per token.
struct ToneModel;

impl SpeechModel for ToneModel {
    fn infer(&mut self, token_ids: &[i64], style: &[f32], _speed: f32) -> Result<Vec<f32>, EngineError> {
        let level = style.first().copied().unwrap_or(0.3);
        Ok(vec![level; token_ids.len() * 20])
    }
}

fn tone_loader(_: &Path) -> Result<Box<dyn SpeechModel>, EngineError> {
    Ok(Box::new(ToneModel))
}

pub struct TestApp {
    pub router: Router,
    pub host: HostHandle,
    _voices: tempfile::NamedTempFile,
}

fn test_config() -> PipelineConfig {
    PipelineConfig {
        model_sample_rate: 8_000,
        output_sample_rate: 8_000,
        quantum_samples: 80,
        ..Default::default()
    }
}

/// Build the router around a live orchestrator. With `load` the model is
/// loaded and the call waits until it is ready.
pub async fn create_test_app(load: bool) -> TestApp {
    let voices = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(
        voices.path(),
        r#"{ "expr-voice-2-f": [0.4], "expr-voice-3-m": [0.2] }"#,
    )
    .unwrap();

    let mut orchestrator = Orchestrator::new(
        test_config(),
        tone_loader,
        Encoder::new(Box::new(RuleBasedPhonemizer)),
        Box::new(NullSink),
    )
    .unwrap();
    orchestrator.unlock().unwrap();
    if load {
        orchestrator.init_from("kitten.onnx", voices.path());
    }

    let metrics = AppMetrics::new();
    let host = spawn_host(orchestrator, metrics.pipeline.clone());
    if load {
        let mut status = host.watch_status();
        tokio::time::timeout(Duration::from_secs(5), status.wait_for(|s| s.ready))
            .await
            .expect("model ready in time")
            .expect("host alive");
    }

    let router = build_router(AppState::new(host.clone(), metrics));
    TestApp {
        router,
        host,
        _voices: voices,
    }
}

pub async fn get(router: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    send(router, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

pub async fn post_json(router: &Router, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(router, request).await
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&body)
        .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(&body).into_owned()));
    (status, json)
}
