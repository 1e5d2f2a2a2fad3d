pub mod config;
pub mod error;
pub mod host;
pub mod metrics;
pub mod validation;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        DefaultBodyLimit, Request, State, WebSocketUpgrade,
    },
    http::{HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tower::ServiceBuilder;
use tower_governor::{governor::GovernorConfigBuilder, key_extractor::GlobalKeyExtractor, GovernorLayer};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{debug, info, warn};

use tts_core::{clean_for_speech, SpeakOptions};

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::host::{HostHandle, HostStatus};
use crate::metrics::{system_metrics, AppMetrics, MetricsResponse};
use crate::validation::{validate_speak_request, validate_voice_name};

/// Speak bodies carry at most a few thousand characters of text.
const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub host: HostHandle,
    pub metrics: AppMetrics,
    pub request_count: Arc<AtomicU64>,
    pub started: Instant,
}

impl AppState {
    pub fn new(host: HostHandle, metrics: AppMetrics) -> Self {
        Self {
            host,
            metrics,
            request_count: Arc::new(AtomicU64::new(0)),
            started: Instant::now(),
        }
    }
}

#[derive(Deserialize)]
pub struct SpeakRequest {
    pub text: String,
    pub voice: Option<String>,
    pub speed: Option<f32>,
}

#[derive(Serialize)]
pub struct SpeakResponse {
    pub clauses: usize,
    pub generation: u64,
}

#[derive(Deserialize)]
pub struct VoiceRequest {
    pub name: String,
}

#[derive(Serialize)]
pub struct FlushResponse {
    pub generation: u64,
}

/// Routes plus request ids, without the network-facing middleware.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(health_check))
        .route("/status", get(status))
        .route("/voices", get(list_voices))
        .route("/voice", post(set_voice))
        .route("/speak", post(speak))
        .route("/flush", post(flush))
        .route("/events", get(events_ws))
        .route("/metrics", get(metrics_endpoint));

    Router::new()
        .merge(api.clone()) // root paths
        .nest("/api", api) // /api prefix
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(axum::middleware::from_fn(add_request_id))
        .with_state(state)
}

/// Full application: routes wrapped in the network-facing middleware.
pub fn app(state: AppState, config: &ServerConfig) -> anyhow::Result<Router> {
    // one global bucket; per-IP keys are unreliable behind proxies
    let replenish_ms = 60_000 / u64::from(config.rate_limit_per_minute.max(1));
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(replenish_ms.max(1))
            .burst_size(config.rate_limit_per_minute.max(1))
            .key_extractor(GlobalKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("invalid rate limit configuration"))?,
    );
    info!("Rate limiting: {} requests per minute", config.rate_limit_per_minute);

    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(GovernorLayer::new(governor_conf))
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(cors_layer(config))
        .into_inner();

    Ok(build_router(state).layer(middleware_stack))
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .allow_credentials(false);

    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .flatten()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    if origins.is_empty() {
        warn!("CORS_ALLOWED_ORIGINS not set or empty, allowing all origins");
        base.allow_origin(Any)
    } else {
        info!("CORS configured for {} origin(s)", origins.len());
        base.allow_origin(AllowOrigin::list(origins))
    }
}

async fn add_request_id(mut request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    // a v4 uuid is always a valid header value
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        request.headers_mut().insert("x-request-id", value.clone());
        let mut response = next.run(request).await;
        response.headers_mut().insert("x-request-id", value);
        return response;
    }
    next.run(request).await
}

pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn status(State(state): State<AppState>) -> Json<HostStatus> {
    Json(state.host.status())
}

pub async fn list_voices(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.host.status().voices)
}

pub async fn set_voice(
    State(state): State<AppState>,
    Json(req): Json<VoiceRequest>,
) -> Result<Json<HostStatus>, ApiError> {
    validate_voice_name(&req.name)?;
    let current = state.host.status();
    if !current.voices.iter().any(|v| v == &req.name) {
        return Err(ApiError::UnknownVoice(req.name));
    }

    state.host.set_voice(req.name.clone()).await?;
    let mut watcher = state.host.watch_status();
    let updated = watcher
        .wait_for(|s| s.selected_voice.as_deref() == Some(req.name.as_str()))
        .await
        .map_err(|_| anyhow::anyhow!("speech host has stopped"))?
        .clone();
    Ok(Json(updated))
}

pub async fn speak(
    State(state): State<AppState>,
    Json(req): Json<SpeakRequest>,
) -> Result<(StatusCode, Json<SpeakResponse>), ApiError> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    let started = Instant::now();

    let result = speak_inner(&state, req).await;
    match &result {
        Ok(_) => state
            .metrics
            .speak
            .record_request(started.elapsed().as_millis() as u64),
        Err(_) => state.metrics.speak.record_error(),
    }
    result
}

async fn speak_inner(
    state: &AppState,
    req: SpeakRequest,
) -> Result<(StatusCode, Json<SpeakResponse>), ApiError> {
    validate_speak_request(&req.text, req.speed)?;
    if let Some(voice) = &req.voice {
        validate_voice_name(voice)?;
    }

    let status = state.host.status();
    if !status.ready {
        return Err(ApiError::NotReady(status.load_state));
    }
    if let Some(voice) = &req.voice {
        if !status.voices.contains(voice) {
            return Err(ApiError::UnknownVoice(voice.clone()));
        }
    }

    let text = clean_for_speech(&req.text);
    if text.is_empty() {
        return Err(ApiError::InvalidInput(
            "Text has nothing speakable after cleanup".to_string(),
        ));
    }

    let accepted = state
        .host
        .speak(
            text,
            SpeakOptions {
                voice: req.voice,
                speed: req.speed,
                pause_ms: 0,
            },
        )
        .await?;
    info!(
        "Speak request accepted: {} clause(s), generation {}",
        accepted.clauses, accepted.generation
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(SpeakResponse {
            clauses: accepted.clauses,
            generation: accepted.generation,
        }),
    ))
}

pub async fn flush(State(state): State<AppState>) -> Result<Json<FlushResponse>, ApiError> {
    let generation = state.host.flush().await?;
    Ok(Json(FlushResponse { generation }))
}

pub async fn metrics_endpoint(State(state): State<AppState>) -> Json<MetricsResponse> {
    let request_count = state.request_count.load(Ordering::Relaxed);
    let uptime = state.started.elapsed().as_secs();

    Json(MetricsResponse {
        timestamp: chrono::Utc::now(),
        system: system_metrics(request_count, uptime),
        speak: state.metrics.speak.stats(),
        pipeline: state.metrics.pipeline.stats(),
    })
}

pub async fn events_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| forward_events(socket, state))
}

/// Push every orchestrator event to the client as JSON until it disconnects.
async fn forward_events(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.host.subscribe();

    let hello = serde_json::json!({ "type": "status", "status": state.host.status() });
    if sender.send(Message::Text(hello.to_string().into())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let json = match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!("Failed to serialize event: {e}");
                            continue;
                        }
                    };
                    if let Err(e) = sender.send(Message::Text(json.into())).await {
                        debug!("Event socket closed: {e}");
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!("Event socket lagging, skipped {missed} event(s)");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }
    let _ = sender.close().await;
}
