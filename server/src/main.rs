use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::info;

use server::config::{OutputTarget, ServerConfig};
use server::host::spawn_host;
use server::metrics::AppMetrics;
use server::{app, AppState};
use tts_core::{AudioSink, Encoder, EspeakPhonemizer, NullSink, Orchestrator, WavSink};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let _ = dotenv::dotenv();

    async_main().await
}

async fn async_main() -> anyhow::Result<()> {
    info!("Starting speech server...");

    let config = ServerConfig::from_env();
    info!(
        "Server configuration loaded: port={}, rate_limit={}/min, model={}",
        config.port,
        config.rate_limit_per_minute,
        config.pipeline.model_path.display()
    );

    let sink: Box<dyn AudioSink> = match &config.output {
        OutputTarget::Wav(path) => {
            info!("Recording playback to {}", path.display());
            Box::new(WavSink::create(path, config.pipeline.output_sample_rate)?)
        }
        OutputTarget::Null => Box::new(NullSink),
    };

    let encoder = Encoder::new(Box::new(EspeakPhonemizer::new(
        config.espeak_program.clone(),
        config.espeak_voice.clone(),
    )));

    let mut orchestrator = Orchestrator::new(config.pipeline.clone(), loader(), encoder, sink)?
        .with_audio_events(config.stream_audio);
    // no browser autoplay gate on a server: start playback right away
    orchestrator.unlock()?;
    let load_state = orchestrator.init();
    info!("Loading speech model ({load_state:?})");

    let metrics = AppMetrics::new();
    let host = spawn_host(orchestrator, metrics.pipeline.clone());
    let state = AppState::new(host, metrics);
    let app = app(state, &config)?;

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!("Failed to bind {addr}: {e}. Try a different PORT.")
    })?;

    info!("Server listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(feature = "onnx")]
fn loader() -> tts_core::OnnxLoader {
    let intra_threads = std::thread::available_parallelism()
        .map(|n| n.get().min(4))
        .unwrap_or(1);
    tts_core::OnnxLoader { intra_threads }
}

#[cfg(not(feature = "onnx"))]
fn loader() -> impl tts_core::ModelLoader {
    tracing::warn!("Built without the `onnx` feature; the speech model cannot be loaded");
    |_: &std::path::Path| -> Result<Box<dyn tts_core::SpeechModel>, tts_core::EngineError> {
        Err(tts_core::EngineError::LoadFailure(
            "server built without ONNX support".to_string(),
        ))
    }
}
