//! Synthesis engine.
//!
//! Inference runs on a dedicated OS thread that owns the model session and
//! the voice table. The control side talks to it only through
//! [`EngineRequest`] messages and reads back [`EngineEvent`]s; PCM produced by
//! the worker is moved through the channel, never shared.

mod voices;

#[cfg(feature = "onnx")]
mod onnx;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::dsp::{PcmBuffer, PostProcessor};
use crate::error::{EngineError, ErrorReport};

#[cfg(feature = "onnx")]
pub use onnx::OnnxSpeechModel;
pub use voices::{VoiceEmbedding, VoiceTable};

/// The opaque inference step: token ids + style embedding + speed → PCM at
/// the model's native rate.
pub trait SpeechModel {
    fn infer(&mut self, token_ids: &[i64], style: &[f32], speed: f32) -> Result<Vec<f32>, EngineError>;
}

/// Builds a [`SpeechModel`] on the worker thread, so the model itself never
/// has to cross threads.
pub trait ModelLoader: Send + 'static {
    fn load(&self, model_path: &Path) -> Result<Box<dyn SpeechModel>, EngineError>;
}

impl<F> ModelLoader for F
where
    F: Fn(&Path) -> Result<Box<dyn SpeechModel>, EngineError> + Send + 'static,
{
    fn load(&self, model_path: &Path) -> Result<Box<dyn SpeechModel>, EngineError> {
        self(model_path)
    }
}

/// Loads [`OnnxSpeechModel`]s.
#[cfg(feature = "onnx")]
#[derive(Debug, Clone, Copy)]
pub struct OnnxLoader {
    pub intra_threads: usize,
}

#[cfg(feature = "onnx")]
impl Default for OnnxLoader {
    fn default() -> Self {
        Self { intra_threads: 1 }
    }
}

#[cfg(feature = "onnx")]
impl ModelLoader for OnnxLoader {
    fn load(&self, model_path: &Path) -> Result<Box<dyn SpeechModel>, EngineError> {
        Ok(Box::new(OnnxSpeechModel::load(model_path, self.intra_threads)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    Unloaded,
    Loading,
    Ready,
    Failed,
}

#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    /// Flush generation the request was issued in
    pub generation: u64,
    pub token_ids: Vec<i64>,
    pub voice: String,
    pub speed: f32,
    /// Silence to play after this clause
    pub pause_ms: u32,
}

#[derive(Debug)]
pub enum EngineRequest {
    Load { model_path: PathBuf, voices_path: PathBuf },
    Synthesize(SynthesisRequest),
    Dispose,
    Shutdown,
}

#[derive(Debug)]
pub enum EngineEvent {
    Ready {
        voices: Vec<String>,
    },
    Pcm {
        generation: u64,
        pcm: PcmBuffer,
        pause_ms: u32,
    },
    /// Synthesis succeeded but nothing audible was left after trimming.
    Skipped {
        generation: u64,
    },
    Error {
        generation: Option<u64>,
        report: ErrorReport,
    },
}

/// Control-side handle to the synthesis worker.
///
/// Dropping the handle shuts the worker down and joins it.
pub struct SynthesisHandle {
    requests: UnboundedSender<EngineRequest>,
    state: Arc<Mutex<LoadState>>,
    thread: Option<JoinHandle<()>>,
}

impl SynthesisHandle {
    pub fn spawn(
        loader: impl ModelLoader,
        config: &PipelineConfig,
    ) -> anyhow::Result<(Self, UnboundedReceiver<EngineEvent>)> {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(LoadState::Unloaded));

        let post = PostProcessor::from_config(config);
        let (model_rate, out_rate) = (config.model_sample_rate, config.output_sample_rate);
        let worker_state = Arc::clone(&state);
        let loader: Box<dyn ModelLoader> = Box::new(loader);

        // the model is created and dropped on this thread only
        let thread = std::thread::Builder::new()
            .name("tts-synthesis".to_string())
            .spawn(move || {
                let worker = Worker {
                    loader,
                    model: None,
                    voices: None,
                    post,
                    model_rate,
                    out_rate,
                    state: worker_state,
                    events: event_tx,
                };
                worker.run(request_rx)
            })?;

        Ok((
            Self {
                requests: request_tx,
                state,
                thread: Some(thread),
            },
            event_rx,
        ))
    }

    pub fn state(&self) -> LoadState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start loading unless a load is in flight or already succeeded.
    ///
    /// Returns the state after the call; `Loading` means a load was started
    /// (or is still running).
    pub fn load(&self, model_path: impl Into<PathBuf>, voices_path: impl Into<PathBuf>) -> LoadState {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*state, LoadState::Loading | LoadState::Ready) {
            return *state;
        }
        let request = EngineRequest::Load {
            model_path: model_path.into(),
            voices_path: voices_path.into(),
        };
        if self.requests.send(request).is_err() {
            error!("Synthesis worker is gone, cannot load");
            *state = LoadState::Failed;
            return *state;
        }
        *state = LoadState::Loading;
        *state
    }

    pub fn synthesize(&self, request: SynthesisRequest) {
        if self.requests.send(EngineRequest::Synthesize(request)).is_err() {
            warn!("Synthesis worker is gone, dropping request");
        }
    }

    /// Release the model and voices. The state flips to `Unloaded` right
    /// away so a following `load` is queued behind the release.
    pub fn dispose(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if self.requests.send(EngineRequest::Dispose).is_err() {
            warn!("Synthesis worker is gone, nothing to dispose");
        }
        *state = LoadState::Unloaded;
    }
}

impl Drop for SynthesisHandle {
    fn drop(&mut self) {
        let _ = self.requests.send(EngineRequest::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Synthesis worker panicked");
            }
        }
    }
}

struct Worker {
    loader: Box<dyn ModelLoader>,
    model: Option<Box<dyn SpeechModel>>,
    voices: Option<VoiceTable>,
    post: PostProcessor,
    model_rate: u32,
    out_rate: u32,
    state: Arc<Mutex<LoadState>>,
    events: UnboundedSender<EngineEvent>,
}

impl Worker {
    fn run(mut self, mut requests: UnboundedReceiver<EngineRequest>) {
        debug!("Synthesis worker started");
        while let Some(request) = requests.blocking_recv() {
            match request {
                EngineRequest::Load {
                    model_path,
                    voices_path,
                } => self.load(&model_path, &voices_path),
                EngineRequest::Synthesize(request) => self.synthesize(request),
                EngineRequest::Dispose => self.dispose(),
                EngineRequest::Shutdown => break,
            }
        }
        debug!("Synthesis worker stopped");
    }

    fn set_state(&self, next: LoadState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }

    fn emit(&self, event: EngineEvent) {
        // receiver gone means the orchestrator is shutting down
        let _ = self.events.send(event);
    }

    fn load(&mut self, model_path: &Path, voices_path: &Path) {
        let started = Instant::now();
        let loaded = self
            .loader
            .load(model_path)
            .and_then(|model| Ok((model, VoiceTable::load(voices_path)?)));

        match loaded {
            Ok((model, voices)) => {
                let names = voices.names();
                info!(
                    "Speech model ready in {:.2}s with {} voice(s)",
                    started.elapsed().as_secs_f64(),
                    names.len()
                );
                self.model = Some(model);
                self.voices = Some(voices);
                self.set_state(LoadState::Ready);
                self.emit(EngineEvent::Ready { voices: names });
            }
            Err(e) => {
                error!("Failed to load speech model: {e}");
                self.set_state(LoadState::Failed);
                self.emit(EngineEvent::Error {
                    generation: None,
                    report: e.into(),
                });
            }
        }
    }

    fn synthesize(&mut self, request: SynthesisRequest) {
        let generation = request.generation;
        match self.render(&request) {
            Ok(pcm) if pcm.is_empty() => {
                debug!("Clause produced no audible samples, skipping");
                self.emit(EngineEvent::Skipped { generation });
            }
            Ok(pcm) => self.emit(EngineEvent::Pcm {
                generation,
                pcm,
                pause_ms: request.pause_ms,
            }),
            Err(e) => {
                warn!("Synthesis failed: {e}");
                self.emit(EngineEvent::Error {
                    generation: Some(generation),
                    report: e.into(),
                });
            }
        }
    }

    fn render(&mut self, request: &SynthesisRequest) -> Result<PcmBuffer, EngineError> {
        let (Some(model), Some(voices)) = (self.model.as_mut(), self.voices.as_ref()) else {
            return Err(EngineError::NotLoaded);
        };
        let voice = voices.resolve(&request.voice)?;
        if voice.name != request.voice {
            debug!("Voice '{}' unknown, using '{}'", request.voice, voice.name);
        }

        let started = Instant::now();
        let raw = model.infer(&request.token_ids, &voice.style, request.speed)?;
        let pcm = self
            .post
            .process(PcmBuffer::new(raw, self.model_rate), self.out_rate);
        debug!(
            "Synthesized {} tokens into {} ms of audio in {:.0} ms",
            request.token_ids.len(),
            pcm.duration_ms(),
            started.elapsed().as_secs_f64() * 1000.0
        );
        Ok(pcm)
    }

    // the handle already moved the shared state to `Unloaded`
    fn dispose(&mut self) {
        self.model = None;
        self.voices = None;
        info!("Speech model released");
    }
}
