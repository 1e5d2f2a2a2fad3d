//! Control domain: ties the synthesis worker and the render thread together.
//!
//! The orchestrator owns every piece of mutable pipeline state (readiness,
//! voice selection, playback state, flush generation). It never blocks: work
//! is dispatched as messages and results come back through
//! [`Orchestrator::next_event`], which the host polls from its own task.

use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use crate::config::{ms_to_samples, PipelineConfig};
use crate::dsp::PcmBuffer;
use crate::engine::{EngineEvent, LoadState, ModelLoader, SynthesisHandle, SynthesisRequest};
use crate::error::ErrorReport;
use crate::phoneme::Encoder;
use crate::playback::{AudioSink, PlaybackEngine, PlaybackEvent, RenderThread};
use crate::text::speakable_clauses;
use crate::wav::encode_wav_base64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    Idle,
    Speaking,
}

#[derive(Debug, Clone, Default)]
pub struct SpeakOptions {
    /// Overrides the selected voice for this request
    pub voice: Option<String>,
    /// Defaults to the configured speed
    pub speed: Option<f32>,
    /// Silence queued after the synthesized audio
    pub pause_ms: u32,
}

/// Host-facing notifications.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    Ready {
        voices: Vec<String>,
    },
    /// Synthesized audio was handed to playback.
    Chunk {
        generation: u64,
        duration_ms: u64,
        pause_ms: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        wav_base64: Option<String>,
    },
    Skipped {
        generation: u64,
    },
    Drained,
    Overflow {
        dropped_samples: usize,
    },
    Error {
        #[serde(flatten)]
        report: ErrorReport,
    },
}

pub struct Orchestrator {
    config: PipelineConfig,
    encoder: Encoder,
    engine: SynthesisHandle,
    engine_events: UnboundedReceiver<EngineEvent>,
    sink: Option<Box<dyn AudioSink>>,
    render: Option<RenderThread>,
    playback_events: Option<UnboundedReceiver<PlaybackEvent>>,
    ready: bool,
    voices: Vec<String>,
    selected_voice: Option<String>,
    state: PlaybackState,
    generation: u64,
    audio_events: bool,
}

impl Orchestrator {
    /// Spawn the synthesis worker. Playback stays locked until [`unlock`].
    ///
    /// [`unlock`]: Orchestrator::unlock
    pub fn new(
        config: PipelineConfig,
        loader: impl ModelLoader,
        encoder: Encoder,
        sink: Box<dyn AudioSink>,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let (engine, engine_events) = SynthesisHandle::spawn(loader, &config)?;
        Ok(Self {
            config,
            encoder,
            engine,
            engine_events,
            sink: Some(sink),
            render: None,
            playback_events: None,
            ready: false,
            voices: Vec::new(),
            selected_voice: None,
            state: PlaybackState::Idle,
            generation: 0,
            audio_events: false,
        })
    }

    /// Attach a Base64 WAV copy of every chunk to [`OrchestratorEvent::Chunk`].
    pub fn with_audio_events(mut self, enabled: bool) -> Self {
        self.audio_events = enabled;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load the model and voices from the configured paths.
    pub fn init(&self) -> LoadState {
        self.init_from(
            self.config.model_path.clone(),
            self.config.voices_path.clone(),
        )
    }

    /// Load from explicit paths. Calling again while loading or loaded is a
    /// no-op that reports the current state.
    pub fn init_from(&self, model_path: impl Into<PathBuf>, voices_path: impl Into<PathBuf>) -> LoadState {
        let state = self.engine.load(model_path, voices_path);
        debug!("init -> {state:?}");
        state
    }

    /// Start the render thread. Audio is only produced after this call.
    pub fn unlock(&mut self) -> anyhow::Result<()> {
        if self.render.is_some() {
            return Ok(());
        }
        let Some(sink) = self.sink.take() else {
            anyhow::bail!("audio sink already consumed");
        };
        let (render, events) = RenderThread::spawn(
            PlaybackEngine::from_config(&self.config),
            sink,
            self.config.quantum_samples,
            self.config.quantum_duration(),
        )?;
        self.render = Some(render);
        self.playback_events = Some(events);
        info!(
            "Playback unlocked at {} Hz, {} samples per quantum",
            self.config.output_sample_rate, self.config.quantum_samples
        );
        Ok(())
    }

    pub fn is_unlocked(&self) -> bool {
        self.render.is_some()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn load_state(&self) -> LoadState {
        self.engine.state()
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn voices(&self) -> &[String] {
        &self.voices
    }

    pub fn selected_voice(&self) -> Option<&str> {
        self.selected_voice.as_deref()
    }

    pub fn set_voice(&mut self, name: impl Into<String>) {
        self.selected_voice = Some(name.into());
    }

    /// Current flush generation
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Queue synthesis of one token sequence. Returns immediately; the audio
    /// arrives later through [`next_event`](Orchestrator::next_event).
    pub fn speak(&self, token_ids: Vec<i64>, options: SpeakOptions) {
        let voice = options
            .voice
            .or_else(|| self.selected_voice.clone())
            .unwrap_or_default();
        self.engine.synthesize(SynthesisRequest {
            generation: self.generation,
            token_ids,
            voice,
            speed: options.speed.unwrap_or(self.config.default_speed),
            pause_ms: options.pause_ms,
        });
    }

    /// Segment, budget and encode `text`, then queue one synthesis per
    /// clause. Returns the number of clauses dispatched.
    pub fn speak_text(&self, text: &str, options: SpeakOptions) -> usize {
        let clauses = speakable_clauses(text, self.config.max_tokens);
        for clause in &clauses {
            let token_ids = self.encoder.encode(&clause.text);
            self.speak(
                token_ids,
                SpeakOptions {
                    pause_ms: clause.pause_ms,
                    ..options.clone()
                },
            );
        }
        debug!("Dispatched {} clause(s)", clauses.len());
        clauses.len()
    }

    /// Queue raw PCM at the output rate. Ignored while locked or when empty.
    pub fn enqueue_pcm(&self, samples: Vec<f32>) {
        let Some(render) = &self.render else {
            return;
        };
        if samples.is_empty() {
            return;
        }
        render.enqueue(samples);
    }

    pub fn enqueue_silence(&self, ms: u32) {
        if self.render.is_none() {
            return;
        }
        let len = ms_to_samples(ms, self.config.output_sample_rate);
        if len > 0 {
            self.enqueue_pcm(vec![0.0; len]);
        }
    }

    /// Drop queued audio and discard synthesis results still in flight.
    pub fn flush(&mut self) {
        if let Some(render) = &self.render {
            render.flush();
        }
        self.generation += 1;
        self.state = PlaybackState::Idle;
        debug!("Flushed, generation now {}", self.generation);
    }

    /// Release the model and voices. A later `init` loads them again.
    pub fn dispose(&mut self) {
        self.engine.dispose();
        self.ready = false;
        self.voices.clear();
    }

    /// Wait for the next host-visible event.
    ///
    /// Returns `None` once the synthesis worker has stopped.
    pub async fn next_event(&mut self) -> Option<OrchestratorEvent> {
        loop {
            let handled = tokio::select! {
                event = self.engine_events.recv() => match event {
                    Some(event) => self.on_engine_event(event),
                    None => return None,
                },
                event = recv_or_pending(self.playback_events.as_mut()) => match event {
                    Some(event) => self.on_playback_event(event),
                    None => {
                        warn!("Render thread stopped");
                        self.playback_events = None;
                        None
                    }
                },
            };
            if let Some(event) = handled {
                return Some(event);
            }
        }
    }

    fn on_engine_event(&mut self, event: EngineEvent) -> Option<OrchestratorEvent> {
        match event {
            EngineEvent::Ready { voices } => {
                info!("TTS ready with {} voice(s)", voices.len());
                self.ready = true;
                if self.selected_voice.is_none() {
                    self.selected_voice = voices.first().cloned();
                }
                self.voices = voices.clone();
                Some(OrchestratorEvent::Ready { voices })
            }
            EngineEvent::Pcm {
                generation,
                pcm,
                pause_ms,
            } => {
                if generation != self.generation {
                    debug!("Dropping stale audio from generation {generation}");
                    return None;
                }
                Some(self.play(generation, pcm, pause_ms))
            }
            EngineEvent::Skipped { generation } => {
                (generation == self.generation).then_some(OrchestratorEvent::Skipped { generation })
            }
            EngineEvent::Error { generation, report } => {
                if generation.is_some_and(|g| g != self.generation) {
                    debug!("Ignoring error from stale generation: {}", report.detail);
                    return None;
                }
                warn!("TTS error: {}", report.detail);
                self.state = PlaybackState::Idle;
                Some(OrchestratorEvent::Error { report })
            }
        }
    }

    fn play(&mut self, generation: u64, pcm: PcmBuffer, pause_ms: u32) -> OrchestratorEvent {
        self.state = PlaybackState::Speaking;
        let duration_ms = pcm.duration_ms();
        let wav_base64 = if self.audio_events {
            encode_wav_base64(&pcm)
                .map_err(|e| warn!("Failed to encode chunk as WAV: {e}"))
                .ok()
        } else {
            None
        };

        self.enqueue_pcm(pcm.samples);
        self.enqueue_silence(pause_ms);
        OrchestratorEvent::Chunk {
            generation,
            duration_ms,
            pause_ms,
            wav_base64,
        }
    }

    fn on_playback_event(&mut self, event: PlaybackEvent) -> Option<OrchestratorEvent> {
        match event {
            PlaybackEvent::Drained => {
                self.state = PlaybackState::Idle;
                Some(OrchestratorEvent::Drained)
            }
            PlaybackEvent::Overflow { dropped_samples } => {
                warn!("Playback queue full, dropped {dropped_samples} samples");
                Some(OrchestratorEvent::Overflow { dropped_samples })
            }
        }
    }
}

/// Receive from `receiver`, or wait forever while there is none.
async fn recv_or_pending<T>(receiver: Option<&mut UnboundedReceiver<T>>) -> Option<T> {
    match receiver {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}
