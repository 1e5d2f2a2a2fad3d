//! Streaming text-to-speech pipeline.
//!
//! Text is split into clauses ([`text`]), encoded to token ids ([`phoneme`]),
//! synthesized on a worker thread ([`engine`]), post-processed ([`dsp`]) and
//! rendered gaplessly by a clocked playback thread ([`playback`]). The
//! [`Orchestrator`] owns the control state and connects the stages.

pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod phoneme;
pub mod playback;
pub mod text;
pub mod wav;

pub use config::PipelineConfig;
pub use dsp::{PcmBuffer, PostProcessor};
#[cfg(feature = "onnx")]
pub use engine::OnnxLoader;
pub use engine::{LoadState, ModelLoader, SpeechModel, SynthesisHandle, VoiceTable};
pub use error::{EngineError, ErrorKind, ErrorReport};
pub use orchestrator::{Orchestrator, OrchestratorEvent, PlaybackState, SpeakOptions};
pub use phoneme::{Encoder, EspeakPhonemizer, Phonemizer, RuleBasedPhonemizer};
pub use playback::{AudioSink, MemorySink, NullSink, PlaybackEngine, WavSink};
pub use text::{clean_for_speech, Clause};
