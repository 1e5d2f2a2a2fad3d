//! Voice style embeddings.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::EngineError;

/// Named style embedding, shared read-only with every synthesis call.
#[derive(Debug, Clone)]
pub struct VoiceEmbedding {
    pub name: String,
    pub style: Arc<[f32]>,
}

/// Ordered name → embedding table. The first entry is the fallback voice.
#[derive(Debug, Clone, Default)]
pub struct VoiceTable {
    voices: Vec<VoiceEmbedding>,
}

/// A voice entry is either `[f32, ...]` or `[[f32, ...], ...]`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawStyle {
    Flat(Vec<f32>),
    Nested(Vec<Vec<f32>>),
}

impl RawStyle {
    fn flatten(self) -> Vec<f32> {
        match self {
            RawStyle::Flat(values) => values,
            RawStyle::Nested(rows) => rows.into_iter().flatten().collect(),
        }
    }
}

impl VoiceTable {
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let json = fs::read_to_string(path).map_err(|e| {
            EngineError::LoadFailure(format!("reading voices {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let entries: Map<String, Value> = serde_json::from_str(json)
            .map_err(|e| EngineError::LoadFailure(format!("parsing voices: {e}")))?;

        let voices = entries
            .into_iter()
            .map(|(name, value)| {
                let raw: RawStyle = serde_json::from_value(value).map_err(|e| {
                    EngineError::LoadFailure(format!("voice '{name}' is not a float array: {e}"))
                })?;
                Ok(VoiceEmbedding {
                    name,
                    style: raw.flatten().into(),
                })
            })
            .collect::<Result<Vec<_>, EngineError>>()?;

        Ok(Self { voices })
    }

    pub fn names(&self) -> Vec<String> {
        self.voices.iter().map(|v| v.name.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&VoiceEmbedding> {
        self.voices.iter().find(|v| v.name == name)
    }

    /// The named voice, or the first voice when the name is unknown.
    pub fn resolve(&self, name: &str) -> Result<&VoiceEmbedding, EngineError> {
        self.get(name)
            .or_else(|| self.voices.first())
            .ok_or(EngineError::NoVoicesAvailable)
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }
}
