//! ONNX Runtime backed speech model (Kitten-style inputs).

use std::path::Path;

use ndarray::{Array1, Array2};
use ort::session::{builder::GraphOptimizationLevel, Session};
use tracing::info;

use super::SpeechModel;
use crate::error::EngineError;

pub struct OnnxSpeechModel {
    session: Session,
    output_name: String,
}

impl OnnxSpeechModel {
    pub fn load(model_path: &Path, intra_threads: usize) -> Result<Self, EngineError> {
        let load_err = |e: ort::Error| {
            EngineError::LoadFailure(format!("loading model {}: {e}", model_path.display()))
        };

        let session = Session::builder()
            .map_err(load_err)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(load_err)?
            .with_intra_threads(intra_threads)
            .map_err(load_err)?
            .commit_from_file(model_path)
            .map_err(load_err)?;

        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| EngineError::LoadFailure("model declares no outputs".to_string()))?;

        info!(
            "Loaded ONNX speech model from {} (output '{}')",
            model_path.display(),
            output_name
        );
        Ok(Self {
            session,
            output_name,
        })
    }
}

impl SpeechModel for OnnxSpeechModel {
    fn infer(&mut self, token_ids: &[i64], style: &[f32], speed: f32) -> Result<Vec<f32>, EngineError> {
        let synth_err = |e: ort::Error| EngineError::SynthesisFailure(e.to_string());
        let shape_err = |e: ndarray::ShapeError| EngineError::SynthesisFailure(e.to_string());

        let input_ids = Array2::from_shape_vec((1, token_ids.len()), token_ids.to_vec())
            .map_err(shape_err)?;
        let style = Array2::from_shape_vec((1, style.len()), style.to_vec()).map_err(shape_err)?;
        let speed = Array1::from_vec(vec![speed]);

        let outputs = self
            .session
            .run(
                ort::inputs![
                    "input_ids" => input_ids.view(),
                    "style" => style.view(),
                    "speed" => speed.view(),
                ]
                .map_err(synth_err)?,
            )
            .map_err(synth_err)?;

        let audio = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| EngineError::SynthesisFailure("missing audio output".to_string()))?
            .try_extract_tensor::<f32>()
            .map_err(synth_err)?;

        Ok(audio.view().iter().copied().collect())
    }
}
