use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use hound::{SampleFormat, WavSpec, WavWriter};

/// Destination for rendered quanta.
pub trait AudioSink: Send + 'static {
    fn write(&mut self, quantum: &[f32]) -> anyhow::Result<()>;

    /// Called once when the render thread stops.
    fn finish(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Discards audio. The render thread still runs on the wall clock, so queue
/// timing and drain events behave as with a device.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl AudioSink for NullSink {
    fn write(&mut self, _quantum: &[f32]) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Collects every rendered sample. Clones share the same buffer.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    samples: Arc<Mutex<Vec<f32>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> Vec<f32> {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.samples.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AudioSink for MemorySink {
    fn write(&mut self, quantum: &[f32]) -> anyhow::Result<()> {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(quantum);
        Ok(())
    }
}

/// Writes mono 16-bit PCM to a WAV file.
pub struct WavSink {
    writer: Option<WavWriter<BufWriter<File>>>,
}

impl WavSink {
    pub fn create(path: &Path, sample_rate: u32) -> anyhow::Result<Self> {
        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        Ok(Self {
            writer: Some(WavWriter::create(path, spec)?),
        })
    }
}

impl AudioSink for WavSink {
    fn write(&mut self, quantum: &[f32]) -> anyhow::Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            anyhow::bail!("WAV sink already finalized");
        };
        for &sample in quantum {
            writer.write_sample(crate::wav::to_i16(sample))?;
        }
        Ok(())
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.finalize()?;
        }
        Ok(())
    }
}
