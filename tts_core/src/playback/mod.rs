//! Real-time playback.
//!
//! [`PlaybackEngine`] is the queue and cross-fade logic; it knows nothing
//! about threads or devices. [`RenderThread`] drives it at a fixed quantum
//! on its own OS thread and hands every quantum to an [`AudioSink`].

mod render;
mod sink;

use std::collections::VecDeque;

use crate::config::PipelineConfig;

pub use render::{PlaybackCommand, PlaybackEvent, RenderThread};
pub use sink::{AudioSink, MemorySink, NullSink, WavSink};

/// Result of rendering one quantum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderReport {
    /// Samples copied from the queue; the rest of the quantum is silence
    pub written: usize,
    /// The queue ran dry since the last report
    pub drained: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    /// Empty chunk, nothing to play
    Ignored,
    /// Accepting the chunk would exceed the sample or chunk cap
    Dropped { samples: usize },
}

/// Chunks the queue holds without reallocating on the render thread
pub const MAX_QUEUED_CHUNKS: usize = 1024;

/// Chunk queue with per-chunk linear fades and edge-triggered drain.
#[derive(Debug)]
pub struct PlaybackEngine {
    queue: VecDeque<Vec<f32>>,
    read_index: usize,
    fade_samples: usize,
    was_empty: bool,
    queued_samples: usize,
    max_queued_samples: usize,
}

impl PlaybackEngine {
    pub fn new(fade_samples: usize, max_queued_samples: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(MAX_QUEUED_CHUNKS),
            read_index: 0,
            fade_samples,
            was_empty: true,
            queued_samples: 0,
            max_queued_samples,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.fade_samples(), config.max_queued_samples())
    }

    pub fn enqueue(&mut self, chunk: Vec<f32>) -> EnqueueOutcome {
        if chunk.is_empty() {
            return EnqueueOutcome::Ignored;
        }
        if self.queued_samples + chunk.len() > self.max_queued_samples
            || self.queue.len() >= MAX_QUEUED_CHUNKS
        {
            return EnqueueOutcome::Dropped {
                samples: chunk.len(),
            };
        }
        self.queued_samples += chunk.len();
        self.queue.push_back(chunk);
        self.was_empty = false;
        EnqueueOutcome::Queued
    }

    /// Drop everything queued. No drain is reported for a flush.
    pub fn flush(&mut self) {
        self.queue.clear();
        self.read_index = 0;
        self.queued_samples = 0;
        self.was_empty = true;
    }

    /// Samples still waiting to be played
    pub fn queued_samples(&self) -> usize {
        self.queued_samples
    }

    pub fn chunk_count(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Fill `out` from the queue.
    ///
    /// Each chunk fades in over its first `fade_samples` and out over its
    /// last `fade_samples`, measured from the chunk start and end; on short
    /// chunks the two ramps overlap. Whatever the queue cannot cover stays
    /// zero.
    pub fn render(&mut self, out: &mut [f32]) -> RenderReport {
        out.fill(0.0);

        let fade = self.fade_samples;
        let mut written = 0;
        while written < out.len() {
            let Some(chunk) = self.queue.front() else {
                break;
            };
            let to_copy = (chunk.len() - self.read_index).min(out.len() - written);

            for i in 0..to_copy {
                let position = self.read_index + i;
                let mut sample = chunk[position];
                if fade > 0 {
                    if position < fade {
                        sample *= position as f32 / fade as f32;
                    }
                    let left = chunk.len() - position;
                    if left <= fade {
                        sample *= left as f32 / fade as f32;
                    }
                }
                out[written + i] += sample;
            }

            written += to_copy;
            self.read_index += to_copy;
            if self.read_index >= chunk.len() {
                self.queue.pop_front();
                self.read_index = 0;
            }
        }
        self.queued_samples -= written;

        let mut drained = false;
        if self.queue.is_empty() && written == 0 {
            drained = !self.was_empty;
            self.was_empty = true;
        } else {
            self.was_empty = false;
        }

        RenderReport { written, drained }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUANTUM: usize = 128;

    fn engine(fade: usize) -> PlaybackEngine {
        PlaybackEngine::new(fade, usize::MAX)
    }

    fn render_all(engine: &mut PlaybackEngine, quanta: usize) -> (Vec<f32>, usize) {
        let mut out = Vec::new();
        let mut drains = 0;
        let mut quantum = [0.0_f32; QUANTUM];
        for _ in 0..quanta {
            let report = engine.render(&mut quantum);
            drains += report.drained as usize;
            out.extend_from_slice(&quantum);
        }
        (out, drains)
    }

    #[test]
    fn test_short_buffer_plays_then_drains_once() {
        let mut engine = engine(4);
        engine.enqueue(vec![1.0; 50]);

        let (out, drains) = render_all(&mut engine, 5);
        // fade-in ramp
        assert_eq!(&out[..4], &[0.0, 0.25, 0.5, 0.75]);
        assert_eq!(out[4], 1.0);
        // fade-out ramp ends on the last sample
        assert_eq!(&out[46..50], &[1.0, 0.75, 0.5, 0.25]);
        assert!(out[50..].iter().all(|s| *s == 0.0));
        assert_eq!(drains, 1);
    }

    #[test]
    fn test_drain_reported_after_first_empty_quantum() {
        let mut engine = engine(0);
        engine.enqueue(vec![0.5; QUANTUM]);
        let mut quantum = [0.0_f32; QUANTUM];
        assert_eq!(engine.render(&mut quantum), RenderReport { written: QUANTUM, drained: false });
        assert_eq!(engine.render(&mut quantum), RenderReport { written: 0, drained: true });
        assert_eq!(engine.render(&mut quantum), RenderReport { written: 0, drained: false });
    }

    #[test]
    fn test_never_fed_never_drains() {
        let mut engine = engine(4);
        let (out, drains) = render_all(&mut engine, 3);
        assert!(out.iter().all(|s| *s == 0.0));
        assert_eq!(drains, 0);
    }

    #[test]
    fn test_chunks_play_in_fifo_order_across_quanta() {
        let mut engine = engine(0);
        let chunks: Vec<Vec<f32>> = (1..=5).map(|n| vec![n as f32; 100 + n * 17]).collect();
        let expected: Vec<f32> = chunks.iter().flatten().copied().collect();
        for chunk in chunks {
            assert_eq!(engine.enqueue(chunk), EnqueueOutcome::Queued);
        }

        let (out, drains) = render_all(&mut engine, 10);
        assert_eq!(&out[..expected.len()], expected.as_slice());
        assert!(out[expected.len()..].iter().all(|s| *s == 0.0));
        assert_eq!(drains, 1);
        assert_eq!(engine.queued_samples(), 0);
    }

    #[test]
    fn test_chunk_boundaries_fade_out_and_in() {
        let mut engine = engine(2);
        engine.enqueue(vec![1.0; 6]);
        engine.enqueue(vec![1.0; 6]);
        let mut quantum = [0.0_f32; 12];
        engine.render(&mut quantum);
        assert_eq!(
            quantum,
            [0.0, 0.5, 1.0, 1.0, 1.0, 0.5, 0.0, 0.5, 1.0, 1.0, 1.0, 0.5]
        );
    }

    #[test]
    fn test_overlapping_fades_on_tiny_chunk() {
        let mut engine = engine(4);
        engine.enqueue(vec![1.0; 3]);
        let mut quantum = [0.0_f32; 4];
        engine.render(&mut quantum);
        // in: 0, 1/4, 2/4 ; out: 3/4, 2/4, 1/4
        assert_eq!(quantum, [0.0, 0.125, 0.125, 0.0]);
    }

    #[test]
    fn test_flush_clears_without_drain() {
        let mut engine = engine(0);
        engine.enqueue(vec![1.0; 1000]);
        let mut quantum = [0.0_f32; QUANTUM];
        engine.render(&mut quantum);

        engine.flush();
        assert!(engine.is_empty());
        assert_eq!(engine.queued_samples(), 0);
        let (out, drains) = render_all(&mut engine, 3);
        assert!(out.iter().all(|s| *s == 0.0));
        assert_eq!(drains, 0);

        // a chunk queued after the flush starts from its beginning
        engine.enqueue(vec![0.25; 10]);
        engine.render(&mut quantum);
        assert_eq!(&quantum[..10], &[0.25; 10]);
    }

    #[test]
    fn test_empty_chunk_ignored() {
        let mut engine = engine(0);
        assert_eq!(engine.enqueue(Vec::new()), EnqueueOutcome::Ignored);
        let (_, drains) = render_all(&mut engine, 2);
        assert_eq!(drains, 0);
    }

    #[test]
    fn test_queue_cap_drops_whole_chunks() {
        let mut engine = PlaybackEngine::new(0, 300);
        assert_eq!(engine.enqueue(vec![0.1; 200]), EnqueueOutcome::Queued);
        assert_eq!(engine.enqueue(vec![0.1; 200]), EnqueueOutcome::Dropped { samples: 200 });
        assert_eq!(engine.enqueue(vec![0.1; 100]), EnqueueOutcome::Queued);
        assert_eq!(engine.chunk_count(), 2);

        let mut quantum = [0.0_f32; QUANTUM];
        engine.render(&mut quantum);
        assert_eq!(engine.queued_samples(), 300 - QUANTUM);
        assert_eq!(engine.enqueue(vec![0.1; QUANTUM]), EnqueueOutcome::Queued);
    }

    #[test]
    fn test_queue_storage_reserved_up_front() {
        let mut engine = engine(0);
        let capacity = engine.queue.capacity();
        assert!(capacity >= MAX_QUEUED_CHUNKS);

        for _ in 0..MAX_QUEUED_CHUNKS {
            assert_eq!(engine.enqueue(vec![0.1]), EnqueueOutcome::Queued);
        }
        assert_eq!(engine.enqueue(vec![0.1; 3]), EnqueueOutcome::Dropped { samples: 3 });
        assert_eq!(engine.queue.capacity(), capacity);
    }
}
