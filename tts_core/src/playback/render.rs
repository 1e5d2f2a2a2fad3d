use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, warn};

use super::{AudioSink, EnqueueOutcome, PlaybackEngine};

/// Commands from the control domain, applied at the start of each quantum.
#[derive(Debug)]
pub enum PlaybackCommand {
    Enqueue(Vec<f32>),
    Flush,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlaybackEvent {
    /// The queue ran out after having audio
    Drained,
    /// A chunk was rejected by the queue cap
    Overflow { dropped_samples: usize },
}

/// Falling this far behind the clock resets the schedule instead of
/// rendering a burst of catch-up quanta.
const MAX_LAG: Duration = Duration::from_millis(200);

/// Dedicated thread that renders one quantum per period.
pub struct RenderThread {
    commands: UnboundedSender<PlaybackCommand>,
    thread: Option<JoinHandle<()>>,
}

impl RenderThread {
    pub fn spawn(
        engine: PlaybackEngine,
        sink: Box<dyn AudioSink>,
        quantum_samples: usize,
        period: Duration,
    ) -> anyhow::Result<(Self, UnboundedReceiver<PlaybackEvent>)> {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let thread = std::thread::Builder::new()
            .name("tts-render".to_string())
            .spawn(move || {
                run(engine, sink, quantum_samples.max(1), period, command_rx, event_tx)
            })?;

        Ok((
            Self {
                commands: command_tx,
                thread: Some(thread),
            },
            event_rx,
        ))
    }

    /// Sender for queuing commands from other tasks
    pub fn commands(&self) -> UnboundedSender<PlaybackCommand> {
        self.commands.clone()
    }

    pub fn enqueue(&self, samples: Vec<f32>) {
        self.send(PlaybackCommand::Enqueue(samples));
    }

    pub fn flush(&self) {
        self.send(PlaybackCommand::Flush);
    }

    fn send(&self, command: PlaybackCommand) {
        if self.commands.send(command).is_err() {
            warn!("Render thread is gone, dropping playback command");
        }
    }
}

impl Drop for RenderThread {
    fn drop(&mut self) {
        let _ = self.commands.send(PlaybackCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Render thread panicked");
            }
        }
    }
}

fn run(
    mut engine: PlaybackEngine,
    mut sink: Box<dyn AudioSink>,
    quantum_samples: usize,
    period: Duration,
    mut commands: UnboundedReceiver<PlaybackCommand>,
    events: UnboundedSender<PlaybackEvent>,
) {
    debug!("Render thread started ({quantum_samples} samples per {period:?})");
    let mut quantum = vec![0.0_f32; quantum_samples];
    let mut sink_failed = false;
    let mut deadline = Instant::now();

    'render: loop {
        loop {
            match commands.try_recv() {
                Ok(PlaybackCommand::Enqueue(samples)) => {
                    if let EnqueueOutcome::Dropped { samples } = engine.enqueue(samples) {
                        let _ = events.send(PlaybackEvent::Overflow {
                            dropped_samples: samples,
                        });
                    }
                }
                Ok(PlaybackCommand::Flush) => engine.flush(),
                Ok(PlaybackCommand::Shutdown) | Err(TryRecvError::Disconnected) => break 'render,
                Err(TryRecvError::Empty) => break,
            }
        }

        let report = engine.render(&mut quantum);
        if report.drained {
            let _ = events.send(PlaybackEvent::Drained);
        }
        if !sink_failed {
            if let Err(e) = sink.write(&quantum) {
                error!("Audio sink failed, continuing without output: {e}");
                sink_failed = true;
            }
        }

        deadline += period;
        let now = Instant::now();
        if deadline > now {
            std::thread::sleep(deadline - now);
        } else if now - deadline > MAX_LAG {
            deadline = now;
        }
    }

    if let Err(e) = sink.finish() {
        error!("Failed to finalize audio sink: {e}");
    }
    debug!("Render thread stopped");
}
