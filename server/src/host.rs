//! Orchestrator actor.
//!
//! One task owns the [`Orchestrator`]. HTTP handlers talk to it through a
//! command channel, read its state from a `watch` snapshot and follow its
//! events through a `broadcast` channel.

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use tts_core::{LoadState, Orchestrator, OrchestratorEvent, PlaybackState, SpeakOptions};

use crate::metrics::PipelineMetrics;

const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 256;

#[derive(Debug)]
pub enum HostCommand {
    Speak {
        text: String,
        options: SpeakOptions,
        reply: oneshot::Sender<SpeakAccepted>,
    },
    Flush {
        reply: oneshot::Sender<u64>,
    },
    SetVoice {
        name: String,
    },
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct SpeakAccepted {
    pub clauses: usize,
    pub generation: u64,
}

/// Snapshot of the orchestrator, refreshed after every command and event.
#[derive(Debug, Clone, Serialize)]
pub struct HostStatus {
    pub ready: bool,
    pub load_state: LoadState,
    pub playback: PlaybackState,
    pub unlocked: bool,
    pub voices: Vec<String>,
    pub selected_voice: Option<String>,
    pub generation: u64,
}

impl HostStatus {
    fn of(orchestrator: &Orchestrator) -> Self {
        Self {
            ready: orchestrator.is_ready(),
            load_state: orchestrator.load_state(),
            playback: orchestrator.state(),
            unlocked: orchestrator.is_unlocked(),
            voices: orchestrator.voices().to_vec(),
            selected_voice: orchestrator.selected_voice().map(str::to_string),
            generation: orchestrator.generation(),
        }
    }
}

/// Cloneable handle to the orchestrator task.
#[derive(Clone)]
pub struct HostHandle {
    commands: mpsc::Sender<HostCommand>,
    status: watch::Receiver<HostStatus>,
    events: broadcast::Sender<OrchestratorEvent>,
}

impl HostHandle {
    pub fn status(&self) -> HostStatus {
        self.status.borrow().clone()
    }

    /// Receiver that observes every status change
    pub fn watch_status(&self) -> watch::Receiver<HostStatus> {
        self.status.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.events.subscribe()
    }

    pub async fn speak(&self, text: String, options: SpeakOptions) -> anyhow::Result<SpeakAccepted> {
        let (reply, accepted) = oneshot::channel();
        self.send(HostCommand::Speak {
            text,
            options,
            reply,
        })
        .await?;
        Ok(accepted.await?)
    }

    pub async fn flush(&self) -> anyhow::Result<u64> {
        let (reply, generation) = oneshot::channel();
        self.send(HostCommand::Flush { reply }).await?;
        Ok(generation.await?)
    }

    pub async fn set_voice(&self, name: String) -> anyhow::Result<()> {
        self.send(HostCommand::SetVoice { name }).await
    }

    async fn send(&self, command: HostCommand) -> anyhow::Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| anyhow::anyhow!("speech host has stopped"))
    }
}

/// Move `orchestrator` into its own task and return a handle to it.
pub fn spawn_host(orchestrator: Orchestrator, metrics: PipelineMetrics) -> HostHandle {
    let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
    let (status_tx, status_rx) = watch::channel(HostStatus::of(&orchestrator));
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    tokio::spawn(run(
        orchestrator,
        command_rx,
        status_tx,
        event_tx.clone(),
        metrics,
    ));

    HostHandle {
        commands: command_tx,
        status: status_rx,
        events: event_tx,
    }
}

async fn run(
    mut orchestrator: Orchestrator,
    mut commands: mpsc::Receiver<HostCommand>,
    status: watch::Sender<HostStatus>,
    events: broadcast::Sender<OrchestratorEvent>,
    metrics: PipelineMetrics,
) {
    info!("Speech host started");
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => apply(&mut orchestrator, command),
                None => break,
            },
            event = orchestrator.next_event() => match event {
                Some(event) => {
                    metrics.record_event(&event);
                    // no subscribers is fine
                    let _ = events.send(event);
                }
                None => {
                    warn!("Synthesis worker stopped, shutting down speech host");
                    break;
                }
            },
        }
        status.send_replace(HostStatus::of(&orchestrator));
    }
    info!("Speech host stopped");
}

fn apply(orchestrator: &mut Orchestrator, command: HostCommand) {
    match command {
        HostCommand::Speak {
            text,
            options,
            reply,
        } => {
            let clauses = orchestrator.speak_text(&text, options);
            debug!("Queued {clauses} clause(s) for synthesis");
            let _ = reply.send(SpeakAccepted {
                clauses,
                generation: orchestrator.generation(),
            });
        }
        HostCommand::Flush { reply } => {
            orchestrator.flush();
            let _ = reply.send(orchestrator.generation());
        }
        HostCommand::SetVoice { name } => {
            info!("Voice set to '{name}'");
            orchestrator.set_voice(name);
        }
    }
}
