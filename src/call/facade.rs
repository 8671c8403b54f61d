use super::{CallEvent, CallSession, CallState, Effect, Scheduler, SessionCommand};
use crate::config::AudioConfig;
use crate::event::{EventLog, LogEntry, LogKind};
use crate::media::VoiceAdapter;
use crate::provider::{self, CallInitiator};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Read model of the session handed to the UI.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub state: CallState,
    pub target_number: String,
    pub log_entries: Vec<LogEntry>,
    pub current_prompt: Option<String>,
    pub generation: u64,
}

impl SessionSnapshot {
    fn capture(session: &CallSession, log: &EventLog) -> Self {
        Self {
            state: session.state(),
            target_number: session.target_number().to_string(),
            log_entries: log.entries().to_vec(),
            current_prompt: session.current_prompt().map(str::to_string),
            generation: session.generation(),
        }
    }

    pub fn count(&self, kind: LogKind) -> usize {
        self.log_entries.iter().filter(|e| e.kind == kind).count()
    }
}

#[derive(Debug, Error)]
#[error("call session is no longer running")]
pub struct SessionClosed;

/// Cloneable front door to a running [`SessionLoop`].
///
/// Every action maps 1:1 onto a queued command; the UI never touches the
/// session directly.
#[derive(Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::UnboundedSender<SessionCommand>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    fn send(&self, cmd: SessionCommand) -> Result<(), SessionClosed> {
        self.cmd_tx.send(cmd).map_err(|_| SessionClosed)
    }

    pub fn set_target_number(&self, number: impl Into<String>) -> Result<(), SessionClosed> {
        self.send(SessionCommand::SetTargetNumber(number.into()))
    }

    pub fn initiate(&self) -> Result<(), SessionClosed> {
        self.send(SessionCommand::Initiate)
    }

    pub fn answer(&self) -> Result<(), SessionClosed> {
        self.send(SessionCommand::Event(CallEvent::Answer))
    }

    pub fn hang_up(&self) -> Result<(), SessionClosed> {
        self.send(SessionCommand::Event(CallEvent::HangUp))
    }

    pub fn send_digit(&self, digit: char) -> Result<(), SessionClosed> {
        self.send(SessionCommand::Event(CallEvent::Digit(digit)))
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Receiver that observes a new snapshot after every processed command.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Wait until the published snapshot satisfies `predicate`.
    pub async fn wait_for<F>(&self, predicate: F) -> Result<SessionSnapshot, SessionClosed>
    where
        F: FnMut(&SessionSnapshot) -> bool,
    {
        let mut rx = self.snapshot_rx.clone();
        let snapshot = rx.wait_for(predicate).await.map_err(|_| SessionClosed)?;
        Ok(snapshot.clone())
    }

    pub async fn wait_for_state(&self, state: CallState) -> Result<SessionSnapshot, SessionClosed> {
        self.wait_for(|s| s.state == state).await
    }
}

/// Owns the call session and executes the effects it produces.
///
/// Commands from the UI, timer fires, initiation results and playback
/// callbacks all arrive on one FIFO queue and are processed one at a time,
/// so the session needs no locking.
pub struct SessionLoop {
    session: CallSession,
    log: EventLog,
    scheduler: Scheduler,
    voice: Arc<dyn VoiceAdapter>,
    initiator: Arc<dyn CallInitiator>,
    audio: AudioConfig,
    initiate_timeout: Option<Duration>,
    cmd_tx: mpsc::UnboundedSender<SessionCommand>,
    cmd_rx: mpsc::UnboundedReceiver<SessionCommand>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    cancel_token: CancellationToken,
}

impl SessionLoop {
    pub fn new(
        voice: Arc<dyn VoiceAdapter>,
        initiator: Arc<dyn CallInitiator>,
        audio: AudioConfig,
        cancel_token: CancellationToken,
    ) -> (Self, SessionHandle) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let session = CallSession::new();
        let log = EventLog::new();
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::capture(&session, &log));
        let handle = SessionHandle {
            cmd_tx: cmd_tx.clone(),
            snapshot_rx,
        };
        let event_loop = Self {
            session,
            log,
            scheduler: Scheduler::new(cmd_tx.clone()),
            voice,
            initiator,
            audio,
            initiate_timeout: None,
            cmd_tx,
            cmd_rx,
            snapshot_tx,
            cancel_token,
        };
        (event_loop, handle)
    }

    pub fn with_initiate_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.initiate_timeout = timeout;
        self
    }

    /// Spawn the loop on the current runtime.
    pub fn spawn(self) -> tokio::task::JoinHandle<anyhow::Result<()>> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        info!("call session loop started");
        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("call session loop cancelled");
                    break;
                }
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle(cmd),
                        None => break,
                    }
                }
            }
        }
        self.scheduler.cancel_all();
        self.voice.stop_all();
        Ok(())
    }

    fn handle(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::SetTargetNumber(number) => {
                debug!(target_number = %number, "target number set");
                self.session.set_target_number(number);
            }
            SessionCommand::Initiate => {
                let number = self.session.target_number().to_string();
                self.submit(CallEvent::Initiate(number));
            }
            SessionCommand::Event(event) => self.submit(event),
        }
        self.snapshot_tx
            .send_replace(SessionSnapshot::capture(&self.session, &self.log));
    }

    fn submit(&mut self, event: CallEvent) {
        debug!(state = %self.session.state(), ?event, "submit");
        for effect in self.session.submit(event) {
            self.execute(effect);
        }
    }

    fn execute(&mut self, effect: Effect) {
        debug!(?effect, "execute effect");
        match effect {
            Effect::Log { kind, message } => {
                self.log.append(kind, message);
            }
            Effect::ClearLog => self.log.clear(),
            Effect::Speak { text, locale } => self.voice.speak(&text, locale),
            Effect::StopAudio => self.voice.stop_all(),
            Effect::PlayAudio { locale, generation } => {
                let url = self.audio.track(locale).to_string();
                let tx = self.cmd_tx.clone();
                let on_ended = Box::new(move || {
                    let _ = tx.send(SessionCommand::Event(CallEvent::AudioEnded { generation }));
                });
                if let Err(e) = self.voice.play_audio(&url, on_ended) {
                    warn!(%url, "audio playback failed: {}", e);
                    let _ = self
                        .cmd_tx
                        .send(SessionCommand::Event(CallEvent::PlaybackFailed {
                            generation,
                            reason: e.to_string(),
                        }));
                }
            }
            Effect::Schedule { timer, generation } => {
                self.scheduler.schedule(timer, generation);
            }
            Effect::CancelTimers { generation } => {
                let cancelled = self.scheduler.cancel_stale(generation);
                debug!(generation, cancelled, "stale timers cancelled");
            }
            Effect::CallProvider { number, generation } => {
                let initiator = self.initiator.clone();
                let tx = self.cmd_tx.clone();
                let timeout = self.initiate_timeout;
                tokio::spawn(async move {
                    let result = match timeout {
                        Some(limit) => {
                            match tokio::time::timeout(limit, initiator.initiate(&number)).await {
                                Ok(result) => result,
                                Err(_) => Err(anyhow::anyhow!(
                                    "timed out after {} ms",
                                    limit.as_millis()
                                )),
                            }
                        }
                        None => initiator.initiate(&number).await,
                    };
                    let outcome = provider::to_outcome(result);
                    debug!(%number, generation, ?outcome, "initiation finished");
                    let _ = tx.send(SessionCommand::Event(CallEvent::InitiationResult {
                        generation,
                        outcome,
                    }));
                });
            }
        }
    }
}
