//! Test harness for the call flow.
//!
//! [`MockIvrStack`] runs a real [`SessionLoop`] with in-memory doubles for
//! the voice adapter and the call initiator, so the whole flow can be driven
//! on a paused Tokio clock without audio hardware or network access.
//!
//! ```rust,ignore
//! let stack = MockIvrStack::simulated();
//! stack.handle.set_target_number("+15551234567")?;
//! stack.handle.initiate()?;
//! stack.handle.wait_for_state(CallState::Ringing).await?;
//! stack.handle.answer()?;
//! stack.handle.wait_for_state(CallState::MenuLanguage).await?;
//! assert!(stack.voice.spoken().iter().any(|(_, l)| *l == Locale::En));
//! ```

use super::{CallState, Locale, SessionHandle, SessionLoop};
use crate::config::AudioConfig;
use crate::media::{PlaybackDone, VoiceAdapter};
use crate::provider::{CallInitiator, InitiateResponse};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq)]
pub enum VoiceCall {
    Speak { text: String, locale: Locale },
    Play { url: String },
    StopAll,
}

/// Voice adapter double that records every call.
///
/// Playback never ends on its own: use [`finish_playback`](Self::finish_playback)
/// to simulate a track reaching its end.
#[derive(Default)]
pub struct RecordingVoice {
    calls: Mutex<Vec<VoiceCall>>,
    playing: Mutex<Option<PlaybackDone>>,
    fail_playback: AtomicBool,
}

impl RecordingVoice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `play_audio` fail.
    pub fn fail_playback(&self, fail: bool) {
        self.fail_playback.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<VoiceCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn spoken(&self) -> Vec<(String, Locale)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                VoiceCall::Speak { text, locale } => Some((text, locale)),
                _ => None,
            })
            .collect()
    }

    pub fn played(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                VoiceCall::Play { url } => Some(url),
                _ => None,
            })
            .collect()
    }

    pub fn stop_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, VoiceCall::StopAll))
            .count()
    }

    pub fn is_playing(&self) -> bool {
        self.playing.lock().map(|p| p.is_some()).unwrap_or(false)
    }

    /// Complete the active track. Returns `false` if nothing was playing.
    pub fn finish_playback(&self) -> bool {
        let done = self.playing.lock().ok().and_then(|mut p| p.take());
        match done {
            Some(done) => {
                done();
                true
            }
            None => false,
        }
    }

    fn push(&self, call: VoiceCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

impl VoiceAdapter for RecordingVoice {
    fn speak(&self, text: &str, locale: Locale) {
        self.push(VoiceCall::Speak {
            text: text.to_string(),
            locale,
        });
    }

    fn play_audio(&self, url: &str, on_ended: PlaybackDone) -> Result<()> {
        if self.fail_playback.load(Ordering::SeqCst) {
            return Err(anyhow!("playback refused for {}", url));
        }
        self.push(VoiceCall::Play {
            url: url.to_string(),
        });
        if let Ok(mut playing) = self.playing.lock() {
            *playing = Some(on_ended);
        }
        Ok(())
    }

    fn stop_all(&self) {
        self.push(VoiceCall::StopAll);
        if let Ok(mut playing) = self.playing.lock() {
            playing.take();
        }
    }
}

/// Call initiator double returning a fixed answer after an optional delay.
pub struct ScriptedInitiator {
    response: Option<InitiateResponse>,
    delay: Duration,
    calls: Mutex<Vec<String>>,
}

impl ScriptedInitiator {
    pub fn simulated() -> Self {
        Self::responding(InitiateResponse::accepted(true, Some("sim-test".to_string())))
    }

    pub fn responding(response: InitiateResponse) -> Self {
        Self {
            response: Some(response),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every request fails at the transport level.
    pub fn unreachable() -> Self {
        Self {
            response: None,
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CallInitiator for ScriptedInitiator {
    async fn initiate(&self, target_number: &str) -> Result<InitiateResponse> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(target_number.to_string());
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.response
            .clone()
            .ok_or_else(|| anyhow!("connection refused"))
    }
}

/// A running session loop wired to test doubles.
pub struct MockIvrStack {
    pub handle: SessionHandle,
    pub voice: Arc<RecordingVoice>,
    pub initiator: Arc<ScriptedInitiator>,
    cancel: CancellationToken,
    join_handle: tokio::task::JoinHandle<anyhow::Result<()>>,
}

impl MockIvrStack {
    pub fn run(initiator: ScriptedInitiator, initiate_timeout: Option<Duration>) -> Self {
        let voice = Arc::new(RecordingVoice::new());
        let initiator = Arc::new(initiator);
        let cancel = CancellationToken::new();
        let (event_loop, handle) = SessionLoop::new(
            voice.clone(),
            initiator.clone(),
            AudioConfig::default(),
            cancel.child_token(),
        );
        let join_handle = event_loop.with_initiate_timeout(initiate_timeout).spawn();
        Self {
            handle,
            voice,
            initiator,
            cancel,
            join_handle,
        }
    }

    pub fn simulated() -> Self {
        Self::run(ScriptedInitiator::simulated(), None)
    }

    /// Dial `number` and wait until the phone rings.
    pub async fn ringing(&self, number: &str) -> Result<()> {
        self.handle.set_target_number(number)?;
        self.handle.initiate()?;
        self.handle.wait_for_state(CallState::Ringing).await?;
        Ok(())
    }

    /// Dial, answer and wait for the language menu.
    pub async fn at_language_menu(&self, number: &str) -> Result<()> {
        self.ringing(number).await?;
        self.handle.answer()?;
        self.handle.wait_for_state(CallState::MenuLanguage).await?;
        Ok(())
    }

    /// Send a digit and wait for the session to reach `state`.
    pub async fn press(&self, digit: char, state: CallState) -> Result<()> {
        self.handle.send_digit(digit)?;
        self.handle.wait_for_state(state).await?;
        Ok(())
    }

    pub async fn shutdown(self) -> anyhow::Result<()> {
        self.cancel.cancel();
        self.join_handle
            .await
            .map_err(|e| anyhow!("session task failed: {}", e))?
    }
}
