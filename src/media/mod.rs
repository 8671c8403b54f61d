//! Voice and audio output for the call.
//!
//! The call flow only ever needs three things from the media side: say a
//! sentence, play one music track with a completion callback, and stop
//! everything. [`VoiceAdapter`] is that seam. [`SimulatedVoice`] is the
//! implementation used by the server, which has no audio device: it traces
//! what would be spoken and fakes a track of configurable length.

use crate::call::Locale;
use crate::config::AudioConfig;
use anyhow::{anyhow, Result};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Invoked exactly once when a track finishes on its own. Never invoked for
/// a track that was stopped.
pub type PlaybackDone = Box<dyn FnOnce() + Send + 'static>;

pub trait VoiceAdapter: Send + Sync {
    /// Fire-and-forget speech synthesis.
    fn speak(&self, text: &str, locale: Locale);

    /// Start playing `url`, replacing any track already playing.
    fn play_audio(&self, url: &str, on_ended: PlaybackDone) -> Result<()>;

    /// Halt speech and audio. Safe to call when nothing is playing.
    fn stop_all(&self);
}

pub struct SimulatedVoice {
    playback: Duration,
    current: Mutex<Option<CancellationToken>>,
}

impl SimulatedVoice {
    pub fn new(playback: Duration) -> Self {
        Self {
            playback,
            current: Mutex::new(None),
        }
    }

    pub fn from_config(config: &AudioConfig) -> Self {
        Self::new(Duration::from_millis(config.playback_ms))
    }

    fn take_current(&self) -> Option<CancellationToken> {
        match self.current.lock() {
            Ok(mut current) => current.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    pub fn is_playing(&self) -> bool {
        match self.current.lock() {
            Ok(current) => current.as_ref().is_some_and(|t| !t.is_cancelled()),
            Err(_) => false,
        }
    }
}

impl VoiceAdapter for SimulatedVoice {
    fn speak(&self, text: &str, locale: Locale) {
        info!(locale = locale.tag(), "speak: {}", text);
    }

    fn play_audio(&self, url: &str, on_ended: PlaybackDone) -> Result<()> {
        if url.trim().is_empty() {
            return Err(anyhow!("no audio track configured"));
        }
        if let Some(previous) = self.take_current() {
            previous.cancel();
        }
        let token = CancellationToken::new();
        match self.current.lock() {
            Ok(mut current) => *current = Some(token.clone()),
            Err(e) => return Err(anyhow!("playback state poisoned: {}", e)),
        }

        let playback = self.playback;
        let url = url.to_string();
        info!(%url, playback_ms = playback.as_millis() as u64, "audio playback started");
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(%url, "audio playback stopped");
                }
                _ = tokio::time::sleep(playback) => {
                    token.cancel();
                    debug!(%url, "audio playback finished");
                    on_ended();
                }
            }
        });
        Ok(())
    }

    fn stop_all(&self) {
        if let Some(token) = self.take_current() {
            token.cancel();
        }
    }
}
