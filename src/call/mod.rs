//! # Call progression
//!
//! A single simulated outbound call moves through dialing, ringing, a
//! two-level touch-tone menu, music playback or forwarding, and termination.
//!
//! ```text
//! Idle ─Initiate─→ Dialing ─ring─→ Ringing ─Answer─→ Connected ─menu─→ MenuLanguage
//!                                                                      │1        │2
//!                                                                 MenuEnglish  MenuSpanish
//!                                                                   │1   │2      │1    │2
//!                                                    PlayingAudio{En,Es}   Forwarding
//!                                                               │ AudioEnded / force-end / forward-end
//!                                          (any) ─HangUp─→ Ended ─idle-reset─→ Idle
//! ```
//!
//! [`CallSession::submit`] is pure with respect to the outside world: it
//! updates the session and returns [`Effect`]s. [`SessionLoop`] executes them
//! against the [`Scheduler`], the voice adapter, the call initiator and the
//! event log, and feeds callbacks back in as new [`CallEvent`]s.

use crate::event::LogKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub mod facade;
pub mod prompts;
pub mod session;
pub mod testing;
pub mod timer;

#[cfg(test)]
mod tests;

pub use facade::{SessionClosed, SessionHandle, SessionLoop, SessionSnapshot};
pub use session::CallSession;
pub use timer::{Scheduler, TimerHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    Idle,
    Dialing,
    Ringing,
    Connected,
    MenuLanguage,
    MenuEnglish,
    MenuSpanish,
    PlayingAudioEnglish,
    PlayingAudioSpanish,
    Forwarding,
    Ended,
}

impl CallState {
    /// States in which an announcement is semantically active and
    /// `current_prompt` is therefore set.
    pub fn has_announcement(&self) -> bool {
        matches!(
            self,
            CallState::MenuLanguage
                | CallState::MenuEnglish
                | CallState::MenuSpanish
                | CallState::PlayingAudioEnglish
                | CallState::PlayingAudioSpanish
                | CallState::Forwarding
        )
    }

    pub fn playing_locale(&self) -> Option<Locale> {
        match self {
            CallState::PlayingAudioEnglish => Some(Locale::En),
            CallState::PlayingAudioSpanish => Some(Locale::Es),
            _ => None,
        }
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CallState::Idle => "idle",
            CallState::Dialing => "dialing",
            CallState::Ringing => "ringing",
            CallState::Connected => "connected",
            CallState::MenuLanguage => "menu_language",
            CallState::MenuEnglish => "menu_english",
            CallState::MenuSpanish => "menu_spanish",
            CallState::PlayingAudioEnglish => "playing_audio_english",
            CallState::PlayingAudioSpanish => "playing_audio_spanish",
            CallState::Forwarding => "forwarding",
            CallState::Ended => "ended",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Locale {
    En,
    Es,
}

impl Locale {
    /// BCP 47 tag handed to the speech synthesizer.
    pub fn tag(&self) -> &'static str {
        match self {
            Locale::En => "en-US",
            Locale::Es => "es-ES",
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Named one-shot timers used by the call flow. Each has a fixed delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimerKind {
    Ring,
    Menu,
    AudioStart,
    ForceEnd,
    ForwardEnd,
    IdleReset,
}

impl TimerKind {
    pub fn delay(&self) -> Duration {
        match self {
            TimerKind::Ring => Duration::from_millis(1500),
            TimerKind::Menu => Duration::from_millis(1000),
            TimerKind::AudioStart => Duration::from_millis(1500),
            TimerKind::ForceEnd => Duration::from_millis(15000),
            TimerKind::ForwardEnd => Duration::from_millis(4000),
            TimerKind::IdleReset => Duration::from_millis(3000),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimerKind::Ring => "ring",
            TimerKind::Menu => "menu",
            TimerKind::AudioStart => "audio-start",
            TimerKind::ForceEnd => "force-end",
            TimerKind::ForwardEnd => "forward-end",
            TimerKind::IdleReset => "idle-reset",
        }
    }
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of asking the telephony provider to place the outbound call.
#[derive(Debug, Clone, PartialEq)]
pub enum InitiationOutcome {
    /// Provider accepted the request.
    Accepted {
        simulated: bool,
        call_id: Option<String>,
    },
    /// Provider answered but refused (`success: false`).
    Rejected(String),
    /// The request itself failed: network error, bad response, timeout.
    TransportError(String),
}

/// Inputs to the call state machine.
///
/// Callback-originated events carry the generation that was current when
/// the timer, request or playback was started. Events whose generation no
/// longer matches the session are discarded.
#[derive(Debug, Clone, PartialEq)]
pub enum CallEvent {
    Initiate(String),
    Answer,
    HangUp,
    Digit(char),
    TimerFired { timer: TimerKind, generation: u64 },
    AudioEnded { generation: u64 },
    InitiationResult {
        generation: u64,
        outcome: InitiationOutcome,
    },
    /// The voice adapter could not start a track.
    PlaybackFailed { generation: u64, reason: String },
}

/// Side-effect instruction returned by [`CallSession::submit`].
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Log { kind: LogKind, message: String },
    ClearLog,
    Speak { text: String, locale: Locale },
    PlayAudio { locale: Locale, generation: u64 },
    StopAudio,
    Schedule { timer: TimerKind, generation: u64 },
    /// Drop every pending timer whose generation differs from `generation`.
    CancelTimers { generation: u64 },
    CallProvider { number: String, generation: u64 },
}

impl Effect {
    pub(crate) fn log(kind: LogKind, message: impl Into<String>) -> Self {
        Effect::Log {
            kind,
            message: message.into(),
        }
    }

    pub(crate) fn speak(text: impl Into<String>, locale: Locale) -> Self {
        Effect::Speak {
            text: text.into(),
            locale,
        }
    }
}

/// Items on the session's single FIFO queue.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    SetTargetNumber(String),
    /// Start a call to the session's current target number.
    Initiate,
    Event(CallEvent),
}
