use super::prompts;
use super::testing::{MockIvrStack, RecordingVoice, ScriptedInitiator};
use super::*;
use crate::config::AudioConfig;
use crate::event::LogKind;
use crate::provider::{CallInitiator, InitiateResponse};
use async_trait::async_trait;
use mockall::mock;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const NUMBER: &str = "+15551234567";

const ALL_STATES: [CallState; 11] = [
    CallState::Idle,
    CallState::Dialing,
    CallState::Ringing,
    CallState::Connected,
    CallState::MenuLanguage,
    CallState::MenuEnglish,
    CallState::MenuSpanish,
    CallState::PlayingAudioEnglish,
    CallState::PlayingAudioSpanish,
    CallState::Forwarding,
    CallState::Ended,
];

/// Events that take a fresh session (generation 0) to `state`.
fn path_to(state: CallState) -> Vec<CallEvent> {
    let accepted = CallEvent::InitiationResult {
        generation: 0,
        outcome: InitiationOutcome::Accepted {
            simulated: true,
            call_id: None,
        },
    };
    let fired = |timer| CallEvent::TimerFired {
        timer,
        generation: 0,
    };
    let (before, tail) = match state {
        CallState::Idle => return vec![],
        CallState::Dialing => return vec![CallEvent::Initiate(NUMBER.to_string())],
        CallState::Ended => return vec![CallEvent::HangUp],
        CallState::Ringing => (CallState::Dialing, vec![accepted, fired(TimerKind::Ring)]),
        CallState::Connected => (CallState::Ringing, vec![CallEvent::Answer]),
        CallState::MenuLanguage => (CallState::Connected, vec![fired(TimerKind::Menu)]),
        CallState::MenuEnglish => (CallState::MenuLanguage, vec![CallEvent::Digit('1')]),
        CallState::MenuSpanish => (CallState::MenuLanguage, vec![CallEvent::Digit('2')]),
        CallState::PlayingAudioEnglish => (CallState::MenuEnglish, vec![CallEvent::Digit('1')]),
        CallState::PlayingAudioSpanish => (CallState::MenuSpanish, vec![CallEvent::Digit('1')]),
        CallState::Forwarding => (CallState::MenuEnglish, vec![CallEvent::Digit('2')]),
    };
    let mut path = path_to(before);
    path.extend(tail);
    path
}

fn session_in(state: CallState) -> CallSession {
    let mut session = CallSession::new();
    for event in path_to(state) {
        session.submit(event);
    }
    assert_eq!(session.state(), state, "failed to drive session to {state}");
    session
}

fn logs(effects: &[Effect]) -> Vec<(LogKind, String)> {
    effects
        .iter()
        .filter_map(|e| match e {
            Effect::Log { kind, message } => Some((*kind, message.clone())),
            _ => None,
        })
        .collect()
}

fn spoken(effects: &[Effect]) -> Vec<(String, Locale)> {
    effects
        .iter()
        .filter_map(|e| match e {
            Effect::Speak { text, locale } => Some((text.clone(), *locale)),
            _ => None,
        })
        .collect()
}

fn scheduled(effects: &[Effect]) -> Vec<(TimerKind, u64)> {
    effects
        .iter()
        .filter_map(|e| match e {
            Effect::Schedule { timer, generation } => Some((*timer, *generation)),
            _ => None,
        })
        .collect()
}

// ── Initiation ──

#[test]
fn test_initiate_with_number_dials() {
    let mut session = CallSession::new();
    let effects = session.submit(CallEvent::Initiate(NUMBER.to_string()));

    assert_eq!(session.state(), CallState::Dialing);
    assert_eq!(
        effects,
        vec![
            Effect::log(LogKind::System, prompts::initiating(NUMBER)),
            Effect::CallProvider {
                number: NUMBER.to_string(),
                generation: 0
            },
        ]
    );
}

#[test]
fn test_initiate_empty_number_stays_idle() {
    for number in ["", "   "] {
        let mut session = CallSession::new();
        let effects = session.submit(CallEvent::Initiate(number.to_string()));
        assert_eq!(session.state(), CallState::Idle);
        assert_eq!(
            effects,
            vec![Effect::log(LogKind::Error, prompts::LOG_NO_TARGET)]
        );
    }
}

#[test]
fn test_initiate_ignored_outside_idle() {
    let mut session = session_in(CallState::Ringing);
    let effects = session.submit(CallEvent::Initiate(NUMBER.to_string()));
    assert!(effects.is_empty());
    assert_eq!(session.state(), CallState::Ringing);
}

#[test]
fn test_initiation_accepted_schedules_ring() {
    let mut session = session_in(CallState::Dialing);
    let effects = session.submit(CallEvent::InitiationResult {
        generation: 0,
        outcome: InitiationOutcome::Accepted {
            simulated: true,
            call_id: None,
        },
    });
    assert_eq!(session.state(), CallState::Dialing);
    assert_eq!(
        logs(&effects),
        vec![(LogKind::Info, prompts::LOG_SIMULATED.to_string())]
    );
    assert_eq!(scheduled(&effects), vec![(TimerKind::Ring, 0)]);

    let mut session = session_in(CallState::Dialing);
    let effects = session.submit(CallEvent::InitiationResult {
        generation: 0,
        outcome: InitiationOutcome::Accepted {
            simulated: false,
            call_id: Some("uuid-1".to_string()),
        },
    });
    assert_eq!(
        logs(&effects),
        vec![(
            LogKind::Success,
            "Real call initiated - UUID: uuid-1".to_string()
        )]
    );
}

#[test]
fn test_initiation_failure_returns_to_idle() {
    let mut session = session_in(CallState::Dialing);
    let effects = session.submit(CallEvent::InitiationResult {
        generation: 0,
        outcome: InitiationOutcome::Rejected(String::new()),
    });
    assert_eq!(session.state(), CallState::Idle);
    assert_eq!(
        logs(&effects),
        vec![(
            LogKind::Error,
            "Failed to initiate call: Unknown error".to_string()
        )]
    );
    assert!(scheduled(&effects).is_empty());

    let mut session = session_in(CallState::Dialing);
    let effects = session.submit(CallEvent::InitiationResult {
        generation: 0,
        outcome: InitiationOutcome::TransportError("connection refused".to_string()),
    });
    assert_eq!(session.state(), CallState::Idle);
    assert_eq!(
        logs(&effects),
        vec![(
            LogKind::Error,
            "Error initiating call: connection refused".to_string()
        )]
    );
}

// ── Ringing / answer / menu entry ──

#[test]
fn test_ring_answer_and_language_menu() {
    let mut session = session_in(CallState::Ringing);

    let effects = session.submit(CallEvent::Answer);
    assert_eq!(session.state(), CallState::Connected);
    assert_eq!(
        logs(&effects),
        vec![(LogKind::Success, prompts::LOG_ANSWERED.to_string())]
    );
    assert_eq!(scheduled(&effects), vec![(TimerKind::Menu, 0)]);
    assert!(session.current_prompt().is_none());

    let effects = session.submit(CallEvent::TimerFired {
        timer: TimerKind::Menu,
        generation: 0,
    });
    assert_eq!(session.state(), CallState::MenuLanguage);
    assert_eq!(session.current_prompt(), Some(prompts::LANGUAGE_MENU));
    // system log precedes the announcement
    assert_eq!(
        effects,
        vec![
            Effect::log(LogKind::System, prompts::LOG_LANGUAGE_MENU),
            Effect::speak(prompts::LANGUAGE_MENU, Locale::En),
        ]
    );
}

#[test]
fn test_answer_ignored_unless_ringing() {
    for state in [CallState::Idle, CallState::Dialing, CallState::MenuLanguage] {
        let mut session = session_in(state);
        assert!(session.submit(CallEvent::Answer).is_empty());
        assert_eq!(session.state(), state);
    }
}

// ── Digits ──

#[test]
fn test_digit_always_logs_and_stops_audio() {
    for state in ALL_STATES {
        let mut session = session_in(state);
        let effects = session.submit(CallEvent::Digit('7'));
        assert_eq!(
            effects[0],
            Effect::log(LogKind::DigitInput, "DTMF Received: 7"),
            "state {state}"
        );
        assert_eq!(effects[1], Effect::StopAudio, "state {state}");
    }
}

#[test]
fn test_language_menu_selection() {
    let mut session = session_in(CallState::MenuLanguage);
    let effects = session.submit(CallEvent::Digit('1'));
    assert_eq!(session.state(), CallState::MenuEnglish);
    assert_eq!(session.current_prompt(), Some(prompts::menu(Locale::En).menu));
    assert_eq!(
        spoken(&effects),
        vec![(prompts::menu(Locale::En).menu.to_string(), Locale::En)]
    );

    let mut session = session_in(CallState::MenuLanguage);
    let effects = session.submit(CallEvent::Digit('2'));
    assert_eq!(session.state(), CallState::MenuSpanish);
    assert_eq!(
        spoken(&effects),
        vec![(prompts::menu(Locale::Es).menu.to_string(), Locale::Es)]
    );
}

#[test]
fn test_language_menu_invalid_digit() {
    for digit in ['0', '3', '9', '*', '#'] {
        let mut session = session_in(CallState::MenuLanguage);
        let effects = session.submit(CallEvent::Digit(digit));
        assert_eq!(session.state(), CallState::MenuLanguage);
        assert_eq!(session.current_prompt(), Some(prompts::LANGUAGE_MENU));
        let warnings: Vec<_> = logs(&effects)
            .into_iter()
            .filter(|(k, _)| *k == LogKind::Warning)
            .collect();
        assert_eq!(warnings.len(), 1);
        assert_eq!(
            spoken(&effects),
            vec![(prompts::LANGUAGE_INVALID.to_string(), Locale::En)]
        );
    }
}

#[test]
fn test_english_music_selection_schedules_racing_timers() {
    let mut session = session_in(CallState::MenuEnglish);
    let effects = session.submit(CallEvent::Digit('1'));
    assert_eq!(session.state(), CallState::PlayingAudioEnglish);
    assert_eq!(session.current_prompt(), Some("Playing English music..."));
    assert_eq!(
        spoken(&effects),
        vec![("Playing your music now.".to_string(), Locale::En)]
    );
    assert_eq!(
        scheduled(&effects),
        vec![(TimerKind::AudioStart, 0), (TimerKind::ForceEnd, 0)]
    );
}

#[test]
fn test_spanish_forwarding() {
    let mut session = session_in(CallState::MenuSpanish);
    let effects = session.submit(CallEvent::Digit('2'));
    assert_eq!(session.state(), CallState::Forwarding);
    assert_eq!(session.current_prompt(), Some("Conectando con un asociado..."));
    assert_eq!(spoken(&effects)[0].1, Locale::Es);
    assert_eq!(scheduled(&effects), vec![(TimerKind::ForwardEnd, 0)]);

    let effects = session.submit(CallEvent::TimerFired {
        timer: TimerKind::ForwardEnd,
        generation: 0,
    });
    assert_eq!(session.state(), CallState::Ended);
    assert!(effects.contains(&Effect::StopAudio));
}

#[test]
fn test_second_level_invalid_digit_replays_prompt() {
    let mut session = session_in(CallState::MenuEnglish);
    let effects = session.submit(CallEvent::Digit('9'));
    assert_eq!(session.state(), CallState::MenuEnglish);
    assert_eq!(
        logs(&effects)[1],
        (LogKind::Warning, prompts::LOG_MENU_INVALID.to_string())
    );
    assert_eq!(
        spoken(&effects),
        vec![(prompts::menu(Locale::En).invalid.to_string(), Locale::En)]
    );

    let mut session = session_in(CallState::MenuSpanish);
    let effects = session.submit(CallEvent::Digit('#'));
    assert_eq!(session.state(), CallState::MenuSpanish);
    assert_eq!(spoken(&effects)[0].1, Locale::Es);
}

// ── Playback ──

#[test]
fn test_audio_start_plays_locale_track() {
    let mut session = session_in(CallState::PlayingAudioSpanish);
    let effects = session.submit(CallEvent::TimerFired {
        timer: TimerKind::AudioStart,
        generation: 0,
    });
    assert_eq!(session.state(), CallState::PlayingAudioSpanish);
    assert_eq!(
        effects,
        vec![Effect::PlayAudio {
            locale: Locale::Es,
            generation: 0
        }]
    );
}

#[test]
fn test_audio_ended_hangs_up_and_force_end_is_then_stale() {
    let mut session = session_in(CallState::PlayingAudioEnglish);
    let effects = session.submit(CallEvent::AudioEnded { generation: 0 });
    assert_eq!(session.state(), CallState::Ended);
    assert_eq!(
        logs(&effects),
        vec![
            (LogKind::Success, "Music finished. Ending call.".to_string()),
            (LogKind::Warning, prompts::LOG_ENDED.to_string()),
        ]
    );

    let effects = session.submit(CallEvent::TimerFired {
        timer: TimerKind::ForceEnd,
        generation: 0,
    });
    assert!(effects.is_empty());
    assert_eq!(session.state(), CallState::Ended);
}

#[test]
fn test_force_end_when_audio_never_ends() {
    let mut session = session_in(CallState::PlayingAudioEnglish);
    session.submit(CallEvent::TimerFired {
        timer: TimerKind::AudioStart,
        generation: 0,
    });
    let effects = session.submit(CallEvent::TimerFired {
        timer: TimerKind::ForceEnd,
        generation: 0,
    });
    assert_eq!(session.state(), CallState::Ended);
    assert_eq!(scheduled(&effects), vec![(TimerKind::IdleReset, 1)]);

    // the track's completion arrives late and must be dropped
    assert!(session
        .submit(CallEvent::AudioEnded { generation: 0 })
        .is_empty());
}

#[test]
fn test_playback_failure_is_a_warning() {
    let mut session = session_in(CallState::PlayingAudioEnglish);
    let effects = session.submit(CallEvent::PlaybackFailed {
        generation: 0,
        reason: "404".to_string(),
    });
    assert_eq!(session.state(), CallState::PlayingAudioEnglish);
    assert_eq!(
        logs(&effects),
        vec![(LogKind::Warning, "Audio playback failed: 404".to_string())]
    );
}

// ── Hang-up and reset ──

#[test]
fn test_hang_up_from_every_state() {
    for state in ALL_STATES.into_iter().filter(|s| *s != CallState::Ended) {
        let mut session = session_in(state);
        let effects = session.submit(CallEvent::HangUp);
        assert_eq!(session.state(), CallState::Ended, "from {state}");
        assert_eq!(session.generation(), 1);
        assert!(session.current_prompt().is_none());
        assert_eq!(
            effects,
            vec![
                Effect::StopAudio,
                Effect::log(LogKind::Warning, prompts::LOG_ENDED),
                Effect::CancelTimers { generation: 1 },
                Effect::Schedule {
                    timer: TimerKind::IdleReset,
                    generation: 1
                },
            ],
            "from {state}"
        );
    }
}

#[test]
fn test_hang_up_when_ended_is_noop() {
    let mut session = session_in(CallState::Ended);
    assert!(session.submit(CallEvent::HangUp).is_empty());
    assert_eq!(session.generation(), 1);
}

#[test]
fn test_idle_reset_clears_log() {
    let mut session = session_in(CallState::MenuEnglish);
    session.submit(CallEvent::HangUp);
    let effects = session.submit(CallEvent::TimerFired {
        timer: TimerKind::IdleReset,
        generation: 1,
    });
    assert_eq!(session.state(), CallState::Idle);
    assert_eq!(effects, vec![Effect::ClearLog]);
    assert_eq!(session.target_number(), "");
}

#[test]
fn test_target_number_survives_reset() {
    let mut session = CallSession::new();
    session.set_target_number(NUMBER);
    session.submit(CallEvent::Initiate(NUMBER.to_string()));
    session.submit(CallEvent::HangUp);
    session.submit(CallEvent::TimerFired {
        timer: TimerKind::IdleReset,
        generation: 1,
    });
    assert_eq!(session.state(), CallState::Idle);
    assert_eq!(session.target_number(), NUMBER);
}

#[test]
fn test_stale_ring_after_hang_up_has_no_effect() {
    let mut session = session_in(CallState::Dialing);
    session.submit(CallEvent::InitiationResult {
        generation: 0,
        outcome: InitiationOutcome::Accepted {
            simulated: true,
            call_id: None,
        },
    });
    session.submit(CallEvent::HangUp);
    session.submit(CallEvent::TimerFired {
        timer: TimerKind::IdleReset,
        generation: 1,
    });
    // next call is dialing when the old ring timer finally fires
    session.submit(CallEvent::Initiate(NUMBER.to_string()));
    assert_eq!(session.state(), CallState::Dialing);

    let effects = session.submit(CallEvent::TimerFired {
        timer: TimerKind::Ring,
        generation: 0,
    });
    assert!(effects.is_empty());
    assert_eq!(session.state(), CallState::Dialing);

    let effects = session.submit(CallEvent::InitiationResult {
        generation: 0,
        outcome: InitiationOutcome::Rejected("late".to_string()),
    });
    assert!(effects.is_empty());
    assert_eq!(session.state(), CallState::Dialing);
}

#[test]
fn test_prompt_only_set_in_announcement_states() {
    for state in ALL_STATES {
        let session = session_in(state);
        assert_eq!(
            session.current_prompt().is_some(),
            state.has_announcement(),
            "state {state}"
        );
    }
}

// ── Session loop ──

mock! {
    pub Initiator {}

    #[async_trait]
    impl CallInitiator for Initiator {
        async fn initiate(&self, target_number: &str) -> anyhow::Result<InitiateResponse>;
    }
}

#[tokio::test(start_paused = true)]
async fn test_loop_calls_provider_with_target_number() {
    let mut initiator = MockInitiator::new();
    initiator
        .expect_initiate()
        .withf(|number: &str| number == NUMBER)
        .times(1)
        .returning(|_| Ok(InitiateResponse::accepted(false, Some("real-1".to_string()))));

    let cancel = CancellationToken::new();
    let (event_loop, handle) = SessionLoop::new(
        Arc::new(RecordingVoice::new()),
        Arc::new(initiator),
        AudioConfig::default(),
        cancel.child_token(),
    );
    let join = event_loop.spawn();

    handle.set_target_number(NUMBER).unwrap();
    handle.initiate().unwrap();
    let snapshot = handle.wait_for_state(CallState::Ringing).await.unwrap();
    assert_eq!(snapshot.target_number, NUMBER);
    assert_eq!(
        snapshot.log_entries[1].message,
        "Real call initiated - UUID: real-1"
    );

    cancel.cancel();
    join.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_loop_initiation_timeout_returns_to_idle() {
    let stack = MockIvrStack::run(
        ScriptedInitiator::simulated().with_delay(Duration::from_secs(60)),
        Some(Duration::from_secs(5)),
    );
    stack.handle.set_target_number(NUMBER).unwrap();
    stack.handle.initiate().unwrap();
    stack.handle.wait_for_state(CallState::Dialing).await.unwrap();

    let start = tokio::time::Instant::now();
    let snapshot = stack.handle.wait_for_state(CallState::Idle).await.unwrap();
    assert!(start.elapsed() >= Duration::from_secs(5));
    let last = snapshot.log_entries.last().unwrap();
    assert_eq!(last.kind, LogKind::Error);
    assert_eq!(last.message, "Error initiating call: timed out after 5000 ms");

    stack.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_loop_playback_failure_logged_then_force_end() {
    let stack = MockIvrStack::simulated();
    stack.voice.fail_playback(true);
    stack.at_language_menu(NUMBER).await.unwrap();
    stack.press('1', CallState::MenuEnglish).await.unwrap();
    stack.press('1', CallState::PlayingAudioEnglish).await.unwrap();

    let snapshot = stack
        .handle
        .wait_for(|s| {
            s.log_entries
                .iter()
                .any(|e| e.message.starts_with("Audio playback failed"))
        })
        .await
        .unwrap();
    assert_eq!(snapshot.state, CallState::PlayingAudioEnglish);
    assert!(stack.voice.played().is_empty());

    stack.handle.wait_for_state(CallState::Ended).await.unwrap();
    stack.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_loop_hang_up_during_dialing_ignores_late_result() {
    let stack = MockIvrStack::run(
        ScriptedInitiator::simulated().with_delay(Duration::from_millis(500)),
        None,
    );
    stack.handle.set_target_number(NUMBER).unwrap();
    stack.handle.initiate().unwrap();
    stack.handle.wait_for_state(CallState::Dialing).await.unwrap();
    stack.handle.hang_up().unwrap();
    stack.handle.wait_for_state(CallState::Ended).await.unwrap();

    // the provider answers and the idle reset runs; no ringing afterwards
    tokio::time::sleep(Duration::from_secs(10)).await;
    let snapshot = stack.handle.snapshot();
    assert_eq!(snapshot.state, CallState::Idle);
    assert!(snapshot.log_entries.is_empty());
    assert_eq!(stack.initiator.calls(), vec![NUMBER.to_string()]);

    stack.shutdown().await.unwrap();
}
