use super::prompts::{self, MenuPrompts};
use super::{CallEvent, CallState, Effect, InitiationOutcome, Locale, TimerKind};
use crate::event::LogKind;
use tracing::{debug, info};

/// The single live call session and its transition logic.
///
/// All mutation goes through [`submit`](Self::submit), which never performs
/// I/O: it returns the effects the orchestration layer has to carry out.
#[derive(Debug, Clone)]
pub struct CallSession {
    state: CallState,
    target_number: String,
    current_prompt: Option<String>,
    generation: u64,
}

impl Default for CallSession {
    fn default() -> Self {
        Self::new()
    }
}

impl CallSession {
    pub fn new() -> Self {
        Self {
            state: CallState::Idle,
            target_number: String::new(),
            current_prompt: None,
            generation: 0,
        }
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn target_number(&self) -> &str {
        &self.target_number
    }

    pub fn current_prompt(&self) -> Option<&str> {
        self.current_prompt.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The target survives hang-up and reset.
    pub fn set_target_number(&mut self, number: impl Into<String>) {
        self.target_number = number.into();
    }

    pub fn submit(&mut self, event: CallEvent) -> Vec<Effect> {
        let mut effects = Vec::new();
        match event {
            CallEvent::Initiate(number) => self.on_initiate(number, &mut effects),
            CallEvent::InitiationResult {
                generation,
                outcome,
            } => {
                if self.is_current(generation, "initiation result") {
                    self.on_initiation_result(outcome, &mut effects);
                }
            }
            CallEvent::Answer => self.on_answer(&mut effects),
            CallEvent::HangUp => self.hang_up(&mut effects),
            CallEvent::Digit(digit) => self.on_digit(digit, &mut effects),
            CallEvent::TimerFired { timer, generation } => {
                if self.is_current(generation, timer.as_str()) {
                    self.on_timer(timer, &mut effects);
                }
            }
            CallEvent::AudioEnded { generation } => {
                if self.is_current(generation, "audio ended") {
                    self.on_audio_ended(&mut effects);
                }
            }
            CallEvent::PlaybackFailed { generation, reason } => {
                if self.is_current(generation, "playback failure") {
                    effects.push(Effect::log(
                        LogKind::Warning,
                        prompts::playback_failed(&reason),
                    ));
                }
            }
        }
        effects
    }

    fn is_current(&self, generation: u64, what: &str) -> bool {
        if generation != self.generation {
            debug!(
                what,
                generation,
                current = self.generation,
                "dropping stale event"
            );
            return false;
        }
        true
    }

    fn ignore(&self, what: &str) {
        debug!(state = %self.state, what, "event not applicable in current state");
    }

    fn enter(&mut self, to: CallState, prompt: Option<&str>) {
        debug!(from = %self.state, to = %to, generation = self.generation, "call state transition");
        self.state = to;
        self.current_prompt = if to.has_announcement() {
            prompt.map(str::to_string)
        } else {
            None
        };
    }

    fn schedule(&self, timer: TimerKind, effects: &mut Vec<Effect>) {
        effects.push(Effect::Schedule {
            timer,
            generation: self.generation,
        });
    }

    fn on_initiate(&mut self, number: String, effects: &mut Vec<Effect>) {
        if self.state != CallState::Idle {
            return self.ignore("initiate");
        }
        let number = number.trim();
        if number.is_empty() {
            effects.push(Effect::log(LogKind::Error, prompts::LOG_NO_TARGET));
            return;
        }
        info!(target_number = number, generation = self.generation, "initiating call");
        self.enter(CallState::Dialing, None);
        effects.push(Effect::log(LogKind::System, prompts::initiating(number)));
        effects.push(Effect::CallProvider {
            number: number.to_string(),
            generation: self.generation,
        });
    }

    fn on_initiation_result(&mut self, outcome: InitiationOutcome, effects: &mut Vec<Effect>) {
        if self.state != CallState::Dialing {
            return self.ignore("initiation result");
        }
        match outcome {
            InitiationOutcome::Accepted { simulated, call_id } => {
                if simulated {
                    effects.push(Effect::log(LogKind::Info, prompts::LOG_SIMULATED));
                } else {
                    effects.push(Effect::log(
                        LogKind::Success,
                        prompts::real_call(call_id.as_deref()),
                    ));
                }
                self.schedule(TimerKind::Ring, effects);
            }
            InitiationOutcome::Rejected(error) => {
                self.enter(CallState::Idle, None);
                effects.push(Effect::log(LogKind::Error, prompts::rejected(&error)));
            }
            InitiationOutcome::TransportError(error) => {
                self.enter(CallState::Idle, None);
                effects.push(Effect::log(LogKind::Error, prompts::transport_error(&error)));
            }
        }
    }

    fn on_answer(&mut self, effects: &mut Vec<Effect>) {
        if self.state != CallState::Ringing {
            return self.ignore("answer");
        }
        self.enter(CallState::Connected, None);
        effects.push(Effect::log(LogKind::Success, prompts::LOG_ANSWERED));
        self.schedule(TimerKind::Menu, effects);
    }

    fn hang_up(&mut self, effects: &mut Vec<Effect>) {
        if self.state == CallState::Ended {
            return self.ignore("hang up");
        }
        self.enter(CallState::Ended, None);
        self.generation += 1;
        info!(generation = self.generation, "call ended");
        effects.push(Effect::StopAudio);
        effects.push(Effect::log(LogKind::Warning, prompts::LOG_ENDED));
        effects.push(Effect::CancelTimers {
            generation: self.generation,
        });
        self.schedule(TimerKind::IdleReset, effects);
    }

    fn on_digit(&mut self, digit: char, effects: &mut Vec<Effect>) {
        effects.push(Effect::log(LogKind::DigitInput, prompts::digit_received(digit)));
        effects.push(Effect::StopAudio);

        match self.state {
            CallState::MenuLanguage => match digit {
                '1' => self.enter_menu(Locale::En, effects),
                '2' => self.enter_menu(Locale::Es, effects),
                _ => {
                    effects.push(Effect::log(LogKind::Warning, prompts::LOG_LANGUAGE_INVALID));
                    effects.push(Effect::speak(prompts::LANGUAGE_INVALID, Locale::En));
                }
            },
            CallState::MenuEnglish => self.on_menu_digit(Locale::En, digit, effects),
            CallState::MenuSpanish => self.on_menu_digit(Locale::Es, digit, effects),
            _ => {}
        }
    }

    fn enter_menu(&mut self, locale: Locale, effects: &mut Vec<Effect>) {
        let menu = prompts::menu(locale);
        let state = match locale {
            Locale::En => CallState::MenuEnglish,
            Locale::Es => CallState::MenuSpanish,
        };
        self.enter(state, Some(menu.menu));
        effects.push(Effect::log(LogKind::System, menu.log_selected));
        effects.push(Effect::speak(menu.menu, locale));
    }

    fn on_menu_digit(&mut self, locale: Locale, digit: char, effects: &mut Vec<Effect>) {
        let menu: &MenuPrompts = prompts::menu(locale);
        match digit {
            '1' => {
                let state = match locale {
                    Locale::En => CallState::PlayingAudioEnglish,
                    Locale::Es => CallState::PlayingAudioSpanish,
                };
                self.enter(state, Some(menu.music_banner));
                effects.push(Effect::log(LogKind::System, menu.log_music));
                effects.push(Effect::speak(menu.music_speech, locale));
                self.schedule(TimerKind::AudioStart, effects);
                self.schedule(TimerKind::ForceEnd, effects);
            }
            '2' => {
                self.enter(CallState::Forwarding, Some(menu.forwarding_banner));
                effects.push(Effect::log(LogKind::System, prompts::LOG_FORWARDING));
                effects.push(Effect::speak(menu.forwarding_speech, locale));
                self.schedule(TimerKind::ForwardEnd, effects);
            }
            _ => {
                effects.push(Effect::log(LogKind::Warning, prompts::LOG_MENU_INVALID));
                effects.push(Effect::speak(menu.invalid, locale));
            }
        }
    }

    fn on_timer(&mut self, timer: TimerKind, effects: &mut Vec<Effect>) {
        match (timer, self.state) {
            (TimerKind::Ring, CallState::Dialing) => {
                self.enter(CallState::Ringing, None);
                effects.push(Effect::log(LogKind::Info, prompts::LOG_RINGING));
            }
            (TimerKind::Menu, CallState::Connected) => {
                self.enter(CallState::MenuLanguage, Some(prompts::LANGUAGE_MENU));
                effects.push(Effect::log(LogKind::System, prompts::LOG_LANGUAGE_MENU));
                effects.push(Effect::speak(prompts::LANGUAGE_MENU, Locale::En));
            }
            (TimerKind::AudioStart, state) if state.playing_locale().is_some() => {
                if let Some(locale) = state.playing_locale() {
                    effects.push(Effect::PlayAudio {
                        locale,
                        generation: self.generation,
                    });
                }
            }
            (TimerKind::ForceEnd, state) if state.playing_locale().is_some() => {
                self.hang_up(effects);
            }
            (TimerKind::ForwardEnd, CallState::Forwarding) => self.hang_up(effects),
            (TimerKind::IdleReset, CallState::Ended) => {
                self.enter(CallState::Idle, None);
                effects.push(Effect::ClearLog);
            }
            (timer, _) => self.ignore(timer.as_str()),
        }
    }

    fn on_audio_ended(&mut self, effects: &mut Vec<Effect>) {
        let Some(locale) = self.state.playing_locale() else {
            return self.ignore("audio ended");
        };
        effects.push(Effect::log(
            LogKind::Success,
            prompts::menu(locale).music_finished,
        ));
        self.hang_up(effects);
    }
}
