use super::Locale;

pub const LANGUAGE_MENU: &str =
    "Welcome to IVR Demo. Please select your language. Press 1 for English, Press 2 for Spanish.";
pub const LANGUAGE_INVALID: &str = "Invalid input. Press 1 for English, Press 2 for Spanish.";

pub const LOG_LANGUAGE_MENU: &str = "IVR Level 1: Playing Language Selection Prompt";
pub const LOG_LANGUAGE_INVALID: &str = "Invalid Input. Replaying Level 1 Menu.";
pub const LOG_MENU_INVALID: &str = "Invalid Input. Replaying Level 2 Menu.";
pub const LOG_FORWARDING: &str = "Action: Forwarding Call";
pub const LOG_RINGING: &str = "Phone is ringing...";
pub const LOG_ANSWERED: &str = "Call answered.";
pub const LOG_ENDED: &str = "Call ended.";
pub const LOG_NO_TARGET: &str = "No target number provided.";
pub const LOG_SIMULATED: &str =
    "Running in simulation mode - configure Plivo credentials for real calls";

/// Announcements and log lines of the second-level menu for one language.
#[derive(Debug)]
pub struct MenuPrompts {
    pub menu: &'static str,
    pub invalid: &'static str,
    pub log_selected: &'static str,
    pub music_banner: &'static str,
    pub music_speech: &'static str,
    pub log_music: &'static str,
    pub music_finished: &'static str,
    pub forwarding_banner: &'static str,
    pub forwarding_speech: &'static str,
}

static ENGLISH: MenuPrompts = MenuPrompts {
    menu: "English selected. Press 1 to play a message. Press 2 to speak to an associate.",
    invalid: "Invalid input. Press 1 to play music. Press 2 to speak to an associate.",
    log_selected: "Language set to English. Moving to Level 2.",
    music_banner: "Playing English music...",
    music_speech: "Playing your music now.",
    log_music: "Action: Playing English Music",
    music_finished: "Music finished. Ending call.",
    forwarding_banner: "Connecting you to an associate...",
    forwarding_speech: "Please hold while we connect you to an associate.",
};

static SPANISH: MenuPrompts = MenuPrompts {
    menu: "Español seleccionado. Presione 1 para escuchar un mensaje. Presione 2 para hablar con un asociado.",
    invalid: "Entrada inválida. Presione 1 para música. Presione 2 para hablar con un asociado.",
    log_selected: "Language set to Spanish. Moving to Level 2.",
    music_banner: "Reproduciendo música en español...",
    music_speech: "Reproduciendo su música ahora.",
    log_music: "Action: Playing Spanish Music",
    music_finished: "Música terminada. Finalizando llamada.",
    forwarding_banner: "Conectando con un asociado...",
    forwarding_speech: "Por favor espere mientras le conectamos con un asociado.",
};

pub fn menu(locale: Locale) -> &'static MenuPrompts {
    match locale {
        Locale::En => &ENGLISH,
        Locale::Es => &SPANISH,
    }
}

pub fn initiating(number: &str) -> String {
    format!("Initiating outbound call to {} via Plivo API...", number)
}

pub fn digit_received(digit: char) -> String {
    format!("DTMF Received: {}", digit)
}

pub fn real_call(call_id: Option<&str>) -> String {
    format!("Real call initiated - UUID: {}", call_id.unwrap_or("unknown"))
}

pub fn rejected(error: &str) -> String {
    let error = if error.is_empty() { "Unknown error" } else { error };
    format!("Failed to initiate call: {}", error)
}

pub fn transport_error(error: &str) -> String {
    format!("Error initiating call: {}", error)
}

pub fn playback_failed(reason: &str) -> String {
    format!("Audio playback failed: {}", reason)
}
