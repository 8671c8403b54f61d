use anyhow::Error;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_PLIVO_API_BASE: &str = "https://api.plivo.com";

#[derive(Parser, Debug)]
#[command(version)]
pub struct Cli {
    #[clap(long, default_value = "ivrflow.toml")]
    pub conf: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub http_addr: String,
    pub log_level: Option<String>,
    pub log_file: Option<String>,
    pub provider: ProviderConfig,
    pub plivo: Option<PlivoConfig>,
    pub audio: AudioConfig,
}

/// How the session reaches the call-initiation endpoint.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Full URL of a `POST /calls/initiate` endpoint. When unset the session
    /// talks to the in-process telephony service.
    pub initiate_url: Option<String>,
    /// Give up on an unanswered initiation request after this long.
    pub initiate_timeout_ms: Option<u64>,
}

impl ProviderConfig {
    pub fn initiate_timeout(&self) -> Option<Duration> {
        self.initiate_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlivoConfig {
    pub auth_id: Option<String>,
    pub auth_token: Option<String>,
    pub from_number: Option<String>,
    pub answer_url: Option<String>,
    pub api_base: Option<String>,
}

impl Default for PlivoConfig {
    fn default() -> Self {
        Self {
            auth_id: None,
            auth_token: None,
            from_number: None,
            answer_url: None,
            api_base: Some(DEFAULT_PLIVO_API_BASE.to_string()),
        }
    }
}

impl PlivoConfig {
    /// Real calls need an account id, a token and a caller id.
    pub fn is_configured(&self) -> bool {
        [&self.auth_id, &self.auth_token, &self.from_number]
            .iter()
            .all(|v| v.as_deref().is_some_and(|s| !s.trim().is_empty()))
    }

    pub fn api_base(&self) -> &str {
        self.api_base
            .as_deref()
            .unwrap_or(DEFAULT_PLIVO_API_BASE)
            .trim_end_matches('/')
    }

    /// Fill missing fields from `PLIVO_AUTH_ID`, `PLIVO_AUTH_TOKEN`,
    /// `PLIVO_FROM_NUMBER` and `PLIVO_ANSWER_URL`.
    pub fn merge_env(&mut self) {
        fn env(key: &str) -> Option<String> {
            std::env::var(key).ok().filter(|v| !v.is_empty())
        }
        if let Some(v) = env("PLIVO_AUTH_ID") {
            self.auth_id = Some(v);
        }
        if let Some(v) = env("PLIVO_AUTH_TOKEN") {
            self.auth_token = Some(v);
        }
        if let Some(v) = env("PLIVO_FROM_NUMBER") {
            self.from_number = Some(v);
        }
        if let Some(v) = env("PLIVO_ANSWER_URL") {
            self.answer_url = Some(v);
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AudioConfig {
    pub en: String,
    pub es: String,
    /// Length of a simulated music track.
    pub playback_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            en: "https://www.soundhelix.com/examples/mp3/SoundHelix-Song-1.mp3".to_string(),
            es: "https://www.soundhelix.com/examples/mp3/SoundHelix-Song-2.mp3".to_string(),
            playback_ms: 10_000,
        }
    }
}

impl AudioConfig {
    pub fn track(&self, locale: crate::call::Locale) -> &str {
        match locale {
            crate::call::Locale::En => &self.en,
            crate::call::Locale::Es => &self.es,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_addr: "0.0.0.0:8080".to_string(),
            log_level: Some("info".to_string()),
            log_file: None,
            provider: ProviderConfig::default(),
            plivo: None,
            audio: AudioConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self, Error> {
        let config = toml::from_str(
            &std::fs::read_to_string(path).map_err(|e| anyhow::anyhow!("{}: {}", e, path))?,
        )?;
        Ok(config)
    }

    /// Plivo settings with environment overrides applied.
    pub fn plivo_with_env(&self) -> PlivoConfig {
        let mut plivo = self.plivo.clone().unwrap_or_default();
        plivo.merge_env();
        plivo
    }
}
