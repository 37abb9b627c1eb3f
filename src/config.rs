use std::env;

use anyhow::Result;
use once_cell::sync::Lazy;

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub log_level: String,
    pub gemini_api_key: String,
    pub gemini_base_url: String,
    pub gemini_image_model: String,
    pub gemini_text_model: String,
    pub gemini_timeout_seconds: u64,
    pub gemini_max_retry_attempts: usize,
    pub response_language: Option<String>,
    pub telegram_max_length: usize,
    /// Sessions untouched this long are dropped; 0 keeps them forever.
    pub session_idle_minutes: u64,
}

pub static CONFIG: Lazy<Config> =
    Lazy::new(|| Config::load().expect("Failed to load configuration"));

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_optional(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn normalize_base_url(value: String) -> String {
    value.trim().trim_end_matches('/').to_string()
}

impl Config {
    /// Missing credentials are not fatal here: the bot token is checked in
    /// `main`, and an empty Gemini key surfaces on the first generation call.
    pub fn load() -> Result<Self> {
        Ok(Config {
            bot_token: env_string("BOT_TOKEN", ""),
            log_level: env_string("LOG_LEVEL", "info").to_lowercase(),
            gemini_api_key: env_string("GEMINI_API_KEY", "").trim().to_string(),
            gemini_base_url: normalize_base_url(env_string(
                "GEMINI_BASE_URL",
                "https://generativelanguage.googleapis.com/v1beta",
            )),
            gemini_image_model: env_string("GEMINI_IMAGE_MODEL", "gemini-2.5-flash-image"),
            gemini_text_model: env_string("GEMINI_TEXT_MODEL", "gemini-2.5-flash"),
            gemini_timeout_seconds: env_u64("GEMINI_TIMEOUT_SECONDS", 90).max(1),
            gemini_max_retry_attempts: env_usize("GEMINI_MAX_RETRY_ATTEMPTS", 1).max(1),
            response_language: env_optional("DESIGNER_RESPONSE_LANGUAGE"),
            telegram_max_length: env_usize("TELEGRAM_MAX_LENGTH", 4000).max(100),
            session_idle_minutes: env_u64("SESSION_IDLE_MINUTES", 60),
        })
    }
}
