use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be a valid number, got '{value}'")]
    InvalidNumber { name: &'static str, value: String },
    #[error("{name} must be a boolean (true/false/1/0), got '{value}'")]
    InvalidBool { name: &'static str, value: String },
}

/// Process-level settings, read once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    /// Absent => jobs are tracked in an in-process memory store.
    pub database_url: Option<String>,
    pub run_migrations: bool,
    pub chrome_path: Option<PathBuf>,
    pub headless: bool,
    pub tesseract_bin: String,
    /// Requests per minute per client IP; `None` disables the limiter.
    pub rate_limit_per_minute: Option<u32>,
    pub timings: Timings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            database_url: None,
            run_migrations: false,
            chrome_path: None,
            headless: true,
            tesseract_bin: "tesseract".to_string(),
            rate_limit_per_minute: Some(10),
            timings: Timings::default(),
        }
    }
}

impl Settings {
    /// Load `.env` (if present) and read settings from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let defaults = Settings::default();

        let rate_limit = parse_number::<u32>("RATE_LIMIT_PER_MINUTE")?
            .unwrap_or(10);

        Ok(Self {
            host: env::var("HOST").unwrap_or(defaults.host),
            port: parse_number("PORT")?.unwrap_or(defaults.port),
            database_url: non_empty("DATABASE_URL"),
            run_migrations: parse_bool("RUN_MIGRATIONS")?.unwrap_or(false),
            chrome_path: non_empty("CHROME_PATH").map(PathBuf::from),
            headless: parse_bool("HEADLESS")?.unwrap_or(true),
            tesseract_bin: non_empty("TESSERACT_BIN").unwrap_or(defaults.tesseract_bin),
            rate_limit_per_minute: (rate_limit > 0).then_some(rate_limit),
            timings: Timings::default(),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Fixed waits used while driving pages. None of these are event-driven.
#[derive(Debug, Clone, Copy)]
pub struct Timings {
    pub navigation_timeout: Duration,
    pub render_settle: Duration,
    pub consent_timeout: Duration,
    pub reveal_timeout: Duration,
    pub reveal_settle: Duration,
    pub phone_image_wait: Duration,
    pub scroll_pause: Duration,
    pub scroll_attempts: u32,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_secs(30),
            render_settle: Duration::from_secs(2),
            consent_timeout: Duration::from_secs(5),
            reveal_timeout: Duration::from_secs(10),
            reveal_settle: Duration::from_secs(3),
            phone_image_wait: Duration::from_secs(3),
            scroll_pause: Duration::from_millis(1500),
            scroll_attempts: 10,
        }
    }
}

impl Timings {
    /// No waiting at all; used when the page is not a real browser.
    pub fn immediate() -> Self {
        Self {
            navigation_timeout: Duration::from_secs(5),
            render_settle: Duration::ZERO,
            consent_timeout: Duration::ZERO,
            reveal_timeout: Duration::ZERO,
            reveal_settle: Duration::ZERO,
            phone_image_wait: Duration::ZERO,
            scroll_pause: Duration::ZERO,
            scroll_attempts: 3,
        }
    }
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_number<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match non_empty(name) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { name, value }),
        None => Ok(None),
    }
}

fn parse_bool(name: &'static str) -> Result<Option<bool>, ConfigError> {
    match non_empty(name) {
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(Some(true)),
            "false" | "0" | "no" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidBool { name, value }),
        },
        None => Ok(None),
    }
}
