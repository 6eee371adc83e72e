use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use panel_core::RetryPolicy;

/// Worksheet holding the ids of logged-out sessions, next to the feedback
/// table in the same store file.
pub const REVOKED_SESSIONS_WORKSHEET: &str = "Revoked_Sessions";

/// Shortest accepted cookie signing key, in bytes.
pub const MIN_COOKIE_KEY_LEN: usize = 16;

#[derive(Clone)]
pub struct Config {
    /// Secret used to sign session cookies.
    pub cookie_key: String,
    /// Path of the TOML panel file (roster, rubric, accounts).
    pub panel_config: PathBuf,
    pub port: u16,
    /// Directory for persistent state (SQLite feedback store).
    /// Defaults to current working directory.
    pub state_dir: PathBuf,
    pub store_max_attempts: u32,
    pub store_retry_delay: Duration,
    /// Refuse saves that would overwrite a row changed by another session.
    pub conflict_detection: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let cookie_key = cookie_key(env::var("COOKIE_KEY").ok())?;

        let panel_config = env::var("PANEL_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("panel.toml"));

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid number")?;

        let state_dir = env::var("STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        let store_max_attempts = env::var("STORE_MAX_ATTEMPTS")
            .unwrap_or_else(|_| "5".to_string())
            .parse::<u32>()
            .context("STORE_MAX_ATTEMPTS must be a valid number")?;

        let store_retry_delay = env::var("STORE_RETRY_DELAY_SECS")
            .unwrap_or_else(|_| "2".to_string())
            .parse::<u64>()
            .map(Duration::from_secs)
            .context("STORE_RETRY_DELAY_SECS must be a valid number")?;

        let conflict_detection = parse_flag(env::var("CONFLICT_DETECTION").ok());

        Ok(Config {
            cookie_key,
            panel_config,
            port,
            state_dir,
            store_max_attempts,
            store_retry_delay,
            conflict_detection,
        })
    }

    pub fn store_path(&self) -> PathBuf {
        self.state_dir.join("feedback.db")
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.store_max_attempts, self.store_retry_delay)
    }
}

/// The cookie signing key. Surrounding whitespace is not part of the key,
/// and a key shorter than [`MIN_COOKIE_KEY_LEN`] bytes is refused.
pub fn cookie_key(value: Option<String>) -> Result<String> {
    let Some(key) = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) else {
        bail!("COOKIE_KEY environment variable is required");
    };
    if key.len() < MIN_COOKIE_KEY_LEN {
        bail!(
            "COOKIE_KEY must be at least {} bytes, got {}",
            MIN_COOKIE_KEY_LEN,
            key.len()
        );
    }
    Ok(key)
}

/// `true`, `1` and `yes` (any case) enable a flag; anything else disables it.
pub fn parse_flag(value: Option<String>) -> bool {
    value
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}
