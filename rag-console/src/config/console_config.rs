//! Console configuration loaded from environment variables.
//!
//! Every knob has a default; only a malformed value is an error. The base
//! URL resolves like the backend's own endpoint handling:
//!
//! 1. `MEDNOTES_URL` if present and non-empty
//! 2. `MEDNOTES_PORT` → `http://localhost:{port}`
//! 3. fallback `http://localhost:8000`
//!
//! Remaining variables:
//! - `MEDNOTES_TIMEOUT_SECS`     = per-request timeout (default 600; generation is slow)
//! - `MEDNOTES_POLL_INTERVAL_SECS` = health poll cadence (default 30)
//! - `MEDNOTES_RESTART_SETTLE_MS`  = wait before re-probing after a restart (default 1500)
//! - `MEDNOTES_NOTIFY_TTL_MS`      = notification time-to-live (default 2500)
//! - `MEDNOTES_ADMIN_KEY_FILE`     = path of the persisted admin credential

use std::path::PathBuf;

use crate::error_handler::{ConfigError, RagConsoleError, Result, env_opt_u64};

/// Runtime knobs for the console and its client layer.
#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    /// Base URL of the MedNotes API (no trailing slash required).
    pub base_url: String,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,

    /// Health poll cadence in seconds.
    pub poll_interval_secs: u64,

    /// Delay before reconciling monitor state after a restart, in milliseconds.
    pub restart_settle_ms: u64,

    /// Notification time-to-live in milliseconds.
    pub notification_ttl_ms: u64,

    /// Where the admin credential is persisted between sessions.
    pub admin_key_file: PathBuf,
}

impl ConsoleConfig {
    /// Build from environment variables with defaults.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidNumber`] for unparseable numeric
    /// variables.
    pub fn from_env() -> Result<Self> {
        let base_url = resolve_base_url()?;

        let admin_key_file = std::env::var("MEDNOTES_ADMIN_KEY_FILE")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".mednotes_admin_key"));

        Ok(Self {
            base_url,
            timeout_secs: env_opt_u64("MEDNOTES_TIMEOUT_SECS")?.unwrap_or(600),
            poll_interval_secs: env_opt_u64("MEDNOTES_POLL_INTERVAL_SECS")?.unwrap_or(30),
            restart_settle_ms: env_opt_u64("MEDNOTES_RESTART_SETTLE_MS")?.unwrap_or(1500),
            notification_ttl_ms: env_opt_u64("MEDNOTES_NOTIFY_TTL_MS")?.unwrap_or(2500),
            admin_key_file,
        })
    }

    /// Config pointed at an explicit base URL, defaults elsewhere. Handy for
    /// tests and embedding.
    pub fn for_base(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_secs: 600,
            poll_interval_secs: 30,
            restart_settle_ms: 1500,
            notification_ttl_ms: 2500,
            admin_key_file: PathBuf::from(".mednotes_admin_key"),
        }
    }
}

/// Resolves the API base URL from `MEDNOTES_URL` / `MEDNOTES_PORT`.
fn resolve_base_url() -> Result<String> {
    if let Ok(url) = std::env::var("MEDNOTES_URL") {
        if !url.trim().is_empty() {
            return Ok(url);
        }
    }
    if let Ok(port) = std::env::var("MEDNOTES_PORT") {
        if !port.trim().is_empty() {
            let _ = port
                .trim()
                .parse::<u16>()
                .map_err(|_| -> RagConsoleError {
                    ConfigError::InvalidNumber {
                        var: "MEDNOTES_PORT",
                        reason: "expected u16 (1..=65535)",
                    }
                    .into()
                })?;
            return Ok(format!("http://localhost:{}", port.trim()));
        }
    }
    Ok("http://localhost:8000".to_string())
}
