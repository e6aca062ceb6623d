//! Unified error handling for `rag-console`.
//!
//! One top-level [`RagConsoleError`] covers the whole crate, with
//! configuration problems grouped in [`ConfigError`]. The split mirrors how
//! failures are classified at the UI edge: validation stops before the
//! network, transport errors never reached a server, HTTP errors carry the
//! status and a body snippet, decode errors mean the server answered with an
//! unexpected shape.
//!
//! All messages carry the `[RAG Console]` prefix to simplify attribution in
//! logs. Env helpers for config loading live here as well and return the
//! unified [`Result`] alias.

use reqwest::StatusCode;
use thiserror::Error;

/// Unified result alias for the entire crate.
pub type Result<T> = std::result::Result<T, RagConsoleError>;

/// Top-level error for the `rag-console` crate.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RagConsoleError {
    /// Configuration/validation errors (startup time).
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Submission rejected locally; no request was issued.
    #[error("[RAG Console] query text must not be empty")]
    EmptyInput,

    /// The request never reached a server (connect, read or client error).
    #[error("[RAG Console] transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Upstream answered with a non-successful HTTP status.
    #[error("[RAG Console] HTTP {status} from {url}: {snippet}")]
    HttpStatus {
        /// Numeric HTTP status code.
        status: StatusCode,
        /// Request URL.
        url: String,
        /// Short snippet of the response body (trimmed).
        snippet: String,
    },

    /// Response payload could not be decoded as expected.
    #[error("[RAG Console] decode error: {0}")]
    Decode(String),

    /// The persisted admin credential could not be read or written.
    #[error("[RAG Console] admin key store: {0}")]
    KeyStore(#[from] std::io::Error),
}

impl RagConsoleError {
    /// HTTP status of the failure, if the server answered at all.
    pub fn http_status(&self) -> Option<StatusCode> {
        match self {
            RagConsoleError::HttpStatus { status, .. } => Some(*status),
            RagConsoleError::Transport(err) => err.status(),
            _ => None,
        }
    }
}

/// Error enum for environment-driven configuration.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A number failed to parse (ports, intervals, TTLs).
    #[error("[RAG Console] invalid number in {var}: {reason}")]
    InvalidNumber {
        /// Variable name (e.g. `MEDNOTES_POLL_INTERVAL_SECS`).
        var: &'static str,
        /// Human-readable reason (e.g. `expected u64`).
        reason: &'static str,
    },

    /// Value had the wrong format (e.g. a base URL without a scheme).
    #[error("[RAG Console] invalid format in {var}: {reason}")]
    InvalidFormat {
        /// Variable name (e.g. `MEDNOTES_URL`).
        var: &'static str,
        /// Explanation (e.g. `must start with http:// or https://`).
        reason: &'static str,
    },
}

/// Maximum body length kept when reporting a non-success HTTP response.
const SNIPPET_MAX_CHARS: usize = 240;

/// Trims a response body down to a short, single-purpose error snippet.
pub fn make_snippet(text: &str) -> String {
    text.trim().chars().take(SNIPPET_MAX_CHARS).collect()
}

/// Parses an optional `u64` from env (`Ok(None)` if unset/empty).
///
/// # Errors
/// Returns [`ConfigError::InvalidNumber`] if the variable is set but not a
/// valid `u64`.
pub fn env_opt_u64(name: &'static str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => v.trim().parse::<u64>().map(Some).map_err(|_| {
            RagConsoleError::from(ConfigError::InvalidNumber {
                var: name,
                reason: "expected u64",
            })
        }),
        _ => Ok(None),
    }
}

/// Validates that an HTTP endpoint starts with `http://` or `https://`.
///
/// # Errors
/// Returns [`ConfigError::InvalidFormat`] when the string does not start
/// with a valid HTTP scheme.
pub fn validate_http_endpoint(var: &'static str, value: &str) -> Result<()> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::InvalidFormat {
            var,
            reason: "must start with http:// or https://",
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_is_trimmed_and_bounded() {
        assert_eq!(make_snippet("  boom  \n"), "boom");
        let long = "x".repeat(1000);
        assert_eq!(make_snippet(&long).chars().count(), SNIPPET_MAX_CHARS);
    }

    #[test]
    fn endpoint_validation_requires_http_scheme() {
        assert!(validate_http_endpoint("MEDNOTES_URL", "http://localhost:8000").is_ok());
        assert!(validate_http_endpoint("MEDNOTES_URL", "https://rag.internal").is_ok());
        assert!(validate_http_endpoint("MEDNOTES_URL", "localhost:8000").is_err());
    }

    #[test]
    fn http_status_is_exposed_for_classification() {
        let err = RagConsoleError::HttpStatus {
            status: StatusCode::FORBIDDEN,
            url: "http://localhost:8000/api/admin/restart_api".into(),
            snippet: String::new(),
        };
        assert_eq!(err.http_status(), Some(StatusCode::FORBIDDEN));
        assert_eq!(RagConsoleError::EmptyInput.http_status(), None);
    }
}
