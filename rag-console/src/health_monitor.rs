//! Health probes for the two supervised processes.
//!
//! Two independent probes, each a single request/response cycle with no
//! retries:
//!
//! - **API**: `GET /api/health`, 2xx means reachable.
//! - **Ollama**: `GET /api/ollama/health` for the current model, then
//!   `GET /api/ollama/models` for the available list.
//!
//! Probe invocations are tagged with a per-service monotonically increasing
//! sequence number; a completion is applied only if it is newer than the
//! last applied one, so an overlapping probe that finishes late can never
//! overwrite fresher state. [`HealthMonitor::start_polling`] runs both
//! probes immediately and then on a fixed cadence until the returned handle
//! is dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error_handler::Result;
use crate::transport::Transport;

/// Error text shown while the API process is unreachable.
pub const API_DOWN_MSG: &str = "API unreachable";

/// Error text shown while the Ollama server is unreachable.
pub const OLLAMA_DOWN_MSG: &str = "Ollama unreachable";

/// Probe-observed reachability of one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reachability {
    /// No probe has completed yet.
    #[default]
    Unknown,
    Up,
    Down,
}

/// Status of the MedNotes API process.
#[derive(Debug, Clone, Default)]
pub struct ApiStatus {
    pub reachability: Reachability,
    /// Last probe failure; cleared by the next successful probe.
    pub last_error: Option<String>,
}

/// Status of the Ollama model server.
#[derive(Debug, Clone, Default)]
pub struct OllamaStatus {
    pub reachability: Reachability,
    /// Last probe failure; cleared by the next successful probe.
    pub last_error: Option<String>,
    /// Ollama base URL as reported by the backend.
    pub base: Option<String>,
    /// Ollama server version as reported by the backend.
    pub version: Option<String>,
    /// Model currently active for generation.
    pub current_model: Option<String>,
    /// Models available for switching. Empty when unknown.
    pub models: Vec<String>,
}

/// Wire shape of `GET /api/ollama/health`.
#[derive(Debug, Deserialize)]
struct OllamaHealth {
    #[serde(default)]
    base: Option<String>,
    #[serde(default)]
    version: Option<String>,
    current_model: String,
}

/// Wire shape of `GET /api/ollama/models`.
#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    models: Vec<String>,
}

#[derive(Default)]
struct MonitorState {
    api: ApiStatus,
    api_applied: u64,
    ollama: OllamaStatus,
    ollama_applied: u64,
}

/// Polls the two services and owns their observed status.
pub struct HealthMonitor {
    transport: Arc<Transport>,
    state: Mutex<MonitorState>,
    api_seq: AtomicU64,
    ollama_seq: AtomicU64,
}

impl HealthMonitor {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self {
            transport,
            state: Mutex::new(MonitorState::default()),
            api_seq: AtomicU64::new(0),
            ollama_seq: AtomicU64::new(0),
        }
    }

    /// Snapshot of the API status.
    pub fn api_status(&self) -> ApiStatus {
        self.state.lock().expect("monitor state poisoned").api.clone()
    }

    /// Snapshot of the Ollama status.
    pub fn ollama_status(&self) -> OllamaStatus {
        self.state
            .lock()
            .expect("monitor state poisoned")
            .ollama
            .clone()
    }

    /// Runs the API probe once and applies the result unless it is stale.
    pub async fn check_api(&self) {
        let seq = self.begin_api();
        let outcome = self.transport.get_ok("/api/health").await;
        self.apply_api(seq, outcome);
    }

    /// Runs the Ollama probe once and applies the result unless it is stale.
    ///
    /// The model list is a secondary call: its failure leaves the service
    /// `up` with the current model from the primary call, an empty list and
    /// no error text. A failed primary call marks the service `down` and
    /// clears both the current model and the list.
    pub async fn check_ollama(&self) {
        let seq = self.begin_ollama();
        let outcome = match self.transport.get_json::<OllamaHealth>("/api/ollama/health").await {
            Ok(health) => {
                let models = match self
                    .transport
                    .get_json::<ModelList>("/api/ollama/models")
                    .await
                {
                    Ok(list) => list.models,
                    Err(err) => {
                        warn!(error = %err, "model list fetch failed; keeping current model");
                        Vec::new()
                    }
                };
                Ok((health, models))
            }
            Err(err) => Err(err),
        };
        self.apply_ollama(seq, outcome);
    }

    /// Spawns the fixed-interval polling task. Both probes run immediately
    /// on the first tick. Dropping the handle aborts the task; no further
    /// probes fire after that.
    pub fn start_polling(self: &Arc<Self>, every: Duration) -> PollHandle {
        let monitor = Arc::clone(self);
        info!(every_secs = every.as_secs(), "health polling started");
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                monitor.check_api().await;
                monitor.check_ollama().await;
            }
        });
        PollHandle { task }
    }

    fn begin_api(&self) -> u64 {
        self.api_seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn begin_ollama(&self) -> u64 {
        self.ollama_seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn apply_api(&self, seq: u64, outcome: Result<()>) {
        let mut state = self.state.lock().expect("monitor state poisoned");
        if seq <= state.api_applied {
            debug!(seq, applied = state.api_applied, "discarding stale API probe");
            return;
        }
        state.api_applied = seq;
        match outcome {
            Ok(()) => {
                state.api.reachability = Reachability::Up;
                state.api.last_error = None;
            }
            Err(err) => {
                warn!(error = %err, "API probe failed");
                state.api = ApiStatus {
                    reachability: Reachability::Down,
                    last_error: Some(API_DOWN_MSG.to_string()),
                };
            }
        }
    }

    fn apply_ollama(&self, seq: u64, outcome: Result<(OllamaHealth, Vec<String>)>) {
        let mut state = self.state.lock().expect("monitor state poisoned");
        if seq <= state.ollama_applied {
            debug!(seq, applied = state.ollama_applied, "discarding stale Ollama probe");
            return;
        }
        state.ollama_applied = seq;
        match outcome {
            Ok((health, models)) => {
                debug!(model = %health.current_model, models = models.len(), "Ollama probe ok");
                state.ollama = OllamaStatus {
                    reachability: Reachability::Up,
                    last_error: None,
                    base: health.base,
                    version: health.version,
                    current_model: Some(health.current_model),
                    models,
                };
            }
            Err(err) => {
                warn!(error = %err, "Ollama probe failed");
                state.ollama = OllamaStatus {
                    reachability: Reachability::Down,
                    last_error: Some(OLLAMA_DOWN_MSG.to_string()),
                    ..OllamaStatus::default()
                };
            }
        }
    }
}

/// Owner of the polling task; aborts it on drop.
pub struct PollHandle {
    task: JoinHandle<()>,
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;

    fn monitor_for(server: &MockServer) -> HealthMonitor {
        let transport = Arc::new(Transport::new(&server.base_url(), 5).unwrap());
        HealthMonitor::new(transport)
    }

    #[tokio::test]
    async fn api_probe_failure_sets_down_and_success_clears_it() {
        let server = MockServer::start_async().await;
        let failing = server
            .mock_async(|when, then| {
                when.method(GET).path("/api/health");
                then.status(500);
            })
            .await;

        let monitor = monitor_for(&server);
        monitor.check_api().await;

        let status = monitor.api_status();
        assert_eq!(status.reachability, Reachability::Down);
        assert_eq!(status.last_error.as_deref(), Some(API_DOWN_MSG));

        failing.delete_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/health");
                then.status(200).json_body(json!({"status": "ok"}));
            })
            .await;

        monitor.check_api().await;
        let status = monitor.api_status();
        assert_eq!(status.reachability, Reachability::Up);
        assert_eq!(status.last_error, None);
    }

    #[tokio::test]
    async fn ollama_probe_reads_model_and_list() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/ollama/health");
                then.status(200).json_body(json!({
                    "base": "http://localhost:11434",
                    "version": "0.5.4",
                    "current_model": "llama3.1:8b-instruct-q4_K_M"
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/ollama/models");
                then.status(200)
                    .json_body(json!({"models": ["llama3.1:8b-instruct-q4_K_M", "qwen3:14b"]}));
            })
            .await;

        let monitor = monitor_for(&server);
        monitor.check_ollama().await;

        let status = monitor.ollama_status();
        assert_eq!(status.reachability, Reachability::Up);
        assert_eq!(
            status.current_model.as_deref(),
            Some("llama3.1:8b-instruct-q4_K_M")
        );
        assert_eq!(status.models.len(), 2);
        assert_eq!(status.base.as_deref(), Some("http://localhost:11434"));
        assert_eq!(status.last_error, None);
    }

    #[tokio::test]
    async fn model_list_failure_keeps_current_model_without_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/ollama/health");
                then.status(200)
                    .json_body(json!({"current_model": "llama3.1:8b-instruct-q4_K_M"}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/ollama/models");
                then.status(500).body("tags endpoint down");
            })
            .await;

        let monitor = monitor_for(&server);
        monitor.check_ollama().await;

        let status = monitor.ollama_status();
        assert_eq!(status.reachability, Reachability::Up);
        assert_eq!(
            status.current_model.as_deref(),
            Some("llama3.1:8b-instruct-q4_K_M")
        );
        assert!(status.models.is_empty());
        assert_eq!(status.last_error, None);
    }

    #[tokio::test]
    async fn primary_failure_marks_down_and_clears_models() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/ollama/health");
                then.status(502);
            })
            .await;

        let monitor = monitor_for(&server);
        monitor.check_ollama().await;

        let status = monitor.ollama_status();
        assert_eq!(status.reachability, Reachability::Down);
        assert_eq!(status.last_error.as_deref(), Some(OLLAMA_DOWN_MSG));
        assert_eq!(status.current_model, None);
        assert!(status.models.is_empty());
    }

    #[tokio::test]
    async fn stale_probe_completion_is_discarded() {
        let server = MockServer::start_async().await;
        let monitor = monitor_for(&server);

        // Two probes begin in order; the later one completes first.
        let older = monitor.begin_api();
        let newer = monitor.begin_api();

        monitor.apply_api(newer, Ok(()));
        assert_eq!(monitor.api_status().reachability, Reachability::Up);

        // The older completion reports a failure but must not win.
        monitor.apply_api(
            older,
            Err(crate::error_handler::RagConsoleError::Decode("late".into())),
        );
        let status = monitor.api_status();
        assert_eq!(status.reachability, Reachability::Up);
        assert_eq!(status.last_error, None);
    }

    #[tokio::test]
    async fn dropped_poll_handle_stops_the_task() {
        let server = MockServer::start_async().await;
        let health = server
            .mock_async(|when, then| {
                when.method(GET).path("/api/health");
                then.status(200);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/ollama/health");
                then.status(200).json_body(json!({"current_model": "m"}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/ollama/models");
                then.status(200).json_body(json!({"models": []}));
            })
            .await;

        let monitor = Arc::new(monitor_for(&server));
        let handle = monitor.start_polling(Duration::from_millis(20));

        // Let the immediate tick land, then tear down.
        tokio::time::sleep(Duration::from_millis(60)).await;
        drop(handle);

        // Allow any in-flight request to finish before sampling.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let hits_after_drop = health.hits_async().await;
        assert!(hits_after_drop >= 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(health.hits_async().await, hits_after_drop);
    }
}
