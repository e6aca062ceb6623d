//! Credentialed restart and model-switch operations.
//!
//! Every call attaches the persisted admin credential as the
//! `x-admin-key` header when one is present. Outcomes are recorded in a
//! small pending/error state cell and pushed to the notification queue;
//! failures are terminal here and never propagate to the caller. After
//! each restart the corresponding health probe re-runs (following a settle
//! delay, so the process has a chance to come back); a successful model
//! switch re-probes Ollama immediately.
//!
//! The operations record their pending description synchronously and
//! return the remaining work as a future, so a caller that blocks on the
//! whole operation can still render the description while the call is in
//! flight.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::json;
use tracing::{info, warn};

use crate::config::admin_key::AdminKeyStore;
use crate::error_handler::Result;
use crate::health_monitor::HealthMonitor;
use crate::notifications::{NotificationQueue, Severity};
use crate::transport::Transport;

/// Error text recorded when the backend rejects the credential.
pub const INVALID_KEY_MSG: &str = "Invalid admin key";

/// Rendered admin state: the in-flight action and the last failure.
#[derive(Debug, Clone, Default)]
pub struct AdminState {
    /// Description of the action currently in flight.
    pub pending: Option<String>,
    /// Last admin failure; cleared by the next successful action.
    pub last_error: Option<String>,
}

/// Executes admin actions and reconciles monitor state afterwards.
pub struct AdminService {
    transport: Arc<Transport>,
    monitor: Arc<HealthMonitor>,
    notifications: Arc<NotificationQueue>,
    key_store: Arc<dyn AdminKeyStore>,
    settle: Duration,
    state: Mutex<AdminState>,
}

impl AdminService {
    pub fn new(
        transport: Arc<Transport>,
        monitor: Arc<HealthMonitor>,
        notifications: Arc<NotificationQueue>,
        key_store: Arc<dyn AdminKeyStore>,
        settle: Duration,
    ) -> Self {
        Self {
            transport,
            monitor,
            notifications,
            key_store,
            settle,
            state: Mutex::new(AdminState::default()),
        }
    }

    /// Snapshot of the pending/error state.
    pub fn state(&self) -> AdminState {
        self.state.lock().expect("admin state poisoned").clone()
    }

    /// Requests an API process restart, then re-probes the API.
    ///
    /// The pending description is recorded before the returned future is
    /// first polled.
    pub fn restart_api(&self) -> impl Future<Output = ()> {
        self.begin("Restarting API");
        async move {
            let result = self.call("/api/admin/restart_api", None).await;
            self.conclude(result, "API restart requested");

            tokio::time::sleep(self.settle).await;
            self.monitor.check_api().await;
        }
    }

    /// Requests an Ollama restart, then re-probes Ollama.
    pub fn restart_ollama(&self) -> impl Future<Output = ()> {
        self.begin("Restarting Ollama");
        async move {
            let result = self.call("/api/admin/restart_ollama", None).await;
            self.conclude(result, "Ollama restart requested");

            tokio::time::sleep(self.settle).await;
            self.monitor.check_ollama().await;
        }
    }

    /// Switches the active generation model. A successful switch re-probes
    /// Ollama immediately so the rendered current model matches reality.
    pub fn set_model<'a>(&'a self, name: &'a str) -> impl Future<Output = ()> + 'a {
        self.begin(&format!("Switching model to {name}"));
        async move {
            let result = self
                .call("/api/ollama/set_model", Some(json!({ "model": name })))
                .await;
            let ok = self.conclude(result, &format!("Model set to {name}"));
            if ok {
                self.monitor.check_ollama().await;
            }
        }
    }

    async fn call(&self, path: &str, body: Option<serde_json::Value>) -> Result<()> {
        let key = self.key_store.load();
        self.transport
            .post_admin(path, key.as_deref(), body.as_ref())
            .await
    }

    fn begin(&self, pending: &str) {
        let mut state = self.state.lock().expect("admin state poisoned");
        state.pending = Some(pending.to_string());
    }

    /// Records the outcome and notifies. Returns whether the call succeeded.
    fn conclude(&self, result: Result<()>, success_msg: &str) -> bool {
        let mut state = self.state.lock().expect("admin state poisoned");
        state.pending = None;
        match result {
            Ok(()) => {
                state.last_error = None;
                drop(state);
                info!(outcome = success_msg, "admin call ok");
                self.notifications.push(success_msg, Severity::Success);
                true
            }
            Err(err) => {
                let msg = match err.http_status() {
                    Some(StatusCode::FORBIDDEN) => INVALID_KEY_MSG.to_string(),
                    Some(status) => format!("Admin error: {}", status.as_u16()),
                    None => err.to_string(),
                };
                state.last_error = Some(msg.clone());
                drop(state);
                warn!(error = %msg, "admin call failed");
                self.notifications.push(msg, Severity::Error);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::config::admin_key::MemoryKeyStore;
    use crate::health_monitor::Reachability;
    use crate::transport::ADMIN_KEY_HEADER;

    struct Fixture {
        admin: AdminService,
        monitor: Arc<HealthMonitor>,
        notifications: Arc<NotificationQueue>,
    }

    fn fixture(server: &MockServer, key: Option<&str>) -> Fixture {
        let transport = Arc::new(Transport::new(&server.base_url(), 5).unwrap());
        let monitor = Arc::new(HealthMonitor::new(Arc::clone(&transport)));
        let notifications = Arc::new(NotificationQueue::new(Duration::from_secs(60)));
        let key_store: Arc<dyn AdminKeyStore> = match key {
            Some(k) => Arc::new(MemoryKeyStore::with_key(k)),
            None => Arc::new(MemoryKeyStore::default()),
        };
        let admin = AdminService::new(
            Arc::clone(&transport),
            Arc::clone(&monitor),
            Arc::clone(&notifications),
            key_store,
            Duration::ZERO,
        );
        Fixture {
            admin,
            monitor,
            notifications,
        }
    }

    async fn mock_health_endpoints(server: &MockServer) {
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/health");
                then.status(200);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/ollama/health");
                then.status(200).json_body(json!({"current_model": "qwen3:14b"}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/ollama/models");
                then.status(200).json_body(json!({"models": ["qwen3:14b"]}));
            })
            .await;
    }

    #[tokio::test]
    async fn rejected_credential_records_exact_error_and_notifies() {
        let server = MockServer::start_async().await;
        mock_health_endpoints(&server).await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/admin/restart_api");
                then.status(403).body("forbidden");
            })
            .await;

        let fx = fixture(&server, None);
        fx.admin.restart_api().await;

        let state = fx.admin.state();
        assert_eq!(state.pending, None);
        assert_eq!(state.last_error.as_deref(), Some(INVALID_KEY_MSG));

        let live = fx.notifications.snapshot();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].severity, Severity::Error);
        assert_eq!(live[0].text, INVALID_KEY_MSG);

        // The probe still reconciled afterwards.
        assert_eq!(fx.monitor.api_status().reachability, Reachability::Up);
    }

    #[tokio::test]
    async fn other_http_failures_record_the_status_code() {
        let server = MockServer::start_async().await;
        mock_health_endpoints(&server).await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/admin/restart_ollama");
                then.status(500);
            })
            .await;

        let fx = fixture(&server, Some("secret"));
        fx.admin.restart_ollama().await;

        assert_eq!(
            fx.admin.state().last_error.as_deref(),
            Some("Admin error: 500")
        );
    }

    #[tokio::test]
    async fn pending_description_is_readable_until_the_call_concludes() {
        let server = MockServer::start_async().await;
        mock_health_endpoints(&server).await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/admin/restart_api");
                then.status(200);
            })
            .await;

        let fx = fixture(&server, Some("secret"));
        let action = fx.admin.restart_api();
        assert_eq!(fx.admin.state().pending.as_deref(), Some("Restarting API"));

        action.await;
        assert_eq!(fx.admin.state().pending, None);
    }

    #[tokio::test]
    async fn successful_restart_clears_error_notifies_and_reconciles() {
        let server = MockServer::start_async().await;
        mock_health_endpoints(&server).await;
        let restart = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/admin/restart_api")
                    .header(ADMIN_KEY_HEADER, "secret");
                then.status(200);
            })
            .await;

        let fx = fixture(&server, Some("secret"));
        // Seed an old failure; success must clear it.
        fx.admin
            .state
            .lock()
            .unwrap()
            .last_error = Some(INVALID_KEY_MSG.to_string());

        fx.admin.restart_api().await;

        restart.assert_async().await;
        let state = fx.admin.state();
        assert_eq!(state.last_error, None);
        assert_eq!(state.pending, None);

        let live = fx.notifications.snapshot();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].severity, Severity::Success);

        assert_eq!(fx.monitor.api_status().reachability, Reachability::Up);
    }

    #[tokio::test]
    async fn successful_model_switch_reprobes_ollama() {
        let server = MockServer::start_async().await;
        mock_health_endpoints(&server).await;
        let set_model = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/ollama/set_model")
                    .header(ADMIN_KEY_HEADER, "secret")
                    .json_body(json!({"model": "qwen3:14b"}));
                then.status(200);
            })
            .await;

        let fx = fixture(&server, Some("secret"));
        fx.admin.set_model("qwen3:14b").await;

        set_model.assert_async().await;
        assert_eq!(fx.admin.state().last_error, None);
        assert_eq!(
            fx.monitor.ollama_status().current_model.as_deref(),
            Some("qwen3:14b")
        );
    }

    #[tokio::test]
    async fn failed_model_switch_does_not_reprobe() {
        let server = MockServer::start_async().await;
        let health = server
            .mock_async(|when, then| {
                when.method(GET).path("/api/ollama/health");
                then.status(200).json_body(json!({"current_model": "qwen3:14b"}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/ollama/set_model");
                then.status(403);
            })
            .await;

        let fx = fixture(&server, Some("wrong"));
        fx.admin.set_model("qwen3:14b").await;

        assert_eq!(fx.admin.state().last_error.as_deref(), Some(INVALID_KEY_MSG));
        assert_eq!(health.hits_async().await, 0);
        assert_eq!(fx.monitor.ollama_status().reachability, Reachability::Unknown);
    }
}
