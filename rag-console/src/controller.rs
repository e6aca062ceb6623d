//! Control-surface state behind the console.
//!
//! [`ConsoleController`] owns the query form, the run lifecycle, the answer
//! buffer and the component handles (query service, health monitor, admin
//! service, notifications, credential store). Submissions validate the
//! trimmed input before any network traffic, then either open a stream or
//! perform a unary call. Every run carries a sequence number; a chunk or
//! result from an abandoned run is discarded instead of landing in the
//! buffer of a newer run.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{info, warn};

use crate::config::admin_key::AdminKeyStore;
use crate::config::console_config::ConsoleConfig;
use crate::error_handler::{RagConsoleError, Result};
use crate::health_monitor::{HealthMonitor, PollHandle};
use crate::notifications::NotificationQueue;
use crate::services::admin_service::AdminService;
use crate::services::query_service::{ContextRecord, NoteTemplate, QueryService};
use crate::transport::Transport;

/// What the submit button does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryMode {
    /// Ask a question, render the answer.
    #[default]
    Qa,
    /// Generate a study note card for a topic.
    Note,
}

/// Everything the operator can set before submitting.
#[derive(Debug, Clone, Default)]
pub struct QueryForm {
    pub mode: QueryMode,
    /// Question or topic; trimmed and validated non-empty on submit.
    pub text: String,
    /// Optional free-text hint for the retriever.
    pub extra: String,
    /// Note-card template; only sent in note mode.
    pub template: NoteTemplate,
    /// Stream the answer instead of waiting for the full body.
    pub stream: bool,
    /// Attach scored context passages (unary mode only).
    pub debug: bool,
}

/// Lifecycle of one query run.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Done,
    /// Query-flow failure, rendered in place of the answer.
    Error(String),
}

#[derive(Default)]
struct RunOutput {
    seq: u64,
    state: RunState,
    buffer: Vec<String>,
    contexts: Vec<ContextRecord>,
}

/// Owns the whole control surface; one per console session.
pub struct ConsoleController {
    form: Mutex<QueryForm>,
    run: Mutex<RunOutput>,
    query: QueryService,
    monitor: Arc<HealthMonitor>,
    admin: AdminService,
    notifications: Arc<NotificationQueue>,
    key_store: Arc<dyn AdminKeyStore>,
    poll_interval: Duration,
}

impl ConsoleController {
    /// Wires up transport, monitor, admin service and notifications from a
    /// config and a credential store.
    pub fn new(config: &ConsoleConfig, key_store: Arc<dyn AdminKeyStore>) -> Result<Self> {
        let transport = Arc::new(Transport::new(&config.base_url, config.timeout_secs)?);
        let monitor = Arc::new(HealthMonitor::new(Arc::clone(&transport)));
        let notifications = Arc::new(NotificationQueue::new(Duration::from_millis(
            config.notification_ttl_ms,
        )));
        let admin = AdminService::new(
            Arc::clone(&transport),
            Arc::clone(&monitor),
            Arc::clone(&notifications),
            Arc::clone(&key_store),
            Duration::from_millis(config.restart_settle_ms),
        );

        Ok(Self {
            form: Mutex::new(QueryForm::default()),
            run: Mutex::new(RunOutput::default()),
            query: QueryService::new(transport),
            monitor,
            admin,
            notifications,
            key_store,
            poll_interval: Duration::from_secs(config.poll_interval_secs),
        })
    }

    /// Starts health polling at the configured cadence. Dropping the handle
    /// stops it.
    pub fn start_polling(self: &Arc<Self>) -> PollHandle {
        self.monitor.start_polling(self.poll_interval)
    }

    pub fn monitor(&self) -> &Arc<HealthMonitor> {
        &self.monitor
    }

    pub fn admin(&self) -> &AdminService {
        &self.admin
    }

    pub fn notifications(&self) -> &Arc<NotificationQueue> {
        &self.notifications
    }

    /// Current form contents.
    pub fn form(&self) -> QueryForm {
        self.form.lock().expect("form poisoned").clone()
    }

    /// Edits the form in place.
    pub fn update_form(&self, edit: impl FnOnce(&mut QueryForm)) {
        edit(&mut self.form.lock().expect("form poisoned"));
    }

    /// Stored admin credential, if any.
    pub fn admin_key(&self) -> Option<String> {
        self.key_store.load()
    }

    /// Persists a new admin credential (empty clears it).
    pub fn set_admin_key(&self, key: &str) -> Result<()> {
        self.key_store.store(key)?;
        Ok(())
    }

    /// Submits the current form.
    ///
    /// Returns [`RagConsoleError::EmptyInput`] without touching the network
    /// when the trimmed text is empty; the caller decides how to alert.
    /// Transport and HTTP failures do not propagate: they land in the run
    /// state and are rendered in place of the answer.
    ///
    /// `on_chunk` is invoked for every streamed fragment that passes the
    /// run-sequence guard, in delivery order, for live rendering.
    pub async fn submit(&self, mut on_chunk: impl FnMut(&str)) -> Result<()> {
        let form = self.form();
        let text = form.text.trim().to_string();
        if text.is_empty() {
            return Err(RagConsoleError::EmptyInput);
        }
        let extra = form.extra.trim();
        let extra = (!extra.is_empty()).then_some(extra);

        let seq = self.begin_run();
        info!(seq, mode = ?form.mode, stream = form.stream, "run started");

        let outcome = if form.stream {
            let deliver = |chunk: &str| {
                if self.append_chunk(seq, chunk) {
                    on_chunk(chunk);
                }
            };
            match form.mode {
                QueryMode::Qa => self.query.qa_stream(&text, extra, deliver).await,
                QueryMode::Note => {
                    self.query
                        .note_stream(&text, form.template, extra, deliver)
                        .await
                }
            }
        } else {
            match form.mode {
                QueryMode::Qa => self
                    .query
                    .qa(&text, extra, form.debug)
                    .await
                    .map(|r| self.finish_unary(seq, r.answer, r.contexts)),
                QueryMode::Note => self
                    .query
                    .note(&text, form.template, extra, form.debug)
                    .await
                    .map(|r| self.finish_unary(seq, r.card, r.contexts)),
            }
        };

        match outcome {
            Ok(()) => {
                self.set_state(seq, RunState::Done);
                info!(seq, "run finished");
            }
            Err(err) => {
                warn!(seq, error = %err, "run failed");
                self.set_state(seq, RunState::Error(err.to_string()));
            }
        }
        Ok(())
    }

    /// Rendered answer: the buffer fragments in order.
    pub fn answer(&self) -> String {
        self.run.lock().expect("run poisoned").buffer.concat()
    }

    /// Current run lifecycle state.
    pub fn run_state(&self) -> RunState {
        self.run.lock().expect("run poisoned").state.clone()
    }

    /// Context passages of the last completed debug run.
    pub fn contexts(&self) -> Vec<ContextRecord> {
        self.run.lock().expect("run poisoned").contexts.clone()
    }

    /// Starts a new run: bumps the sequence and clears prior output.
    fn begin_run(&self) -> u64 {
        let mut run = self.run.lock().expect("run poisoned");
        run.seq += 1;
        run.state = RunState::Running;
        run.buffer.clear();
        run.contexts.clear();
        run.seq
    }

    /// Appends a streamed chunk if `seq` is still the live run.
    fn append_chunk(&self, seq: u64, chunk: &str) -> bool {
        let mut run = self.run.lock().expect("run poisoned");
        if run.seq != seq {
            warn!(seq, live = run.seq, "dropping chunk from abandoned run");
            return false;
        }
        run.buffer.push(chunk.to_string());
        true
    }

    /// Replaces buffer and contexts wholesale from a unary response.
    fn finish_unary(&self, seq: u64, text: String, contexts: Vec<ContextRecord>) {
        let mut run = self.run.lock().expect("run poisoned");
        if run.seq != seq {
            return;
        }
        run.buffer = vec![text];
        run.contexts = contexts;
    }

    fn set_state(&self, seq: u64, state: RunState) {
        let mut run = self.run.lock().expect("run poisoned");
        if run.seq != seq {
            return;
        }
        run.state = state;
    }
}
