//! Client layer for the MedNotes RAG console.
//!
//! Talks to the MedNotes API over HTTP: streaming and unary Q&A/note
//! calls, health polling for the API process and the Ollama model server,
//! credentialed admin actions (restart, model switch) and the transient
//! notification queue behind the console UI. The binary in the workspace
//! root is a thin line-oriented front end over [`ConsoleController`].

pub mod config;
pub mod controller;
pub mod error_handler;
pub mod health_monitor;
pub mod notifications;
pub mod services;
pub mod telemetry;
pub mod transport;

pub use controller::{ConsoleController, QueryForm, QueryMode, RunState};
pub use error_handler::{RagConsoleError, Result};
