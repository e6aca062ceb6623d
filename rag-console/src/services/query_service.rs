//! Q&A and note-card calls against the MedNotes API.
//!
//! `POST /api/qa` answers a question; `POST /api/note` generates a study
//! note card for a topic. Both accept an optional free-text hint, a stream
//! flag (raw text stream instead of a JSON body) and a debug flag (attach
//! the retrieved, scored context passages to the response).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error_handler::Result;
use crate::transport::Transport;

/// Note-card section template understood by `/api/note`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NoteTemplate {
    Disease,
    Drug,
    Procedure,
    #[default]
    General,
}

impl NoteTemplate {
    pub const ALL: [NoteTemplate; 4] = [
        NoteTemplate::Disease,
        NoteTemplate::Drug,
        NoteTemplate::Procedure,
        NoteTemplate::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NoteTemplate::Disease => "disease",
            NoteTemplate::Drug => "drug",
            NoteTemplate::Procedure => "procedure",
            NoteTemplate::General => "general",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == s)
    }
}

#[derive(Debug, Serialize)]
struct QaRequest<'a> {
    q: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    extra: Option<&'a str>,
    stream: bool,
    debug: bool,
}

#[derive(Debug, Serialize)]
struct NoteRequest<'a> {
    topic: &'a str,
    template: NoteTemplate,
    #[serde(skip_serializing_if = "Option::is_none")]
    extra: Option<&'a str>,
    stream: bool,
    debug: bool,
}

/// Response body of a unary `/api/qa` call.
#[derive(Debug, Deserialize)]
pub struct QaResponse {
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub contexts: Vec<ContextRecord>,
}

/// Response body of a unary `/api/note` call.
#[derive(Debug, Deserialize)]
pub struct NoteResponse {
    #[serde(default)]
    pub card: String,
    #[serde(default)]
    pub contexts: Vec<ContextRecord>,
}

/// One retrieved passage with its ranking scores, present in debug
/// responses only.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ContextRecord {
    /// Source/book identifier, as used in citations.
    pub book_id: String,
    pub page_start: u32,
    pub page_end: u32,
    /// Reciprocal-rank-fusion score across retrieval paths.
    #[serde(default)]
    pub score_rrf: Option<f64>,
    /// Cross-encoder rerank score.
    #[serde(default)]
    pub score_ce: Option<f64>,
    /// Lexical (BM25) score.
    #[serde(default)]
    pub score_lex: Option<f64>,
    /// Dense similarity; rendered as a distance (`1 - sim`, lower is closer).
    #[serde(default)]
    pub sim: Option<f64>,
    /// Passage was surfaced by the lexical path.
    #[serde(default)]
    pub from_lex: bool,
    /// Passage was surfaced by the dense path.
    #[serde(default)]
    pub from_dense: bool,
}

impl ContextRecord {
    /// Distance derived from the dense similarity, if present.
    pub fn distance(&self) -> Option<f64> {
        self.sim.map(|s| 1.0 - s)
    }

    /// One rendered context line: `[book:start-end]` plus the four scores
    /// and provenance flags. Matches the backend's citation shape.
    pub fn summary(&self) -> String {
        fn fmt(v: Option<f64>) -> String {
            v.map(|v| format!("{v:.3}")).unwrap_or_else(|| "-".into())
        }

        let mut line = format!(
            "[{}:{}-{}] rrf={} ce={} lex={} dist={}",
            self.book_id,
            self.page_start,
            self.page_end,
            fmt(self.score_rrf),
            fmt(self.score_ce),
            fmt(self.score_lex),
            fmt(self.distance()),
        );
        if self.from_lex {
            line.push_str(" +lex");
        }
        if self.from_dense {
            line.push_str(" +dense");
        }
        line
    }
}

/// Typed access to the query endpoints.
pub struct QueryService {
    transport: Arc<Transport>,
}

impl QueryService {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self { transport }
    }

    /// Unary question answering.
    pub async fn qa(&self, q: &str, extra: Option<&str>, debug_ctx: bool) -> Result<QaResponse> {
        debug!(debug_ctx, "qa request");
        self.transport
            .post_json(
                "/api/qa",
                &QaRequest {
                    q,
                    extra,
                    stream: false,
                    debug: debug_ctx,
                },
            )
            .await
    }

    /// Unary note-card generation.
    pub async fn note(
        &self,
        topic: &str,
        template: NoteTemplate,
        extra: Option<&str>,
        debug_ctx: bool,
    ) -> Result<NoteResponse> {
        debug!(template = template.as_str(), debug_ctx, "note request");
        self.transport
            .post_json(
                "/api/note",
                &NoteRequest {
                    topic,
                    template,
                    extra,
                    stream: false,
                    debug: debug_ctx,
                },
            )
            .await
    }

    /// Streaming question answering; `on_chunk` receives ordered text
    /// fragments until the server closes the stream.
    pub async fn qa_stream(
        &self,
        q: &str,
        extra: Option<&str>,
        on_chunk: impl FnMut(&str),
    ) -> Result<()> {
        self.transport
            .open_stream(
                "/api/qa",
                &QaRequest {
                    q,
                    extra,
                    stream: true,
                    debug: false,
                },
                on_chunk,
            )
            .await
    }

    /// Streaming note-card generation.
    pub async fn note_stream(
        &self,
        topic: &str,
        template: NoteTemplate,
        extra: Option<&str>,
        on_chunk: impl FnMut(&str),
    ) -> Result<()> {
        self.transport
            .open_stream(
                "/api/note",
                &NoteRequest {
                    topic,
                    template,
                    extra,
                    stream: true,
                    debug: false,
                },
                on_chunk,
            )
            .await
    }
}
