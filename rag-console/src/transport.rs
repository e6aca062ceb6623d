//! HTTP transport for the MedNotes API.
//!
//! A thin layer over a single shared `reqwest::Client`:
//! - [`Transport::post_json`] / [`Transport::get_json`] — unary JSON calls
//! - [`Transport::get_ok`] — status-only probe (body ignored)
//! - [`Transport::post_admin`] — mutating call with the admin credential header
//! - [`Transport::open_stream`] — incremental consumption of a text stream
//!
//! Non-success responses are normalized into
//! [`RagConsoleError::HttpStatus`] carrying the status and a trimmed body
//! snippet; connect/read failures surface as
//! [`RagConsoleError::Transport`]. No retries anywhere; callers classify
//! and recover.

use std::time::Duration;

use futures::StreamExt;
use reqwest::Response;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error_handler::{RagConsoleError, Result, make_snippet, validate_http_endpoint};

/// Header carrying the admin credential on mutating calls.
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Shared HTTP transport. Build once, wrap in `Arc`, pass clones around.
pub struct Transport {
    client: reqwest::Client,
    base: String,
}

impl Transport {
    /// Creates a transport rooted at `base_url` with a request timeout.
    ///
    /// # Errors
    /// - [`crate::error_handler::ConfigError::InvalidFormat`] if `base_url`
    ///   has no HTTP scheme
    /// - [`RagConsoleError::Transport`] if the HTTP client cannot be built
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self> {
        let base = base_url.trim().trim_end_matches('/').to_string();
        validate_http_endpoint("MEDNOTES_URL", &base)?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self { client, base })
    }

    /// Absolute URL for an API path (`path` starts with `/`).
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// POSTs a JSON body and decodes a JSON response.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        debug!("POST {url}");
        let resp = self.client.post(&url).json(body).send().await?;
        Self::decode_json(resp, url).await
    }

    /// GETs a JSON response.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        debug!("GET {url}");
        let resp = self.client.get(&url).send().await?;
        Self::decode_json(resp, url).await
    }

    /// GETs a path and checks the status only; the body is not read.
    pub async fn get_ok(&self, path: &str) -> Result<()> {
        let url = self.url(path);
        debug!("GET {url}");
        let resp = self.client.get(&url).send().await?;
        Self::ensure_success(resp, url).await?;
        Ok(())
    }

    /// POSTs to an admin endpoint, attaching the credential header when a
    /// key is present. `body = None` sends an empty body. An absent key
    /// sends the call unauthenticated; the server is expected to reject it.
    pub async fn post_admin(
        &self,
        path: &str,
        key: Option<&str>,
        body: Option<&serde_json::Value>,
    ) -> Result<()> {
        let url = self.url(path);
        debug!(authenticated = key.is_some(), "POST {url}");
        let mut req = self.client.post(&url);
        if let Some(key) = key {
            req = req.header(ADMIN_KEY_HEADER, key);
        }
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await?;
        Self::ensure_success(resp, url).await?;
        Ok(())
    }

    /// POSTs a JSON body and consumes the response as an incremental text
    /// stream, invoking `on_chunk` synchronously and in delivery order for
    /// every non-empty decoded fragment. Completes when the remote closes
    /// the stream.
    ///
    /// Decoding is stateful: a multi-byte character split across chunk
    /// boundaries is carried until it completes, so partial sequences never
    /// produce corrupted output. A lone incomplete sequence at end-of-stream
    /// is dropped with a warning.
    pub async fn open_stream<B, F>(&self, path: &str, body: &B, mut on_chunk: F) -> Result<()>
    where
        B: Serialize + ?Sized,
        F: FnMut(&str),
    {
        let url = self.url(path);
        debug!("POST {url} (streaming)");
        let resp = self.client.post(&url).json(body).send().await?;
        let resp = Self::ensure_success(resp, url).await?;

        let mut stream = resp.bytes_stream();
        let mut decoder = Utf8Carry::default();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            let text = decoder.push(chunk.as_ref())?;
            if !text.is_empty() {
                on_chunk(&text);
            }
        }
        if decoder.pending() > 0 {
            warn!(
                bytes = decoder.pending(),
                "stream ended inside a multi-byte character; dropping the partial sequence"
            );
        }
        Ok(())
    }

    /// Fails with [`RagConsoleError::HttpStatus`] on non-2xx, reading the
    /// body for the snippet.
    async fn ensure_success(resp: Response, url: String) -> Result<Response> {
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(RagConsoleError::HttpStatus {
                status,
                url,
                snippet: make_snippet(&text),
            });
        }
        Ok(resp)
    }

    async fn decode_json<T: DeserializeOwned>(resp: Response, url: String) -> Result<T> {
        let url_for_err = url.clone();
        let resp = Self::ensure_success(resp, url).await?;
        resp.json::<T>()
            .await
            .map_err(|e| RagConsoleError::Decode(format!("unexpected response from {url_for_err}: {e}")))
    }
}

/// Incremental UTF-8 decoder.
///
/// Bytes that end in the middle of a multi-byte character are carried over
/// and prepended to the next chunk, so the concatenation of everything
/// returned by [`Utf8Carry::push`] always equals the single-shot decoding of
/// the same bytes.
#[derive(Debug, Default)]
pub struct Utf8Carry {
    carry: Vec<u8>,
}

impl Utf8Carry {
    /// Feeds `input` and returns every character completed so far.
    ///
    /// # Errors
    /// Returns [`RagConsoleError::Decode`] on genuinely invalid UTF-8 (not a
    /// chunk-boundary split).
    pub fn push(&mut self, input: &[u8]) -> Result<String> {
        self.carry.extend_from_slice(input);
        match std::str::from_utf8(&self.carry) {
            Ok(text) => {
                let out = text.to_string();
                self.carry.clear();
                Ok(out)
            }
            Err(err) => {
                if err.error_len().is_some() {
                    // Invalid bytes, not an incomplete suffix.
                    return Err(RagConsoleError::Decode(format!(
                        "invalid UTF-8 in stream at byte {}",
                        err.valid_up_to()
                    )));
                }
                let rest = self.carry.split_off(err.valid_up_to());
                let done = std::mem::replace(&mut self.carry, rest);
                // `done` is valid up to `valid_up_to` by construction.
                Ok(String::from_utf8_lossy(&done).into_owned())
            }
        }
    }

    /// Bytes still held back waiting for the character to complete.
    pub fn pending(&self) -> usize {
        self.carry.len()
    }
}
