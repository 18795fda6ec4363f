//! The resolution stream consumer.
//!
//! One [`StreamConsumer`] tracks at most one live stream. Every
//! [`start_stream`](StreamConsumer::start_stream) and every
//! [`reset`](StreamConsumer::reset) bumps a generation number and cancels
//! the previous stream's token. A read loop whose generation is no longer
//! current stops at once, even while waiting for data, drops the response
//! and emits no further callbacks.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::decoder::Utf8Decoder;
use crate::config::{AppConfig, StreamMethod};
use crate::errors::StreamError;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Parameters of one resolution request. Absent fields are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamRequest {
    pub conflict_content: String,
    pub file_path: String,
    pub user_query: String,
    pub repo_hash: String,
}

impl StreamRequest {
    pub fn new(conflict_content: impl Into<String>, file_path: impl Into<String>) -> Self {
        Self {
            conflict_content: conflict_content.into(),
            file_path: file_path.into(),
            ..Self::default()
        }
    }

    pub fn with_user_query(mut self, user_query: impl Into<String>) -> Self {
        self.user_query = user_query.into();
        self
    }

    pub fn with_repo_hash(mut self, repo_hash: impl Into<String>) -> Self {
        self.repo_hash = repo_hash.into();
        self
    }
}

/// Observable state of the consumer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamState {
    pub is_streaming: bool,
    pub accumulated_text: String,
    pub last_error: Option<StreamError>,
}

/// Where and how to open the stream.
#[derive(Debug, Clone)]
pub struct StreamEndpoint {
    pub url: String,
    pub method: StreamMethod,
    /// Longest wait for response headers or for the next body segment.
    pub read_timeout: Option<Duration>,
}

impl StreamEndpoint {
    pub fn post(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: StreamMethod::Post,
            read_timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: StreamMethod::Get,
            read_timeout: None,
        }
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            url: config.stream_url(),
            method: config.stream.method,
            read_timeout: config.stream.read_timeout(),
        }
    }
}

/// Receives stream lifecycle events.
///
/// `on_chunk` gets each newly decoded piece in arrival order. Exactly one of
/// `on_complete` / `on_error` follows, unless the stream was superseded, in
/// which case neither is called.
pub trait StreamHandler {
    fn on_chunk(&mut self, _chunk: &str) {}
    fn on_complete(&mut self, _full_text: &str) {}
    fn on_error(&mut self, _error: &StreamError) {}
}

impl StreamHandler for () {}

#[derive(Debug, Default)]
struct Shared {
    generation: u64,
    state: StreamState,
    /// Cancelled when the current generation is superseded.
    cancel: CancellationToken,
}

impl Shared {
    /// Supersede whatever stream is live and return the new generation.
    fn advance(&mut self) -> (u64, CancellationToken) {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.generation += 1;
        (self.generation, self.cancel.clone())
    }
}

// ---------------------------------------------------------------------------
// Consumer
// ---------------------------------------------------------------------------

/// Reads a streamed plain-text response and reports it chunk by chunk.
///
/// Clones share the same state, so one handle can drive a stream while
/// another polls [`state`](Self::state).
#[derive(Clone)]
pub struct StreamConsumer {
    http: reqwest::Client,
    endpoint: StreamEndpoint,
    shared: Arc<Mutex<Shared>>,
}

impl StreamConsumer {
    pub fn new(http: reqwest::Client, endpoint: StreamEndpoint) -> Self {
        debug!(url = %endpoint.url, method = ?endpoint.method, "created StreamConsumer");
        Self {
            http,
            endpoint,
            shared: Arc::new(Mutex::new(Shared::default())),
        }
    }

    pub fn endpoint(&self) -> &StreamEndpoint {
        &self.endpoint
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> StreamState {
        self.lock().state.clone()
    }

    pub fn is_streaming(&self) -> bool {
        self.lock().state.is_streaming
    }

    /// Clear text and error and invalidate any stream still in flight.
    pub fn reset(&self) {
        let mut shared = self.lock();
        shared.advance();
        shared.state = StreamState::default();
        debug!(generation = shared.generation, "stream state reset");
    }

    /// Open the stream and consume it to the end.
    ///
    /// Returns the full text on success. The same outcome is reported to
    /// `handler`. A stream invalidated by a later `start_stream` or `reset`
    /// returns [`StreamError::Superseded`] and leaves the state alone.
    #[instrument(skip(self, request, handler), fields(file_path = %request.file_path))]
    pub async fn start_stream<H>(
        &self,
        request: &StreamRequest,
        handler: &mut H,
    ) -> Result<String, StreamError>
    where
        H: StreamHandler + ?Sized,
    {
        let (generation, cancel) = self.begin();
        info!(generation, url = %self.endpoint.url, "starting stream");

        let opened = tokio::select! {
            _ = cancel.cancelled() => Err(StreamError::Superseded),
            opened = self.open(request) => opened,
        };
        let result = match opened {
            Ok(response) => {
                self.pump(generation, &cancel, response.bytes_stream(), handler)
                    .await
            }
            Err(err) => Err(err),
        };
        self.settle(generation, result, handler)
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self) -> (u64, CancellationToken) {
        let mut shared = self.lock();
        let next = shared.advance();
        shared.state = StreamState {
            is_streaming: true,
            ..StreamState::default()
        };
        next
    }

    async fn open(&self, request: &StreamRequest) -> Result<reqwest::Response, StreamError> {
        let builder = match self.endpoint.method {
            StreamMethod::Post => self
                .http
                .post(&self.endpoint.url)
                .header(ACCEPT, "text/plain")
                .json(request),
            StreamMethod::Get => self
                .http
                .get(&self.endpoint.url)
                .header(ACCEPT, "text/plain")
                .query(&[("message", request.user_query.as_str())]),
        };

        let sent = match self.endpoint.read_timeout {
            Some(after) => tokio::time::timeout(after, builder.send())
                .await
                .map_err(|_| StreamError::Timeout { after })?,
            None => builder.send().await,
        };
        let response = sent.map_err(|e| StreamError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StreamError::Http {
                status: status.as_u16(),
            });
        }
        debug!(status = status.as_u16(), "stream opened");
        Ok(response)
    }

    /// Read segments until the body ends, decoding and forwarding each one.
    ///
    /// Returns `Superseded` as soon as `cancel` fires; the body is dropped
    /// with the loop.
    async fn pump<S, B, E, H>(
        &self,
        generation: u64,
        cancel: &CancellationToken,
        body: S,
        handler: &mut H,
    ) -> Result<(), StreamError>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: std::fmt::Display,
        H: StreamHandler + ?Sized,
    {
        let mut body = std::pin::pin!(body);
        let mut decoder = Utf8Decoder::new();
        let mut received = 0usize;

        loop {
            let read = async {
                match self.endpoint.read_timeout {
                    Some(after) => tokio::time::timeout(after, body.next())
                        .await
                        .map_err(|_| StreamError::Timeout { after }),
                    None => Ok(body.next().await),
                }
            };
            let next = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(generation, "stream cancelled while waiting for data");
                    return Err(StreamError::Superseded);
                }
                next = read => next?,
            };
            let text = match next {
                Some(Ok(segment)) => {
                    let bytes = segment.as_ref();
                    received += bytes.len();
                    decoder.decode(bytes)
                }
                Some(Err(e)) if received == 0 => {
                    warn!(error = %e, "response body unreadable");
                    return Err(StreamError::Unavailable);
                }
                Some(Err(e)) => return Err(StreamError::Transport(e.to_string())),
                None => break,
            };
            self.deliver(generation, &text, handler)?;
        }

        let tail = decoder.finish();
        self.deliver(generation, &tail, handler)?;
        debug!(generation, bytes = received, "stream body finished");
        Ok(())
    }

    /// Append decoded text to the state and pass it on, if still current.
    fn deliver<H>(&self, generation: u64, text: &str, handler: &mut H) -> Result<(), StreamError>
    where
        H: StreamHandler + ?Sized,
    {
        {
            let mut shared = self.lock();
            if shared.generation != generation {
                return Err(StreamError::Superseded);
            }
            if text.is_empty() {
                return Ok(());
            }
            shared.state.accumulated_text.push_str(text);
        }
        handler.on_chunk(text);
        Ok(())
    }

    /// Record the outcome and fire exactly one terminal callback.
    fn settle<H>(
        &self,
        generation: u64,
        result: Result<(), StreamError>,
        handler: &mut H,
    ) -> Result<String, StreamError>
    where
        H: StreamHandler + ?Sized,
    {
        let outcome = {
            let mut shared = self.lock();
            if shared.generation != generation {
                debug!(
                    generation,
                    current = shared.generation,
                    "dropping superseded stream"
                );
                return Err(StreamError::Superseded);
            }
            shared.state.is_streaming = false;
            match result {
                Ok(()) => Ok(shared.state.accumulated_text.clone()),
                Err(err) => {
                    shared.state.last_error = Some(err.clone());
                    Err(err)
                }
            }
        };

        match &outcome {
            Ok(text) => {
                info!(generation, len = text.len(), "stream complete");
                handler.on_complete(text);
            }
            Err(err) => {
                warn!(generation, error = %err, "stream failed");
                handler.on_error(err);
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        chunks: Vec<String>,
        completed: Vec<String>,
        errors: Vec<StreamError>,
    }

    impl StreamHandler for Recorder {
        fn on_chunk(&mut self, chunk: &str) {
            self.chunks.push(chunk.to_string());
        }
        fn on_complete(&mut self, full_text: &str) {
            self.completed.push(full_text.to_string());
        }
        fn on_error(&mut self, error: &StreamError) {
            self.errors.push(error.clone());
        }
    }

    fn consumer() -> StreamConsumer {
        StreamConsumer::new(
            reqwest::Client::new(),
            StreamEndpoint::post("http://127.0.0.1:9/unused"),
        )
    }

    async fn drive<S, B, E, H>(
        consumer: &StreamConsumer,
        body: S,
        handler: &mut H,
    ) -> Result<String, StreamError>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: std::fmt::Display,
        H: StreamHandler + ?Sized,
    {
        let (generation, cancel) = consumer.begin();
        let result = consumer.pump(generation, &cancel, body, handler).await;
        consumer.settle(generation, result, handler)
    }

    fn segments(parts: &[&'static [u8]]) -> impl Stream<Item = Result<&'static [u8], String>> {
        futures_util::stream::iter(parts.to_vec().into_iter().map(Ok))
    }

    #[tokio::test]
    async fn test_chunks_then_complete() {
        let consumer = consumer();
        let mut rec = Recorder::default();

        let text = drive(&consumer, segments(&[b"func", b" main(){}", b""]), &mut rec)
            .await
            .unwrap();

        assert_eq!(rec.chunks, vec!["func", " main(){}"]);
        assert_eq!(rec.completed, vec!["func main(){}"]);
        assert!(rec.errors.is_empty());
        assert_eq!(text, "func main(){}");

        let state = consumer.state();
        assert!(!state.is_streaming);
        assert_eq!(state.accumulated_text, text);
        assert_eq!(rec.chunks.concat(), rec.completed[0]);
    }

    #[tokio::test]
    async fn test_multibyte_split_across_segments() {
        let consumer = consumer();
        let mut rec = Recorder::default();
        // "é世🎉" split inside every character.
        let parts: [&'static [u8]; 4] = [b"\xc3", b"\xa9\xe4\xb8", b"\x96\xf0\x9f", b"\x8e\x89"];

        let text = drive(&consumer, segments(&parts), &mut rec).await.unwrap();

        assert_eq!(text, "é世🎉");
        assert_eq!(rec.chunks.concat(), "é世🎉");
        assert!(rec.chunks.iter().all(|c| !c.is_empty()));
    }

    #[tokio::test]
    async fn test_transport_error_keeps_partial_text() {
        let consumer = consumer();
        let mut rec = Recorder::default();
        let body = futures_util::stream::iter(vec![
            Ok(b"partial ".as_slice()),
            Err("connection reset".to_string()),
        ]);

        let err = drive(&consumer, body, &mut rec).await.unwrap_err();

        assert!(matches!(err, StreamError::Transport(ref m) if m.contains("connection reset")));
        assert_eq!(rec.chunks, vec!["partial "]);
        assert!(rec.completed.is_empty());
        assert_eq!(rec.errors.len(), 1);

        let state = consumer.state();
        assert!(!state.is_streaming);
        assert_eq!(state.accumulated_text, "partial ");
        assert_eq!(state.last_error, Some(err));
    }

    #[tokio::test]
    async fn test_unreadable_body_emits_no_chunks() {
        let consumer = consumer();
        let mut rec = Recorder::default();
        let body = futures_util::stream::iter(vec![Err::<&'static [u8], _>("boom".to_string())]);

        let err = drive(&consumer, body, &mut rec).await.unwrap_err();

        assert_eq!(err, StreamError::Unavailable);
        assert!(rec.chunks.is_empty());
        assert_eq!(rec.errors, vec![StreamError::Unavailable]);
    }

    struct ResetOnFirstChunk {
        consumer: StreamConsumer,
        inner: Recorder,
    }

    impl StreamHandler for ResetOnFirstChunk {
        fn on_chunk(&mut self, chunk: &str) {
            self.inner.on_chunk(chunk);
            self.consumer.reset();
        }
        fn on_complete(&mut self, full_text: &str) {
            self.inner.on_complete(full_text);
        }
        fn on_error(&mut self, error: &StreamError) {
            self.inner.on_error(error);
        }
    }

    #[tokio::test]
    async fn test_reset_supersedes_in_flight_stream() {
        let consumer = consumer();
        let mut handler = ResetOnFirstChunk {
            consumer: consumer.clone(),
            inner: Recorder::default(),
        };

        let err = drive(&consumer, segments(&[b"one", b"two", b"three"]), &mut handler)
            .await
            .unwrap_err();

        assert_eq!(err, StreamError::Superseded);
        assert_eq!(handler.inner.chunks, vec!["one"]);
        assert!(handler.inner.completed.is_empty());
        assert!(handler.inner.errors.is_empty());
        assert_eq!(consumer.state(), StreamState::default());
    }

    #[tokio::test]
    async fn test_newer_stream_wins() {
        let consumer = consumer();
        let mut first = Recorder::default();

        let (generation, stale) = consumer.begin();
        let (newer, _) = consumer.begin();
        assert!(newer > generation);
        assert!(stale.is_cancelled());

        let result = consumer
            .pump(generation, &stale, segments(&[b"stale"]), &mut first)
            .await;
        let err = consumer.settle(generation, result, &mut first).unwrap_err();

        assert_eq!(err, StreamError::Superseded);
        assert!(first.chunks.is_empty());
        let state = consumer.state();
        assert!(state.is_streaming, "state belongs to the newer stream");
        assert!(state.accumulated_text.is_empty());
    }

    #[tokio::test]
    async fn test_fresh_stream_after_failure_starts_empty() {
        let consumer = consumer();
        let body = futures_util::stream::iter(vec![
            Ok(b"left over".as_slice()),
            Err("eof".to_string()),
        ]);
        let _ = drive(&consumer, body, &mut ()).await;
        assert_eq!(consumer.state().accumulated_text, "left over");

        consumer.reset();
        let (generation, cancel) = consumer.begin();
        let state = consumer.state();
        assert!(state.accumulated_text.is_empty());
        assert!(state.last_error.is_none());
        assert!(state.is_streaming);

        let result = consumer
            .pump(generation, &cancel, segments(&[b"new"]), &mut ())
            .await;
        assert_eq!(consumer.settle(generation, result, &mut ()).unwrap(), "new");
    }

    #[tokio::test]
    async fn test_reset_interrupts_stalled_body() {
        let consumer = consumer();
        let resetter = consumer.clone();
        let mut rec = Recorder::default();
        // One segment, then nothing ever again.
        let body = segments(&[b"partial"]).chain(futures_util::stream::pending());

        let (generation, cancel) = consumer.begin();
        let (result, ()) = tokio::join!(
            consumer.pump(generation, &cancel, body, &mut rec),
            async move {
                tokio::task::yield_now().await;
                resetter.reset();
            }
        );

        assert_eq!(result, Err(StreamError::Superseded));
        assert_eq!(rec.chunks, vec!["partial"]);
        assert!(cancel.is_cancelled());
        assert_eq!(consumer.state(), StreamState::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_body_times_out() {
        let consumer = StreamConsumer::new(
            reqwest::Client::new(),
            StreamEndpoint::post("http://127.0.0.1:9/unused")
                .with_read_timeout(Duration::from_secs(5)),
        );
        let mut rec = Recorder::default();
        let body = futures_util::stream::pending::<Result<&'static [u8], String>>();

        let err = drive(&consumer, body, &mut rec).await.unwrap_err();

        assert_eq!(
            err,
            StreamError::Timeout {
                after: Duration::from_secs(5)
            }
        );
        assert_eq!(rec.errors.len(), 1);
        assert!(!consumer.is_streaming());
    }

    #[test]
    fn test_request_defaults_to_empty_fields() {
        let req: StreamRequest = serde_json::from_str(r#"{"file_path":"x.go"}"#).unwrap();
        assert_eq!(req.file_path, "x.go");
        assert!(req.conflict_content.is_empty());
        assert!(req.user_query.is_empty());
        assert!(req.repo_hash.is_empty());

        let json = serde_json::to_value(StreamRequest::new("c", "p").with_user_query("q")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "conflict_content": "c",
                "file_path": "p",
                "user_query": "q",
                "repo_hash": ""
            })
        );
    }
}
