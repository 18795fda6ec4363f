//! Lifecycle of resolving one conflicted file.
//!
//! A [`ResolutionSession`] owns the conflicted content, builds the stream
//! request, collects the streamed proposal through [`StreamHandler`], and
//! then waits for the user to accept it (commit and push, or only stage) or
//! reject it.

use std::fmt;

use tracing::{debug, info, instrument, warn};

use crate::api::ApiClient;
use crate::conflict::{has_conflict_markers, render_diff, summarize, DiffSummary};
use crate::errors::{CoreError, ResolutionError, StreamError};
use crate::models::StagedFile;
use crate::stream::{StreamConsumer, StreamHandler, StreamRequest};

/// Where a resolution currently stands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    /// Text received so far.
    Streaming { preview: String },
    AwaitingDecision { resolved: String },
    /// Committed and pushed; holds the server's message.
    Committed { message: String },
    /// Written and `git add`ed on the server, not committed.
    Staged(StagedFile),
    Rejected,
    Failed { message: String },
}

impl Phase {
    fn can_begin(&self) -> bool {
        matches!(
            self,
            Phase::Idle | Phase::AwaitingDecision { .. } | Phase::Rejected | Phase::Failed { .. }
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Streaming { .. } => "streaming",
            Phase::AwaitingDecision { .. } => "awaiting a decision",
            Phase::Committed { .. } => "committed",
            Phase::Staged(_) => "staged",
            Phase::Rejected => "rejected",
            Phase::Failed { .. } => "failed",
        };
        f.write_str(name)
    }
}

type PreviewSink = Box<dyn FnMut(&str) + Send>;

/// Drives one file from conflicted to committed (or rejected).
pub struct ResolutionSession {
    file_path: String,
    original: String,
    phase: Phase,
    preview_sink: Option<PreviewSink>,
}

impl fmt::Debug for ResolutionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolutionSession")
            .field("file_path", &self.file_path)
            .field("original_len", &self.original.len())
            .field("phase", &self.phase)
            .finish()
    }
}

impl ResolutionSession {
    pub fn new(file_path: impl Into<String>, original: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            original: original.into(),
            phase: Phase::Idle,
            preview_sink: None,
        }
    }

    /// Forward every streamed chunk to `sink` as it arrives.
    pub fn with_preview<F>(mut self, sink: F) -> Self
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.preview_sink = Some(Box::new(sink));
        self
    }

    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    /// The completed proposal, once one exists.
    pub fn resolved(&self) -> Option<&str> {
        match &self.phase {
            Phase::AwaitingDecision { resolved } => Some(resolved),
            _ => None,
        }
    }

    pub fn request(&self, user_query: &str, repo_hash: Option<&str>) -> StreamRequest {
        StreamRequest::new(self.original.clone(), self.file_path.clone())
            .with_user_query(user_query)
            .with_repo_hash(repo_hash.unwrap_or_default())
    }

    /// Enter `Streaming` and return the request to send.
    pub fn begin(
        &mut self,
        user_query: &str,
        repo_hash: Option<&str>,
    ) -> Result<StreamRequest, ResolutionError> {
        if !self.phase.can_begin() {
            return Err(self.invalid("start a resolution"));
        }
        self.phase = Phase::Streaming {
            preview: String::new(),
        };
        debug!(file_path = %self.file_path, "resolution streaming");
        Ok(self.request(user_query, repo_hash))
    }

    /// Begin and consume one stream through `consumer`.
    ///
    /// On success the session is awaiting a decision and the proposal is
    /// returned.
    #[instrument(skip(self, consumer, user_query), fields(file_path = %self.file_path))]
    pub async fn resolve(
        &mut self,
        consumer: &StreamConsumer,
        user_query: &str,
        repo_hash: Option<&str>,
    ) -> Result<String, CoreError> {
        let request = self.begin(user_query, repo_hash)?;
        match consumer.start_stream(&request, self).await {
            Ok(text) => Ok(text),
            Err(StreamError::Superseded) => {
                self.phase = Phase::Idle;
                Err(StreamError::Superseded.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Unified diff from the conflicted original to the proposal.
    pub fn diff(&self, color: bool) -> Option<String> {
        self.resolved()
            .map(|resolved| render_diff(&self.original, resolved, color))
    }

    pub fn summary(&self) -> Option<DiffSummary> {
        self.resolved()
            .map(|resolved| summarize(&self.original, resolved))
    }

    /// Commit the proposal as the new content of the file and push it.
    ///
    /// Returns the server's message. A failed commit leaves the proposal in
    /// place so it can be retried.
    #[instrument(skip(self, api), fields(file_path = %self.file_path))]
    pub async fn accept(
        &mut self,
        api: &ApiClient,
        repo_name: &str,
    ) -> Result<String, ResolutionError> {
        let resolved = self.proposal_for("accept")?;
        let ack = api.commit(repo_name, resolved, &self.file_path).await?;
        info!(message = %ack.message, "resolution committed");
        self.phase = Phase::Committed {
            message: ack.message.clone(),
        };
        Ok(ack.message)
    }

    /// Write the proposal and stage it, leaving the commit to the user.
    ///
    /// A failure leaves the proposal in place, as with [`accept`](Self::accept).
    #[instrument(skip(self, api), fields(file_path = %self.file_path))]
    pub async fn stage(
        &mut self,
        api: &ApiClient,
        repo_name: &str,
    ) -> Result<StagedFile, ResolutionError> {
        let resolved = self.proposal_for("stage")?;
        let staged = api.accept_merge(repo_name, resolved, &self.file_path).await?;
        info!(full_path = %staged.full_path, "resolution staged");
        self.phase = Phase::Staged(staged.clone());
        Ok(staged)
    }

    fn proposal_for(&self, action: &'static str) -> Result<&str, ResolutionError> {
        let resolved = match &self.phase {
            Phase::AwaitingDecision { resolved } => resolved,
            _ => return Err(self.invalid(action)),
        };
        if has_conflict_markers(resolved) {
            warn!(action, "resolution still contains conflict markers");
        }
        Ok(resolved)
    }

    /// Discard the proposal. Nothing is sent to the service.
    pub fn reject(&mut self) -> Result<(), ResolutionError> {
        if !matches!(self.phase, Phase::AwaitingDecision { .. }) {
            return Err(self.invalid("reject"));
        }
        info!(file_path = %self.file_path, "resolution rejected");
        self.phase = Phase::Rejected;
        Ok(())
    }

    fn invalid(&self, action: &'static str) -> ResolutionError {
        ResolutionError::InvalidPhase {
            action,
            actual: self.phase.to_string(),
        }
    }
}

impl StreamHandler for ResolutionSession {
    fn on_chunk(&mut self, chunk: &str) {
        if let Phase::Streaming { preview } = &mut self.phase {
            preview.push_str(chunk);
        }
        if let Some(sink) = self.preview_sink.as_mut() {
            sink(chunk);
        }
    }

    fn on_complete(&mut self, full_text: &str) {
        self.phase = Phase::AwaitingDecision {
            resolved: full_text.to_string(),
        };
    }

    fn on_error(&mut self, error: &StreamError) {
        self.phase = Phase::Failed {
            message: error.to_string(),
        };
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    const CONFLICTED: &str = "<<<<<<< HEAD\nlet x = 1;\n=======\nlet x = 2;\n>>>>>>> topic\n";

    #[test]
    fn test_request_carries_file_and_query() {
        let session = ResolutionSession::new("src/lib.rs", CONFLICTED);
        let req = session.request("keep both", Some("abc123"));
        assert_eq!(req.conflict_content, CONFLICTED);
        assert_eq!(req.file_path, "src/lib.rs");
        assert_eq!(req.user_query, "keep both");
        assert_eq!(req.repo_hash, "abc123");
        assert_eq!(session.request("", None).repo_hash, "");
    }

    #[test]
    fn test_streaming_then_awaiting_decision() {
        let seen = Arc::new(Mutex::new(String::new()));
        let sink = Arc::clone(&seen);
        let mut session = ResolutionSession::new("src/lib.rs", CONFLICTED)
            .with_preview(move |chunk| sink.lock().unwrap().push_str(chunk));

        session.begin("", None).unwrap();
        session.on_chunk("let x ");
        assert_eq!(
            session.phase(),
            &Phase::Streaming {
                preview: "let x ".into()
            }
        );
        session.on_chunk("= 2;\n");
        session.on_complete("let x = 2;\n");

        assert_eq!(session.resolved(), Some("let x = 2;\n"));
        assert_eq!(*seen.lock().unwrap(), "let x = 2;\n");

        let diff = session.diff(false).unwrap();
        assert!(diff.contains("-<<<<<<< HEAD"));
        assert!(diff.contains(" let x = 2;"));
        assert_eq!(session.summary().unwrap().hunks, 1);
    }

    #[test]
    fn test_error_fails_and_allows_retry() {
        let mut session = ResolutionSession::new("a.go", CONFLICTED);
        session.begin("", None).unwrap();
        session.on_error(&StreamError::Http { status: 500 });
        assert_eq!(
            session.phase(),
            &Phase::Failed {
                message: "HTTP error! status: 500".into()
            }
        );
        assert!(session.diff(false).is_none());
        session.begin("try again", None).unwrap();
        assert!(matches!(session.phase(), Phase::Streaming { .. }));
    }

    #[test]
    fn test_begin_while_streaming_is_rejected() {
        let mut session = ResolutionSession::new("a.go", CONFLICTED);
        session.begin("", None).unwrap();
        let err = session.begin("", None).unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot start a resolution while resolution is streaming"
        );
    }

    #[test]
    fn test_reject_only_when_awaiting() {
        let mut session = ResolutionSession::new("a.go", CONFLICTED);
        assert!(matches!(
            session.reject(),
            Err(ResolutionError::InvalidPhase { action: "reject", .. })
        ));

        session.begin("", None).unwrap();
        session.on_complete("let x = 2;\n");
        session.reject().unwrap();
        assert_eq!(session.phase(), &Phase::Rejected);
        assert!(session.resolved().is_none());
    }

    #[tokio::test]
    async fn test_accept_requires_proposal() {
        let api = ApiClient::new("http://127.0.0.1:9", None).unwrap();
        let mut session = ResolutionSession::new("a.go", CONFLICTED);
        let err = session.accept(&api, "demo").await.unwrap_err();
        assert!(matches!(
            err,
            ResolutionError::InvalidPhase { action: "accept", ref actual } if actual == "idle"
        ));
        let err = session.stage(&api, "demo").await.unwrap_err();
        assert!(matches!(
            err,
            ResolutionError::InvalidPhase { action: "stage", .. }
        ));
    }
}
