//! Streamed model output to queued actions.

use forge_stream::{ParseEvent, ParseOutput, SseDecoder, SseEvent, StreamSession};
use futures::{Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::error::{CoreError, CoreResult};
use crate::executor::{ActionExecutor, ActionId};

/// What a finished stream produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    /// Free text outside any artifact
    pub text: String,
    /// Ids of the actions handed to the executor, in order
    pub queued: Vec<ActionId>,
    /// Titles of the artifacts seen
    pub artifacts: Vec<String>,
}

/// Feeds one response stream through the tag parser into an executor.
pub struct StreamPipeline {
    executor: ActionExecutor,
    decoder: SseDecoder,
    session: StreamSession,
    report: PipelineReport,
}

impl StreamPipeline {
    pub fn new(executor: ActionExecutor, stream_id: impl Into<String>) -> Self {
        Self {
            executor,
            decoder: SseDecoder::new(),
            session: StreamSession::begin(stream_id),
            report: PipelineReport::default(),
        }
    }

    /// Raw SSE transport bytes.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> ParseOutput {
        let mut out = ParseOutput::default();
        for event in self.decoder.push(bytes) {
            if let SseEvent::Delta(text) = event {
                out.extend(self.session.push(&text));
            }
        }
        self.dispatch(&out);
        out
    }

    /// Already-decoded text.
    pub fn push_text(&mut self, text: &str) -> ParseOutput {
        let out = self.session.push(text);
        self.dispatch(&out);
        out
    }

    pub fn is_done(&self) -> bool {
        self.decoder.is_done()
    }

    /// Flush both layers and return the report.
    pub fn finish(self) -> PipelineReport {
        let Self {
            executor,
            mut decoder,
            mut session,
            mut report,
        } = self;

        let mut out = ParseOutput::default();
        for event in decoder.finish() {
            if let SseEvent::Delta(text) = event {
                out.extend(session.push(&text));
            }
        }
        out.extend(session.finish());
        dispatch(&executor, &mut report, &out);

        info!(
            actions = report.queued.len(),
            artifacts = report.artifacts.len(),
            "Stream finished"
        );
        report
    }

    /// Drive a byte stream to completion.
    pub async fn run<S, B, E>(mut self, stream: S) -> CoreResult<PipelineReport>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: std::fmt::Display,
    {
        futures::pin_mut!(stream);
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => {
                    self.push_bytes(bytes.as_ref());
                }
                Err(e) => {
                    warn!(stream_id = %self.session.id(), "Stream transport failed: {}", e);
                    return Err(CoreError::Transport(e.to_string()));
                }
            }
            if self.is_done() {
                break;
            }
        }
        Ok(self.finish())
    }

    fn dispatch(&mut self, out: &ParseOutput) {
        dispatch(&self.executor, &mut self.report, out);
    }
}

fn dispatch(executor: &ActionExecutor, report: &mut PipelineReport, out: &ParseOutput) {
    for event in &out.events {
        match event {
            ParseEvent::Text(text) => report.text.push_str(text),
            ParseEvent::ArtifactOpen { title, .. } => report.artifacts.push(title.clone()),
            ParseEvent::ActionComplete(action) => {
                if let Some(id) = executor.enqueue(action.clone()) {
                    debug!(action_id = id, "Action handed to executor");
                    report.queued.push(id);
                }
            }
            ParseEvent::ActionOpen { .. } | ParseEvent::ArtifactClose { .. } => {}
        }
    }
}
