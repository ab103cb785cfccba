//! Client-facing output stream.
//!
//! The composer owns the upstream byte stream and the request's
//! [`ResponsePipeline`], and yields plain-text chunks: answer text as it is
//! decoded, then the remainder flushed at end of input, then the reference
//! block. Phases only move forward.

use std::convert::Infallible;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tracing::warn;

use crate::observability::stream_stats::log_stream_complete;
use crate::protocol::response::CompletionOutput;

use super::citations::{CitationPolicy, ReferenceBlock};
use super::pipeline::ResponsePipeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposerPhase {
    /// Forwarding text decoded from upstream chunks.
    Streaming,
    /// Upstream ended or sent `[DONE]`; emitting whatever is still buffered.
    FlushingRemainder,
    /// Emitting the reference block, if any.
    EmittingCitations,
    Closed,
}

pub struct OutputComposer<S> {
    upstream: Option<S>,
    pipeline: ResponsePipeline,
    policy: Arc<CitationPolicy>,
    phase: ComposerPhase,
    pending: String,
    request_id: String,
    references: usize,
    started: Instant,
}

impl<S, E> OutputComposer<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Display,
{
    pub fn new(upstream: S, policy: Arc<CitationPolicy>, request_id: String) -> Self {
        Self {
            upstream: Some(upstream),
            pipeline: ResponsePipeline::new(),
            policy,
            phase: ComposerPhase::Streaming,
            pending: String::new(),
            request_id,
            references: 0,
            started: Instant::now(),
        }
    }

    /// Composer over an already complete upstream answer. Starts in
    /// [`ComposerPhase::FlushingRemainder`] with the whole text pending.
    pub fn from_completion(
        output: CompletionOutput,
        policy: Arc<CitationPolicy>,
        request_id: String,
    ) -> Self {
        let mut pipeline = ResponsePipeline::new();
        pipeline.add_citations(output.citations);
        Self {
            upstream: None,
            pipeline,
            policy,
            phase: ComposerPhase::FlushingRemainder,
            pending: output.text,
            request_id,
            references: 0,
            started: Instant::now(),
        }
    }

    #[must_use]
    pub fn phase(&self) -> ComposerPhase {
        self.phase
    }

    /// Next non-empty output chunk, or `None` once closed.
    pub async fn next_chunk(&mut self) -> Option<Bytes> {
        loop {
            match self.phase {
                ComposerPhase::Streaming => {
                    if let Some(chunk) = self.poll_upstream().await {
                        return Some(chunk);
                    }
                }
                ComposerPhase::FlushingRemainder => {
                    self.pipeline.finish_input(&mut self.pending);
                    self.phase = ComposerPhase::EmittingCitations;
                    if !self.pending.is_empty() {
                        return Some(Bytes::from(std::mem::take(&mut self.pending)));
                    }
                }
                ComposerPhase::EmittingCitations => {
                    let block = self.pipeline.reference_block(&self.policy);
                    self.references = block.as_ref().map_or(0, ReferenceBlock::entry_count);
                    self.close();
                    if let Some(block) = block {
                        return Some(Bytes::from(block.render()));
                    }
                }
                ComposerPhase::Closed => return None,
            }
        }
    }

    /// One upstream read. Returns a chunk when the read produced text;
    /// otherwise the phase may have advanced.
    async fn poll_upstream(&mut self) -> Option<Bytes> {
        let Some(upstream) = self.upstream.as_mut() else {
            self.phase = ComposerPhase::FlushingRemainder;
            return None;
        };
        match upstream.next().await {
            Some(Ok(chunk)) => {
                self.pipeline.push_chunk(&chunk, &mut self.pending);
                if self.pipeline.is_terminated() {
                    // Stop reading; releasing the stream closes the upstream connection.
                    self.upstream = None;
                    self.phase = ComposerPhase::FlushingRemainder;
                }
                if self.pending.is_empty() {
                    None
                } else {
                    Some(Bytes::from(std::mem::take(&mut self.pending)))
                }
            }
            Some(Err(err)) => {
                warn!(
                    request_id = %self.request_id,
                    error = %err,
                    "upstream stream read failed; finishing with partial answer"
                );
                self.upstream = None;
                self.phase = ComposerPhase::FlushingRemainder;
                None
            }
            None => {
                self.upstream = None;
                self.phase = ComposerPhase::FlushingRemainder;
                None
            }
        }
    }

    fn close(&mut self) {
        self.phase = ComposerPhase::Closed;
        log_stream_complete(
            &self.request_id,
            self.pipeline.stats(),
            self.references,
            self.started.elapsed(),
        );
    }

    /// Body stream for the client response.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, Infallible>>
    where
        S: Send + 'static,
        E: Send + 'static,
    {
        futures_util::stream::unfold(self, |mut composer| async move {
            let chunk = composer.next_chunk().await?;
            Some((Ok(chunk), composer))
        })
    }
}
