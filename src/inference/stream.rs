//! Generation event stream
//!
//! Lazy sequence of decoded text increments for one generation, ending in a
//! terminal `Completed` or `Failed` event. Backed by an mpsc channel so the
//! producing session and the consuming UI advance independently; events for a
//! single generation arrive in the order tokens were produced.

use crate::error::{EngineError, EngineResult};
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Final accounting for a completed, budget-terminated, or cancelled
/// generation.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult {
    pub output: String,
    pub total_tokens: usize,
    pub tokens_per_second: f64,
}

/// One event observed by the consumer of a generation.
#[derive(Debug, Clone)]
pub enum GenerationEvent {
    /// Incremental decoded text; emitted only when streaming was requested.
    Delta(String),
    /// Terminal event carrying the full accumulated output.
    Completed(GenerationResult),
    /// Terminal event for a generation that failed mid-flight. Cancellation
    /// is not a failure; it completes with the text accumulated so far.
    Failed(String),
}

/// Consumer half of one generation's event channel.
pub struct GenerationStream {
    inner: ReceiverStream<GenerationEvent>,
}

impl GenerationStream {
    pub(crate) fn channel(capacity: usize) -> (mpsc::Sender<GenerationEvent>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            tx,
            Self {
                inner: ReceiverStream::new(rx),
            },
        )
    }

    /// Drain the stream to its terminal event and return the final result.
    pub async fn collect_result(mut self) -> EngineResult<GenerationResult> {
        use futures::StreamExt;

        while let Some(event) = self.inner.next().await {
            match event {
                GenerationEvent::Delta(_) => continue,
                GenerationEvent::Completed(result) => return Ok(result),
                GenerationEvent::Failed(message) => {
                    return Err(EngineError::Generation(message));
                }
            }
        }
        Err(EngineError::Generation(
            "generation ended without a result".to_string(),
        ))
    }
}

impl Stream for GenerationStream {
    type Item = GenerationEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
