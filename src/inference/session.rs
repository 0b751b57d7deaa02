//! Inference session
//!
//! Wraps one loaded model's generation capability and serializes requests
//! against it: strict single-flight (a second `generate` fails immediately,
//! the session never queues), a hard token budget, and cooperative
//! cancellation observed at every token boundary.

use crate::cancel::CancelFlag;
use crate::error::{EngineError, EngineResult};
use crate::inference::stream::{GenerationEvent, GenerationResult, GenerationStream};
use crate::models::runtime::{GenerateParams, ModelHandle};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::mpsc;

/// Hard ceiling on generated tokens per request.
pub const DEFAULT_MAX_TOKENS: usize = 120_000;

/// Streaming deltas are flushed every this many tokens.
const DISPLAY_EVERY_N_TOKENS: usize = 4;

const LOCAL_TEMPERATURE: f32 = 0.6;

/// Value object describing one generation. Constructed fresh per call.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system_prompt: Option<String>,
    pub user_prompt: String,
    pub images: Vec<Vec<u8>>,
    /// Accepted but not yet incorporated into the prompt; carried end-to-end
    /// so a future video-to-text policy has the bytes to work with.
    pub videos: Vec<Vec<u8>>,
    pub streaming: bool,
    pub max_tokens: usize,
}

impl GenerationRequest {
    pub fn new(user_prompt: &str) -> Self {
        Self {
            system_prompt: None,
            user_prompt: user_prompt.to_string(),
            images: Vec::new(),
            videos: Vec::new(),
            streaming: false,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: &str) -> Self {
        self.system_prompt = Some(system_prompt.to_string());
        self
    }

    pub fn with_images(mut self, images: Vec<Vec<u8>>) -> Self {
        self.images = images;
        self
    }

    pub fn with_videos(mut self, videos: Vec<Vec<u8>>) -> Self {
        self.videos = videos;
        self
    }

    pub fn streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Single-flight wrapper around one loaded model handle.
///
/// Cheap to clone; clones share the same in-flight guard and cancel flag.
#[derive(Clone)]
pub struct InferenceSession {
    handle: ModelHandle,
    running: Arc<AtomicBool>,
    cancel: CancelFlag,
}

impl InferenceSession {
    pub fn new(handle: ModelHandle) -> Self {
        Self {
            handle,
            running: Arc::new(AtomicBool::new(false)),
            cancel: CancelFlag::new(),
        }
    }

    /// The handle this session generates against.
    pub fn handle(&self) -> &ModelHandle {
        &self.handle
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Begin a generation for an already-assembled prompt.
    ///
    /// Fails immediately with `GenerationAlreadyInProgress` while another
    /// generation on this session is active. The returned stream yields
    /// deltas (when streaming was requested) followed by a terminal event;
    /// the single-flight guard clears when the driving task settles.
    pub fn generate(
        &self,
        prompt: String,
        request: &GenerationRequest,
    ) -> EngineResult<GenerationStream> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(EngineError::GenerationAlreadyInProgress);
        }
        // Single-flight holds, so nothing else observes the flag between the
        // clear and the first boundary check.
        self.cancel.clear();

        let (tx, stream) = GenerationStream::channel(64);
        let handle = Arc::clone(&self.handle);
        let running = Arc::clone(&self.running);
        let cancel = self.cancel.clone();
        let streaming = request.streaming;
        let budget = request.max_tokens;

        tokio::spawn(async move {
            let outcome = drive(handle, prompt, streaming, budget, cancel, &tx).await;
            match outcome {
                Ok(result) => {
                    tracing::debug!(
                        total_tokens = result.total_tokens,
                        tokens_per_second = format!("{:.3}", result.tokens_per_second),
                        "Generation finished"
                    );
                    let _ = tx.send(GenerationEvent::Completed(result)).await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Generation failed");
                    let _ = tx.send(GenerationEvent::Failed(e.to_string())).await;
                }
            }
            running.store(false, Ordering::SeqCst);
        });

        Ok(stream)
    }

    /// Request cooperative cancellation of the active generation.
    ///
    /// Observed within one token boundary; the generation completes early
    /// with whatever text has accumulated. Not an error.
    pub fn cancel(&self) {
        self.cancel.set();
    }
}

/// Pull tokens until the model stops, the budget is reached, or cancellation
/// is observed. The budget is a hard ceiling: the loop never pulls a token
/// that would exceed it.
async fn drive(
    handle: ModelHandle,
    prompt: String,
    streaming: bool,
    budget: usize,
    cancel: CancelFlag,
    tx: &mpsc::Sender<GenerationEvent>,
) -> EngineResult<GenerationResult> {
    let params = GenerateParams::seeded_now(LOCAL_TEMPERATURE);
    let started = Instant::now();
    let mut source = handle.start(&prompt, params).await?;

    let mut output = String::new();
    let mut pending = String::new();
    let mut total_tokens = 0usize;

    loop {
        if cancel.is_set() || total_tokens >= budget {
            break;
        }
        match source.next_token().await? {
            Some(piece) => {
                total_tokens += 1;
                output.push_str(&piece);
                if streaming {
                    pending.push_str(&piece);
                    if total_tokens % DISPLAY_EVERY_N_TOKENS == 0 {
                        let _ = tx
                            .send(GenerationEvent::Delta(std::mem::take(&mut pending)))
                            .await;
                    }
                }
            }
            None => break,
        }
    }

    if streaming && !pending.is_empty() {
        let _ = tx.send(GenerationEvent::Delta(pending)).await;
    }

    let elapsed = started.elapsed().as_secs_f64();
    let tokens_per_second = if elapsed > 0.0 {
        total_tokens as f64 / elapsed
    } else {
        0.0
    };

    Ok(GenerationResult {
        output,
        total_tokens,
        tokens_per_second,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::runtime::{TokenGenerator, TokenSource};
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::time::Duration;

    /// Generator yielding a fixed token script, optionally pausing between
    /// tokens and optionally failing partway through.
    #[derive(Debug)]
    struct ScriptedGenerator {
        tokens: Vec<String>,
        delay: Option<Duration>,
        fail_after: Option<usize>,
    }

    impl ScriptedGenerator {
        fn handle(tokens: &[&str]) -> ModelHandle {
            Arc::new(Self {
                tokens: tokens.iter().map(|t| t.to_string()).collect(),
                delay: None,
                fail_after: None,
            })
        }

        fn slow_handle(tokens: &[&str], delay: Duration) -> ModelHandle {
            Arc::new(Self {
                tokens: tokens.iter().map(|t| t.to_string()).collect(),
                delay: Some(delay),
                fail_after: None,
            })
        }

        fn failing_handle(tokens: &[&str], fail_after: usize) -> ModelHandle {
            Arc::new(Self {
                tokens: tokens.iter().map(|t| t.to_string()).collect(),
                delay: None,
                fail_after: Some(fail_after),
            })
        }
    }

    struct ScriptedSource {
        tokens: std::vec::IntoIter<String>,
        delay: Option<Duration>,
        fail_after: Option<usize>,
        produced: usize,
    }

    #[async_trait]
    impl TokenSource for ScriptedSource {
        async fn next_token(&mut self) -> EngineResult<Option<String>> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(limit) = self.fail_after
                && self.produced >= limit
            {
                return Err(EngineError::Generation("scripted failure".to_string()));
            }
            self.produced += 1;
            Ok(self.tokens.next())
        }
    }

    #[async_trait]
    impl TokenGenerator for ScriptedGenerator {
        async fn start(
            &self,
            _prompt: &str,
            _params: GenerateParams,
        ) -> EngineResult<Box<dyn TokenSource>> {
            Ok(Box::new(ScriptedSource {
                tokens: self.tokens.clone().into_iter(),
                delay: self.delay,
                fail_after: self.fail_after,
                produced: 0,
            }))
        }
    }

    fn tokens(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("t{} ", i)).collect()
    }

    #[tokio::test]
    async fn test_generation_collects_all_tokens() {
        let session = InferenceSession::new(ScriptedGenerator::handle(&["a", "b", "c"]));
        let request = GenerationRequest::new("prompt");
        let stream = session.generate("prompt".into(), &request).unwrap();

        let result = stream.collect_result().await.unwrap();
        assert_eq!(result.output, "abc");
        assert_eq!(result.total_tokens, 3);
        assert!(result.tokens_per_second > 0.0);
    }

    #[tokio::test]
    async fn test_budget_is_a_hard_ceiling() {
        let script = tokens(100);
        let refs: Vec<&str> = script.iter().map(|s| s.as_str()).collect();
        let session = InferenceSession::new(ScriptedGenerator::handle(&refs));
        let request = GenerationRequest::new("prompt").with_max_tokens(10);

        let result = session
            .generate("prompt".into(), &request)
            .unwrap()
            .collect_result()
            .await
            .unwrap();
        assert_eq!(result.total_tokens, 10);
        assert_eq!(result.output, script[..10].concat());
    }

    #[tokio::test]
    async fn test_second_generate_fails_while_active() {
        let script = tokens(50);
        let refs: Vec<&str> = script.iter().map(|s| s.as_str()).collect();
        let session = InferenceSession::new(ScriptedGenerator::slow_handle(
            &refs,
            Duration::from_millis(5),
        ));
        let request = GenerationRequest::new("prompt");

        let first = session.generate("prompt".into(), &request).unwrap();
        let second = session.generate("prompt".into(), &request);
        assert!(matches!(
            second,
            Err(EngineError::GenerationAlreadyInProgress)
        ));

        // After the first settles, a new call succeeds.
        first.collect_result().await.unwrap();
        let third = session.generate("prompt".into(), &request).unwrap();
        third.collect_result().await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_returns_partial_output_without_error() {
        let script = tokens(1000);
        let refs: Vec<&str> = script.iter().map(|s| s.as_str()).collect();
        let session = InferenceSession::new(ScriptedGenerator::slow_handle(
            &refs,
            Duration::from_millis(2),
        ));
        let request = GenerationRequest::new("prompt");

        let stream = session.generate("prompt".into(), &request).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        session.cancel();

        let result = stream.collect_result().await.unwrap();
        assert!(result.total_tokens < 1000);
        assert_eq!(result.output, script[..result.total_tokens].concat());
    }

    #[tokio::test]
    async fn test_streaming_deltas_batch_every_four_tokens() {
        let script = tokens(10);
        let refs: Vec<&str> = script.iter().map(|s| s.as_str()).collect();
        let session = InferenceSession::new(ScriptedGenerator::handle(&refs));
        let request = GenerationRequest::new("prompt").streaming(true);

        let mut stream = session.generate("prompt".into(), &request).unwrap();
        let mut deltas = Vec::new();
        let mut completed = None;
        while let Some(event) = stream.next().await {
            match event {
                GenerationEvent::Delta(text) => deltas.push(text),
                GenerationEvent::Completed(result) => completed = Some(result),
                GenerationEvent::Failed(message) => panic!("unexpected failure: {}", message),
            }
        }

        // 10 tokens flush as 4 + 4 + trailing 2
        assert_eq!(deltas.len(), 3);
        let result = completed.expect("missing terminal event");
        assert_eq!(deltas.concat(), result.output);
    }

    #[tokio::test]
    async fn test_non_streaming_withholds_deltas() {
        let session = InferenceSession::new(ScriptedGenerator::handle(&["a", "b", "c", "d", "e"]));
        let request = GenerationRequest::new("prompt");

        let mut stream = session.generate("prompt".into(), &request).unwrap();
        let mut saw_delta = false;
        while let Some(event) = stream.next().await {
            if matches!(event, GenerationEvent::Delta(_)) {
                saw_delta = true;
            }
        }
        assert!(!saw_delta);
    }

    #[tokio::test]
    async fn test_failure_mid_generation_clears_single_flight() {
        let session =
            InferenceSession::new(ScriptedGenerator::failing_handle(&["a", "b", "c"], 2));
        let request = GenerationRequest::new("prompt");

        let err = session
            .generate("prompt".into(), &request)
            .unwrap()
            .collect_result()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("scripted failure"));

        // The in-progress flag must not dangle after a failure.
        let session2 = session.clone();
        let stream = session2.generate("prompt".into(), &request);
        assert!(stream.is_ok());
        stream.unwrap().collect_result().await.unwrap_err();
    }

    #[tokio::test]
    async fn test_request_defaults() {
        let request = GenerationRequest::new("hello");
        assert_eq!(request.max_tokens, DEFAULT_MAX_TOKENS);
        assert!(!request.streaming);
        assert!(request.system_prompt.is_none());
        assert!(request.images.is_empty());
        assert!(request.videos.is_empty());
    }
}
