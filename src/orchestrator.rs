//! `Orchestrator`: fans out N `ThinkingThread`s for a request, aggregates
//! their terminal states, handles partial failures, and hands the finished
//! set to `Fusion` (spec §4.1).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::cancel::CancelHandle;
use crate::config::Config;
use crate::error::GatewayError;
use crate::fusion;
use crate::model_client::ModelClient;
use crate::thread::{EffectiveConfig, ThinkingThread};
use crate::types::{FinalAnswer, FusionStrategy, Request, StreamEvent, ThreadState, ThreadStatus};

/// Default streaming chunk size in bytes (spec §4.1, §6): 50 characters,
/// UTF-8-boundary-safe.
pub const STREAM_CHUNK_SIZE: usize = 50;

pub struct Orchestrator {
    config: Arc<Config>,
    client: Arc<dyn ModelClient>,
    limiter: Arc<Semaphore>,
}

impl Orchestrator {
    pub fn new(config: Arc<Config>, client: Arc<dyn ModelClient>) -> Self {
        let limiter = Arc::new(Semaphore::new(config.concurrency.max_in_flight));
        Self {
            config,
            client,
            limiter,
        }
    }

    fn effective_config(&self, request: &Request) -> EffectiveConfig {
        EffectiveConfig::from_config(
            &self.config.thinking,
            request.validate.unwrap_or(self.config.validation.enabled),
            0.7,
            request.threads,
            request.max_steps,
        )
    }

    fn fusion_strategy(&self, request: &Request) -> FusionStrategy {
        request.fusion.unwrap_or(self.config.fusion.strategy)
    }

    /// Run the pipeline to completion, non-streaming. `deadline` is the
    /// per-request wall-clock budget (spec §5); `None` means no deadline.
    #[tracing::instrument(skip(self, request), fields(threads = ?request.threads))]
    pub async fn run(
        &self,
        request: Request,
        deadline: Option<Duration>,
    ) -> Result<FinalAnswer, GatewayError> {
        let cancel = CancelHandle::new();
        let (threads, deadline_hit) = self.run_threads(&request, deadline, &cancel).await;

        let completed: Vec<&ThreadState> = threads
            .iter()
            .filter(|t| t.status == ThreadStatus::Completed)
            .collect();
        let failed_count = threads.len() - completed.len();

        if completed.is_empty() {
            return Err(if deadline_hit {
                GatewayError::DeadlineExceeded
            } else {
                GatewayError::AllThreadsFailed
            });
        }

        let flagged_steps: usize = completed.iter().map(|t| t.flagged_step_count()).sum();
        let strategy = self.fusion_strategy(&request);
        let text = fusion::fuse(
            &completed,
            &request.messages,
            strategy,
            self.client.as_ref(),
            &self.config.models,
            &self.config.fusion.concat_delimiter,
            &cancel,
        )
        .await?;

        Ok(FinalAnswer {
            text,
            threads_completed: completed.len(),
            threads_failed: failed_count,
            flagged_steps,
        })
    }

    /// Run the pipeline and chunk the final answer into stream events
    /// (spec §4.1): fixed-size, UTF-8-boundary-safe chunks followed by a
    /// terminal `Done` event.
    pub async fn run_stream(
        &self,
        request: Request,
        deadline: Option<Duration>,
    ) -> Result<Vec<StreamEvent>, GatewayError> {
        let answer = self.run(request, deadline).await?;
        let mut events: Vec<StreamEvent> = chunk_utf8_safe(&answer.text, STREAM_CHUNK_SIZE)
            .into_iter()
            .map(StreamEvent::Delta)
            .collect();
        events.push(StreamEvent::Done);
        Ok(events)
    }

    /// Propagate caller-initiated cancellation into every in-flight thread
    /// and model call for a request already in flight.
    pub fn cancel(handle: &CancelHandle) {
        handle.cancel();
    }

    async fn run_threads(
        &self,
        request: &Request,
        deadline: Option<Duration>,
        cancel: &CancelHandle,
    ) -> (Vec<ThreadState>, bool) {
        let effective = Arc::new(self.effective_config(request));
        let user_messages = Arc::new(request.messages.clone());

        let mut join_set: JoinSet<ThreadState> = JoinSet::new();
        for thread_id in 0..effective.threads as usize {
            let user_messages = user_messages.clone();
            let models = self.config.models.clone();
            let effective = effective.clone();
            let validation_config = self.config.validation.clone();
            let client = self.client.clone();
            let limiter = self.limiter.clone();
            let cancel = cancel.clone();
            join_set.spawn(async move {
                ThinkingThread::run(
                    thread_id,
                    user_messages,
                    models,
                    effective,
                    validation_config,
                    client,
                    limiter,
                    cancel,
                )
                .await
            });
        }

        let mut threads = Vec::new();
        let mut deadline_hit = false;

        match deadline {
            None => {
                while let Some(res) = join_set.join_next().await {
                    if let Ok(state) = res {
                        threads.push(state);
                    }
                }
            }
            Some(budget) => {
                let sleep = tokio::time::sleep(budget);
                tokio::pin!(sleep);
                loop {
                    tokio::select! {
                        maybe_res = join_set.join_next() => {
                            match maybe_res {
                                Some(Ok(state)) => threads.push(state),
                                Some(Err(_)) => {}
                                None => break,
                            }
                        }
                        _ = &mut sleep => {
                            tracing::warn!("request deadline elapsed, cancelling in-flight threads");
                            deadline_hit = true;
                            cancel.cancel();
                            join_set.abort_all();
                            while let Some(res) = join_set.join_next().await {
                                if let Ok(state) = res {
                                    threads.push(state);
                                }
                            }
                            break;
                        }
                    }
                }
            }
        }

        (threads, deadline_hit)
    }
}

/// Split `text` into chunks of at most `size` bytes, never splitting a
/// multi-byte UTF-8 codepoint (spec §4.1, §6, §8 scenario 6).
pub fn chunk_utf8_safe(text: &str, size: usize) -> Vec<String> {
    if size == 0 || text.is_empty() {
        return if text.is_empty() { Vec::new() } else { vec![text.to_string()] };
    }

    let mut chunks = Vec::new();
    let bytes = text.as_bytes();
    let mut start = 0usize;
    while start < bytes.len() {
        let mut end = (start + size).min(bytes.len());
        while end < bytes.len() && !text.is_char_boundary(end) {
            end -= 1;
        }
        chunks.push(text[start..end].to_string());
        start = end;
    }
    chunks
}

/// Acceptance of an extension field's bound, returning `BadRequest` if it's
/// out of the configured range (spec §6).
pub fn validate_extension_bounds(request: &Request) -> Result<(), GatewayError> {
    if let Some(threads) = request.threads {
        if !(1..=8).contains(&threads) {
            return Err(GatewayError::BadRequest(format!(
                "x_threads must be within 1..=8, got {threads}"
            )));
        }
    }
    if let Some(max_steps) = request.max_steps {
        if !(1..=50).contains(&max_steps) {
            return Err(GatewayError::BadRequest(format!(
                "x_max_steps must be within 1..=50, got {max_steps}"
            )));
        }
    }
    if request.messages.is_empty() {
        return Err(GatewayError::BadRequest("messages must not be empty".to_string()));
    }
    Ok(())
}
