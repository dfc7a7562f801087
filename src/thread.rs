//! `ThinkingThread`: a single reasoning thread's state machine (spec §4.2).
//!
//! Produces an ordered sequence of steps, consulting `ContextBuilder` and
//! `Validator` between steps, until it self-declares completion (the main
//! model's body satisfies the termination predicate) or hits the step cap.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::cancel::CancelHandle;
use crate::config::{ModelsConfig, ThinkingConfig, ValidationConfig};
use crate::context::ContextBuilder;
use crate::model_client::{InvokeOptions, ModelClient};
use crate::types::{ChatMessage, Step, ThreadState, ThreadStatus, ValidationVerdict};
use crate::validator::Validator;

/// Per-request knobs resolved from `Config` + the request's `x_*`
/// overrides (spec §6). Shared read-only across all threads of a request.
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    pub threads: u32,
    pub max_steps: u32,
    pub validate: bool,
    pub termination_marker: String,
    pub base_temperature: f32,
}

impl EffectiveConfig {
    pub fn from_config(
        thinking: &ThinkingConfig,
        validation_enabled: bool,
        base_temperature: f32,
        threads_override: Option<u32>,
        max_steps_override: Option<u32>,
    ) -> Self {
        Self {
            threads: threads_override.unwrap_or(thinking.threads),
            max_steps: max_steps_override.unwrap_or(thinking.max_steps),
            validate: validation_enabled,
            termination_marker: thinking.termination_marker.clone(),
            base_temperature,
        }
    }

    /// Per-thread temperature: distinct sampling per thread, deterministic
    /// in the seed itself (diversity comes from the upstream model's own
    /// sampling, not from this perturbation).
    pub fn temperature_for(&self, thread_id: usize) -> f32 {
        (self.base_temperature + thread_id as f32 * 0.05).clamp(0.0, 2.0)
    }
}

pub struct ThinkingThread;

impl ThinkingThread {
    /// Run one thread to completion or failure.
    #[allow(clippy::too_many_arguments)]
    pub async fn run(
        thread_id: usize,
        user_messages: Arc<Vec<ChatMessage>>,
        models: ModelsConfig,
        effective: Arc<EffectiveConfig>,
        validation_config: ValidationConfig,
        client: Arc<dyn ModelClient>,
        limiter: Arc<Semaphore>,
        cancel: CancelHandle,
    ) -> ThreadState {
        let mut state = ThreadState::new(thread_id);
        let mut context_builder = ContextBuilder::new(models.summary.clone());
        let validator = Arc::new(Validator::new(
            client.clone(),
            models.clone(),
            validation_config,
            limiter.clone(),
        ));
        let last_user_message = last_user_message(&user_messages);
        let mut pending_validation: Option<(u32, JoinHandle<ValidationVerdict>)> = None;
        let temperature = effective.temperature_for(thread_id);

        for i in 0..effective.max_steps {
            if cancel.is_cancelled() {
                state.status = ThreadStatus::Failed;
                state.failure_reason = Some("cancelled".to_string());
                break;
            }

            let msgs = match context_builder
                .build(&state.steps, &user_messages, i, client.as_ref(), &cancel)
                .await
            {
                Ok(m) => m,
                Err(e) => {
                    state.status = ThreadStatus::Failed;
                    state.failure_reason = Some(format!("context build failed: {e}"));
                    break;
                }
            };

            let started = Instant::now();
            let options = InvokeOptions {
                temperature: Some(temperature),
                max_tokens: None,
            };
            let _permit = match limiter.clone().acquire_owned().await {
                Ok(p) => p,
                Err(_) => {
                    state.status = ThreadStatus::Failed;
                    state.failure_reason = Some("concurrency limiter closed".to_string());
                    break;
                }
            };
            let invocation = client.invoke(&models.main, &msgs, &options, &cancel).await;
            drop(_permit);

            let body = match invocation {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(thread_id, step = i, error = %e, "main model call failed, thread terminating");
                    state.status = ThreadStatus::Failed;
                    state.failure_reason = Some(format!("main model call failed: {e}"));
                    break;
                }
            };
            let elapsed = started.elapsed();

            let done = is_terminal(&body, &effective.termination_marker);
            let step = Step {
                index: i,
                body: body.clone(),
                done,
                verdict: ValidationVerdict::pending(),
                elapsed,
            };
            state.steps.push(step);

            if effective.validate {
                if let Some((idx, handle)) = pending_validation.take() {
                    attach_verdict(&mut state, idx, handle).await;
                }
                let validator = validator.clone();
                let cancel_clone = cancel.clone();
                let body_clone = body.clone();
                let question = last_user_message.clone();
                let handle = tokio::spawn(async move {
                    validator.validate(&body_clone, &question, &cancel_clone).await
                });
                pending_validation = Some((i, handle));
            }

            if done {
                if let Some((idx, handle)) = pending_validation.take() {
                    attach_verdict(&mut state, idx, handle).await;
                }
                state.status = ThreadStatus::Completed;
                tracing::info!(thread_id, steps = state.steps.len(), "thread completed");
                break;
            }
        }

        if state.status == ThreadStatus::Running {
            // Step cap reached without a terminal step: spec treats the cap
            // as a legitimate stopping condition, not a failure.
            if let Some((idx, handle)) = pending_validation.take() {
                attach_verdict(&mut state, idx, handle).await;
            }
            state.status = ThreadStatus::Completed;
        }

        state
    }
}

async fn attach_verdict(state: &mut ThreadState, index: u32, handle: JoinHandle<ValidationVerdict>) {
    let verdict = match handle.await {
        Ok(v) => v,
        Err(_) => return, // validator task panicked/cancelled; leave verdict pending
    };
    if let Some(step) = state.steps.iter_mut().find(|s| s.index == index) {
        step.verdict = verdict;
    }
}

fn last_user_message(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.clone())
        .unwrap_or_default()
}

/// Termination predicate (spec §4.2): the sentinel marker appears in the
/// step body, or the continuation is empty. Pure function over step text.
fn is_terminal(body: &str, marker: &str) -> bool {
    body.trim().is_empty() || body.contains(marker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_client::{MockModelClient, ScriptedReply};
    use crate::types::VerdictOutcome;

    fn models() -> ModelsConfig {
        ModelsConfig {
            main: "main-model".into(),
            fusion: "fusion-model".into(),
            summary: "summary-model".into(),
            counterexample: "ce-model".into(),
            vote: "vote-model".into(),
        }
    }

    #[tokio::test]
    async fn single_step_terminates_on_marker() {
        let mock = Arc::new(MockModelClient::new());
        mock.script(
            "main-model",
            vec![ScriptedReply::Text("The answer is 42. <END>".into())],
        )
        .await;
        let effective = Arc::new(EffectiveConfig::from_config(
            &ThinkingConfig::default(),
            false,
            0.7,
            Some(1),
            None,
        ));
        let state = ThinkingThread::run(
            0,
            Arc::new(vec![ChatMessage::user("what is the answer?")]),
            models(),
            effective,
            ValidationConfig::default(),
            mock,
            Arc::new(Semaphore::new(32)),
            CancelHandle::new(),
        )
        .await;

        assert_eq!(state.status, ThreadStatus::Completed);
        assert_eq!(state.steps.len(), 1);
        assert!(state.steps[0].done);
        assert_eq!(state.final_answer(), Some("The answer is 42. <END>"));
    }

    #[tokio::test]
    async fn two_steps_second_is_flagged() {
        let mock = Arc::new(MockModelClient::new());
        mock.script(
            "main-model",
            vec![
                ScriptedReply::Text("partial".into()),
                ScriptedReply::Text("final. <END>".into()),
            ],
        )
        .await;
        mock.script("ce-model", vec![ScriptedReply::Text("flaw".into())]).await;
        mock.script("vote-model", vec![ScriptedReply::Text("counter".into())]).await;

        let effective = Arc::new(EffectiveConfig::from_config(
            &ThinkingConfig::default(),
            true,
            0.7,
            Some(1),
            None,
        ));
        let state = ThinkingThread::run(
            0,
            Arc::new(vec![ChatMessage::user("question")]),
            models(),
            effective,
            ValidationConfig::default(),
            mock,
            Arc::new(Semaphore::new(32)),
            CancelHandle::new(),
        )
        .await;

        assert_eq!(state.status, ThreadStatus::Completed);
        assert_eq!(state.steps.len(), 2);
        assert_eq!(state.steps[0].verdict.outcome, VerdictOutcome::Flagged);
        assert_eq!(state.flagged_step_count(), 1);
    }

    #[tokio::test]
    async fn main_call_failure_fails_the_thread() {
        let mock = Arc::new(MockModelClient::new());
        mock.script("main-model", vec![ScriptedReply::Error]).await;
        let effective = Arc::new(EffectiveConfig::from_config(
            &ThinkingConfig::default(),
            false,
            0.7,
            Some(1),
            None,
        ));
        let state = ThinkingThread::run(
            0,
            Arc::new(vec![ChatMessage::user("q")]),
            models(),
            effective,
            ValidationConfig::default(),
            mock,
            Arc::new(Semaphore::new(32)),
            CancelHandle::new(),
        )
        .await;
        assert_eq!(state.status, ThreadStatus::Failed);
        assert!(state.steps.is_empty());
    }

    #[tokio::test]
    async fn step_cap_reached_without_marker_still_completes() {
        let mock = Arc::new(MockModelClient::new());
        mock.script("main-model", vec![ScriptedReply::Text("still thinking".into())])
            .await;
        let mut thinking = ThinkingConfig::default();
        thinking.max_steps = 2;
        let effective = Arc::new(EffectiveConfig::from_config(&thinking, false, 0.7, Some(1), None));
        let state = ThinkingThread::run(
            0,
            Arc::new(vec![ChatMessage::user("q")]),
            models(),
            effective,
            ValidationConfig::default(),
            mock,
            Arc::new(Semaphore::new(32)),
            CancelHandle::new(),
        )
        .await;
        assert_eq!(state.status, ThreadStatus::Completed);
        assert_eq!(state.steps.len(), 2);
        assert!(!state.steps.last().unwrap().done);
    }
}
