//! The `ModelClient` capability: invoke a named upstream model with
//! `(messages, options)` and receive back complete text.
//!
//! This is the sole suspension point in the whole pipeline (spec §5): every
//! other operation (context arithmetic, verdict tallying, chunking) is
//! synchronous. `HttpModelClient` is the concrete, production
//! implementation, wrapping one process-wide `reqwest::Client` and the
//! fixed retry schedule of [`crate::retry::RetryPolicy`]. `MockModelClient`
//! is a deterministic test double used throughout the orchestrator's own
//! test suite and available to downstream integration tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use secrecy::ExposeSecret;
use tokio::sync::Mutex;

use crate::cancel::CancelHandle;
use crate::config::UpstreamConfig;
use crate::error::GatewayError;
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::types::ChatMessage;

/// Per-call sampling and shaping options (spec §6).
#[derive(Debug, Clone, Default)]
pub struct InvokeOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// Capability to invoke a named upstream model. Implementations own their
/// own retry/timeout policy internally; callers treat every call as a
/// single suspension point that either returns text or fails.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn invoke(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &InvokeOptions,
        cancel: &CancelHandle,
    ) -> Result<String, GatewayError>;
}

/// Production `ModelClient`: one shared `reqwest::Client`, one upstream
/// endpoint, OpenAI-compatible `/chat/completions` wire format. Model names
/// are opaque strings forwarded verbatim to the upstream `model` field.
pub struct HttpModelClient {
    http: reqwest::Client,
    upstream: UpstreamConfig,
    retry: RetryExecutor,
}

impl HttpModelClient {
    /// Construct from a process-wide `reqwest::Client` (connection pool
    /// shared for the process lifetime, per spec §5) and the resolved
    /// upstream configuration.
    pub fn new(http: reqwest::Client, upstream: UpstreamConfig) -> Self {
        Self {
            http,
            upstream,
            retry: RetryExecutor::new(RetryPolicy::default()),
        }
    }

    async fn invoke_once(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &InvokeOptions,
    ) -> Result<String, GatewayError> {
        let api_key = self.upstream.api_key()?;
        let url = format!(
            "{}/chat/completions",
            self.upstream.base_url.trim_end_matches('/')
        );

        let body = serde_json::json!({
            "model": model,
            "messages": messages,
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
            "stream": false,
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key.expose_secret())
            .json(&body)
            .timeout(self.upstream.timeout())
            .send()
            .await
            .map_err(|e| GatewayError::UpstreamUnavailable(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(GatewayError::UpstreamUnavailable(format!(
                "upstream returned {status}: {text}"
            )));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GatewayError::UpstreamUnavailable(format!("invalid response body: {e}")))?;

        payload
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                GatewayError::UpstreamUnavailable(
                    "response missing choices[0].message.content".to_string(),
                )
            })
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn invoke(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &InvokeOptions,
        cancel: &CancelHandle,
    ) -> Result<String, GatewayError> {
        if cancel.is_cancelled() {
            return Err(GatewayError::UpstreamUnavailable(
                "cancelled before dispatch".to_string(),
            ));
        }

        self.retry
            .execute(|| async {
                // Race the in-flight HTTP call against cancellation so an
                // abort is observed within one suspension-point granularity
                // (spec §5) instead of only between retries.
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(GatewayError::UpstreamUnavailable(
                        "cancelled mid-flight".to_string(),
                    )),
                    result = self.invoke_once(model, messages, options) => result,
                }
            })
            .await
    }
}

/// A scripted response for [`MockModelClient`]: either a fixed text or a
/// permanent failure, consumed one entry per call to a given model.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    Error,
}

/// Deterministic test double. Each model name owns its own FIFO queue of
/// scripted replies; calling `invoke` for a model pops the next entry. A
/// model with an empty queue falls back to echoing its last scripted reply
/// forever, so short scripts ("two steps then keep answering the same
/// thing") don't need padding.
#[derive(Default)]
pub struct MockModelClient {
    scripts: Mutex<std::collections::HashMap<String, VecDeque<ScriptedReply>>>,
    calls: AtomicUsize,
}

impl MockModelClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue scripted replies for a given model name.
    pub async fn script(&self, model: impl Into<String>, replies: Vec<ScriptedReply>) {
        self.scripts
            .lock()
            .await
            .insert(model.into(), VecDeque::from(replies));
    }

    /// Total number of `invoke` calls observed so far, across all models.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelClient for MockModelClient {
    async fn invoke(
        &self,
        model: &str,
        _messages: &[ChatMessage],
        _options: &InvokeOptions,
        cancel: &CancelHandle,
    ) -> Result<String, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if cancel.is_cancelled() {
            return Err(GatewayError::UpstreamUnavailable("cancelled".to_string()));
        }

        let mut scripts = self.scripts.lock().await;
        let queue = scripts
            .get_mut(model)
            .ok_or_else(|| GatewayError::UpstreamUnavailable(format!("no script for {model}")))?;

        let reply = if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue
                .front()
                .cloned()
                .ok_or_else(|| GatewayError::UpstreamUnavailable(format!("script for {model} exhausted")))?
        };

        match reply {
            ScriptedReply::Text(t) => Ok(t),
            ScriptedReply::Error => Err(GatewayError::UpstreamUnavailable(format!(
                "scripted failure for {model}"
            ))),
        }
    }
}

/// Convenience wrapper so tests can pass `Arc<dyn ModelClient>` around
/// without repeating the trait-object boilerplate.
pub fn arc_client<C: ModelClient + 'static>(client: C) -> Arc<dyn ModelClient> {
    Arc::new(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_client_replays_scripted_text_then_repeats_last() {
        let mock = MockModelClient::new();
        mock.script(
            "main",
            vec![
                ScriptedReply::Text("first".into()),
                ScriptedReply::Text("second".into()),
            ],
        )
        .await;
        let cancel = CancelHandle::new();
        let opts = InvokeOptions::default();

        let a = mock.invoke("main", &[], &opts, &cancel).await.unwrap();
        let b = mock.invoke("main", &[], &opts, &cancel).await.unwrap();
        let c = mock.invoke("main", &[], &opts, &cancel).await.unwrap();

        assert_eq!(a, "first");
        assert_eq!(b, "second");
        assert_eq!(c, "second");
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn mock_client_surfaces_scripted_errors() {
        let mock = MockModelClient::new();
        mock.script("flaky", vec![ScriptedReply::Error]).await;
        let cancel = CancelHandle::new();
        let result = mock
            .invoke("flaky", &[], &InvokeOptions::default(), &cancel)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn cancelled_handle_short_circuits_before_dispatch() {
        let mock = MockModelClient::new();
        mock.script("main", vec![ScriptedReply::Text("x".into())])
            .await;
        let cancel = CancelHandle::new();
        cancel.cancel();
        let result = mock
            .invoke("main", &[], &InvokeOptions::default(), &cancel)
            .await;
        assert!(result.is_err());
    }
}
