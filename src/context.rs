//! `ContextBuilder`: pure-ish function turning a thread's step history into
//! the message list fed to the *next* step (spec §4.3).
//!
//! The only impurity is the middle-range summarization call, which is why
//! `build` takes a `ModelClient` and is `async`; the compression policy
//! itself (which steps are kept full vs. summarized) is pure arithmetic over
//! `history.len()`.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;

use lru::LruCache;

use crate::cancel::CancelHandle;
use crate::error::GatewayError;
use crate::model_client::{InvokeOptions, ModelClient};
use crate::types::{ChatMessage, Step};

const DEFAULT_CACHE_CAPACITY: usize = 16;

/// Per-thread context builder. Holds a small LRU cache memoizing middle-range
/// summaries keyed by the identity of the range (index bounds + content
/// hash), scoped to a single request (a fresh instance is created per
/// `ThinkingThread`, never shared across requests or threads — the core
/// stays stateless across requests per spec §1).
pub struct ContextBuilder {
    summary_cache: LruCache<(u32, u32, u64), String>,
    summary_model: String,
}

impl ContextBuilder {
    pub fn new(summary_model: impl Into<String>) -> Self {
        Self {
            summary_cache: LruCache::new(NonZeroUsize::new(DEFAULT_CACHE_CAPACITY).unwrap()),
            summary_model: summary_model.into(),
        }
    }

    /// Build the message list for step `next_index`, given the thread's
    /// history so far (exactly `next_index` steps long) and the original
    /// user messages.
    pub async fn build(
        &mut self,
        history: &[Step],
        user_messages: &[ChatMessage],
        next_index: u32,
        client: &dyn ModelClient,
        cancel: &CancelHandle,
    ) -> Result<Vec<ChatMessage>, GatewayError> {
        let k = next_index as usize;
        debug_assert_eq!(history.len(), k, "ContextBuilder expects exactly k steps of history");

        let mut msgs = Vec::with_capacity(user_messages.len() + 4);
        msgs.extend_from_slice(user_messages);

        match k {
            0 => {}
            1 => msgs.push(ChatMessage::assistant(history[0].body.clone())),
            2 => {
                msgs.push(ChatMessage::assistant(history[0].body.clone()));
                msgs.push(ChatMessage::assistant(history[1].body.clone()));
            }
            _ => {
                msgs.push(ChatMessage::assistant(history[0].body.clone()));
                let middle = &history[1..k - 2];
                let summary = self.summarize(middle, client, cancel).await?;
                msgs.push(ChatMessage::assistant(summary));
                msgs.push(ChatMessage::assistant(history[k - 2].body.clone()));
                msgs.push(ChatMessage::assistant(history[k - 1].body.clone()));
            }
        }

        Ok(msgs)
    }

    async fn summarize(
        &mut self,
        middle: &[Step],
        client: &dyn ModelClient,
        cancel: &CancelHandle,
    ) -> Result<String, GatewayError> {
        let key = cache_key(middle);
        if let Some(cached) = self.summary_cache.get(&key) {
            return Ok(cached.clone());
        }

        let prompt = summary_prompt(middle);
        let messages = vec![ChatMessage::user(prompt)];
        let summary = client
            .invoke(
                &self.summary_model,
                &messages,
                &InvokeOptions::default(),
                cancel,
            )
            .await?;

        self.summary_cache.put(key, summary.clone());
        Ok(summary)
    }
}

/// Identity of a middle range: its index bounds plus a content hash, so the
/// cache hits exactly when the unchanged-prefix fraction of the range is
/// unchanged (spec §4.3).
fn cache_key(middle: &[Step]) -> (u32, u32, u64) {
    if middle.is_empty() {
        return (0, 0, 0);
    }
    let start = middle.first().unwrap().index;
    let end = middle.last().unwrap().index;
    let mut hasher = DefaultHasher::new();
    for step in middle {
        step.body.hash(&mut hasher);
    }
    (start, end, hasher.finish())
}

fn summary_prompt(middle: &[Step]) -> String {
    let mut prompt = String::from(
        "Summarize the following intermediate reasoning steps concisely, \
         preserving any conclusions that later steps depend on:\n\n",
    );
    for step in middle {
        prompt.push_str(&format!("Step {}: {}\n", step.index, step.body));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_client::{MockModelClient, ScriptedReply};
    use crate::types::ValidationVerdict;
    use std::time::Duration;

    fn step(index: u32, body: &str) -> Step {
        Step {
            index,
            body: body.to_string(),
            done: false,
            verdict: ValidationVerdict::pending(),
            elapsed: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn k_zero_returns_only_user_messages() {
        let mut builder = ContextBuilder::new("summary-model");
        let client = MockModelClient::new();
        let user = vec![ChatMessage::user("hello")];
        let msgs = builder
            .build(&[], &user, 0, &client, &CancelHandle::new())
            .await
            .unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].content, "hello");
    }

    #[tokio::test]
    async fn k_one_appends_single_assistant_step() {
        let mut builder = ContextBuilder::new("summary-model");
        let client = MockModelClient::new();
        let user = vec![ChatMessage::user("hello")];
        let history = vec![step(0, "first")];
        let msgs = builder
            .build(&history, &user, 1, &client, &CancelHandle::new())
            .await
            .unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[1].content, "first");
    }

    #[tokio::test]
    async fn k_at_least_three_produces_exactly_four_extra_messages() {
        let mut builder = ContextBuilder::new("summary-model");
        let client = MockModelClient::new();
        client
            .script("summary-model", vec![ScriptedReply::Text("mid summary".into())])
            .await;
        let user = vec![ChatMessage::user("hello"), ChatMessage::user("world")];
        let history = vec![
            step(0, "first"),
            step(1, "middle-a"),
            step(2, "middle-b"),
            step(3, "second-to-last"),
            step(4, "last"),
        ];
        let msgs = builder
            .build(&history, &user, 5, &client, &CancelHandle::new())
            .await
            .unwrap();
        assert_eq!(msgs.len(), user.len() + 4);
        assert_eq!(msgs[user.len()].content, "first");
        assert_eq!(msgs[user.len() + 1].content, "mid summary");
        assert_eq!(msgs[user.len() + 2].content, "second-to-last");
        assert_eq!(msgs[user.len() + 3].content, "last");
    }

    #[tokio::test]
    async fn unchanged_prefix_hits_the_summary_cache() {
        let mut builder = ContextBuilder::new("summary-model");
        let client = MockModelClient::new();
        client
            .script(
                "summary-model",
                vec![ScriptedReply::Text("cached summary".into())],
            )
            .await;
        let user = vec![ChatMessage::user("hello")];
        let history = vec![
            step(0, "first"),
            step(1, "middle-a"),
            step(2, "second-to-last"),
            step(3, "last"),
        ];
        let _ = builder
            .build(&history, &user, 4, &client, &CancelHandle::new())
            .await
            .unwrap();
        assert_eq!(client.call_count(), 1);

        // Same middle range content -> cache hit, no second summary call.
        let _ = builder
            .build(&history, &user, 4, &client, &CancelHandle::new())
            .await
            .unwrap();
        assert_eq!(client.call_count(), 1);
    }
}
