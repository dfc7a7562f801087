//! `Fusion`: collapses N completed thread outputs into one final answer
//! (spec §4.5).

use crate::cancel::CancelHandle;
use crate::config::ModelsConfig;
use crate::error::GatewayError;
use crate::model_client::{InvokeOptions, ModelClient};
use crate::types::{ChatMessage, FusionStrategy, ThreadState};

/// Merge `completed` thread states into a single answer text.
///
/// Only each thread's last step body is contributed (its "final answer");
/// validation metadata never reaches the fusion model — flagged steps are
/// reported out-of-band in response metadata. Thread order follows thread
/// id ascending for reproducibility.
pub async fn fuse(
    completed: &[&ThreadState],
    user_messages: &[ChatMessage],
    strategy: FusionStrategy,
    client: &dyn ModelClient,
    models: &ModelsConfig,
    concat_delimiter: &str,
    cancel: &CancelHandle,
) -> Result<String, GatewayError> {
    debug_assert!(!completed.is_empty(), "fusion input must contain >=1 completed thread");

    let mut ordered: Vec<&ThreadState> = completed.to_vec();
    ordered.sort_by_key(|t| t.thread_id);

    match strategy {
        FusionStrategy::Concat => Ok(concat(&ordered, concat_delimiter)),
        FusionStrategy::Intelligent => {
            match intelligent(&ordered, user_messages, client, models, cancel).await {
                Ok(text) => Ok(text),
                Err(e) => {
                    tracing::warn!(error = %e, "intelligent fusion failed, falling back to concat");
                    Ok(concat(&ordered, concat_delimiter))
                }
            }
        }
    }
}

/// Join each thread's final step body with `delimiter`, in thread-id order.
/// No per-thread header is added (spec §8 scenario 4: two-thread concat with
/// delimiter `"\n\n---\n\n"` yields exactly `"X<END>\n\n---\n\nY<END>"`, with
/// nothing else interposed).
fn concat(ordered: &[&ThreadState], delimiter: &str) -> String {
    ordered
        .iter()
        .map(|t| t.final_answer().unwrap_or_default())
        .collect::<Vec<_>>()
        .join(delimiter)
}

async fn intelligent(
    ordered: &[&ThreadState],
    user_messages: &[ChatMessage],
    client: &dyn ModelClient,
    models: &ModelsConfig,
    cancel: &CancelHandle,
) -> Result<String, GatewayError> {
    let prompt = intelligent_prompt(ordered, user_messages);
    let messages = vec![ChatMessage::user(prompt)];
    client
        .invoke(&models.fusion, &messages, &InvokeOptions::default(), cancel)
        .await
}

fn intelligent_prompt(ordered: &[&ThreadState], user_messages: &[ChatMessage]) -> String {
    let mut prompt = String::from(
        "Several independent reasoning threads produced final answers to the same question. \
         Extract the conclusions they share, integrate each thread's unique insights, and \
         resolve any contradictions into one coherent answer.\n\n",
    );
    for msg in user_messages {
        prompt.push_str(&format!("[{}] {}\n", msg.role, msg.content));
    }
    prompt.push_str("\nThread final answers:\n");
    for (i, thread) in ordered.iter().enumerate() {
        prompt.push_str(&format!(
            "Thread {}: {}\n",
            i,
            thread.final_answer().unwrap_or_default()
        ));
    }
    prompt
}
