//! Axum SSE adapter: converts the orchestrator's `StreamEvent`s into
//! `axum::response::sse::Event`s.
//!
//! Adapted and narrowed from `siumai::server_adapters::axum::to_sse_response`
//! (a `ChatStream` -> `Sse<impl Stream>` converter keyed on
//! `ChatStreamEvent`), generalized here from that stream-event enum to our
//! own `StreamEvent` (`Delta`/`Done`).

use std::convert::Infallible;

use axum::response::sse::{Event, Sse};
use futures::Stream;

use crate::server::dto::{ChatCompletionChunk, ChatCompletionChunkChoice, ChatCompletionDelta};
use crate::types::StreamEvent;

/// Convert a finished sequence of `StreamEvent`s into an Axum SSE response,
/// wrapping each `Delta` in an OpenAI-compatible streaming chunk and
/// emitting the sentinel `data: [DONE]` frame last (spec §6).
pub fn to_sse_response(
    request_id: String,
    model: String,
    events: Vec<StreamEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send> {
    let created = chrono::Utc::now().timestamp();
    let stream = futures::stream::iter(events.into_iter().map(move |event| {
        let data = match event {
            StreamEvent::Delta(text) => {
                let chunk = ChatCompletionChunk {
                    id: request_id.clone(),
                    object: "chat.completion.chunk",
                    created,
                    model: model.clone(),
                    choices: vec![ChatCompletionChunkChoice {
                        index: 0,
                        delta: ChatCompletionDelta { content: Some(text) },
                        finish_reason: None,
                    }],
                };
                serde_json::to_string(&chunk).unwrap_or_else(|_| "{}".to_string())
            }
            StreamEvent::Done => "[DONE]".to_string(),
        };
        Ok(Event::default().data(data))
    }));
    Sse::new(stream)
}
