//! OpenAI-compatible request/response shapes (spec §6).
//!
//! These types are the HTTP ingress surface this specification treats as
//! ambient plumbing (spec §1): they translate between the wire format and
//! the core's own [`crate::types::Request`]/[`crate::types::FinalAnswer`].

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::types::{ChatMessage, FinalAnswer, FusionStrategy, Request};

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionRequest {
    /// Accepted for OpenAI-compatibility; the core resolves the actual
    /// upstream model names from `Config.models`, not from this field.
    #[serde(default)]
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,

    #[serde(default, rename = "x_threads")]
    pub x_threads: Option<u32>,
    #[serde(default, rename = "x_validate")]
    pub x_validate: Option<bool>,
    #[serde(default, rename = "x_fusion")]
    pub x_fusion: Option<FusionStrategy>,
    #[serde(default, rename = "x_max_steps")]
    pub x_max_steps: Option<u32>,
}

impl ChatCompletionRequest {
    /// Translate the wire DTO into the core's `Request`, validating
    /// extension-field bounds (spec §6: out-of-range -> `BadRequest`).
    pub fn into_core_request(self) -> Result<Request, GatewayError> {
        if self.messages.is_empty() {
            return Err(GatewayError::BadRequest("messages must not be empty".to_string()));
        }
        if let Some(t) = self.x_threads {
            if !(1..=8).contains(&t) {
                return Err(GatewayError::BadRequest(format!(
                    "x_threads must be within 1..=8, got {t}"
                )));
            }
        }
        if let Some(m) = self.x_max_steps {
            if !(1..=50).contains(&m) {
                return Err(GatewayError::BadRequest(format!(
                    "x_max_steps must be within 1..=50, got {m}"
                )));
            }
        }

        Ok(Request {
            messages: self.messages,
            stream: self.stream,
            threads: self.x_threads,
            validate: self.x_validate,
            fusion: self.x_fusion,
            max_steps: self.x_max_steps,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatCompletionChoice>,
    pub usage_meta: UsageMeta,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionChoice {
    pub index: u32,
    pub message: ChatMessage,
    pub finish_reason: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageMeta {
    pub threads_completed: usize,
    pub threads_failed: usize,
    pub flagged_steps: usize,
}

impl ChatCompletionResponse {
    pub fn from_final_answer(request_id: String, model: String, answer: FinalAnswer) -> Self {
        Self {
            id: request_id,
            object: "chat.completion",
            created: chrono::Utc::now().timestamp(),
            model,
            choices: vec![ChatCompletionChoice {
                index: 0,
                message: ChatMessage::assistant(answer.text),
                finish_reason: "stop",
            }],
            usage_meta: UsageMeta {
                threads_completed: answer.threads_completed,
                threads_failed: answer.threads_failed,
                flagged_steps: answer.flagged_steps,
            },
        }
    }
}

/// OpenAI streaming delta shape, one per SSE `data:` frame.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatCompletionChunkChoice>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionChunkChoice {
    pub index: u32,
    pub delta: ChatCompletionDelta,
    pub finish_reason: Option<&'static str>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct ChatCompletionDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// OpenAI-compatible error body.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(rename = "type")]
    pub type_: &'static str,
}

impl ErrorBody {
    pub fn from_gateway_error(err: &GatewayError) -> Self {
        Self {
            error: ErrorDetail {
                message: err.user_message(),
                type_: err.type_str(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_threads() {
        let req = ChatCompletionRequest {
            model: None,
            messages: vec![ChatMessage::user("hi")],
            stream: false,
            x_threads: Some(9),
            x_validate: None,
            x_fusion: None,
            x_max_steps: None,
        };
        assert!(req.into_core_request().is_err());
    }

    #[test]
    fn accepts_absent_extension_fields() {
        let req = ChatCompletionRequest {
            model: Some("gpt-4o".to_string()),
            messages: vec![ChatMessage::user("hi")],
            stream: false,
            x_threads: None,
            x_validate: None,
            x_fusion: None,
            x_max_steps: None,
        };
        let core = req.into_core_request().unwrap();
        assert_eq!(core.threads, None);
        assert_eq!(core.messages.len(), 1);
    }
}
