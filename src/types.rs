//! Core data model: `Request`, `Step`, `ThreadState`, `ValidationVerdict`,
//! `FusionInput`, `FinalAnswer`.
//!
//! Invariants (see spec §3):
//! - I1: step indices are contiguous from 0 within a thread.
//! - I2: `ThreadState.status` transitions `running -> completed` or
//!   `running -> failed` exactly once.
//! - I3: `done=true` appears on at most one step per thread, and if present
//!   it is the last step.
//! - I4: validation may flag a step but never removes it, never blocks the
//!   thread.
//! - I5: fusion input holds at least one completed thread.

use serde::{Deserialize, Serialize};

/// One message in the inbound chat history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Fusion strategy selector (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionStrategy {
    Intelligent,
    Concat,
}

impl Default for FusionStrategy {
    fn default() -> Self {
        Self::Intelligent
    }
}

/// One inbound request to the orchestrator, after DTO translation.
#[derive(Debug, Clone)]
pub struct Request {
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    pub threads: Option<u32>,
    pub validate: Option<bool>,
    pub fusion: Option<FusionStrategy>,
    pub max_steps: Option<u32>,
}

impl Request {
    /// The last user message, used as the validator's `userQuestion`.
    pub fn last_user_message(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }
}

/// Outcome of a per-step validation pass (spec §3, §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictOutcome {
    Pending,
    Accepted,
    Flagged,
    Skipped,
}

/// A single vote cast during validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vote {
    Main,
    Counter,
    Abstain,
}

/// The tallied result of a step's adversarial validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub counterexamples: Vec<String>,
    pub votes: Vec<Vote>,
    pub outcome: VerdictOutcome,
}

impl ValidationVerdict {
    pub fn pending() -> Self {
        Self {
            counterexamples: Vec::new(),
            votes: Vec::new(),
            outcome: VerdictOutcome::Pending,
        }
    }
}

/// One unit of model-produced reasoning text within a thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub index: u32,
    pub body: String,
    pub done: bool,
    pub verdict: ValidationVerdict,
    pub elapsed: std::time::Duration,
}

/// A thread's lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadStatus {
    Running,
    Completed,
    Failed,
}

/// The full state of one reasoning thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadState {
    pub thread_id: usize,
    pub steps: Vec<Step>,
    pub status: ThreadStatus,
    pub failure_reason: Option<String>,
}

impl ThreadState {
    pub fn new(thread_id: usize) -> Self {
        Self {
            thread_id,
            steps: Vec::new(),
            status: ThreadStatus::Running,
            failure_reason: None,
        }
    }

    /// The last step's body, used by Fusion as "this thread's final answer".
    pub fn final_answer(&self) -> Option<&str> {
        self.steps.last().map(|s| s.body.as_str())
    }

    pub fn flagged_step_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.verdict.outcome == VerdictOutcome::Flagged)
            .count()
    }
}

/// Materialized input to the Fusion stage: only completed threads, plus the
/// original user messages.
pub struct FusionInput<'a> {
    pub completed_threads: Vec<&'a ThreadState>,
    pub user_messages: &'a [ChatMessage],
}

/// The single answer emitted per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalAnswer {
    pub text: String,
    pub threads_completed: usize,
    pub threads_failed: usize,
    pub flagged_steps: usize,
}

/// A chunk of streamed output, emitted after Fusion has produced the final
/// text (spec §4.1, §6).
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Delta(String),
    Done,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_user_message_finds_most_recent_user_turn() {
        let req = Request {
            messages: vec![
                ChatMessage::user("first"),
                ChatMessage::assistant("reply"),
                ChatMessage::user("second"),
            ],
            stream: false,
            threads: None,
            validate: None,
            fusion: None,
            max_steps: None,
        };
        assert_eq!(req.last_user_message(), "second");
    }

    #[test]
    fn flagged_step_count_ignores_accepted_and_skipped() {
        let mut thread = ThreadState::new(0);
        let mut flagged_verdict = ValidationVerdict::pending();
        flagged_verdict.outcome = VerdictOutcome::Flagged;
        let mut accepted_verdict = ValidationVerdict::pending();
        accepted_verdict.outcome = VerdictOutcome::Accepted;

        thread.steps.push(Step {
            index: 0,
            body: "a".into(),
            done: false,
            verdict: flagged_verdict,
            elapsed: std::time::Duration::ZERO,
        });
        thread.steps.push(Step {
            index: 1,
            body: "b".into(),
            done: true,
            verdict: accepted_verdict,
            elapsed: std::time::Duration::ZERO,
        });

        assert_eq!(thread.flagged_step_count(), 1);
        assert_eq!(thread.final_answer(), Some("b"));
    }
}
