//! `Validator`: the per-step adversarial sub-pipeline (spec §4.4).
//!
//! Generates K counterexamples, runs V votes, and tallies the result into a
//! `ValidationVerdict`. Never mutates anything outside the verdict it
//! returns and never blocks the producing thread — callers dispatch
//! `validate` as a detached task and join it back in later.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;

use crate::cancel::CancelHandle;
use crate::config::{ModelsConfig, ValidationConfig};
use crate::model_client::{InvokeOptions, ModelClient};
use crate::types::{ChatMessage, ValidationVerdict, Vote, VerdictOutcome};

pub struct Validator {
    client: Arc<dyn ModelClient>,
    models: ModelsConfig,
    config: ValidationConfig,
    limiter: Arc<Semaphore>,
}

impl Validator {
    pub fn new(
        client: Arc<dyn ModelClient>,
        models: ModelsConfig,
        config: ValidationConfig,
        limiter: Arc<Semaphore>,
    ) -> Self {
        Self {
            client,
            models,
            config,
            limiter,
        }
    }

    /// Run the full two-phase validation pipeline for one step's text.
    pub async fn validate(&self, step_text: &str, user_question: &str, cancel: &CancelHandle) -> ValidationVerdict {
        let counterexamples = match self.generate_counterexamples(step_text, user_question, cancel).await {
            Some(c) => c,
            None => return skipped(),
        };

        let votes = match self.cast_votes(step_text, &counterexamples, user_question, cancel).await {
            Some(v) => v,
            None => return skipped(),
        };

        let main_count = votes.iter().filter(|v| **v == Vote::Main).count();
        let counter_count = votes.iter().filter(|v| **v == Vote::Counter).count();
        let outcome = if main_count >= counter_count {
            VerdictOutcome::Accepted
        } else {
            VerdictOutcome::Flagged
        };

        ValidationVerdict {
            counterexamples,
            votes,
            outcome,
        }
    }

    /// Phase 1. Returns `None` (caller should emit `skipped`) iff every one
    /// of the K calls failed. Individual failures otherwise surface as an
    /// empty-string counterexample — absence of a counterexample is not
    /// itself evidence, but the ballot still counts.
    async fn generate_counterexamples(
        &self,
        step_text: &str,
        user_question: &str,
        cancel: &CancelHandle,
    ) -> Option<Vec<String>> {
        let prompt = counterexample_prompt(step_text, user_question);
        let calls = (0..self.config.counterexamples).map(|_| {
            let prompt = prompt.clone();
            async move {
                let _permit = self.limiter.acquire().await.ok()?;
                let messages = vec![ChatMessage::user(prompt)];
                self.client
                    .invoke(
                        &self.models.counterexample,
                        &messages,
                        &InvokeOptions::default(),
                        cancel,
                    )
                    .await
                    .ok()
            }
        });

        let results = join_all(calls).await;
        if results.iter().all(Option::is_none) {
            return None;
        }
        Some(results.into_iter().map(Option::unwrap_or_default).collect())
    }

    /// Phase 2. Returns `None` (caller should emit `skipped`) iff every one
    /// of the V calls failed. Individual failures and unparseable replies
    /// both coerce to `abstain`.
    async fn cast_votes(
        &self,
        step_text: &str,
        counterexamples: &[String],
        user_question: &str,
        cancel: &CancelHandle,
    ) -> Option<Vec<Vote>> {
        let prompt = vote_prompt(step_text, counterexamples, user_question);
        let calls = (0..self.config.votes).map(|_| {
            let prompt = prompt.clone();
            async move {
                let _permit = self.limiter.acquire().await.ok()?;
                let messages = vec![ChatMessage::user(prompt)];
                self.client
                    .invoke(&self.models.vote, &messages, &InvokeOptions::default(), cancel)
                    .await
                    .ok()
            }
        });

        let results = join_all(calls).await;
        if results.iter().all(Option::is_none) {
            return None;
        }
        Some(
            results
                .into_iter()
                .map(|r| r.map(|text| self.parse_vote(&text)).unwrap_or(Vote::Abstain))
                .collect(),
        )
    }

    /// Resolve free-text vote replies against `validation.vote_keywords`
    /// (case-insensitive, first match wins, no match -> abstain). This is
    /// the explicit, configured resolution of the parsing Open Question in
    /// spec §9.
    fn parse_vote(&self, text: &str) -> Vote {
        let lower = text.to_lowercase();
        if self
            .config
            .vote_keywords
            .main
            .iter()
            .any(|kw| lower.contains(&kw.to_lowercase()))
        {
            return Vote::Main;
        }
        if self
            .config
            .vote_keywords
            .counter
            .iter()
            .any(|kw| lower.contains(&kw.to_lowercase()))
        {
            return Vote::Counter;
        }
        Vote::Abstain
    }
}

fn skipped() -> ValidationVerdict {
    ValidationVerdict {
        counterexamples: Vec::new(),
        votes: Vec::new(),
        outcome: VerdictOutcome::Skipped,
    }
}

fn counterexample_prompt(step_text: &str, user_question: &str) -> String {
    format!(
        "The user asked: {user_question}\n\nA reasoning step claims:\n{step_text}\n\n\
         Find the strongest possible flaw or counterexample to this step. If you cannot find one, say so plainly."
    )
}

fn vote_prompt(step_text: &str, counterexamples: &[String], user_question: &str) -> String {
    let mut prompt = format!(
        "The user asked: {user_question}\n\nA reasoning step claims:\n{step_text}\n\n\
         Counterexamples raised against it:\n"
    );
    for (i, ce) in counterexamples.iter().enumerate() {
        prompt.push_str(&format!("{}. {}\n", i + 1, ce));
    }
    prompt.push_str(
        "\nVote: does the original step (\"main\") hold up, or do the counterexamples (\"counter\") \
         defeat it? Reply with exactly one word: main, counter, or abstain.",
    );
    prompt
}
