//! Structured configuration, loaded once at process startup.
//!
//! Recognized options mirror spec §6 exactly. Unknown keys are rejected at
//! load time (`deny_unknown_fields`) so a typo in the document fails fast
//! instead of silently falling back to a default. Secrets (upstream API
//! keys) are never stored in the document itself — the document only names
//! the environment variable to read, and the actual value is wrapped in
//! `secrecy::SecretString` the moment it is read so it cannot be
//! accidentally logged or serialized.

use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::GatewayError;
use crate::types::FusionStrategy;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelsConfig {
    pub main: String,
    pub fusion: String,
    pub summary: String,
    pub counterexample: String,
    pub vote: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThinkingConfig {
    #[serde(default = "default_threads")]
    pub threads: u32,
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    #[serde(default = "default_termination_marker")]
    pub termination_marker: String,
}

fn default_threads() -> u32 {
    3
}
fn default_max_steps() -> u32 {
    15
}
fn default_termination_marker() -> String {
    "<END>".to_string()
}

impl Default for ThinkingConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            max_steps: default_max_steps(),
            termination_marker: default_termination_marker(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_k_or_v")]
    pub counterexamples: u32,
    #[serde(default = "default_k_or_v")]
    pub votes: u32,
    #[serde(default)]
    pub vote_keywords: VoteKeywords,
}

fn default_true() -> bool {
    true
}
fn default_k_or_v() -> u32 {
    3
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            counterexamples: default_k_or_v(),
            votes: default_k_or_v(),
            vote_keywords: VoteKeywords::default(),
        }
    }
}

/// Keyword sets used to parse free-text vote responses into
/// `{main, counter, abstain}` (spec §9 open question — resolved here as
/// explicit, documented configuration rather than a hardcoded regex).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VoteKeywords {
    #[serde(default = "default_main_keywords")]
    pub main: Vec<String>,
    #[serde(default = "default_counter_keywords")]
    pub counter: Vec<String>,
}

fn default_main_keywords() -> Vec<String> {
    vec!["main".into(), "original".into(), "correct".into()]
}
fn default_counter_keywords() -> Vec<String> {
    vec!["counter".into(), "flaw".into(), "incorrect".into()]
}

impl Default for VoteKeywords {
    fn default() -> Self {
        Self {
            main: default_main_keywords(),
            counter: default_counter_keywords(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FusionConfig {
    #[serde(default)]
    pub strategy: FusionStrategy,
    #[serde(default = "default_concat_delimiter")]
    pub concat_delimiter: String,
}

fn default_concat_delimiter() -> String {
    "\n\n---\n\n".to_string()
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            strategy: FusionStrategy::default(),
            concat_delimiter: default_concat_delimiter(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConcurrencyConfig {
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

fn default_max_in_flight() -> usize {
    32
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub api_key_env: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Read the API key named by `api_key_env` from the process environment.
    pub fn api_key(&self) -> Result<SecretString, GatewayError> {
        std::env::var(&self.api_key_env)
            .map(SecretString::from)
            .map_err(|_| {
                GatewayError::ConfigError(format!(
                    "environment variable `{}` is not set",
                    self.api_key_env
                ))
            })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// The full configuration document.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub models: ModelsConfig,
    #[serde(default)]
    pub thinking: ThinkingConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub fusion: FusionConfig,
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// Parse a configuration document from its YAML text.
    pub fn from_yaml(text: &str) -> Result<Self, GatewayError> {
        serde_yaml::from_str(text)
            .map_err(|e| GatewayError::ConfigError(format!("invalid configuration: {e}")))
    }

    /// Load and parse a configuration document from disk.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, GatewayError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::ConfigError(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml(&text)
    }
}
