//! `gateway_core`: the reasoning orchestrator at the heart of the ensemble
//! gateway.
//!
//! This crate implements the four subsystems that define the system's
//! engineering: the fan-out/fan-in [`orchestrator`], the per-step
//! adversarial [`validator`], the sliding-window [`context`] compressor,
//! and the [`fusion`] stage. Everything else — HTTP ingress, YAML/env
//! configuration, structured logging, SSE framing — is ambient plumbing
//! implemented in [`server`] and [`logging`] so the crate is a complete,
//! runnable gateway, but it is secondary to the four core subsystems above.

pub mod cancel;
pub mod config;
pub mod context;
pub mod error;
pub mod fusion;
pub mod logging;
pub mod model_client;
pub mod orchestrator;
pub mod retry;
pub mod server;
pub mod thread;
pub mod types;
pub mod validator;

pub use cancel::CancelHandle;
pub use config::Config;
pub use error::{GatewayError, Result};
pub use model_client::{HttpModelClient, ModelClient, MockModelClient};
pub use orchestrator::Orchestrator;
pub use types::{ChatMessage, FinalAnswer, FusionStrategy, Request, StreamEvent};
