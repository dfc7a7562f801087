//! Structured logging setup, initialized once at process startup.
//!
//! Every suspension point (`ModelClient::invoke`) and every state
//! transition (thread completed/failed, step validated, fusion strategy
//! chosen) is a `tracing` event or span; this module only wires up the
//! subscriber, following the same `tracing` + `tracing-subscriber`
//! (`env-filter`, `fmt`, `json`, `time`) stack used throughout the
//! retrieved corpus.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize the global `tracing` subscriber. `json` selects structured
/// JSON output (suitable for log aggregation) over human-readable text.
///
/// Idempotent-safe to call at most once per process; a second call is a
/// programming error and will panic, matching `tracing`'s own contract for
/// `set_global_default`.
pub fn init(json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        registry
            .with(fmt::layer().json().with_target(true).with_current_span(true))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}
