//! Flowsmith - natural-language automation builder
//!
//! Turns a free-text request into a structured, executable workflow, reviews it,
//! runs it against a small set of integrations and schedules it for recurring
//! execution. The crate can be:
//! - Used as a library in other Rust applications
//! - Run as a CLI tool (`flowsmith` binary)
//! - Exposed as an HTTP API server
//!
//! # Architecture
//!
//! A prompt flows through the generation pipeline:
//! intent agent → flow builder → architect → integration reconciler → learning store.
//! Every stage degrades to a deterministic fallback when the text-generation
//! backend misbehaves, so the pipeline always answers with a flow and a verdict.
//!
//! Separately, the automation scheduler re-runs the integration logic of
//! persisted automations on a fixed interval.
//!
//! # Example
//!
//! ```rust,no_run
//! use flowsmith::config::Config;
//! use flowsmith::core::create_dependencies;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let deps = create_dependencies(&config).await?;
//!
//!     let outcome = deps.pipeline.generate("send the dollar rate on Telegram").await?;
//!     println!("{:?}", outcome.validation.score);
//!
//!     Ok(())
//! }
//! ```

// Core modules
pub mod constants;
pub mod error;
pub mod model;

// Unified operations shared by HTTP and CLI
pub mod core;

// Generation pipeline
pub mod agents;
pub mod llm;

// Execution components
pub mod engine;
pub mod integrations;
pub mod projects;
pub mod scheduler;

// Infrastructure
pub mod config;
pub mod secrets;
pub mod storage;
pub mod telemetry;

// Interface layers (all delegate to operations)
pub mod cli;
pub mod http;

// Utilities
pub mod utils;

// Re-exports for convenience
pub use error::{FlowsmithError, Result};
pub use model::{Flow, FlowNode, Intent, Validation};

/// Initialize logging for the application
///
/// `RUST_LOG` controls the filter; without it `default_filter` applies (see
/// [`config::Config::log_filter`]). `FLOWSMITH_LOG_FORMAT=json` switches to
/// one JSON object per line.
pub fn init_logging(default_filter: &str) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let json = std::env::var(constants::ENV_LOG_FORMAT).is_ok_and(|v| v == "json");

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
