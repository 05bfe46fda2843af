//! Generation pipeline agents
//!
//! Each agent wraps one gateway call and applies deterministic defaulting to
//! whatever comes back. None of them fail outward: a broken backend degrades
//! output quality, never availability.

pub mod architect;
pub mod builder;
pub mod intent;
pub mod learning;
pub mod pipeline;

pub use architect::ArchitectAgent;
pub use builder::FlowBuilderAgent;
pub use intent::IntentAgent;
pub use learning::LearningStore;
pub use pipeline::{Pipeline, PipelineOutcome, Verdict};
