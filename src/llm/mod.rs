//! Text-generation gateway
//!
//! Wraps the external generative model behind the `TextGenerator` trait and
//! turns its raw completion into a JSON value. The backend is asked for JSON at
//! low temperature, but nothing here trusts it: every completion goes through
//! [`extract_json`] before the agents see it.
//!
//! No retries happen at this layer; agents decide how to degrade.

pub mod extract;
pub mod gemini;

pub use extract::extract_json;
pub use gemini::GeminiGenerator;

use crate::{FlowsmithError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;

/// One system + user instruction pair
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system: String,
    pub user: String,
}

impl GenerationRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// A backend that produces raw text for a request
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion. Transport and backend failures are `Generation` errors.
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

/// Generator front-end that returns parsed JSON
#[derive(Clone)]
pub struct Gateway {
    generator: Arc<dyn TextGenerator>,
}

impl Gateway {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Generate and parse a JSON value
    ///
    /// Fails with `Generation` when the backend call fails and with
    /// `MalformedOutput` when no JSON can be recovered from the text.
    pub async fn generate_json(&self, system: &str, user: &str) -> Result<Value> {
        let request = GenerationRequest::new(system, user);
        let text = self.generator.generate(&request).await.map_err(|e| match e {
            FlowsmithError::Generation(_) => e,
            other => FlowsmithError::generation(other.to_string()),
        })?;
        extract_json(&text)
    }
}

/// Replays a fixed list of completions, in order
///
/// Once the script is exhausted every call fails with a `Generation` error,
/// which drives the agents onto their deterministic fallbacks. Requests are
/// recorded for inspection.
#[derive(Default)]
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<std::result::Result<String, String>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful completion
    pub fn push_text(&self, text: impl Into<String>) -> &Self {
        self.responses.lock().push_back(Ok(text.into()));
        self
    }

    /// Queue a JSON completion
    pub fn push_json(&self, value: Value) -> &Self {
        self.push_text(value.to_string())
    }

    /// Queue a backend failure
    pub fn push_failure(&self, message: impl Into<String>) -> &Self {
        self.responses.lock().push_back(Err(message.into()));
        self
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }

    /// Completions not yet consumed
    pub fn remaining(&self) -> usize {
        self.responses.lock().len()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.requests.lock().push(request.clone());
        match self.responses.lock().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(FlowsmithError::generation(message)),
            None => Err(FlowsmithError::generation("no scripted response left")),
        }
    }
}

#[cfg(test)]
mod llm_test;
