//! Core operations module using attribute macros
//!
//! This module contains all Flowsmith operations organized by group.
//! Each operation uses #[operation] and #[operation_group] macros for metadata,
//! and the HTTP router and the CLI are both generated from that metadata.

pub mod automations;
pub mod credentials;
pub mod execution;
pub mod pipeline;
pub mod projects;
pub mod saved_flows;
pub mod system;

// Operation groups are available as modules
// (not re-exported to avoid namespace pollution)

use crate::agents::{LearningStore, Pipeline};
use crate::config::Config;
use crate::engine::FlowExecutor;
use crate::integrations::{CurrencyProvider, IntegrationReconciler, TelegramClient};
use crate::llm::{Gateway, GeminiGenerator, TextGenerator};
use crate::scheduler::{AutomationStore, Scheduler};
use crate::secrets::{EnvSecretsProvider, SecretsProvider};
use crate::storage::{ConfigurationStorage, ProjectStorage, SavedFlowStorage, Storage};
use crate::{FlowsmithError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Dependencies that operations need access to
#[derive(Clone)]
pub struct Dependencies {
    pub config: Arc<Config>,
    pub storage: Arc<dyn Storage>,
    pub secrets: Arc<dyn SecretsProvider>,
    pub gateway: Gateway,
    pub currency: Arc<CurrencyProvider>,
    pub telegram: Arc<TelegramClient>,
    pub pipeline: Arc<Pipeline>,
    pub executor: Arc<FlowExecutor>,
    pub scheduler: Scheduler,
}

/// Metadata for an operation (HTTP routes, CLI patterns, etc.)
#[derive(Debug, Clone)]
pub struct OperationMetadata {
    pub name: &'static str,
    pub description: &'static str,
    pub group: &'static str,
    pub http_method: Option<&'static str>,
    pub http_path: Option<&'static str>,
    pub cli_pattern: Option<&'static str>,
    pub schema: serde_json::Map<String, serde_json::Value>,
}

/// Trait for providing operation metadata
pub trait HasMetadata {
    fn metadata() -> OperationMetadata;
}

/// Core trait for all operations
#[async_trait]
pub trait Operation: Send + Sync + HasMetadata {
    type Input: for<'de> Deserialize<'de> + Send;
    type Output: Serialize + Send;

    async fn execute(&self, input: Self::Input) -> Result<Self::Output>;
}

/// Registry of all operations with dependency injection
pub struct OperationRegistry {
    operations: HashMap<String, Box<dyn OperationExecutor>>,
    metadata: HashMap<String, OperationMetadata>,
    dependencies: Arc<Dependencies>,
}

#[async_trait]
trait OperationExecutor: Send + Sync {
    async fn execute_json(&self, input: Value) -> Result<Value>;
}

impl OperationRegistry {
    pub fn new(dependencies: Dependencies) -> Self {
        let deps = Arc::new(dependencies);
        let mut registry = Self {
            operations: HashMap::new(),
            metadata: HashMap::new(),
            dependencies: deps.clone(),
        };

        // Auto-register all operations by group
        pipeline::pipeline::register_all(&mut registry, deps.clone());
        execution::execution::register_all(&mut registry, deps.clone());
        automations::automations::register_all(&mut registry, deps.clone());
        saved_flows::saved_flows::register_all(&mut registry, deps.clone());
        projects::projects::register_all(&mut registry, deps.clone());
        credentials::credentials::register_all(&mut registry, deps.clone());
        system::system::register_all(&mut registry, deps.clone());

        registry
    }

    fn register<Op: Operation + 'static>(&mut self, op: Op, name: &str) {
        self.metadata.insert(name.to_string(), Op::metadata());
        self.operations
            .insert(name.to_string(), Box::new(OperationWrapper(op)));
    }

    pub async fn execute(&self, name: &str, input: Value) -> Result<Value> {
        let op = self
            .operations
            .get(name)
            .ok_or_else(|| FlowsmithError::config(format!("Operation not found: {}", name)))?;

        op.execute_json(input).await
    }

    pub fn get_dependencies(&self) -> Arc<Dependencies> {
        self.dependencies.clone()
    }

    /// Get all operation metadata for building interfaces
    pub fn get_all_metadata(&self) -> &HashMap<String, OperationMetadata> {
        &self.metadata
    }

    /// Get metadata for a specific operation
    pub fn get_metadata(&self, name: &str) -> Option<&OperationMetadata> {
        self.metadata.get(name)
    }
}

/// Metadata of every operation, without building any dependencies
pub fn all_operation_metadata() -> Vec<OperationMetadata> {
    [
        pipeline::pipeline::operation_metadata(),
        execution::execution::operation_metadata(),
        automations::automations::operation_metadata(),
        saved_flows::saved_flows::operation_metadata(),
        projects::projects::operation_metadata(),
        credentials::credentials::operation_metadata(),
        system::system::operation_metadata(),
    ]
    .concat()
}

struct OperationWrapper<Op>(Op);

#[async_trait]
impl<Op: Operation + 'static> OperationExecutor for OperationWrapper<Op> {
    async fn execute_json(&self, input: Value) -> Result<Value> {
        let typed_input: Op::Input = serde_json::from_value(input)
            .map_err(|e| FlowsmithError::validation(format!("Invalid input: {}", e)))?;
        let output = self.0.execute(typed_input).await?;
        Ok(serde_json::to_value(output)?)
    }
}

/// Numeric row id taken from a path segment; anything else is unknown
fn parse_row_id(raw: &str, entity: &str) -> Result<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| FlowsmithError::not_found(format!("{} not found", entity)))
}

/// Create Dependencies from configuration
///
/// Wires the real secrets provider and the Gemini backend. All presentation
/// layers should use this function to ensure consistent dependency
/// configuration.
pub async fn create_dependencies(config: &Config) -> Result<Dependencies> {
    let storage = crate::storage::create_storage_from_config(&config.storage).await?;
    let secrets: Arc<dyn SecretsProvider> = Arc::new(EnvSecretsProvider::new());
    let generator: Arc<dyn TextGenerator> =
        Arc::new(GeminiGenerator::new(config.llm.clone(), secrets.clone())?);

    assemble_dependencies(config.clone(), storage, secrets, generator).await
}

/// Build the object graph around the given storage, secrets and backend
///
/// Stored configurations are mirrored into the secrets provider first, so the
/// integrations see them from the first request on. Persisted automations are
/// loaded but not scheduled.
pub async fn assemble_dependencies(
    config: Config,
    storage: Arc<dyn Storage>,
    secrets: Arc<dyn SecretsProvider>,
    generator: Arc<dyn TextGenerator>,
) -> Result<Dependencies> {
    let data_dir = config.data_dir();
    tokio::fs::create_dir_all(&data_dir).await?;

    let stored = storage.list_configurations().await?;
    for entry in &stored {
        secrets.set_secret(&entry.key, &entry.value).await?;
    }
    tracing::debug!(count = stored.len(), "Stored configurations mirrored");

    let gateway = Gateway::new(generator);
    let currency = Arc::new(CurrencyProvider::new(&config.integrations)?);
    let telegram = Arc::new(TelegramClient::new(&config.integrations)?);

    let reconciler = Arc::new(IntegrationReconciler::new(
        currency.clone(),
        telegram.clone(),
        secrets.clone(),
    ));
    let learning = Arc::new(LearningStore::open(config.learning_path()));
    let pipeline = Arc::new(Pipeline::new(
        gateway.clone(),
        secrets.clone(),
        reconciler,
        learning,
    ));

    let executor = Arc::new(FlowExecutor::new(
        currency.clone(),
        telegram.clone(),
        secrets.clone(),
        gateway.clone(),
        config.outputs_dir(),
    ));

    let scheduler = Scheduler::new(
        AutomationStore::open(config.automations_path()),
        executor.clone(),
        secrets.clone(),
    );
    let loaded = scheduler.load().await?;
    if loaded > 0 {
        tracing::info!(count = loaded, "Automations loaded; start them to schedule");
    }

    Ok(Dependencies {
        config: Arc::new(config),
        storage,
        secrets,
        gateway,
        currency,
        telegram,
        pipeline,
        executor,
        scheduler,
    })
}
