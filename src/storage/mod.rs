//! Relational storage for Flowsmith
//!
//! Configurations, saved flows and visual-editor projects live in SQLite.
//! Each entity group has its own trait; `Storage` is the umbrella the rest
//! of the crate depends on.

pub mod sqlite;

use crate::model::*;
use crate::{FlowsmithError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use sqlite::SqliteStorage;

/// Key/value configuration rows, mirrored into the secrets provider
#[async_trait]
pub trait ConfigurationStorage: Send + Sync {
    /// All configurations, oldest first
    async fn list_configurations(&self) -> Result<Vec<UserConfiguration>>;

    async fn get_configuration(&self, key: &str) -> Result<Option<UserConfiguration>>;

    /// Insert or update by key
    ///
    /// `integration` is only overwritten when provided.
    async fn upsert_configuration(
        &self,
        key: &str,
        value: &str,
        integration: Option<&str>,
    ) -> Result<UserConfiguration>;

    /// Returns false when the key did not exist
    async fn delete_configuration(&self, key: &str) -> Result<bool>;
}

/// Flows saved from the pipeline for later execution
#[async_trait]
pub trait SavedFlowStorage: Send + Sync {
    /// Newest first
    async fn list_saved_flows(&self) -> Result<Vec<SavedFlow>>;

    async fn get_saved_flow(&self, id: i64) -> Result<Option<SavedFlow>>;

    async fn create_saved_flow(&self, flow: &NewSavedFlow) -> Result<SavedFlow>;

    async fn delete_saved_flow(&self, id: i64) -> Result<bool>;

    /// Increment `execution_count` and stamp `last_executed`
    async fn record_saved_flow_execution(&self, id: i64) -> Result<()>;
}

/// Partial update of a project; `None` leaves a field untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub canvas_zoom: Option<f64>,
    pub canvas_offset_x: Option<f64>,
    pub canvas_offset_y: Option<f64>,
}

/// Partial update of a canvas node
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodePatch {
    pub name: Option<String>,
    pub position_x: Option<f64>,
    pub position_y: Option<f64>,
    pub config: Option<NodeConfig>,
    pub is_enabled: Option<bool>,
}

/// Visual-editor projects with their nodes and edges
///
/// Nodes and edges are addressed by their external ids (`node_id`,
/// `edge_id`) within a project, never by row id.
#[async_trait]
pub trait ProjectStorage: Send + Sync {
    /// Most recently updated first
    async fn list_projects(&self) -> Result<Vec<WorkflowProject>>;

    async fn get_project(&self, id: i64) -> Result<Option<WorkflowProject>>;

    async fn create_project(&self, name: &str, description: &str) -> Result<WorkflowProject>;

    async fn update_project(&self, id: i64, patch: &ProjectPatch)
    -> Result<Option<WorkflowProject>>;

    /// Deletes the project together with its nodes and edges
    async fn delete_project(&self, id: i64) -> Result<bool>;

    async fn record_project_execution(&self, id: i64) -> Result<()>;

    /// Ordered by `position_x`
    async fn list_nodes(&self, project_id: i64) -> Result<Vec<WorkflowNode>>;

    async fn get_node(&self, project_id: i64, node_id: &str) -> Result<Option<WorkflowNode>>;

    async fn create_node(&self, project_id: i64, node: &NewWorkflowNode) -> Result<WorkflowNode>;

    async fn update_node(
        &self,
        project_id: i64,
        node_id: &str,
        patch: &NodePatch,
    ) -> Result<Option<WorkflowNode>>;

    /// Deletes the node and every edge touching it
    async fn delete_node(&self, project_id: i64, node_id: &str) -> Result<bool>;

    async fn list_edges(&self, project_id: i64) -> Result<Vec<WorkflowEdge>>;

    async fn edge_exists(&self, project_id: i64, source: &str, target: &str) -> Result<bool>;

    /// Fails with a validation error when the source/target pair already exists
    async fn create_edge(&self, project_id: i64, edge: &NewWorkflowEdge) -> Result<WorkflowEdge>;

    async fn delete_edge(&self, project_id: i64, edge_id: &str) -> Result<bool>;

    /// Project with nodes and edges embedded
    async fn project_detail(&self, id: i64) -> Result<Option<ProjectDetail>> {
        let Some(project) = self.get_project(id).await? else {
            return Ok(None);
        };
        let nodes = self.list_nodes(id).await?;
        let edges = self.list_edges(id).await?;
        Ok(Some(ProjectDetail {
            project,
            nodes,
            edges,
        }))
    }
}

/// Complete storage trait combining all entity groups
pub trait Storage: ConfigurationStorage + SavedFlowStorage + ProjectStorage {}

impl<T> Storage for T where T: ConfigurationStorage + SavedFlowStorage + ProjectStorage {}

/// Create a storage backend from configuration
pub async fn create_storage_from_config(
    config: &crate::config::StorageConfig,
) -> Result<Arc<dyn Storage>> {
    match config.driver.as_str() {
        crate::constants::STORAGE_DRIVER_SQLITE => Ok(Arc::new(SqliteStorage::new(&config.dsn).await?)),
        other => Err(FlowsmithError::config(format!(
            "Unknown storage driver: {}. Supported: sqlite",
            other
        ))),
    }
}

#[cfg(test)]
mod sqlite_test;
