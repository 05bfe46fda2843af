//! SQLite storage implementation
//!
//! Provides persistent storage for configurations, saved flows and workflow
//! projects using SQLite.

use crate::model::*;
use crate::storage::{ConfigurationStorage, NodePatch, ProjectPatch, ProjectStorage, SavedFlowStorage};
use crate::{FlowsmithError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;

const MEMORY_DSN: &str = ":memory:";

/// SQLite storage backend
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage
    ///
    /// # Arguments
    /// * `dsn` - Database path (e.g., "~/.flowsmith/flowsmith.db" or ":memory:" for in-memory)
    pub async fn new(dsn: &str) -> Result<Self> {
        // Prepend sqlite: prefix if not present and add create-if-missing option
        let connection_string = if dsn.starts_with("sqlite:") {
            if dsn.contains('?') {
                dsn.to_string()
            } else {
                format!("{}?mode=rwc", dsn)
            }
        } else {
            format!("sqlite:{}?mode=rwc", dsn)
        };

        let file_path = dsn.strip_prefix("sqlite:").unwrap_or(dsn);

        if file_path.contains("..") {
            return Err(FlowsmithError::config(
                "Database path cannot contain '..' (path traversal not allowed)",
            ));
        }

        let in_memory = file_path == MEMORY_DSN;
        if !in_memory
            && let Some(parent) = Path::new(file_path).parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        // every connection to :memory: is a separate database
        let max_connections = if in_memory { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(&connection_string)
            .await
            .map_err(|e| FlowsmithError::storage(format!("Failed to connect to SQLite: {}", e)))?;

        if !in_memory {
            sqlx::query("PRAGMA journal_mode = WAL")
                .execute(&pool)
                .await?;
        }
        sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&pool)
            .await?;
        sqlx::query("PRAGMA busy_timeout = 5000")
            .execute(&pool)
            .await?;
        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&pool)
            .await?;

        sqlx::migrate!("./migrations/sqlite")
            .run(&pool)
            .await
            .map_err(|e| FlowsmithError::storage(format!("Failed to run migrations: {}", e)))?;

        tracing::debug!(dsn = %file_path, "SQLite storage ready");
        Ok(Self { pool })
    }

    fn parse_configuration(row: &SqliteRow) -> Result<UserConfiguration> {
        Ok(UserConfiguration {
            id: row.try_get("id")?,
            key: row.try_get("key")?,
            value: row.try_get("value")?,
            integration: row.try_get("integration")?,
            created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?),
            updated_at: parse_timestamp(&row.try_get::<String, _>("updated_at")?),
        })
    }

    fn parse_saved_flow(row: &SqliteRow) -> Result<SavedFlow> {
        Ok(SavedFlow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            prompt: row.try_get("prompt")?,
            flow: serde_json::from_str(&row.try_get::<String, _>("flow_data")?)?,
            intent: serde_json::from_str(&row.try_get::<String, _>("intent_data")?)?,
            validation_score: row.try_get("validation_score")?,
            last_executed: parse_optional_timestamp(row.try_get("last_executed")?),
            execution_count: row.try_get("execution_count")?,
            created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?),
            updated_at: parse_timestamp(&row.try_get::<String, _>("updated_at")?),
        })
    }

    fn parse_project(row: &SqliteRow) -> Result<WorkflowProject> {
        Ok(WorkflowProject {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            canvas_zoom: row.try_get("canvas_zoom")?,
            canvas_offset_x: row.try_get("canvas_offset_x")?,
            canvas_offset_y: row.try_get("canvas_offset_y")?,
            is_active: row.try_get("is_active")?,
            last_executed: parse_optional_timestamp(row.try_get("last_executed")?),
            execution_count: row.try_get("execution_count")?,
            created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?),
            updated_at: parse_timestamp(&row.try_get::<String, _>("updated_at")?),
        })
    }

    fn parse_node(row: &SqliteRow) -> Result<WorkflowNode> {
        Ok(WorkflowNode {
            id: row.try_get("id")?,
            project_id: row.try_get("project_id")?,
            node_id: row.try_get("node_id")?,
            name: row.try_get("name")?,
            node_type: row.try_get("node_type")?,
            node_category: row.try_get("node_category")?,
            position_x: row.try_get("position_x")?,
            position_y: row.try_get("position_y")?,
            config: parse_config(&row.try_get::<String, _>("config")?),
            is_enabled: row.try_get("is_enabled")?,
            created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?),
            updated_at: parse_timestamp(&row.try_get::<String, _>("updated_at")?),
        })
    }

    fn parse_edge(row: &SqliteRow) -> Result<WorkflowEdge> {
        Ok(WorkflowEdge {
            id: row.try_get("id")?,
            project_id: row.try_get("project_id")?,
            edge_id: row.try_get("edge_id")?,
            source_node_id: row.try_get("source_node_id")?,
            target_node_id: row.try_get("target_node_id")?,
            source_port: row.try_get("source_port")?,
            target_port: row.try_get("target_port")?,
            label: row.try_get("label")?,
            created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?),
        })
    }
}

fn now_text() -> String {
    Utc::now().to_rfc3339()
}

#[inline]
fn parse_timestamp(text: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[inline]
fn parse_optional_timestamp(text: Option<String>) -> Option<DateTime<Utc>> {
    text.as_deref().map(parse_timestamp)
}

/// Node config column; anything that isn't a JSON object reads as empty
fn parse_config(text: &str) -> NodeConfig {
    serde_json::from_str(text).unwrap_or_default()
}

const NODE_COLUMNS: &str = "id, project_id, node_id, name, node_type, node_category, position_x, position_y, config, is_enabled, created_at, updated_at";

const EDGE_COLUMNS: &str = "id, project_id, edge_id, source_node_id, target_node_id, source_port, target_port, label, created_at";

#[async_trait]
impl ConfigurationStorage for SqliteStorage {
    async fn list_configurations(&self) -> Result<Vec<UserConfiguration>> {
        let rows = sqlx::query(
            "SELECT id, key, value, integration, created_at, updated_at
             FROM user_configurations ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::parse_configuration).collect()
    }

    async fn get_configuration(&self, key: &str) -> Result<Option<UserConfiguration>> {
        let row = sqlx::query(
            "SELECT id, key, value, integration, created_at, updated_at
             FROM user_configurations WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::parse_configuration).transpose()
    }

    async fn upsert_configuration(
        &self,
        key: &str,
        value: &str,
        integration: Option<&str>,
    ) -> Result<UserConfiguration> {
        let now = now_text();
        sqlx::query(
            "INSERT INTO user_configurations (key, value, integration, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                integration = COALESCE(excluded.integration, user_configurations.integration),
                updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(integration)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.get_configuration(key)
            .await?
            .ok_or_else(|| FlowsmithError::storage(format!("configuration '{}' vanished after upsert", key)))
    }

    async fn delete_configuration(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM user_configurations WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl SavedFlowStorage for SqliteStorage {
    async fn list_saved_flows(&self) -> Result<Vec<SavedFlow>> {
        let rows = sqlx::query(
            "SELECT id, name, description, prompt, flow_data, intent_data, validation_score,
                    last_executed, execution_count, created_at, updated_at
             FROM saved_flows ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut flows = Vec::with_capacity(rows.len());
        for row in rows {
            match Self::parse_saved_flow(&row) {
                Ok(flow) => flows.push(flow),
                Err(e) => tracing::warn!(error = %e, "Skipping unreadable saved flow"),
            }
        }
        Ok(flows)
    }

    async fn get_saved_flow(&self, id: i64) -> Result<Option<SavedFlow>> {
        let row = sqlx::query(
            "SELECT id, name, description, prompt, flow_data, intent_data, validation_score,
                    last_executed, execution_count, created_at, updated_at
             FROM saved_flows WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::parse_saved_flow).transpose()
    }

    async fn create_saved_flow(&self, flow: &NewSavedFlow) -> Result<SavedFlow> {
        let now = now_text();
        let result = sqlx::query(
            "INSERT INTO saved_flows
                (name, description, prompt, flow_data, intent_data, validation_score, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&flow.name)
        .bind(&flow.description)
        .bind(&flow.prompt)
        .bind(serde_json::to_string(&flow.flow)?)
        .bind(serde_json::to_string(&flow.intent)?)
        .bind(flow.validation_score)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.get_saved_flow(id)
            .await?
            .ok_or_else(|| FlowsmithError::storage(format!("saved flow {} vanished after insert", id)))
    }

    async fn delete_saved_flow(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM saved_flows WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_saved_flow_execution(&self, id: i64) -> Result<()> {
        let now = now_text();
        sqlx::query(
            "UPDATE saved_flows
             SET execution_count = execution_count + 1, last_executed = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&now)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ProjectStorage for SqliteStorage {
    async fn list_projects(&self) -> Result<Vec<WorkflowProject>> {
        let rows = sqlx::query(
            "SELECT id, name, description, canvas_zoom, canvas_offset_x, canvas_offset_y, is_active,
                    last_executed, execution_count, created_at, updated_at
             FROM workflow_projects ORDER BY updated_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::parse_project).collect()
    }

    async fn get_project(&self, id: i64) -> Result<Option<WorkflowProject>> {
        let row = sqlx::query(
            "SELECT id, name, description, canvas_zoom, canvas_offset_x, canvas_offset_y, is_active,
                    last_executed, execution_count, created_at, updated_at
             FROM workflow_projects WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::parse_project).transpose()
    }

    async fn create_project(&self, name: &str, description: &str) -> Result<WorkflowProject> {
        let now = now_text();
        let result = sqlx::query(
            "INSERT INTO workflow_projects (name, description, created_at, updated_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(name)
        .bind(description)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.get_project(id)
            .await?
            .ok_or_else(|| FlowsmithError::storage(format!("project {} vanished after insert", id)))
    }

    async fn update_project(
        &self,
        id: i64,
        patch: &ProjectPatch,
    ) -> Result<Option<WorkflowProject>> {
        let result = sqlx::query(
            "UPDATE workflow_projects SET
                name = COALESCE(?, name),
                description = COALESCE(?, description),
                canvas_zoom = COALESCE(?, canvas_zoom),
                canvas_offset_x = COALESCE(?, canvas_offset_x),
                canvas_offset_y = COALESCE(?, canvas_offset_y),
                updated_at = ?
             WHERE id = ?",
        )
        .bind(patch.name.as_deref())
        .bind(patch.description.as_deref())
        .bind(patch.canvas_zoom)
        .bind(patch.canvas_offset_x)
        .bind(patch.canvas_offset_y)
        .bind(now_text())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_project(id).await
    }

    async fn delete_project(&self, id: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM workflow_edges WHERE project_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM workflow_nodes WHERE project_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM workflow_projects WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_project_execution(&self, id: i64) -> Result<()> {
        let now = now_text();
        sqlx::query(
            "UPDATE workflow_projects
             SET execution_count = execution_count + 1, last_executed = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&now)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_nodes(&self, project_id: i64) -> Result<Vec<WorkflowNode>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM workflow_nodes WHERE project_id = ? ORDER BY position_x, id",
            NODE_COLUMNS
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::parse_node).collect()
    }

    async fn get_node(&self, project_id: i64, node_id: &str) -> Result<Option<WorkflowNode>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM workflow_nodes WHERE project_id = ? AND node_id = ?",
            NODE_COLUMNS
        ))
        .bind(project_id)
        .bind(node_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::parse_node).transpose()
    }

    async fn create_node(&self, project_id: i64, node: &NewWorkflowNode) -> Result<WorkflowNode> {
        let now = now_text();
        sqlx::query(
            "INSERT INTO workflow_nodes
                (project_id, node_id, name, node_type, node_category, position_x, position_y,
                 config, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(project_id)
        .bind(&node.node_id)
        .bind(&node.name)
        .bind(&node.node_type)
        .bind(&node.node_category)
        .bind(node.position_x)
        .bind(node.position_y)
        .bind(serde_json::to_string(&node.config)?)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.get_node(project_id, &node.node_id).await?.ok_or_else(|| {
            FlowsmithError::storage(format!("node '{}' vanished after insert", node.node_id))
        })
    }

    async fn update_node(
        &self,
        project_id: i64,
        node_id: &str,
        patch: &NodePatch,
    ) -> Result<Option<WorkflowNode>> {
        let config = patch.config.as_ref().map(serde_json::to_string).transpose()?;
        let result = sqlx::query(
            "UPDATE workflow_nodes SET
                name = COALESCE(?, name),
                position_x = COALESCE(?, position_x),
                position_y = COALESCE(?, position_y),
                config = COALESCE(?, config),
                is_enabled = COALESCE(?, is_enabled),
                updated_at = ?
             WHERE project_id = ? AND node_id = ?",
        )
        .bind(patch.name.as_deref())
        .bind(patch.position_x)
        .bind(patch.position_y)
        .bind(config)
        .bind(patch.is_enabled)
        .bind(now_text())
        .bind(project_id)
        .bind(node_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_node(project_id, node_id).await
    }

    async fn delete_node(&self, project_id: i64, node_id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM workflow_edges
             WHERE project_id = ? AND (source_node_id = ? OR target_node_id = ?)",
        )
        .bind(project_id)
        .bind(node_id)
        .bind(node_id)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query("DELETE FROM workflow_nodes WHERE project_id = ? AND node_id = ?")
            .bind(project_id)
            .bind(node_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn list_edges(&self, project_id: i64) -> Result<Vec<WorkflowEdge>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM workflow_edges WHERE project_id = ? ORDER BY id",
            EDGE_COLUMNS
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::parse_edge).collect()
    }

    async fn edge_exists(&self, project_id: i64, source: &str, target: &str) -> Result<bool> {
        let row = sqlx::query(
            "SELECT 1 FROM workflow_edges
             WHERE project_id = ? AND source_node_id = ? AND target_node_id = ?
             LIMIT 1",
        )
        .bind(project_id)
        .bind(source)
        .bind(target)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn create_edge(&self, project_id: i64, edge: &NewWorkflowEdge) -> Result<WorkflowEdge> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query(
            "SELECT 1 FROM workflow_edges
             WHERE project_id = ? AND source_node_id = ? AND target_node_id = ?
             LIMIT 1",
        )
        .bind(project_id)
        .bind(&edge.source_node_id)
        .bind(&edge.target_node_id)
        .fetch_optional(&mut *tx)
        .await?;

        if existing.is_some() {
            return Err(FlowsmithError::validation("Connection already exists"));
        }

        let result = sqlx::query(
            "INSERT INTO workflow_edges
                (project_id, edge_id, source_node_id, target_node_id, source_port, target_port,
                 label, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(project_id)
        .bind(&edge.edge_id)
        .bind(&edge.source_node_id)
        .bind(&edge.target_node_id)
        .bind(&edge.source_port)
        .bind(&edge.target_port)
        .bind(edge.label.as_deref())
        .bind(now_text())
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM workflow_edges WHERE id = ?",
            EDGE_COLUMNS
        ))
        .bind(result.last_insert_rowid())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Self::parse_edge(&row)
    }

    async fn delete_edge(&self, project_id: i64, edge_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM workflow_edges WHERE project_id = ? AND edge_id = ?")
            .bind(project_id)
            .bind(edge_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
