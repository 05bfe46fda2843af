//! Core data models for Flowsmith
//!
//! Intents, flows, validations and the records derived from them. Types that
//! come back from the text-generation backend are parsed leniently: every field
//! has an explicit default so the rest of the system only sees fully-populated
//! values.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use serde_with::{DeserializeFromStr, skip_serializing_none};
use std::collections::{BTreeMap, HashSet};
use std::convert::Infallible;
use std::str::FromStr;

/// Open configuration map carried by nodes
pub type NodeConfig = Map<String, Value>;

// ============================================================================
// INTENT
// ============================================================================

/// What the automation mainly does
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, DeserializeFromStr, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Search,
    #[default]
    Transform,
    Send,
    Store,
    Hybrid,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Search => "search",
            ActionType::Transform => "transform",
            ActionType::Send => "send",
            ActionType::Store => "store",
            ActionType::Hybrid => "hybrid",
        }
    }
}

impl FromStr for ActionType {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "search" | "busca" => ActionType::Search,
            "send" | "envio" | "enviar" => ActionType::Send,
            "store" | "storage" | "armazenamento" | "armazenar" => ActionType::Store,
            "hybrid" | "hibrido" | "híbrido" => ActionType::Hybrid,
            _ => ActionType::Transform,
        })
    }
}

/// Where the automation's result goes
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, DeserializeFromStr, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputType {
    #[default]
    File,
    Api,
    Message,
    Database,
    Notification,
    Search,
}

impl OutputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputType::File => "file",
            OutputType::Api => "api",
            OutputType::Message => "message",
            OutputType::Database => "database",
            OutputType::Notification => "notification",
            OutputType::Search => "search",
        }
    }
}

impl FromStr for OutputType {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "api" => OutputType::Api,
            "message" | "mensagem" => OutputType::Message,
            "database" | "db" | "banco" | "banco_de_dados" => OutputType::Database,
            "notification" | "notificacao" | "notificação" => OutputType::Notification,
            "search" | "busca" => OutputType::Search,
            _ => OutputType::File,
        })
    }
}

/// Rough size of the requested automation
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, DeserializeFromStr, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    #[default]
    Medium,
    Complex,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::Simple => "simple",
            Complexity::Medium => "medium",
            Complexity::Complex => "complex",
        }
    }
}

impl FromStr for Complexity {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "simple" | "simples" => Complexity::Simple,
            "complex" | "complexa" | "complexo" => Complexity::Complex,
            _ => Complexity::Medium,
        })
    }
}

/// Credential contract of one integration, resolved against the live environment
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CredentialRequirement {
    #[serde(default)]
    pub integration: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub instructions: BTreeMap<String, String>,
    #[serde(default)]
    pub docs_url: String,
    #[serde(default)]
    pub note: Option<String>,
    /// True iff every key is present in the credential environment
    #[serde(default)]
    pub configured: bool,
}

/// Structured interpretation of a free-text automation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Intent {
    #[serde(default = "default_objective")]
    pub objective: String,
    #[serde(default)]
    pub action_type: ActionType,
    #[serde(default)]
    pub output_type: OutputType,
    #[serde(default)]
    pub output_format: Option<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub integrations: Vec<String>,
    #[serde(default)]
    pub needs_credentials: bool,
    #[serde(default)]
    pub required_credentials: Vec<CredentialRequirement>,
    #[serde(default)]
    pub complexity: Complexity,
    #[serde(default = "default_summary")]
    pub summary: String,
}

fn default_objective() -> String {
    crate::constants::DEFAULT_OBJECTIVE.to_string()
}

fn default_summary() -> String {
    crate::constants::DEFAULT_SUMMARY.to_string()
}

impl Default for Intent {
    fn default() -> Self {
        Self {
            objective: default_objective(),
            action_type: ActionType::default(),
            output_type: OutputType::default(),
            output_format: None,
            integrations: Vec::new(),
            needs_credentials: false,
            required_credentials: Vec::new(),
            complexity: Complexity::default(),
            summary: default_summary(),
        }
    }
}

impl Intent {
    pub fn has_integration(&self, id: &str) -> bool {
        self.integrations.iter().any(|i| i == id)
    }
}

/// Accepts a list of strings, a single string, or null.
///
/// Model output and hand-written clients disagree on the shape of id lists;
/// anything that isn't a string is dropped.
pub fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value_to_string_list(value.as_ref()))
}

/// Same coercion as [`string_list`], for values already parsed
pub fn value_to_string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

// ============================================================================
// FLOW
// ============================================================================

const TRIGGER_TYPES: &[&str] = &[
    "trigger", "manual", "schedule", "webhook", "event", "start", "cron", "interval",
];

const OUTPUT_TYPES: &[&str] = &[
    "output",
    "response",
    "result",
    "return",
    "file",
    "save",
    "write",
    "message",
    "notification",
];

/// Whether a node type starts a flow
pub fn is_trigger_type(node_type: &str) -> bool {
    TRIGGER_TYPES.contains(&node_type.trim().to_lowercase().as_str())
}

/// Whether a node type ends a flow
pub fn is_output_type(node_type: &str) -> bool {
    OUTPUT_TYPES.contains(&node_type.trim().to_lowercase().as_str())
}

/// One typed step of a flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FlowNode {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default = "default_node_type")]
    pub node_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub config: NodeConfig,
    /// Successor node ids
    #[serde(default, deserialize_with = "string_list")]
    pub next: Vec<String>,
}

fn default_node_type() -> String {
    "process".to_string()
}

impl FlowNode {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            name: name.into(),
            config: NodeConfig::new(),
            next: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: NodeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_next(mut self, next: Vec<String>) -> Self {
        self.next = next;
        self
    }

    pub fn is_trigger(&self) -> bool {
        is_trigger_type(&self.node_type)
    }

    pub fn is_output(&self) -> bool {
        is_output_type(&self.node_type)
    }
}

/// Directed edge between two nodes
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Connection {
    #[serde(alias = "source")]
    pub from: String,
    #[serde(alias = "target")]
    pub to: String,
    #[serde(default)]
    pub label: Option<String>,
}

impl Connection {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            label: None,
        }
    }
}

/// Directed graph of typed steps produced for an intent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Flow {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub nodes: Vec<FlowNode>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

impl Flow {
    pub fn has_trigger(&self) -> bool {
        self.nodes.iter().any(FlowNode::is_trigger)
    }

    pub fn has_output(&self) -> bool {
        self.nodes.iter().any(FlowNode::is_output)
    }

    pub fn node(&self, id: &str) -> Option<&FlowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Connections implied by the nodes' `next` lists, in node order
    pub fn connections_from_next(&self) -> Vec<Connection> {
        self.nodes
            .iter()
            .flat_map(|node| node.next.iter().map(|to| Connection::new(&node.id, to)))
            .collect()
    }

    /// `(from, to)` pairs that name a node id not present in the flow
    pub fn dangling_references(&self) -> Vec<(String, String)> {
        let ids: HashSet<&str> = self.nodes.iter().map(|n| n.id.as_str()).collect();
        let from_next = self.nodes.iter().flat_map(|node| {
            node.next
                .iter()
                .map(move |to| (node.id.clone(), to.clone()))
        });
        let from_connections = self
            .connections
            .iter()
            .map(|c| (c.from.clone(), c.to.clone()));

        from_next
            .chain(from_connections)
            .filter(|(from, to)| !ids.contains(from.as_str()) || !ids.contains(to.as_str()))
            .collect()
    }
}

// ============================================================================
// VALIDATION
// ============================================================================

/// Outcome of one integration check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

/// Per-integration connectivity detail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IntegrationStatus {
    pub integration: String,
    pub status: CheckStatus,
    pub message: String,
}

/// Architect verdict, enriched by the integration reconciler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Validation {
    pub approved: bool,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub score: u8,
    #[serde(default)]
    pub recommendation: String,
    #[serde(default)]
    pub integration_status: Vec<IntegrationStatus>,
    #[serde(default)]
    pub fixes_applied: Vec<String>,
}

// ============================================================================
// LEARNING
// ============================================================================

/// Immutable log entry for one generation attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningRecord {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub prompt: String,
    pub intent: Intent,
    pub flow: Flow,
    pub approved: bool,
    #[serde(default)]
    pub errors: Vec<String>,
    pub score: u8,
}

/// Aggregate counters over all learning records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningStats {
    pub total: u64,
    pub approved: u64,
    pub rejected: u64,
}

// ============================================================================
// INTEGRATION RESULTS
// ============================================================================

/// One currency quote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub name: String,
    pub bid: f64,
    pub change_pct: f64,
    pub high: f64,
    pub low: f64,
    pub quoted_at: String,
}

/// Which upstream produced a rate table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateSource {
    CentralBank,
    AwesomeApi,
}

/// Rates keyed by pair code (e.g. `USDBRL`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateSnapshot {
    pub rates: BTreeMap<String, Quote>,
    pub source: RateSource,
    pub fetched_at: DateTime<Utc>,
}

/// Telegram delivery receipt
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub chat_id: String,
    pub message_id: Option<i64>,
}

/// Outcome of one integration during an execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunResult {
    Currency {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<RateSnapshot>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Telegram {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Delivery>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    File {
        filename: String,
        filepath: String,
        content_preview: String,
        #[serde(default)]
        summary: String,
    },
    /// An execution step that failed outside any integration
    Error { error: String },
}

impl RunResult {
    pub fn is_error(&self) -> bool {
        match self {
            RunResult::Currency { error, .. } | RunResult::Telegram { error, .. } => {
                error.is_some()
            }
            RunResult::File { .. } => false,
            RunResult::Error { .. } => true,
        }
    }
}

// ============================================================================
// AUTOMATION
// ============================================================================

/// A flow bound to a recurring execution interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Automation {
    pub id: String,
    pub name: String,
    pub flow: Flow,
    pub intent: Intent,
    pub interval_minutes: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub run_count: u64,
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
    /// Only held in memory; the persisted copy always stores an empty list
    #[serde(default)]
    pub last_results: Vec<RunResult>,
    /// Saved flow this automation was scheduled from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_flow_id: Option<i64>,
}

/// Listing projection of an automation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationSummary {
    pub id: String,
    pub name: String,
    pub active: bool,
    pub interval_minutes: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub run_count: u64,
    pub integrations: Vec<String>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// PERSISTED ENTITIES
// ============================================================================

/// Stored credential/config value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserConfiguration {
    pub id: i64,
    pub key: String,
    pub value: String,
    pub integration: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Flow kept for later execution or scheduling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedFlow {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub prompt: String,
    pub flow: Flow,
    pub intent: Intent,
    pub validation_score: Option<i64>,
    pub last_executed: Option<DateTime<Utc>>,
    pub execution_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to insert a saved flow
#[derive(Debug, Clone)]
pub struct NewSavedFlow {
    pub name: String,
    pub description: String,
    pub prompt: String,
    pub flow: Flow,
    pub intent: Intent,
    pub validation_score: Option<i64>,
}

/// Visual-editor project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowProject {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub canvas_zoom: f64,
    pub canvas_offset_x: f64,
    pub canvas_offset_y: f64,
    pub is_active: bool,
    pub last_executed: Option<DateTime<Utc>>,
    pub execution_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Canvas node of a visual-editor project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub id: i64,
    pub project_id: i64,
    pub node_id: String,
    pub name: String,
    pub node_type: String,
    pub node_category: String,
    pub position_x: f64,
    pub position_y: f64,
    pub config: NodeConfig,
    pub is_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to insert a workflow node
#[derive(Debug, Clone)]
pub struct NewWorkflowNode {
    pub node_id: String,
    pub name: String,
    pub node_type: String,
    pub node_category: String,
    pub position_x: f64,
    pub position_y: f64,
    pub config: NodeConfig,
}

/// Edge between two canvas nodes, referencing their external `node_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEdge {
    pub id: i64,
    pub project_id: i64,
    pub edge_id: String,
    pub source_node_id: String,
    pub target_node_id: String,
    pub source_port: String,
    pub target_port: String,
    pub label: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields required to insert a workflow edge
#[derive(Debug, Clone)]
pub struct NewWorkflowEdge {
    pub edge_id: String,
    pub source_node_id: String,
    pub target_node_id: String,
    pub source_port: String,
    pub target_port: String,
    pub label: Option<String>,
}

/// Project with its nodes (ordered by x position) and edges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDetail {
    #[serde(flatten)]
    pub project: WorkflowProject,
    pub nodes: Vec<WorkflowNode>,
    pub edges: Vec<WorkflowEdge>,
}

#[cfg(test)]
#[path = "model_test.rs"]
mod model_test;
