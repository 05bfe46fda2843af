//! Visual-editor projects
//!
//! Maps pipeline flows onto editor projects and back. Generated flows use a
//! loose vocabulary of node types ("process", "notify", "fetch", ...); the
//! editor only knows the types in [`NODE_TYPES`], so imports translate each
//! type through two fixed tables: one for the editor type, one for the
//! palette category.

use crate::model::{
    Connection, Flow, FlowNode, Intent, NewWorkflowEdge, NewWorkflowNode, ProjectDetail,
};
use crate::storage::ProjectStorage;
use crate::{FlowsmithError, Result};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::HashSet;

const DEFAULT_PROJECT_NAME: &str = "Imported flow";
const DEFAULT_PROJECT_DESCRIPTION: &str = "Flow generated by AI";
const DEFAULT_CATEGORY: &str = "data";

/// Horizontal layout of imported nodes
const IMPORT_ORIGIN_X: f64 = 150.0;
const IMPORT_STEP_X: f64 = 250.0;
const IMPORT_Y: f64 = 200.0;

const CATEGORY_MAP: &[(&str, &str)] = &[
    ("trigger", "trigger"),
    ("manual", "trigger"),
    ("schedule", "trigger"),
    ("webhook", "trigger"),
    ("event", "trigger"),
    ("start", "trigger"),
    ("cron", "trigger"),
    ("interval", "trigger"),
    ("process", "data"),
    ("search", "data"),
    ("transform", "data"),
    ("filter", "data"),
    ("merge", "data"),
    ("split", "data"),
    ("currency", "data"),
    ("api", "data"),
    ("fetch", "data"),
    ("get", "data"),
    ("read", "data"),
    ("condition", "flow"),
    ("if", "flow"),
    ("decision", "flow"),
    ("branch", "flow"),
    ("loop", "flow"),
    ("foreach", "flow"),
    ("for", "flow"),
    ("while", "flow"),
    ("wait", "flow"),
    ("delay", "flow"),
    ("switch", "flow"),
    ("error", "flow"),
    ("try", "flow"),
    ("catch", "flow"),
    ("telegram", "action"),
    ("email", "action"),
    ("mail", "action"),
    ("smtp", "action"),
    ("slack", "action"),
    ("whatsapp", "action"),
    ("http", "action"),
    ("httprequest", "action"),
    ("request", "action"),
    ("post", "action"),
    ("put", "action"),
    ("delete", "action"),
    ("patch", "action"),
    ("database", "action"),
    ("db", "action"),
    ("sql", "action"),
    ("query", "action"),
    ("integration", "action"),
    ("send", "action"),
    ("notify", "action"),
    ("notification", "action"),
    ("output", "output"),
    ("file", "output"),
    ("save", "output"),
    ("write", "output"),
    ("response", "output"),
    ("return", "output"),
    ("result", "output"),
    ("log", "output"),
    ("print", "output"),
    ("gemini", "ai"),
    ("prompt", "ai"),
    ("ai", "ai"),
    ("gpt", "ai"),
    ("openai", "ai"),
    ("llm", "ai"),
    ("generate", "ai"),
    ("analyze", "ai"),
];

const EDITOR_TYPE_MAP: &[(&str, &str)] = &[
    ("trigger", "manual"),
    ("start", "manual"),
    ("process", "transform"),
    ("output", "response"),
    ("result", "response"),
    ("return", "response"),
    ("integration", "http"),
    ("httprequest", "http"),
    ("request", "http"),
    ("api", "http"),
    ("fetch", "http"),
    ("get", "http"),
    ("post", "http"),
    ("put", "http"),
    ("delete", "http"),
    ("patch", "http"),
    ("if", "condition"),
    ("decision", "condition"),
    ("branch", "condition"),
    ("for", "loop"),
    ("while", "loop"),
    ("delay", "wait"),
    ("mail", "email"),
    ("smtp", "email"),
    ("db", "database"),
    ("sql", "database"),
    ("query", "database"),
    ("send", "telegram"),
    ("notify", "telegram"),
    ("notification", "telegram"),
    ("save", "file"),
    ("write", "file"),
    ("print", "log"),
    ("ai", "gemini"),
    ("gpt", "gemini"),
    ("openai", "gemini"),
    ("llm", "gemini"),
    ("generate", "gemini"),
    ("analyze", "gemini"),
    ("cron", "schedule"),
    ("interval", "schedule"),
    ("try", "error"),
    ("catch", "error"),
    ("read", "currency"),
];

fn normalized_type(node_type: &str) -> String {
    let lowered = node_type.trim().to_lowercase();
    if lowered.is_empty() {
        "manual".to_string()
    } else {
        lowered
    }
}

/// Palette category of a flow node type; unknown types are data nodes
pub fn category_for(node_type: &str) -> &'static str {
    let key = normalized_type(node_type);
    CATEGORY_MAP
        .iter()
        .find(|(from, _)| *from == key)
        .map(|(_, category)| *category)
        .unwrap_or(DEFAULT_CATEGORY)
}

/// Editor node type for a flow node type; unknown types pass through lowercased
pub fn editor_type_for(node_type: &str) -> String {
    let key = normalized_type(node_type);
    EDITOR_TYPE_MAP
        .iter()
        .find(|(from, _)| *from == key)
        .map(|(_, to)| to.to_string())
        .unwrap_or(key)
}

/// Node and edge rows an import would insert
#[derive(Debug, Clone)]
pub struct ImportPlan {
    pub name: String,
    pub description: String,
    pub nodes: Vec<NewWorkflowNode>,
    pub edges: Vec<NewWorkflowEdge>,
}

/// Lay out `flow` as editor rows without touching storage
///
/// Explicit connections become `edge_{i}`. Each `next` entry then adds
/// `edge_next_{node}_{j}` unless that pair is already connected. References
/// to unknown node ids are dropped.
pub fn plan_import(flow: &Flow, intent: &Intent) -> ImportPlan {
    let name = non_empty(&flow.name).unwrap_or(DEFAULT_PROJECT_NAME).to_string();
    let description = non_empty(&flow.description)
        .or_else(|| non_empty(&intent.summary))
        .unwrap_or(DEFAULT_PROJECT_DESCRIPTION)
        .to_string();

    let node_ids: Vec<String> = flow
        .nodes
        .iter()
        .enumerate()
        .map(|(i, node)| {
            non_empty(&node.id)
                .map(str::to_string)
                .unwrap_or_else(|| format!("node_{}", i))
        })
        .collect();

    let nodes = flow
        .nodes
        .iter()
        .zip(&node_ids)
        .enumerate()
        .map(|(i, (node, node_id))| NewWorkflowNode {
            node_id: node_id.clone(),
            name: non_empty(&node.name)
                .map(str::to_string)
                .unwrap_or_else(|| format!("Node {}", i + 1)),
            node_type: editor_type_for(&node.node_type),
            node_category: category_for(&node.node_type).to_string(),
            position_x: IMPORT_ORIGIN_X + IMPORT_STEP_X * i as f64,
            position_y: IMPORT_Y,
            config: node.config.clone(),
        })
        .collect();

    let known: HashSet<&str> = node_ids.iter().map(String::as_str).collect();
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut edges = Vec::new();
    let mut dropped = 0usize;

    for (i, conn) in flow.connections.iter().enumerate() {
        if conn.from.is_empty() || conn.to.is_empty() {
            continue;
        }
        if !known.contains(conn.from.as_str()) || !known.contains(conn.to.as_str()) {
            dropped += 1;
            continue;
        }
        if !seen.insert((conn.from.clone(), conn.to.clone())) {
            continue;
        }
        edges.push(new_edge(format!("edge_{}", i), &conn.from, &conn.to, conn.label.clone()));
    }

    for (node, node_id) in flow.nodes.iter().zip(&node_ids) {
        for (j, next) in node.next.iter().enumerate() {
            if next.is_empty() {
                continue;
            }
            if !known.contains(next.as_str()) {
                dropped += 1;
                continue;
            }
            if !seen.insert((node_id.clone(), next.clone())) {
                continue;
            }
            edges.push(new_edge(
                format!("edge_next_{}_{}", node_id, j),
                node_id,
                next,
                None,
            ));
        }
    }

    if dropped > 0 {
        tracing::warn!(dropped, "Dropped connections to unknown nodes during import");
    }

    ImportPlan {
        name,
        description,
        nodes,
        edges,
    }
}

fn new_edge(edge_id: String, source: &str, target: &str, label: Option<String>) -> NewWorkflowEdge {
    NewWorkflowEdge {
        edge_id,
        source_node_id: source.to_string(),
        target_node_id: target.to_string(),
        source_port: "output".to_string(),
        target_port: "input".to_string(),
        label,
    }
}

fn non_empty(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    if trimmed.is_empty() { None } else { Some(s) }
}

/// Create a project holding `flow`
///
/// If any row fails to insert, the half-built project is deleted and the
/// error returned.
pub async fn import_flow<S>(storage: &S, flow: &Flow, intent: &Intent) -> Result<ProjectDetail>
where
    S: ProjectStorage + ?Sized,
{
    let plan = plan_import(flow, intent);
    let project = storage.create_project(&plan.name, &plan.description).await?;

    if let Err(err) = insert_rows(storage, project.id, &plan).await {
        tracing::error!(project_id = project.id, error = %err, "Flow import failed, removing project");
        if let Err(cleanup) = storage.delete_project(project.id).await {
            tracing::error!(project_id = project.id, error = %cleanup, "Failed to remove partial import");
        }
        return Err(err);
    }

    tracing::info!(
        project_id = project.id,
        nodes = plan.nodes.len(),
        edges = plan.edges.len(),
        "Flow imported"
    );

    storage
        .project_detail(project.id)
        .await?
        .ok_or_else(|| FlowsmithError::not_found(format!("Project {} not found", project.id)))
}

async fn insert_rows<S>(storage: &S, project_id: i64, plan: &ImportPlan) -> Result<()>
where
    S: ProjectStorage + ?Sized,
{
    for node in &plan.nodes {
        storage.create_node(project_id, node).await?;
    }
    for edge in &plan.edges {
        storage.create_edge(project_id, edge).await?;
    }
    Ok(())
}

/// Export a project back to pipeline flow JSON
///
/// Each node's `next` lists the targets of its outgoing edges; every edge
/// also appears in `connections`.
pub fn to_flow_json(detail: &ProjectDetail) -> Flow {
    let nodes = detail
        .nodes
        .iter()
        .map(|node| {
            let next = detail
                .edges
                .iter()
                .filter(|e| e.source_node_id == node.node_id)
                .map(|e| e.target_node_id.clone())
                .collect();
            FlowNode::new(&node.node_id, &node.node_type, &node.name)
                .with_config(node.config.clone())
                .with_next(next)
        })
        .collect();

    let connections = detail
        .edges
        .iter()
        .map(|e| Connection {
            from: e.source_node_id.clone(),
            to: e.target_node_id.clone(),
            label: e.label.clone(),
        })
        .collect();

    Flow {
        name: detail.project.name.clone(),
        description: detail.project.description.clone(),
        nodes,
        connections,
    }
}

/// Display metadata of one editor node type
#[derive(Debug, Clone, Copy, Serialize)]
pub struct NodeTypeInfo {
    pub name: &'static str,
    pub icon: &'static str,
    pub description: &'static str,
}

const fn info(name: &'static str, icon: &'static str, description: &'static str) -> NodeTypeInfo {
    NodeTypeInfo {
        name,
        icon,
        description,
    }
}

/// Editor palette: categories in display order, each with its node types
pub const NODE_TYPES: &[(&str, &[(&str, NodeTypeInfo)])] = &[
    (
        "trigger",
        &[
            ("manual", info("Manual Trigger", "fa-hand-pointer", "Starts the flow manually")),
            ("schedule", info("Schedule", "fa-clock", "Starts at scheduled times")),
            ("webhook", info("Webhook", "fa-bolt", "Starts when a request arrives")),
            ("event", info("Event", "fa-bell", "Starts when an event occurs")),
        ],
    ),
    (
        "action",
        &[
            ("telegram", info("Telegram", "fa-paper-plane", "Sends a Telegram message")),
            ("email", info("Email", "fa-envelope", "Sends an email over SMTP")),
            ("slack", info("Slack", "fa-slack", "Posts a message to Slack")),
            ("whatsapp", info("WhatsApp", "fa-whatsapp", "Sends a WhatsApp message")),
            ("http", info("HTTP Request", "fa-globe", "Makes an HTTP request")),
            ("database", info("Database", "fa-database", "Runs a database query")),
        ],
    ),
    (
        "data",
        &[
            ("currency", info("Currency Rates", "fa-dollar-sign", "Fetches currency rates")),
            ("transform", info("Transform", "fa-code", "Transforms data")),
            ("filter", info("Filter", "fa-filter", "Filters data")),
            ("merge", info("Merge", "fa-code-merge", "Combines data from several sources")),
            ("split", info("Split", "fa-code-branch", "Splits data into several outputs")),
        ],
    ),
    (
        "flow",
        &[
            ("condition", info("Condition (IF)", "fa-code-branch", "Runs a branch based on a condition")),
            ("switch", info("Switch", "fa-route", "Multiple conditions")),
            ("loop", info("Loop", "fa-rotate", "Repeats actions N times")),
            ("foreach", info("For Each", "fa-list", "Iterates over a list")),
            ("wait", info("Wait", "fa-hourglass-half", "Pauses execution")),
            ("error", info("Error Handler", "fa-triangle-exclamation", "Catches errors")),
        ],
    ),
    (
        "output",
        &[
            ("file", info("File", "fa-file", "Saves to a file")),
            ("response", info("Response", "fa-reply", "Returns a response")),
            ("log", info("Log", "fa-terminal", "Writes to the log")),
        ],
    ),
    (
        "ai",
        &[
            ("gemini", info("Gemini AI", "fa-robot", "Processes with Gemini")),
            ("prompt", info("AI Prompt", "fa-comments", "Generates text with AI")),
        ],
    ),
];

/// The palette as nested JSON: `{category: {type: {name, icon, description}}}`
pub fn node_type_catalog() -> Value {
    let categories: Map<String, Value> = NODE_TYPES
        .iter()
        .map(|(category, types)| {
            let entries: Map<String, Value> = types
                .iter()
                .map(|(id, info)| ((*id).to_string(), json!(info)))
                .collect();
            ((*category).to_string(), Value::Object(entries))
        })
        .collect();
    Value::Object(categories)
}
