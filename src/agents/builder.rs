//! Flow builder agent: intent to a directed graph of typed nodes
//!
//! Whatever the model returns is repaired into a usable flow: at least one
//! trigger-like node, at least one output-like node, three nodes minimum,
//! unique ids, and no references to nodes that don't exist.

use crate::constants::{DERIVED_DESCRIPTION_CHARS, DERIVED_NAME_CHARS};
use crate::llm::Gateway;
use crate::model::{Connection, Flow, FlowNode, Intent, NodeConfig, value_to_string_list};
use crate::telemetry;
use crate::utils::truncate_chars;
use serde_json::{Value, json};
use std::collections::HashSet;

const SYSTEM_INSTRUCTION: &str = r#"You are the Flow Builder Agent. Produce realistic, well-structured automation flows.

CONSTRUCTION ALGORITHM:
1. Start with a TRIGGER (manual, schedule, webhook or event)
2. Add PROCESS nodes for the actions (search, transform, integration)
3. Add CONDITION nodes for if/else logic
4. Add LOOP nodes when iteration is needed
5. Finish with an OUTPUT node (file, message, api, notification)

NODE TYPES:
- trigger (manual|schedule|webhook|event)
- search (fetch data from APIs/web)
- transform (transform/map data)
- condition (if/else branches)
- loop (iteration)
- integration (telegram|email|slack|whatsapp)
- database (CRUD on a database)
- output (file|message|api|notification)

RULES:
1. Always start with a trigger and end with an output
2. Every node has: id, type, name, config, next (list of successor ids)
3. If the integrations list is empty, do NOT add integration nodes
4. Only create nodes relevant to the requested action
5. Minimum 3 nodes, maximum 10

RETURN:
{
    "name": "descriptive name",
    "description": "clear description",
    "nodes": [...],
    "connections": [{"from": "node_id", "to": "node_id"}]
}"#;

pub struct FlowBuilderAgent {
    gateway: Gateway,
}

impl FlowBuilderAgent {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    /// Build a flow for the intent. Never fails.
    pub async fn build(&self, prompt: &str, intent: &Intent) -> Flow {
        let user = user_instruction(prompt, intent);

        let flow = match self.gateway.generate_json(SYSTEM_INSTRUCTION, &user).await {
            Ok(value) => normalize_flow(&value, intent).unwrap_or_else(|| {
                tracing::warn!("Builder returned no usable nodes, using default flow");
                telemetry::record_generation_fallback("builder");
                default_flow(intent)
            }),
            Err(err) => {
                tracing::warn!(error = %err, "Builder generation failed, using default flow");
                telemetry::record_generation_fallback("builder");
                default_flow(intent)
            }
        };

        tracing::info!(nodes = flow.nodes.len(), "Builder produced flow");
        flow
    }
}

fn user_instruction(prompt: &str, intent: &Intent) -> String {
    let integrations = if intent.integrations.is_empty() {
        "none".to_string()
    } else {
        intent.integrations.join(", ")
    };
    format!(
        "Request: {prompt}\n\nIntent (summary):\n- Objective: {objective}\n- Action: {action}\n- Complexity: {complexity}\n- Integrations: {integrations}\n- Output: {output} ({format})\n\nGenerate a detailed flow with the appropriate nodes:",
        objective = intent.objective,
        action = intent.action_type.as_str(),
        complexity = intent.complexity.as_str(),
        output = intent.output_type.as_str(),
        format = intent.output_format.as_deref().unwrap_or("n/a"),
    )
}

fn output_config(intent: &Intent) -> NodeConfig {
    let mut config = NodeConfig::new();
    config.insert(
        "format".to_string(),
        json!(intent.output_format.as_deref().unwrap_or("json")),
    );
    config.insert("destination".to_string(), json!("local"));
    config
}

fn process_config(intent: &Intent) -> NodeConfig {
    let mut config = NodeConfig::new();
    config.insert("action".to_string(), json!(intent.objective));
    config
}

/// Deterministic trigger → process → output flow
pub fn default_flow(intent: &Intent) -> Flow {
    Flow {
        name: "Default flow".to_string(),
        description: intent.summary.clone(),
        nodes: vec![
            FlowNode::new("node_1", "trigger", "Start").with_next(vec!["node_2".to_string()]),
            FlowNode::new("node_2", "process", "Processing")
                .with_config(process_config(intent))
                .with_next(vec!["node_3".to_string()]),
            FlowNode::new("node_3", "output", "Output").with_config(output_config(intent)),
        ],
        connections: vec![
            Connection::new("node_1", "node_2"),
            Connection::new("node_2", "node_3"),
        ],
    }
}

/// Repair a model-produced flow; `None` when there is no non-empty `nodes` array
pub fn normalize_flow(value: &Value, intent: &Intent) -> Option<Flow> {
    let raw_nodes = value.get("nodes")?.as_array()?;
    let mut nodes = normalize_nodes(raw_nodes);
    if nodes.is_empty() {
        return None;
    }

    let mut connections: Option<Vec<Connection>> = value
        .get("connections")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|c| serde_json::from_value::<Connection>(c.clone()).ok())
                .collect::<Vec<_>>()
        })
        .filter(|items| !items.is_empty());

    let mut synthetic = Vec::new();
    ensure_trigger(&mut nodes, &mut synthetic);
    ensure_output(&mut nodes, intent, &mut synthetic);
    if let Some(connections) = connections.as_mut() {
        connections.append(&mut synthetic);
    }
    ensure_minimum(&mut nodes, intent, connections.as_mut());

    let mut flow = Flow {
        name: non_empty_str(value.get("name"))
            .unwrap_or_else(|| truncate_chars(&intent.summary, DERIVED_NAME_CHARS).to_string()),
        description: non_empty_str(value.get("description")).unwrap_or_else(|| {
            truncate_chars(&intent.objective, DERIVED_DESCRIPTION_CHARS).to_string()
        }),
        nodes,
        connections: Vec::new(),
    };
    flow.connections = match connections {
        Some(connections) => connections,
        None => flow.connections_from_next(),
    };

    prune_dangling(&mut flow);
    Some(flow)
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn id_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn normalize_nodes(raw: &[Value]) -> Vec<FlowNode> {
    let mut nodes: Vec<FlowNode> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for (i, entry) in raw.iter().enumerate() {
        let Some(obj) = entry.as_object() else {
            continue;
        };

        let mut id = id_string(obj.get("id")).unwrap_or_else(|| format!("node_{}", i + 1));
        if seen.contains(&id) {
            id = unique_id(&format!("{}_{}", id, i + 1), &seen);
        }
        seen.insert(id.clone());

        let node_type = non_empty_str(obj.get("type")).unwrap_or_else(|| "process".to_string());
        let name = non_empty_str(obj.get("name")).unwrap_or_else(|| id.clone());
        let config = obj
            .get("config")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        nodes.push(FlowNode {
            id,
            node_type,
            name,
            config,
            next: value_to_string_list(obj.get("next")),
        });
    }

    nodes
}

fn unique_id(base: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(base) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{}_{}", base, n))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| base.to_string())
}

fn taken_ids(nodes: &[FlowNode]) -> HashSet<String> {
    nodes.iter().map(|n| n.id.clone()).collect()
}

fn ensure_trigger(nodes: &mut Vec<FlowNode>, synthetic: &mut Vec<Connection>) {
    if nodes.iter().any(FlowNode::is_trigger) {
        return;
    }
    let id = unique_id("node_trigger", &taken_ids(nodes));
    let first = nodes[0].id.clone();
    tracing::warn!("Builder flow has no trigger, prepending one");

    synthetic.push(Connection::new(&id, &first));
    nodes.insert(
        0,
        FlowNode::new(id, "trigger", "Start").with_next(vec![first]),
    );
}

fn ensure_output(nodes: &mut Vec<FlowNode>, intent: &Intent, synthetic: &mut Vec<Connection>) {
    if nodes.iter().any(FlowNode::is_output) {
        return;
    }
    let id = unique_id("node_output", &taken_ids(nodes));
    tracing::warn!("Builder flow has no output, appending one");

    if let Some(last) = nodes.last_mut() {
        last.next = vec![id.clone()];
        synthetic.push(Connection::new(&last.id, &id));
    }
    nodes.push(FlowNode::new(id, "output", "Output").with_config(output_config(intent)));
}

/// Splice a process node after the trigger when fewer than three nodes remain
fn ensure_minimum(
    nodes: &mut Vec<FlowNode>,
    intent: &Intent,
    connections: Option<&mut Vec<Connection>>,
) {
    if nodes.len() >= 3 {
        return;
    }
    let Some(trigger_idx) = nodes.iter().position(FlowNode::is_trigger) else {
        return;
    };

    let id = unique_id("node_process", &taken_ids(nodes));
    let trigger = &mut nodes[trigger_idx];
    let trigger_id = trigger.id.clone();
    let successors = std::mem::replace(&mut trigger.next, vec![id.clone()]);

    if let Some(connections) = connections {
        for connection in connections.iter_mut().filter(|c| c.from == trigger_id) {
            connection.from = id.clone();
        }
        connections.push(Connection::new(&trigger_id, &id));
    }

    nodes.insert(
        trigger_idx + 1,
        FlowNode::new(id, "process", "Processing")
            .with_config(process_config(intent))
            .with_next(successors),
    );
}

/// Drop `next` entries and connections that name unknown nodes
fn prune_dangling(flow: &mut Flow) {
    let dangling = flow.dangling_references();
    if dangling.is_empty() {
        return;
    }
    tracing::warn!(count = dangling.len(), references = ?dangling, "Pruning dangling node references");

    let ids: HashSet<String> = taken_ids(&flow.nodes);
    for node in &mut flow.nodes {
        node.next.retain(|to| ids.contains(to));
    }
    flow.connections
        .retain(|c| ids.contains(&c.from) && ids.contains(&c.to));
}

#[cfg(test)]
#[path = "builder_test.rs"]
mod builder_test;
