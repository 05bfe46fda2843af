//! Visual-editor step interpreter
//!
//! Every canvas node is turned into a `Step` before it runs. Known node types
//! get their own variant; anything else becomes `Step::Other` and is only
//! acknowledged. Loops, conditions and waits are simulated: a loop records
//! its iteration labels, a condition always holds, and a wait records the
//! requested delay without sleeping.

use crate::constants::{DEFAULT_LOOP_COUNT, DEFAULT_WAIT_SECONDS, MAX_LOOP_ITERATIONS};
use crate::model::{Delivery, NodeConfig, RateSnapshot, WorkflowNode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const DEFAULT_CONDITION: &str = "true";
const DEFAULT_LOG_MESSAGE: &str = "Log entry";

/// One executable canvas node
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Currency,
    /// `None` means the project default message
    Telegram { message: Option<String> },
    Loop { count: u64 },
    Condition { expression: String },
    Wait { seconds: f64 },
    Log { message: String },
    Other { node_type: String },
}

impl Step {
    pub fn from_node(node: &WorkflowNode) -> Self {
        Self::parse(&node.node_type, &node.config)
    }

    pub fn parse(node_type: &str, config: &NodeConfig) -> Self {
        match node_type.trim().to_lowercase().as_str() {
            "currency" => Step::Currency,
            "telegram" => Step::Telegram {
                message: config_string(config, "message"),
            },
            "loop" => Step::Loop {
                count: config
                    .get("count")
                    .and_then(as_count)
                    .unwrap_or(DEFAULT_LOOP_COUNT)
                    .min(MAX_LOOP_ITERATIONS),
            },
            "condition" => Step::Condition {
                expression: config_string(config, "condition")
                    .unwrap_or_else(|| DEFAULT_CONDITION.to_string()),
            },
            "wait" => Step::Wait {
                seconds: config
                    .get("seconds")
                    .and_then(as_seconds)
                    .unwrap_or(DEFAULT_WAIT_SECONDS),
            },
            "log" => Step::Log {
                message: config_string(config, "message")
                    .unwrap_or_else(|| DEFAULT_LOG_MESSAGE.to_string()),
            },
            _ => Step::Other {
                node_type: node_type.to_string(),
            },
        }
    }

    /// Integration id the step drives, if any
    pub fn integration(&self) -> Option<&'static str> {
        match self {
            Step::Currency => Some(crate::constants::INTEGRATION_CURRENCY),
            Step::Telegram { .. } => Some(crate::constants::INTEGRATION_TELEGRAM),
            _ => None,
        }
    }
}

/// Strings are taken as-is; other scalars are rendered as JSON text
fn config_string(config: &NodeConfig, key: &str) -> Option<String> {
    match config.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_seconds(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// What one node produced, tagged by node name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeOutcome {
    pub node: String,
    #[serde(flatten)]
    pub detail: StepDetail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepDetail {
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
    Loop {
        iterations: u64,
        results: Vec<String>,
    },
    Condition {
        expression: String,
        result: bool,
    },
    Wait {
        seconds: f64,
    },
    Log {
        message: String,
    },
    Other {
        node_type: String,
        status: String,
    },
}

impl NodeOutcome {
    pub fn is_error(&self) -> bool {
        matches!(
            self.detail,
            StepDetail::Currency { error: Some(_), .. } | StepDetail::Telegram { error: Some(_), .. }
        )
    }
}

/// Nodes in execution order: ascending `position_x`, ties keep their stored order
///
/// Edges play no part here. A node placed left of its predecessor on the
/// canvas runs first.
pub fn execution_order(nodes: &[WorkflowNode]) -> Vec<&WorkflowNode> {
    let mut ordered: Vec<&WorkflowNode> = nodes.iter().filter(|n| n.is_enabled).collect();
    ordered.sort_by(|a, b| a.position_x.total_cmp(&b.position_x));
    ordered
}

/// Labels recorded by a simulated loop, at most `MAX_LOOP_ITERATIONS`
pub fn loop_iterations(count: u64) -> Vec<String> {
    (1..=count.min(MAX_LOOP_ITERATIONS))
        .map(|i| format!("Iteration {}", i))
        .collect()
}

/// Display form of a wait delay: whole seconds drop the fraction
pub fn format_seconds(seconds: f64) -> String {
    if seconds.fract() == 0.0 && seconds.abs() < 1e15 {
        format!("{}", seconds as i64)
    } else {
        format!("{}", seconds)
    }
}
