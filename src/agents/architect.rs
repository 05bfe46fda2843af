//! Validator ("architect") agent: scores and approves a built flow

use crate::constants::APPROVAL_THRESHOLD;
use crate::llm::Gateway;
use crate::model::{Flow, Intent, Validation, value_to_string_list};
use crate::{FlowsmithError, Result, telemetry};
use serde_json::Value;

const SYSTEM_INSTRUCTION: &str = r#"You are the Architect Agent. Validate flows with flexible but rigorous criteria.

VALIDATION:
1. APPROVE: the flow starts with a trigger, ends with an output and uses the listed integrations
2. WARN (does not reject): high complexity, many nodes, optional integrations
3. REJECT: integrations NOT listed in the intent, infinite loops, broken structure

CHECKLIST:
- Starts with a trigger? (trigger|schedule|webhook|event)
- Ends with an output? (output|message|file|notification)
- Are all integrations listed in intent.integrations?
- Does every node have id, type, name, config, next?
- No infinite loops?
- Complexity appropriate for the objective?

SCORING:
- 100: perfect, well structured, correctly integrated
- 80-99: good, minor warnings
- 60-79: acceptable, has problems
- <60: reject, critical problems

RETURN:
{
    "approved": true|false,
    "errors": ["critical errors"],
    "warnings": ["warnings"],
    "score": 85,
    "recommendation": "short recommendation"
}"#;

pub struct ArchitectAgent {
    gateway: Gateway,
}

impl ArchitectAgent {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    /// Review a flow. Falls back to the structural check when generation fails.
    pub async fn review(&self, prompt: &str, intent: &Intent, flow: &Flow) -> Validation {
        let user = user_instruction(prompt, intent, flow);

        let validation = match self
            .gateway
            .generate_json(SYSTEM_INSTRUCTION, &user)
            .await
            .and_then(|value| complete_validation(&value, flow))
        {
            Ok(validation) => validation,
            Err(err) => {
                tracing::warn!(error = %err, "Architect falling back to structural check");
                telemetry::record_generation_fallback("architect");
                fallback_validation(flow)
            }
        };

        tracing::info!(
            score = validation.score,
            approved = validation.approved,
            "Architect verdict"
        );
        validation
    }
}

fn user_instruction(prompt: &str, intent: &Intent, flow: &Flow) -> String {
    let allowed = if intent.integrations.is_empty() {
        "none".to_string()
    } else {
        intent.integrations.join(", ")
    };
    let flow_json = serde_json::to_string_pretty(flow).unwrap_or_default();

    format!(
        "Validate this flow:\n\nREQUEST: {prompt}\n\nINTENT:\n- Objective: {objective}\n- Allowed integrations: {allowed}\n- Output type: {output}\n\nFLOW TO VALIDATE:\n{flow_json}\n\nStrict but fair validation:",
        objective = intent.objective,
        output = intent.output_type.as_str(),
    )
}

/// trigger && output && at least two nodes
pub fn structural_approval(flow: &Flow) -> bool {
    flow.has_trigger() && flow.has_output() && flow.nodes.len() >= 2
}

/// Score used when the model omits one
pub fn derived_score(approved: bool, warnings: usize, errors: usize, nodes: usize) -> u8 {
    if approved {
        let mut score: i32 = 85;
        if warnings > 2 {
            score -= 10;
        }
        if nodes > 8 {
            score -= 5;
        }
        score.clamp(i32::from(APPROVAL_THRESHOLD), 100) as u8
    } else if errors <= 1 {
        55
    } else {
        40
    }
}

/// Recommendation used when the model omits one
pub fn derived_recommendation(approved: bool, score: u8, errors: &[String]) -> String {
    if approved {
        if score >= 80 {
            "Flow approved and ready to run".to_string()
        } else {
            "Flow approved with caveats".to_string()
        }
    } else {
        let first = errors
            .first()
            .map(String::as_str)
            .unwrap_or("check the flow structure");
        format!("Review: {}", first)
    }
}

/// Fill every field the model left out
pub fn complete_validation(value: &Value, flow: &Flow) -> Result<Validation> {
    let obj = value
        .as_object()
        .ok_or_else(|| FlowsmithError::malformed_output("validation is not a JSON object"))?;

    let approved = obj
        .get("approved")
        .and_then(Value::as_bool)
        .unwrap_or_else(|| structural_approval(flow));
    let errors = value_to_string_list(obj.get("errors"));
    let warnings = value_to_string_list(obj.get("warnings"));

    let score = obj
        .get("score")
        .and_then(Value::as_f64)
        .map(|s| s.round().clamp(0.0, 100.0) as u8)
        .unwrap_or_else(|| derived_score(approved, warnings.len(), errors.len(), flow.nodes.len()));

    let recommendation = obj
        .get("recommendation")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| derived_recommendation(approved, score, &errors));

    Ok(Validation {
        approved,
        errors,
        warnings,
        score,
        recommendation,
        integration_status: Vec::new(),
        fixes_applied: Vec::new(),
    })
}

/// Deterministic verdict used when the backend is unavailable
pub fn fallback_validation(flow: &Flow) -> Validation {
    if structural_approval(flow) {
        return Validation {
            approved: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            score: 80,
            recommendation: "Flow processed".to_string(),
            integration_status: Vec::new(),
            fixes_applied: Vec::new(),
        };
    }

    let mut errors = Vec::new();
    if !flow.has_trigger() {
        errors.push("Flow has no trigger node".to_string());
    }
    if !flow.has_output() {
        errors.push("Flow has no output node".to_string());
    }
    if flow.nodes.len() < 2 {
        errors.push("Flow needs at least 2 nodes".to_string());
    }

    Validation {
        approved: false,
        score: derived_score(false, 0, errors.len(), flow.nodes.len()),
        errors,
        warnings: Vec::new(),
        recommendation: "Review flow".to_string(),
        integration_status: Vec::new(),
        fixes_applied: Vec::new(),
    }
}
