//! Intent agent: free-text prompt to structured `Intent`

use crate::constants::{FALLBACK_OBJECTIVE_CHARS, FALLBACK_SUMMARY_CHARS};
use crate::integrations::{self, available_integrations, detect_integrations};
use crate::llm::Gateway;
use crate::model::{ActionType, Intent, value_to_string_list};
use crate::secrets::SecretsProvider;
use crate::utils::truncate_chars;
use crate::{FlowsmithError, Result, telemetry};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;

fn system_instruction() -> String {
    format!(
        r#"You are the Intent Agent. Read the user's request carefully and extract what they want automated.

DETECTION RULES:
1. Look for every service, API and action the request mentions or implies
2. "find", "search", "fetch" + prices/data/info means a data integration is needed
3. "send", "notify", "post" means a communication integration is needed
4. Always return "integrations" as a list, even when empty. Never null.

AVAILABLE INTEGRATIONS: {integrations}

REQUIRED JSON STRUCTURE:
{{
    "objective": "clear technical description of the goal",
    "action_type": "search|transform|send|store|hybrid",
    "output_type": "file|api|message|database|notification|search",
    "output_format": "txt|json|csv|xml|html|null",
    "integrations": ["list", "of", "integrations"],
    "needs_credentials": true|false,
    "complexity": "simple|medium|complex",
    "summary": "one-sentence executive summary"
}}

EXAMPLES:
"find the price of an iphone" -> {{"objective": "Find iPhone prices from marketplaces/APIs", "output_type": "file", "output_format": "json", "integrations": [], "complexity": "medium"}}
"send the dollar rate on Telegram" -> {{"objective": "Fetch the USD rate and send it through a Telegram bot", "output_type": "message", "integrations": ["currency_api", "telegram"], "needs_credentials": true}}
"generate an html report" -> {{"objective": "Generate a structured HTML report", "output_type": "file", "output_format": "html", "integrations": []}}"#,
        integrations = available_integrations().join(", ")
    )
}

pub struct IntentAgent {
    gateway: Gateway,
    secrets: Arc<dyn SecretsProvider>,
}

impl IntentAgent {
    pub fn new(gateway: Gateway, secrets: Arc<dyn SecretsProvider>) -> Self {
        Self { gateway, secrets }
    }

    /// Extract an intent; falls back to keyword detection when generation fails
    pub async fn extract(&self, prompt: &str) -> Intent {
        let detected = detect_integrations(prompt);
        let user = format!(
            "Analyze this request and extract the structured intent:\n\n{}",
            prompt
        );

        let parsed = self
            .gateway
            .generate_json(&system_instruction(), &user)
            .await
            .and_then(parse_intent);

        let mut intent = match parsed {
            Ok(mut intent) => {
                intent.integrations = merge_integrations(&intent.integrations, &detected);
                intent
            }
            Err(err) => {
                tracing::warn!(error = %err, "Intent agent falling back to keyword detection");
                telemetry::record_generation_fallback("intent");
                fallback_intent(prompt, detected)
            }
        };

        intent.required_credentials =
            integrations::required_credentials(&intent.integrations, self.secrets.as_ref()).await;
        intent.needs_credentials = intent
            .required_credentials
            .iter()
            .any(|cred| !cred.keys.is_empty());

        tracing::info!(
            summary = %intent.summary,
            integrations = ?intent.integrations,
            "Intent extracted"
        );
        intent
    }
}

/// Typed view of the model's answer; anything that isn't an object is malformed
///
/// Fields are read one at a time. A null or mistyped field keeps its default
/// instead of discarding the whole answer.
fn parse_intent(value: Value) -> Result<Intent> {
    let Value::Object(fields) = value else {
        return Err(FlowsmithError::malformed_output("intent is not a JSON object"));
    };

    let mut intent = Intent::default();
    read_field(&fields, "objective", &mut intent.objective);
    read_field(&fields, "action_type", &mut intent.action_type);
    read_field(&fields, "output_type", &mut intent.output_type);
    read_field(&fields, "output_format", &mut intent.output_format);
    read_field(&fields, "needs_credentials", &mut intent.needs_credentials);
    read_field(&fields, "required_credentials", &mut intent.required_credentials);
    read_field(&fields, "complexity", &mut intent.complexity);
    read_field(&fields, "summary", &mut intent.summary);
    intent.integrations = value_to_string_list(fields.get("integrations"));

    Ok(intent)
}

fn read_field<T: DeserializeOwned>(fields: &Map<String, Value>, key: &str, slot: &mut T) {
    let Some(raw) = fields.get(key).filter(|v| !v.is_null()) else {
        return;
    };
    match serde_json::from_value(raw.clone()) {
        Ok(value) => *slot = value,
        Err(err) => tracing::debug!(field = key, error = %err, "Ignoring malformed intent field"),
    }
}

/// Model integrations first (lowercased, trimmed, deduplicated), then detected ones
pub fn merge_integrations(from_model: &[String], detected: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();
    let candidates = from_model
        .iter()
        .map(|i| i.trim().to_lowercase())
        .chain(detected.iter().cloned());

    for id in candidates {
        if !id.is_empty() && !merged.contains(&id) {
            merged.push(id);
        }
    }
    merged
}

/// Deterministic intent built from keyword detection alone
pub fn fallback_intent(prompt: &str, detected: Vec<String>) -> Intent {
    Intent {
        objective: truncate_chars(prompt, FALLBACK_OBJECTIVE_CHARS).to_string(),
        action_type: if detected.is_empty() {
            ActionType::Transform
        } else {
            ActionType::Hybrid
        },
        summary: format!("Process: {}", truncate_chars(prompt, FALLBACK_SUMMARY_CHARS)),
        integrations: detected,
        ..Intent::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedGenerator;
    use crate::model::{Complexity, OutputType};
    use crate::secrets::EnvSecretsProvider;
    use serde_json::json;

    fn agent(generator: Arc<ScriptedGenerator>) -> IntentAgent {
        IntentAgent::new(
            Gateway::new(generator),
            Arc::new(EnvSecretsProvider::isolated()),
        )
    }

    #[tokio::test]
    async fn test_model_integrations_unioned_with_keywords() {
        let generator = Arc::new(ScriptedGenerator::new());
        generator.push_json(json!({
            "objective": "Send the USD rate",
            "output_type": "message",
            "integrations": [" Telegram ", "telegram"],
            "complexity": "simples"
        }));

        let intent = agent(generator.clone())
            .extract("envie cotação de dólar pelo Telegram")
            .await;

        assert_eq!(intent.integrations, vec!["telegram", "currency_api"]);
        assert_eq!(intent.output_type, OutputType::Message);
        assert_eq!(intent.complexity, Complexity::Simple);
        assert_eq!(intent.summary, "Flow processing");
        assert!(intent.needs_credentials);
        assert_eq!(intent.required_credentials.len(), 2);
        assert!(generator.requests()[0].system.contains("currency_api"));
    }

    #[tokio::test]
    async fn test_needs_credentials_overrides_model_claim() {
        let generator = Arc::new(ScriptedGenerator::new());
        generator.push_json(json!({
            "objective": "Quote the euro",
            "integrations": ["currency_api"],
            "needs_credentials": true
        }));

        let intent = agent(generator).extract("euro rate to a file").await;
        assert_eq!(intent.integrations, vec!["currency_api"]);
        assert!(!intent.needs_credentials);
    }

    #[tokio::test]
    async fn test_fallback_when_generation_fails() {
        let generator = Arc::new(ScriptedGenerator::new());
        generator.push_failure("backend down");

        let prompt = "envie cotação de dólar pelo Telegram ".repeat(10);
        let intent = agent(generator).extract(&prompt).await;

        assert_eq!(intent.integrations, vec!["telegram", "currency_api"]);
        assert_eq!(intent.action_type, ActionType::Hybrid);
        assert_eq!(intent.objective.chars().count(), 150);
        assert_eq!(
            intent.summary,
            format!("Process: {}", prompt.chars().take(60).collect::<String>())
        );
        assert!(intent.needs_credentials);
    }

    #[tokio::test]
    async fn test_mistyped_fields_keep_the_rest_of_the_answer() {
        let generator = Arc::new(ScriptedGenerator::new());
        generator.push_json(json!({
            "objective": "Send the USD rate",
            "summary": null,
            "complexity": null,
            "needs_credentials": "yes",
            "required_credentials": ["TELEGRAM_BOT_TOKEN"],
            "output_type": 7,
            "integrations": ["telegram"]
        }));

        let intent = agent(generator).extract("write a poem").await;

        assert_eq!(intent.objective, "Send the USD rate");
        assert_eq!(intent.integrations, vec!["telegram"]);
        assert_eq!(intent.summary, "Flow processing");
        assert_eq!(intent.complexity, Complexity::Medium);
        assert_eq!(intent.output_type, OutputType::File);
        assert!(intent.needs_credentials);
        assert_eq!(intent.required_credentials.len(), 1);
        assert_eq!(intent.required_credentials[0].integration, "telegram");
    }

    #[tokio::test]
    async fn test_fallback_on_non_object_answer() {
        let generator = Arc::new(ScriptedGenerator::new());
        generator.push_json(json!(["not", "an", "intent"]));

        let intent = agent(generator).extract("write a poem").await;
        assert!(intent.integrations.is_empty());
        assert_eq!(intent.action_type, ActionType::Transform);
        assert!(!intent.needs_credentials);
    }
}
