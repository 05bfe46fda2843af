//! prompt → intent → flow → verdict → reconciliation → learning record

use super::{ArchitectAgent, FlowBuilderAgent, IntentAgent, LearningStore};
use crate::integrations::IntegrationReconciler;
use crate::llm::Gateway;
use crate::model::{Flow, Intent, Validation};
use crate::secrets::SecretsProvider;
use crate::{FlowsmithError, Result, telemetry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Approved,
    Rejected,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Approved => "approved",
            Verdict::Rejected => "rejected",
        }
    }
}

/// What the caller of `/generate-flow` receives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutcome {
    pub status: Verdict,
    pub intent: Intent,
    pub flow: Flow,
    pub validation: Validation,
    /// Only set on rejection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    /// Learning record id; `None` when the record could not be persisted
    pub record_id: Option<u64>,
}

pub struct Pipeline {
    intent: IntentAgent,
    builder: FlowBuilderAgent,
    architect: ArchitectAgent,
    reconciler: Arc<IntegrationReconciler>,
    learning: Arc<LearningStore>,
}

impl Pipeline {
    pub fn new(
        gateway: Gateway,
        secrets: Arc<dyn SecretsProvider>,
        reconciler: Arc<IntegrationReconciler>,
        learning: Arc<LearningStore>,
    ) -> Self {
        Self {
            intent: IntentAgent::new(gateway.clone(), secrets),
            builder: FlowBuilderAgent::new(gateway.clone()),
            architect: ArchitectAgent::new(gateway),
            reconciler,
            learning,
        }
    }

    pub fn learning(&self) -> &Arc<LearningStore> {
        &self.learning
    }

    /// Run every stage. Only an empty prompt is an error; everything
    /// downstream degrades to a deterministic result instead.
    pub async fn generate(&self, prompt: &str) -> Result<PipelineOutcome> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(FlowsmithError::validation("prompt is required"));
        }
        let started = Instant::now();

        let intent = self.intent.extract(prompt).await;
        let flow = self.builder.build(prompt, &intent).await;
        let mut validation = self.architect.review(prompt, &intent, &flow).await;

        let report = self.reconciler.reconcile(&intent.integrations).await;
        if !report.all_valid {
            tracing::warn!(details = ?report.details, "Integration reconciliation found problems");
        }
        report.merge_into(&mut validation);

        let status = if validation.approved {
            Verdict::Approved
        } else {
            Verdict::Rejected
        };

        let record_id = match self
            .learning
            .append(
                prompt,
                &intent,
                &flow,
                validation.approved,
                &validation.errors,
                validation.score,
            )
            .await
        {
            Ok(record) => Some(record.id),
            Err(err) => {
                tracing::error!(error = %err, "Failed to persist learning record");
                None
            }
        };

        telemetry::record_pipeline_verdict(status.as_str(), started.elapsed().as_secs_f64());
        tracing::info!(
            status = status.as_str(),
            score = validation.score,
            nodes = flow.nodes.len(),
            "Pipeline finished"
        );

        let errors = match status {
            Verdict::Rejected => Some(validation.errors.clone()),
            Verdict::Approved => None,
        };

        Ok(PipelineOutcome {
            status,
            intent,
            flow,
            validation,
            errors,
            record_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CheckStatus;
    use crate::utils::TestEnvironment;
    use serde_json::json;

    #[tokio::test]
    async fn test_empty_prompt_rejected() {
        let env = TestEnvironment::new().await;
        let err = env.deps.pipeline.generate("   ").await.unwrap_err();
        assert!(matches!(err, FlowsmithError::Validation(_)));
        assert_eq!(env.generator.requests().len(), 0);
    }

    #[tokio::test]
    async fn test_backend_down_still_answers() {
        let env = TestEnvironment::new().await;
        // empty script: every stage falls back

        let outcome = env.deps.pipeline.generate("write a short report").await.unwrap();
        assert_eq!(outcome.status, Verdict::Approved);
        assert_eq!(outcome.flow.nodes.len(), 3);
        assert_eq!(outcome.validation.score, 80);
        assert!(outcome.errors.is_none());
        assert_eq!(outcome.record_id, Some(1));
        assert_eq!(env.deps.pipeline.learning().stats().await.total, 1);
    }

    #[tokio::test]
    async fn test_telegram_error_does_not_flip_approval() {
        let env = TestEnvironment::new().await;
        env.generator
            .push_json(json!({"objective": "Send USD", "integrations": ["telegram"]}))
            .push_failure("builder down")
            .push_json(json!({"approved": true, "score": 90}));

        let outcome = env
            .deps
            .pipeline
            .generate("envie cotação de dólar pelo Telegram")
            .await
            .unwrap();

        assert!(outcome.intent.integrations.contains(&"currency_api".to_string()));
        assert!(outcome.intent.integrations.contains(&"telegram".to_string()));
        assert!(outcome.intent.needs_credentials);
        assert_eq!(outcome.status, Verdict::Approved);
        assert_eq!(outcome.validation.score, 90);
        assert!(
            outcome
                .validation
                .errors
                .contains(&"Telegram: credentials not configured".to_string())
        );
        assert!(
            outcome
                .validation
                .integration_status
                .iter()
                .any(|s| s.integration == "telegram" && s.status == CheckStatus::Error)
        );
    }

    #[tokio::test]
    async fn test_rejected_outcome_carries_errors() {
        let env = TestEnvironment::new().await;
        env.generator
            .push_json(json!({"objective": "Report"}))
            .push_failure("builder down")
            .push_json(json!({"approved": false, "errors": ["Loop never ends", "No output"]}));

        let outcome = env.deps.pipeline.generate("make a report").await.unwrap();
        assert_eq!(outcome.status, Verdict::Rejected);
        assert_eq!(outcome.validation.score, 40);
        assert_eq!(
            outcome.errors,
            Some(vec!["Loop never ends".to_string(), "No output".to_string()])
        );

        let stats = env.deps.pipeline.learning().stats().await;
        assert_eq!(stats.rejected, 1);
    }
}
