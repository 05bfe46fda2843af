//! Integration reconciler
//!
//! Probes the integrations an intent declares after the architect has decided
//! approval. Findings are folded into the `Validation` for visibility; they
//! never flip an approved flow back to rejected.

use super::telegram::BotProbe;
use super::{CurrencyProvider, TelegramClient};
use crate::constants::{INTEGRATION_CURRENCY, INTEGRATION_TELEGRAM, TELEGRAM_BOT_TOKEN, TELEGRAM_CHAT_ID};
use crate::model::{CheckStatus, IntegrationStatus, Validation};
use crate::secrets::SecretsProvider;
use crate::telemetry;
use serde::Serialize;
use std::sync::Arc;

/// Outcome of probing a set of integrations
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcileReport {
    pub all_valid: bool,
    pub details: Vec<IntegrationStatus>,
    pub warnings: Vec<String>,
    pub fixes_applied: Vec<String>,
}

impl Default for ReconcileReport {
    fn default() -> Self {
        Self {
            all_valid: true,
            details: Vec::new(),
            warnings: Vec::new(),
            fixes_applied: Vec::new(),
        }
    }
}

impl ReconcileReport {
    fn push(&mut self, integration: &str, status: CheckStatus, message: impl Into<String>) {
        self.details.push(IntegrationStatus {
            integration: integration.to_string(),
            status,
            message: message.into(),
        });
    }

    /// Merge into a validation without touching `approved`
    ///
    /// Error details become validation errors only when the report is not
    /// all-valid.
    pub fn merge_into(self, validation: &mut Validation) {
        if !self.all_valid {
            validation.errors.extend(
                self.details
                    .iter()
                    .filter(|d| d.status == CheckStatus::Error)
                    .map(|d| d.message.clone()),
            );
        }
        validation.warnings.extend(self.warnings);
        validation.fixes_applied.extend(self.fixes_applied);
        validation.integration_status.extend(self.details);
    }
}

pub struct IntegrationReconciler {
    currency: Arc<CurrencyProvider>,
    telegram: Arc<TelegramClient>,
    secrets: Arc<dyn SecretsProvider>,
}

impl IntegrationReconciler {
    pub fn new(
        currency: Arc<CurrencyProvider>,
        telegram: Arc<TelegramClient>,
        secrets: Arc<dyn SecretsProvider>,
    ) -> Self {
        Self {
            currency,
            telegram,
            secrets,
        }
    }

    /// Probe every recognized integration; others are not checked
    pub async fn reconcile(&self, integrations: &[String]) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for integration in integrations {
            match integration.as_str() {
                INTEGRATION_CURRENCY => self.check_currency(&mut report).await,
                INTEGRATION_TELEGRAM => self.check_telegram(&mut report).await,
                _ => {}
            }
        }

        report
    }

    async fn check_currency(&self, report: &mut ReconcileReport) {
        match self.currency.fetch_default().await {
            Ok(_) => report.push(
                INTEGRATION_CURRENCY,
                CheckStatus::Ok,
                "Currency rate API working",
            ),
            Err(err) => {
                let message = format!("Currency rate API: {}", err);
                report.push(INTEGRATION_CURRENCY, CheckStatus::Warning, message.clone());
                report.warnings.push(message);
                report
                    .fixes_applied
                    .push("Cache and provider fallback configured automatically".to_string());
            }
        }
    }

    async fn check_telegram(&self, report: &mut ReconcileReport) {
        let token = self.secrets.get_secret(TELEGRAM_BOT_TOKEN).await.ok().flatten();
        let has_chat = self.secrets.has_secret(TELEGRAM_CHAT_ID).await;

        let Some(token) = token.filter(|_| has_chat) else {
            report.all_valid = false;
            report.push(
                INTEGRATION_TELEGRAM,
                CheckStatus::Error,
                "Telegram: credentials not configured",
            );
            return;
        };

        match self.telegram.get_me(&token).await {
            Ok(BotProbe::Connected { username }) => {
                telemetry::record_integration_call(INTEGRATION_TELEGRAM, "ok");
                report.push(
                    INTEGRATION_TELEGRAM,
                    CheckStatus::Ok,
                    format!("Bot @{} connected", username),
                );
            }
            Ok(BotProbe::InvalidToken) => {
                telemetry::record_integration_call(INTEGRATION_TELEGRAM, "error");
                report.all_valid = false;
                report.push(
                    INTEGRATION_TELEGRAM,
                    CheckStatus::Error,
                    "Telegram: invalid token",
                );
            }
            Ok(BotProbe::Rejected { status }) => {
                telemetry::record_integration_call(INTEGRATION_TELEGRAM, "error");
                report.all_valid = false;
                report.push(
                    INTEGRATION_TELEGRAM,
                    CheckStatus::Error,
                    format!("Telegram: failed to validate bot ({})", status),
                );
            }
            Err(err) => {
                telemetry::record_integration_call(INTEGRATION_TELEGRAM, "unreachable");
                tracing::warn!(error = %err, "Telegram probe failed");
                let message = format!("Telegram: could not validate ({})", err);
                report.push(INTEGRATION_TELEGRAM, CheckStatus::Warning, message.clone());
                report.warnings.push(message);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IntegrationsConfig;
    use crate::secrets::EnvSecretsProvider;
    use serde_json::json;
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn reconciler(server: &MockServer, secrets: Arc<dyn SecretsProvider>) -> IntegrationReconciler {
        let config = IntegrationsConfig {
            bcb_base_url: server.uri(),
            awesome_api_base_url: server.uri(),
            telegram_base_url: server.uri(),
            currency_timeout_secs: 2,
            ..IntegrationsConfig::default()
        };
        IntegrationReconciler::new(
            Arc::new(CurrencyProvider::new(&config).unwrap()),
            Arc::new(TelegramClient::new(&config).unwrap()),
            secrets,
        )
    }

    fn approved_validation() -> Validation {
        Validation {
            approved: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            score: 90,
            recommendation: "Flow approved and ready to run".to_string(),
            integration_status: Vec::new(),
            fixes_applied: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_missing_telegram_credentials_is_error_but_keeps_approval() {
        let server = MockServer::start().await;
        let secrets: Arc<dyn SecretsProvider> = Arc::new(EnvSecretsProvider::isolated());
        let reconciler = reconciler(&server, secrets).await;

        let report = reconciler.reconcile(&["telegram".to_string()]).await;
        assert!(!report.all_valid);
        assert_eq!(report.details[0].status, CheckStatus::Error);

        let mut validation = approved_validation();
        report.merge_into(&mut validation);
        assert!(validation.approved);
        assert_eq!(validation.errors, vec!["Telegram: credentials not configured"]);
        assert_eq!(validation.integration_status.len(), 1);
    }

    #[tokio::test]
    async fn test_connected_bot_and_failing_currency() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/botabc/getMe"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true, "result": {"username": "fx_bot"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex("CotacaoDolarDia|json/last"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let secrets = Arc::new(EnvSecretsProvider::isolated());
        secrets.set_secret(TELEGRAM_BOT_TOKEN, "abc").await.unwrap();
        secrets.set_secret(TELEGRAM_CHAT_ID, "1").await.unwrap();
        let reconciler = reconciler(&server, secrets).await;

        let report = reconciler
            .reconcile(&["currency_api".to_string(), "telegram".to_string(), "slack".to_string()])
            .await;

        assert!(report.all_valid);
        assert_eq!(report.details.len(), 2);
        assert_eq!(report.details[1].message, "Bot @fx_bot connected");
        assert_eq!(
            report.fixes_applied,
            vec!["Cache and provider fallback configured automatically"]
        );
        assert_eq!(report.warnings.len(), 1);

        let mut validation = approved_validation();
        report.merge_into(&mut validation);
        assert!(validation.errors.is_empty());
        assert_eq!(validation.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let secrets = Arc::new(EnvSecretsProvider::isolated());
        secrets.set_secret(TELEGRAM_BOT_TOKEN, "abc").await.unwrap();
        secrets.set_secret(TELEGRAM_CHAT_ID, "1").await.unwrap();
        let reconciler = reconciler(&server, secrets).await;

        let report = reconciler.reconcile(&["telegram".to_string()]).await;
        assert!(!report.all_valid);
        assert_eq!(report.details[0].message, "Telegram: failed to validate bot (404)");
    }
}
