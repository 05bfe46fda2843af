//! Credential operations module
//!
//! Stored configurations and the live credential view derived from them.
//! Every write is mirrored into the secrets provider so integrations pick it
//! up without a restart.

use super::*;
use crate::integrations::{self, CredentialStatus, INTEGRATIONS};
use chrono::{DateTime, Utc};
use flowsmith_core_macros::{operation, operation_group};
use schemars::JsonSchema;
use std::collections::BTreeMap;

#[operation_group(credentials)]
pub mod credentials {
    use super::*;

    #[derive(Deserialize, JsonSchema)]
    #[schemars(description = "Empty input (no parameters required)")]
    pub struct EmptyInput {}

    #[derive(Deserialize, JsonSchema)]
    pub struct ConfigurationEntry {
        #[serde(default)]
        pub key: String,
        #[serde(default)]
        pub value: String,
        pub integration: Option<String>,
    }

    #[derive(Deserialize, JsonSchema)]
    #[schemars(description = "Input for storing configuration values")]
    pub struct SaveInput {
        #[schemars(description = "Entries to upsert; ones without key or value are skipped")]
        #[serde(default)]
        pub configurations: Vec<ConfigurationEntry>,
    }

    #[derive(Deserialize, JsonSchema)]
    #[schemars(description = "Input addressing one configuration")]
    pub struct KeyInput {
        #[schemars(description = "Configuration key")]
        pub key: String,
    }

    #[derive(Serialize)]
    pub struct ConfigurationView {
        pub key: String,
        pub value: String,
        pub integration: Option<String>,
        pub updated_at: DateTime<Utc>,
    }

    #[derive(Serialize)]
    pub struct SaveOutput {
        pub success: bool,
        pub message: String,
        pub count: usize,
    }

    #[derive(Serialize)]
    pub struct MessageOutput {
        pub success: bool,
        pub message: String,
    }

    #[derive(Serialize)]
    pub struct IntegrationView {
        pub id: &'static str,
        pub name: &'static str,
        pub keys_required: &'static [&'static str],
        pub docs_url: &'static str,
        pub note: &'static str,
        pub configured: bool,
    }

    #[operation(
        name = "list_configurations",
        input = EmptyInput,
        http = "GET /api/configurations",
        cli = "config list",
        description = "List stored configuration values"
    )]
    pub struct ListConfigurations {
        pub deps: Arc<Dependencies>,
    }

    #[async_trait]
    impl Operation for ListConfigurations {
        type Input = EmptyInput;
        type Output = Vec<ConfigurationView>;

        async fn execute(&self, _input: Self::Input) -> Result<Self::Output> {
            let stored = self.deps.storage.list_configurations().await?;
            Ok(stored
                .into_iter()
                .map(|c| ConfigurationView {
                    key: c.key,
                    value: c.value,
                    integration: c.integration,
                    updated_at: c.updated_at,
                })
                .collect())
        }
    }

    #[operation(
        name = "save_configurations",
        input = SaveInput,
        http = "POST /api/configurations",
        cli = "config save --configurations <CONFIGURATIONS>",
        description = "Store configuration values and apply them immediately"
    )]
    pub struct SaveConfigurations {
        pub deps: Arc<Dependencies>,
    }

    #[async_trait]
    impl Operation for SaveConfigurations {
        type Input = SaveInput;
        type Output = SaveOutput;

        async fn execute(&self, input: Self::Input) -> Result<Self::Output> {
            let count = input.configurations.len();
            for entry in input.configurations {
                if entry.key.is_empty() || entry.value.is_empty() {
                    continue;
                }
                self.deps
                    .storage
                    .upsert_configuration(&entry.key, &entry.value, entry.integration.as_deref())
                    .await?;
                self.deps.secrets.set_secret(&entry.key, &entry.value).await?;
                tracing::info!(key = %entry.key, "Configuration stored");
            }

            Ok(SaveOutput {
                success: true,
                message: "Configurations saved".to_string(),
                count,
            })
        }
    }

    #[operation(
        name = "delete_configuration",
        input = KeyInput,
        http = "DELETE /api/configurations/{key}",
        cli = "config delete <KEY>",
        description = "Remove a stored configuration value"
    )]
    pub struct DeleteConfiguration {
        pub deps: Arc<Dependencies>,
    }

    #[async_trait]
    impl Operation for DeleteConfiguration {
        type Input = KeyInput;
        type Output = MessageOutput;

        async fn execute(&self, input: Self::Input) -> Result<Self::Output> {
            if !self.deps.storage.delete_configuration(&input.key).await? {
                return Err(FlowsmithError::not_found("Configuration not found"));
            }
            self.deps.secrets.remove_secret(&input.key).await?;

            Ok(MessageOutput {
                success: true,
                message: "Configuration removed".to_string(),
            })
        }
    }

    #[operation(
        name = "credential_status",
        input = EmptyInput,
        http = "GET /credentials",
        cli = "credentials status",
        description = "Which credential keys each integration has configured"
    )]
    pub struct Status {
        pub deps: Arc<Dependencies>,
    }

    #[async_trait]
    impl Operation for Status {
        type Input = EmptyInput;
        type Output = BTreeMap<String, CredentialStatus>;

        async fn execute(&self, _input: Self::Input) -> Result<Self::Output> {
            Ok(integrations::credential_status(self.deps.secrets.as_ref()).await)
        }
    }

    #[operation(
        name = "list_integrations",
        input = EmptyInput,
        http = "GET /integrations",
        cli = "credentials integrations",
        description = "Integrations the generator may use and their credential keys"
    )]
    pub struct Integrations {
        pub deps: Arc<Dependencies>,
    }

    #[async_trait]
    impl Operation for Integrations {
        type Input = EmptyInput;
        type Output = Vec<IntegrationView>;

        async fn execute(&self, _input: Self::Input) -> Result<Self::Output> {
            let mut views = Vec::with_capacity(INTEGRATIONS.len());
            for spec in INTEGRATIONS {
                let mut configured = true;
                for key in spec.keys {
                    if !self.deps.secrets.has_secret(key).await {
                        configured = false;
                    }
                }
                views.push(IntegrationView {
                    id: spec.id,
                    name: spec.name,
                    keys_required: spec.keys,
                    docs_url: spec.docs_url,
                    note: spec.note.unwrap_or_default(),
                    configured,
                });
            }
            Ok(views)
        }
    }
}
