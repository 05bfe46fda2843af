//! Saved flow operations module
//!
//! Flows kept from the pipeline, executable on demand or as automations.

use super::*;
use crate::constants::DEFAULT_INTERVAL_MINUTES;
use crate::model::{Flow, Intent, NewSavedFlow, RunResult, SavedFlow};
use crate::scheduler::NewAutomation;
use flowsmith_core_macros::{operation, operation_group};
use schemars::JsonSchema;

const UNTITLED_FLOW: &str = "Untitled flow";

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_MINUTES
}

fn default_auto_start() -> bool {
    true
}

/// Shape check on the raw document before it is typed
fn parse_flow_document(raw: Option<Value>) -> Result<Flow> {
    let raw = raw.ok_or_else(|| FlowsmithError::validation("Flow not provided"))?;
    let Some(object) = raw.as_object() else {
        return Err(FlowsmithError::validation("Flow must be a JSON object"));
    };
    if !object.get("nodes").is_some_and(Value::is_array) {
        return Err(FlowsmithError::validation("Flow must contain a list of nodes"));
    }
    serde_json::from_value(raw).map_err(|e| FlowsmithError::validation(format!("Invalid flow: {}", e)))
}

#[operation_group(saved_flows)]
pub mod saved_flows {
    use super::*;

    #[derive(Deserialize, JsonSchema)]
    #[schemars(description = "Empty input (no parameters required)")]
    pub struct EmptyInput {}

    #[derive(Deserialize, JsonSchema)]
    #[schemars(description = "Input for saving a generated flow")]
    pub struct SaveInput {
        #[schemars(description = "Flow document; must contain a nodes list")]
        pub flow: Option<Value>,
        #[schemars(description = "Intent the flow was built from")]
        #[serde(default)]
        pub intent: Intent,
        #[schemars(description = "Original prompt (defaults to the intent objective)")]
        #[serde(default)]
        pub prompt: String,
        #[schemars(description = "Validation score at generation time")]
        pub validation_score: Option<i64>,
    }

    #[derive(Deserialize, JsonSchema)]
    #[schemars(description = "Input addressing one saved flow")]
    pub struct IdInput {
        #[schemars(description = "Saved flow id")]
        pub id: String,
    }

    #[derive(Deserialize, JsonSchema)]
    #[schemars(description = "Input for scheduling a saved flow")]
    pub struct ScheduleInput {
        #[schemars(description = "Saved flow id")]
        pub id: String,
        #[schemars(description = "Minutes between runs")]
        #[serde(default = "default_interval")]
        pub interval_minutes: u64,
        #[schemars(description = "Schedule immediately and run once before returning")]
        #[serde(default = "default_auto_start")]
        pub auto_start: bool,
    }

    #[derive(Serialize)]
    pub struct SaveOutput {
        pub success: bool,
        pub message: String,
        pub flow_id: i64,
        pub flow: SavedFlow,
    }

    #[derive(Serialize)]
    pub struct MessageOutput {
        pub success: bool,
        pub message: String,
    }

    #[derive(Serialize)]
    pub struct ExecuteOutput {
        pub success: bool,
        pub output: String,
        pub results: Vec<RunResult>,
        pub execution_count: i64,
    }

    #[derive(Serialize)]
    pub struct ScheduleOutput {
        pub success: bool,
        pub automation_id: String,
        pub message: String,
        pub interval_minutes: u64,
    }

    async fn load(deps: &Dependencies, raw_id: &str) -> Result<SavedFlow> {
        let id = parse_row_id(raw_id, "Flow")?;
        deps.storage
            .get_saved_flow(id)
            .await?
            .ok_or_else(|| FlowsmithError::not_found("Flow not found"))
    }

    #[operation(
        name = "list_saved_flows",
        input = EmptyInput,
        http = "GET /saved-flows",
        cli = "saved-flows list",
        description = "List saved flows, newest first"
    )]
    pub struct List {
        pub deps: Arc<Dependencies>,
    }

    #[async_trait]
    impl Operation for List {
        type Input = EmptyInput;
        type Output = Vec<SavedFlow>;

        async fn execute(&self, _input: Self::Input) -> Result<Self::Output> {
            self.deps.storage.list_saved_flows().await
        }
    }

    #[operation(
        name = "save_flow",
        input = SaveInput,
        http = "POST /saved-flows",
        cli = "saved-flows save --flow <FLOW>",
        description = "Save a flow for later execution"
    )]
    pub struct Save {
        pub deps: Arc<Dependencies>,
    }

    #[async_trait]
    impl Operation for Save {
        type Input = SaveInput;
        type Output = SaveOutput;

        async fn execute(&self, input: Self::Input) -> Result<Self::Output> {
            let flow = parse_flow_document(input.flow)?;
            let intent = input.intent;

            let name = if flow.name.trim().is_empty() {
                UNTITLED_FLOW.to_string()
            } else {
                flow.name.clone()
            };
            let description = if flow.description.is_empty() {
                intent.summary.clone()
            } else {
                flow.description.clone()
            };
            let prompt = if input.prompt.is_empty() {
                intent.objective.clone()
            } else {
                input.prompt
            };

            let saved = self
                .deps
                .storage
                .create_saved_flow(&NewSavedFlow {
                    name,
                    description,
                    prompt,
                    flow,
                    intent,
                    validation_score: Some(input.validation_score.unwrap_or(0)),
                })
                .await?;
            tracing::info!(flow_id = saved.id, name = %saved.name, "Flow saved");

            Ok(SaveOutput {
                success: true,
                message: "Flow saved".to_string(),
                flow_id: saved.id,
                flow: saved,
            })
        }
    }

    #[operation(
        name = "get_saved_flow",
        input = IdInput,
        http = "GET /saved-flows/{id}",
        cli = "saved-flows get <ID>",
        description = "Get a saved flow"
    )]
    pub struct Get {
        pub deps: Arc<Dependencies>,
    }

    #[async_trait]
    impl Operation for Get {
        type Input = IdInput;
        type Output = SavedFlow;

        async fn execute(&self, input: Self::Input) -> Result<Self::Output> {
            load(&self.deps, &input.id).await
        }
    }

    #[operation(
        name = "delete_saved_flow",
        input = IdInput,
        http = "DELETE /saved-flows/{id}",
        cli = "saved-flows delete <ID>",
        description = "Delete a saved flow"
    )]
    pub struct Delete {
        pub deps: Arc<Dependencies>,
    }

    #[async_trait]
    impl Operation for Delete {
        type Input = IdInput;
        type Output = MessageOutput;

        async fn execute(&self, input: Self::Input) -> Result<Self::Output> {
            let id = parse_row_id(&input.id, "Flow")?;
            if !self.deps.storage.delete_saved_flow(id).await? {
                return Err(FlowsmithError::not_found("Flow not found"));
            }
            Ok(MessageOutput {
                success: true,
                message: "Flow removed".to_string(),
            })
        }
    }

    /// Run integrations, or synthesize a file when there are none
    #[operation(
        name = "execute_saved_flow",
        input = IdInput,
        http = "POST /saved-flows/{id}/execute",
        cli = "saved-flows execute <ID>",
        description = "Execute a saved flow"
    )]
    pub struct Execute {
        pub deps: Arc<Dependencies>,
    }

    #[async_trait]
    impl Operation for Execute {
        type Input = IdInput;
        type Output = ExecuteOutput;

        async fn execute(&self, input: Self::Input) -> Result<Self::Output> {
            let saved = load(&self.deps, &input.id).await?;
            let report = self
                .deps
                .executor
                .execute_saved(&saved.flow, &saved.intent)
                .await;

            self.deps
                .storage
                .record_saved_flow_execution(saved.id)
                .await?;

            Ok(ExecuteOutput {
                success: true,
                output: report.output_text(),
                results: report.results,
                execution_count: saved.execution_count + 1,
            })
        }
    }

    #[operation(
        name = "schedule_saved_flow",
        input = ScheduleInput,
        http = "POST /saved-flows/{id}/schedule",
        cli = "saved-flows schedule <ID>",
        description = "Turn a saved flow into a recurring automation"
    )]
    pub struct Schedule {
        pub deps: Arc<Dependencies>,
    }

    #[async_trait]
    impl Operation for Schedule {
        type Input = ScheduleInput;
        type Output = ScheduleOutput;

        async fn execute(&self, input: Self::Input) -> Result<Self::Output> {
            let saved = load(&self.deps, &input.id).await?;
            let auto_start = input.auto_start;

            let automation = self
                .deps
                .scheduler
                .create(NewAutomation {
                    name: Some(saved.name),
                    flow: saved.flow,
                    intent: saved.intent,
                    interval_minutes: input.interval_minutes,
                    auto_start,
                    saved_flow_id: Some(saved.id),
                })
                .await?;

            Ok(ScheduleOutput {
                success: true,
                automation_id: automation.id,
                message: if auto_start {
                    "Flow scheduled and started".to_string()
                } else {
                    "Flow scheduled and paused".to_string()
                },
                interval_minutes: automation.interval_minutes,
            })
        }
    }
}
