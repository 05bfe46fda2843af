//! Automation operations module
//!
//! Recurring execution of a flow's integrations.

use super::*;
use crate::constants::DEFAULT_INTERVAL_MINUTES;
use crate::model::{Automation, AutomationSummary, Flow, Intent, RunResult};
use crate::scheduler::NewAutomation;
use flowsmith_core_macros::{operation, operation_group};
use schemars::JsonSchema;

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_MINUTES
}

fn default_auto_start() -> bool {
    true
}

#[operation_group(automations)]
pub mod automations {
    use super::*;

    #[derive(Deserialize, JsonSchema)]
    #[schemars(description = "Empty input (no parameters required)")]
    pub struct EmptyInput {}

    #[derive(Deserialize, JsonSchema)]
    #[schemars(description = "Input for creating a recurring automation")]
    pub struct CreateInput {
        #[schemars(description = "Flow to run on every tick")]
        pub flow: Option<Flow>,
        #[schemars(description = "Intent whose integrations are executed")]
        #[serde(default)]
        pub intent: Intent,
        #[schemars(description = "Minutes between runs")]
        #[serde(default = "default_interval")]
        pub interval_minutes: u64,
        #[schemars(description = "Schedule immediately and run once before returning")]
        #[serde(default = "default_auto_start")]
        pub auto_start: bool,
    }

    #[derive(Deserialize, JsonSchema)]
    #[schemars(description = "Input addressing one automation")]
    pub struct IdInput {
        #[schemars(description = "Automation id")]
        pub id: String,
    }

    #[derive(Serialize)]
    pub struct CreateOutput {
        pub success: bool,
        pub automation_id: String,
        pub message: String,
        pub interval_minutes: u64,
        pub automation: Automation,
    }

    #[derive(Serialize)]
    pub struct MessageOutput {
        pub success: bool,
        pub message: String,
    }

    #[derive(Serialize)]
    pub struct RunOutput {
        pub success: bool,
        pub message: String,
        pub results: Vec<RunResult>,
    }

    fn message(text: &str) -> MessageOutput {
        MessageOutput {
            success: true,
            message: text.to_string(),
        }
    }

    #[operation(
        name = "list_automations",
        input = EmptyInput,
        http = "GET /automations",
        cli = "automations list",
        description = "List automations and whether each is scheduled"
    )]
    pub struct List {
        pub deps: Arc<Dependencies>,
    }

    #[async_trait]
    impl Operation for List {
        type Input = EmptyInput;
        type Output = Vec<AutomationSummary>;

        async fn execute(&self, _input: Self::Input) -> Result<Self::Output> {
            self.deps.scheduler.list().await
        }
    }

    /// Create an automation; refused while required credentials are missing
    #[operation(
        name = "create_automation",
        input = CreateInput,
        http = "POST /automations",
        cli = "automations create --flow <FLOW>",
        description = "Create a recurring automation"
    )]
    pub struct Create {
        pub deps: Arc<Dependencies>,
    }

    #[async_trait]
    impl Operation for Create {
        type Input = CreateInput;
        type Output = CreateOutput;

        async fn execute(&self, input: Self::Input) -> Result<Self::Output> {
            let flow = input
                .flow
                .ok_or_else(|| FlowsmithError::validation("Flow not provided"))?;
            let auto_start = input.auto_start;

            let automation = self
                .deps
                .scheduler
                .create(NewAutomation {
                    name: None,
                    flow,
                    intent: input.intent,
                    interval_minutes: input.interval_minutes,
                    auto_start,
                    saved_flow_id: None,
                })
                .await?;

            Ok(CreateOutput {
                success: true,
                automation_id: automation.id.clone(),
                message: if auto_start {
                    "Automation created and started".to_string()
                } else {
                    "Automation created and paused".to_string()
                },
                interval_minutes: automation.interval_minutes,
                automation,
            })
        }
    }

    #[operation(
        name = "start_automation",
        input = IdInput,
        http = "POST /automations/{id}/start",
        cli = "automations start <ID>",
        description = "Schedule an automation and run it once"
    )]
    pub struct Start {
        pub deps: Arc<Dependencies>,
    }

    #[async_trait]
    impl Operation for Start {
        type Input = IdInput;
        type Output = MessageOutput;

        async fn execute(&self, input: Self::Input) -> Result<Self::Output> {
            self.deps.scheduler.start(&input.id).await?;
            Ok(message("Automation started"))
        }
    }

    #[operation(
        name = "stop_automation",
        input = IdInput,
        http = "POST /automations/{id}/stop",
        cli = "automations stop <ID>",
        description = "Unschedule an automation; its record is kept"
    )]
    pub struct Stop {
        pub deps: Arc<Dependencies>,
    }

    #[async_trait]
    impl Operation for Stop {
        type Input = IdInput;
        type Output = MessageOutput;

        async fn execute(&self, input: Self::Input) -> Result<Self::Output> {
            self.deps.scheduler.stop(&input.id)?;
            Ok(message("Automation paused"))
        }
    }

    #[operation(
        name = "run_automation",
        input = IdInput,
        http = "POST /automations/{id}/run",
        cli = "automations run <ID>",
        description = "Run an automation once, outside its schedule"
    )]
    pub struct Run {
        pub deps: Arc<Dependencies>,
    }

    #[async_trait]
    impl Operation for Run {
        type Input = IdInput;
        type Output = RunOutput;

        async fn execute(&self, input: Self::Input) -> Result<Self::Output> {
            let results = self.deps.scheduler.run(&input.id).await?;
            Ok(RunOutput {
                success: true,
                message: "Automation executed".to_string(),
                results,
            })
        }
    }

    #[operation(
        name = "delete_automation",
        input = IdInput,
        http = "DELETE /automations/{id}",
        cli = "automations delete <ID>",
        description = "Unschedule and forget an automation"
    )]
    pub struct Delete {
        pub deps: Arc<Dependencies>,
    }

    #[async_trait]
    impl Operation for Delete {
        type Input = IdInput;
        type Output = MessageOutput;

        async fn execute(&self, input: Self::Input) -> Result<Self::Output> {
            self.deps.scheduler.delete(&input.id).await?;
            Ok(message("Automation removed"))
        }
    }
}
