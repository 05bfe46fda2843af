//! Execution operations module
//!
//! Ad-hoc execution of a flow the caller already holds.

use super::*;
use crate::constants::EXECUTE_FLOW_PREVIEW_CHARS;
use crate::model::{Flow, Intent, RunResult};
use flowsmith_core_macros::{operation, operation_group};
use schemars::JsonSchema;

/// The flow is required; a missing body field is a client error
fn require_flow(flow: Option<Flow>) -> Result<Flow> {
    flow.ok_or_else(|| FlowsmithError::validation("Flow not provided"))
}

#[operation_group(execution)]
pub mod execution {
    use super::*;

    #[derive(Deserialize, JsonSchema)]
    #[schemars(description = "A flow and the intent it was built from")]
    pub struct ExecuteInput {
        #[schemars(description = "Flow document as returned by generate_flow")]
        pub flow: Option<Flow>,
        #[schemars(description = "Intent the flow was built from")]
        #[serde(default)]
        pub intent: Intent,
    }

    #[derive(Serialize)]
    pub struct ExecuteFlowOutput {
        pub success: bool,
        pub output: String,
        pub file_created: String,
        pub filename: String,
    }

    #[derive(Serialize)]
    pub struct ExecuteRealOutput {
        pub success: bool,
        pub output: String,
        pub results: Vec<RunResult>,
    }

    /// Ask the model to carry the flow out and write the result to a file
    #[operation(
        name = "execute_flow",
        input = ExecuteInput,
        http = "POST /execute-flow",
        cli = "execute synthesize --flow <FLOW>",
        description = "Execute a flow by synthesizing its output file"
    )]
    pub struct ExecuteFlow {
        pub deps: Arc<Dependencies>,
    }

    #[async_trait]
    impl Operation for ExecuteFlow {
        type Input = ExecuteInput;
        type Output = ExecuteFlowOutput;

        async fn execute(&self, input: Self::Input) -> Result<Self::Output> {
            let flow = require_flow(input.flow)?;
            tracing::info!(flow = %flow.name, "Executing flow by synthesis");

            let file = self
                .deps
                .executor
                .synthesize_file(&flow, &input.intent, EXECUTE_FLOW_PREVIEW_CHARS)
                .await?;

            Ok(ExecuteFlowOutput {
                success: true,
                output: format!("{}\n\nGenerated content:\n{}", file.summary, file.preview),
                file_created: file.filepath.display().to_string(),
                filename: file.filename,
            })
        }
    }

    /// Run the flow's integrations for real
    #[operation(
        name = "execute_real",
        input = ExecuteInput,
        http = "POST /execute-real",
        cli = "execute real --flow <FLOW>",
        description = "Execute a flow against its real integrations"
    )]
    pub struct ExecuteReal {
        pub deps: Arc<Dependencies>,
    }

    #[async_trait]
    impl Operation for ExecuteReal {
        type Input = ExecuteInput;
        type Output = ExecuteRealOutput;

        async fn execute(&self, input: Self::Input) -> Result<Self::Output> {
            let flow = require_flow(input.flow)?;
            let report = self.deps.executor.execute_real(&flow, &input.intent).await;

            Ok(ExecuteRealOutput {
                success: true,
                output: report.output_text(),
                results: report.results,
            })
        }
    }
}
