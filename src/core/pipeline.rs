//! Pipeline operations module
//!
//! Flow generation from a prompt plus the learning-store views.

use super::*;
use crate::agents::learning::StatsSummary;
use crate::agents::PipelineOutcome;
use crate::constants::HISTORY_LIMIT;
use crate::model::{LearningRecord, LearningStats};
use flowsmith_core_macros::{operation, operation_group};
use schemars::JsonSchema;

#[operation_group(pipeline)]
pub mod pipeline {
    use super::*;

    #[derive(Deserialize, JsonSchema)]
    #[schemars(description = "Empty input (no parameters required)")]
    pub struct EmptyInput {}

    #[derive(Deserialize, JsonSchema)]
    #[schemars(description = "Input for generating a flow from natural language")]
    pub struct GenerateInput {
        #[schemars(description = "What the automation should do, in plain language")]
        #[serde(default)]
        pub prompt: String,
    }

    #[derive(Serialize)]
    pub struct HistoryOutput {
        pub stats: LearningStats,
        pub recent: Vec<LearningRecord>,
    }

    /// Generate, review and record a flow
    #[operation(
        name = "generate_flow",
        input = GenerateInput,
        http = "POST /generate-flow",
        cli = "generate <PROMPT>",
        description = "Generate a validated flow from a natural-language prompt"
    )]
    pub struct Generate {
        pub deps: Arc<Dependencies>,
    }

    #[async_trait]
    impl Operation for Generate {
        type Input = GenerateInput;
        type Output = PipelineOutcome;

        async fn execute(&self, input: Self::Input) -> Result<Self::Output> {
            self.deps.pipeline.generate(&input.prompt).await
        }
    }

    #[operation(
        name = "get_history",
        input = EmptyInput,
        http = "GET /history",
        cli = "history show",
        description = "Learning counters and the most recent generation attempts"
    )]
    pub struct History {
        pub deps: Arc<Dependencies>,
    }

    #[async_trait]
    impl Operation for History {
        type Input = EmptyInput;
        type Output = HistoryOutput;

        async fn execute(&self, _input: Self::Input) -> Result<Self::Output> {
            let learning = self.deps.pipeline.learning();
            Ok(HistoryOutput {
                stats: learning.stats().await,
                recent: learning.history(HISTORY_LIMIT).await,
            })
        }
    }

    #[operation(
        name = "get_stats",
        input = EmptyInput,
        http = "GET /stats",
        cli = "stats show",
        description = "Approval counters and rate"
    )]
    pub struct Stats {
        pub deps: Arc<Dependencies>,
    }

    #[async_trait]
    impl Operation for Stats {
        type Input = EmptyInput;
        type Output = StatsSummary;

        async fn execute(&self, _input: Self::Input) -> Result<Self::Output> {
            Ok(self.deps.pipeline.learning().summary().await)
        }
    }
}
