//! System operations module

use super::*;
use flowsmith_core_macros::{operation, operation_group};
use schemars::JsonSchema;

#[operation_group(system)]
pub mod system {
    use super::*;

    #[derive(Deserialize, JsonSchema)]
    #[schemars(description = "Empty input (no parameters required)")]
    pub struct EmptyInput {}

    #[derive(Serialize)]
    pub struct HealthOutput {
        pub status: String,
        pub timestamp: String,
    }

    /// Liveness probe
    #[operation(
        name = "health",
        input = EmptyInput,
        http = "GET /health",
        cli = "system health",
        description = "Report service health"
    )]
    pub struct Health {
        pub deps: Arc<Dependencies>,
    }

    #[async_trait]
    impl Operation for Health {
        type Input = EmptyInput;
        type Output = HealthOutput;

        async fn execute(&self, _input: Self::Input) -> Result<Self::Output> {
            Ok(HealthOutput {
                status: "healthy".to_string(),
                timestamp: chrono::Utc::now().to_rfc3339(),
            })
        }
    }

    /// Prometheus counters, as text
    #[operation(
        name = "metrics",
        input = EmptyInput,
        cli = "system metrics",
        description = "Dump the process counters in Prometheus text format"
    )]
    pub struct Metrics {
        pub deps: Arc<Dependencies>,
    }

    #[async_trait]
    impl Operation for Metrics {
        type Input = EmptyInput;
        type Output = String;

        async fn execute(&self, _input: Self::Input) -> Result<Self::Output> {
            crate::telemetry::get_metrics()
        }
    }
}
