//! Execution engine for Flowsmith
//!
//! Two surfaces share one set of integration clients: ad-hoc execution of a
//! generated or saved flow, and the step interpreter that runs visual-editor
//! projects. Both are best-effort. A failing integration or node leaves an
//! error entry in the results and execution moves on.

pub mod step;

use crate::constants::{
    INTEGRATION_CURRENCY, INTEGRATION_TELEGRAM, SAVED_FLOW_PREVIEW_CHARS, TELEGRAM_BOT_TOKEN,
    TELEGRAM_CHAT_ID,
};
use crate::integrations::telegram::{escape_html, format_automation_message, trend_arrow};
use crate::integrations::{CurrencyProvider, TelegramClient};
use crate::llm::Gateway;
use crate::model::{Flow, Intent, ProjectDetail, RateSnapshot, RunResult};
use crate::secrets::SecretsProvider;
use crate::utils::truncate_chars;
use crate::{FlowsmithError, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use step::{NodeOutcome, Step, StepDetail};

const TELEGRAM_NOT_CONFIGURED: &str = "Telegram not configured";
const DEFAULT_AUTOMATION_NAME: &str = "Automation";
const DEFAULT_SYNTHESIS_SUMMARY: &str = "Execution finished";

const SYNTHESIS_SYSTEM_PROMPT: &str = r#"You are an automation executor. Execute the described flow and produce the appropriate result.

RULES:
1. Read the flow and the intent to understand what must be produced
2. Produce real, useful content based on the objective
3. If the result is a file, return the content to be saved
4. Aim for quality content

Return JSON with this structure:
{
    "content": "generated content (text, data, etc.)",
    "filename": "suggested_name.extension",
    "summary": "summary of what was executed"
}"#;

/// Output lines and structured results of one execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub output: Vec<String>,
    pub results: Vec<RunResult>,
}

impl ExecutionReport {
    /// Output lines joined with newlines
    pub fn output_text(&self) -> String {
        self.output.join("\n")
    }
}

/// File written by gateway-driven synthesis
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedFile {
    pub filename: String,
    pub filepath: PathBuf,
    pub summary: String,
    /// Leading characters of the content, with `...` when truncated
    pub preview: String,
}

impl SynthesizedFile {
    pub fn to_result(&self) -> RunResult {
        RunResult::File {
            filename: self.filename.clone(),
            filepath: self.filepath.display().to_string(),
            content_preview: self.preview.clone(),
            summary: self.summary.clone(),
        }
    }
}

/// Outcome of running a visual-editor project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRun {
    pub success: bool,
    pub output: String,
    pub results: Vec<NodeOutcome>,
}

/// Whether any integration in the list can actually be driven
pub fn has_executable_integration<S: AsRef<str>>(integrations: &[S]) -> bool {
    integrations
        .iter()
        .any(|i| matches!(i.as_ref(), INTEGRATION_CURRENCY | INTEGRATION_TELEGRAM))
}

/// Flowsmith execution engine
///
/// Constructed once in `core::assemble_dependencies()` and shared through
/// `Dependencies` by the HTTP handlers and the scheduler.
pub struct FlowExecutor {
    currency: Arc<CurrencyProvider>,
    telegram: Arc<TelegramClient>,
    secrets: Arc<dyn SecretsProvider>,
    gateway: Gateway,
    outputs_dir: PathBuf,
}

impl FlowExecutor {
    pub fn new(
        currency: Arc<CurrencyProvider>,
        telegram: Arc<TelegramClient>,
        secrets: Arc<dyn SecretsProvider>,
        gateway: Gateway,
        outputs_dir: PathBuf,
    ) -> Self {
        Self {
            currency,
            telegram,
            secrets,
            gateway,
            outputs_dir,
        }
    }

    pub fn outputs_dir(&self) -> &Path {
        &self.outputs_dir
    }

    /// Bot token and chat id, when both are configured
    async fn telegram_credentials(&self) -> Option<(String, String)> {
        let token = self.secrets.get_secret(TELEGRAM_BOT_TOKEN).await.ok().flatten()?;
        let chat_id = self.secrets.get_secret(TELEGRAM_CHAT_ID).await.ok().flatten()?;
        Some((token, chat_id))
    }

    /// Drive the currency and Telegram integrations named in `integrations`
    ///
    /// Shared by ad-hoc execution, saved flows and scheduled automations.
    /// The Telegram message carries the rates fetched in the same run.
    pub async fn run_integrations(&self, name: &str, integrations: &[String]) -> ExecutionReport {
        let mut report = ExecutionReport::default();
        let mut rates: Option<Arc<RateSnapshot>> = None;

        if integrations.iter().any(|i| i == INTEGRATION_CURRENCY) {
            match self.currency.fetch_default().await {
                Ok(snapshot) => {
                    report.output.push("Rates fetched".to_string());
                    for quote in snapshot.rates.values() {
                        report.output.push(format!(
                            "  • {}: R$ {:.2} ({} {:.2}%)",
                            quote.name,
                            quote.bid,
                            trend_arrow(quote.change_pct),
                            quote.change_pct
                        ));
                    }
                    report.results.push(RunResult::Currency {
                        data: Some(snapshot.as_ref().clone()),
                        error: None,
                    });
                    rates = Some(snapshot);
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Currency fetch failed during execution");
                    report.output.push(format!("Failed to fetch rates: {}", err));
                    report.results.push(RunResult::Currency {
                        data: None,
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        if integrations.iter().any(|i| i == INTEGRATION_TELEGRAM) {
            match self.telegram_credentials().await {
                None => {
                    report.output.push(format!(
                        "{}. Set {} and {}.",
                        TELEGRAM_NOT_CONFIGURED, TELEGRAM_BOT_TOKEN, TELEGRAM_CHAT_ID
                    ));
                    report.results.push(RunResult::Telegram {
                        result: None,
                        error: Some(TELEGRAM_NOT_CONFIGURED.to_string()),
                    });
                }
                Some((token, chat_id)) => {
                    let message = format_automation_message(name, rates.as_deref(), Local::now());
                    match self.telegram.send_message(&token, &chat_id, &message).await {
                        Ok(delivery) => {
                            report.output.push("Message sent to Telegram".to_string());
                            report.results.push(RunResult::Telegram {
                                result: Some(delivery),
                                error: None,
                            });
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "Telegram delivery failed");
                            report
                                .output
                                .push(format!("Failed to send Telegram message: {}", err));
                            report.results.push(RunResult::Telegram {
                                result: None,
                                error: Some(err.to_string()),
                            });
                        }
                    }
                }
            }
        }

        report
    }

    /// `POST /execute-real`: integrations only, never the gateway
    pub async fn execute_real(&self, flow: &Flow, intent: &Intent) -> ExecutionReport {
        let mut report = self
            .run_integrations(display_name(flow), &intent.integrations)
            .await;
        if report.results.is_empty() {
            report
                .output
                .push("No executable integration found".to_string());
        }
        report
    }

    /// Saved-flow execution: integrations when any are drivable, file synthesis otherwise
    pub async fn execute_saved(&self, flow: &Flow, intent: &Intent) -> ExecutionReport {
        if has_executable_integration(&intent.integrations) {
            return self
                .run_integrations(display_name(flow), &intent.integrations)
                .await;
        }

        let mut report = ExecutionReport::default();
        match self
            .synthesize_file(flow, intent, SAVED_FLOW_PREVIEW_CHARS)
            .await
        {
            Ok(file) => {
                report.output.push(file.summary.clone());
                report
                    .output
                    .push(format!("File created: {}", file.filepath.display()));
                report.output.push(format!("\nContent:\n{}", file.preview));
                report.results.push(file.to_result());
            }
            Err(err) => {
                tracing::warn!(error = %err, "File synthesis failed for saved flow");
                report.output.push(format!("Failed to execute flow: {}", err));
                report.results.push(RunResult::Error {
                    error: err.to_string(),
                });
            }
        }
        report
    }

    /// Ask the gateway for file content and write it under the outputs directory
    pub async fn synthesize_file(
        &self,
        flow: &Flow,
        intent: &Intent,
        preview_chars: usize,
    ) -> Result<SynthesizedFile> {
        let user = format!(
            "Execute this flow:\n\nFLOW:\n{}\n\nINTENT:\n{}\n\nGenerate the execution result:",
            serde_json::to_string_pretty(flow)?,
            serde_json::to_string_pretty(intent)?
        );
        let value = self
            .gateway
            .generate_json(SYNTHESIS_SYSTEM_PROMPT, &user)
            .await?;
        let Some(fields) = value.as_object() else {
            return Err(FlowsmithError::malformed_output(
                "synthesis result is not a JSON object",
            ));
        };

        let content = match fields.get("content") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(v @ (Value::Object(_) | Value::Array(_))) => serde_json::to_string_pretty(v)?,
            Some(other) => other.to_string(),
        };
        let extension = intent.output_format.as_deref().unwrap_or("txt");
        let filename = sanitize_filename(
            fields.get("filename").and_then(Value::as_str).unwrap_or(""),
            extension,
            Local::now(),
        );
        let summary = fields
            .get("summary")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_SYNTHESIS_SUMMARY)
            .to_string();

        tokio::fs::create_dir_all(&self.outputs_dir).await?;
        let filepath = self.outputs_dir.join(&filename);
        tokio::fs::write(&filepath, content.as_bytes()).await?;
        tracing::info!(path = %filepath.display(), "Generated output file");

        let head = truncate_chars(&content, preview_chars);
        let preview = if head.len() < content.len() {
            format!("{}...", head)
        } else {
            head.to_string()
        };

        Ok(SynthesizedFile {
            filename,
            filepath,
            summary,
            preview,
        })
    }

    /// Run a project's enabled nodes left to right
    pub async fn run_project(&self, detail: &ProjectDetail) -> ProjectRun {
        let project_name = &detail.project.name;
        let mut output = Vec::new();
        let mut results = Vec::new();

        for node in step::execution_order(&detail.nodes) {
            let step = Step::from_node(node);
            let (lines, outcome) = self.run_step(project_name, &node.name, step).await;
            output.extend(lines);
            results.push(NodeOutcome {
                node: node.name.clone(),
                detail: outcome,
            });
        }

        tracing::info!(
            project = %project_name,
            nodes = results.len(),
            errors = results.iter().filter(|r| r.is_error()).count(),
            "Project executed"
        );

        ProjectRun {
            success: true,
            output: output.join("\n"),
            results,
        }
    }

    async fn run_step(
        &self,
        project_name: &str,
        node_name: &str,
        step: Step,
    ) -> (Vec<String>, StepDetail) {
        let tag = format!("[{}]", node_name);

        match step {
            Step::Currency => match self.currency.fetch_default().await {
                Ok(snapshot) => {
                    let mut lines = vec![format!("{} Rates fetched", tag)];
                    lines.extend(
                        snapshot
                            .rates
                            .values()
                            .map(|q| format!("  {}: R$ {:.2}", q.name, q.bid)),
                    );
                    (
                        lines,
                        StepDetail::Currency {
                            data: Some(snapshot.as_ref().clone()),
                            error: None,
                        },
                    )
                }
                Err(err) => (
                    vec![format!("{} Error: {}", tag, err)],
                    StepDetail::Currency {
                        data: None,
                        error: Some(err.to_string()),
                    },
                ),
            },
            Step::Telegram { message } => {
                let Some((token, chat_id)) = self.telegram_credentials().await else {
                    return (
                        vec![format!("{} {}", tag, TELEGRAM_NOT_CONFIGURED)],
                        StepDetail::Telegram {
                            result: None,
                            error: Some(TELEGRAM_NOT_CONFIGURED.to_string()),
                        },
                    );
                };
                let text = message
                    .unwrap_or_else(|| format!("Executing: {}", escape_html(project_name)));
                match self.telegram.send_message(&token, &chat_id, &text).await {
                    Ok(delivery) => (
                        vec![format!("{} Message sent to Telegram", tag)],
                        StepDetail::Telegram {
                            result: Some(delivery),
                            error: None,
                        },
                    ),
                    Err(err) => (
                        vec![format!("{} Telegram error: {}", tag, err)],
                        StepDetail::Telegram {
                            result: None,
                            error: Some(err.to_string()),
                        },
                    ),
                }
            }
            Step::Loop { count } => (
                vec![format!("{} Loop ran {} times", tag, count)],
                StepDetail::Loop {
                    iterations: count,
                    results: step::loop_iterations(count),
                },
            ),
            Step::Condition { expression } => (
                vec![format!("{} Condition evaluated: {}", tag, expression)],
                StepDetail::Condition {
                    expression,
                    result: true,
                },
            ),
            Step::Wait { seconds } => (
                vec![format!("{} Waiting {}s", tag, step::format_seconds(seconds))],
                StepDetail::Wait { seconds },
            ),
            Step::Log { message } => {
                tracing::info!(project = %project_name, "{}", message);
                (
                    vec![format!("{} {}", tag, message)],
                    StepDetail::Log { message },
                )
            }
            Step::Other { node_type } => (
                vec![format!("{} Executed ({})", tag, node_type)],
                StepDetail::Other {
                    node_type,
                    status: "executed".to_string(),
                },
            ),
        }
    }
}

fn display_name(flow: &Flow) -> &str {
    if flow.name.trim().is_empty() {
        DEFAULT_AUTOMATION_NAME
    } else {
        &flow.name
    }
}

fn is_safe_filename_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

/// Reduce a model-suggested name to a plain file name inside the outputs directory
///
/// Keeps the last path segment and replaces anything outside `[A-Za-z0-9_.-]`
/// with `_`. Empty and dot-leading results fall back to a timestamped name.
pub fn sanitize_filename(raw: &str, extension: &str, now: DateTime<Local>) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or("");
    let safe: String = base
        .chars()
        .map(|c| if is_safe_filename_char(c) { c } else { '_' })
        .collect();

    if !safe.is_empty() && !safe.starts_with('.') {
        return safe;
    }

    let extension: String = extension
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    let extension = if extension.is_empty() { "txt" } else { &extension };
    format!("output_{}.{}", now.format("%Y%m%d_%H%M%S"), extension)
}

#[cfg(test)]
mod engine_test;
