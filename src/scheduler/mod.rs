//! Automation scheduler
//!
//! An automation is *known* once it is in the [`AutomationStore`] and *active*
//! while a job for its id exists. Jobs are tokio tasks ticking at the
//! automation's interval; each tick runs the shared integration routine of the
//! [`FlowExecutor`].
//!
//! Automations loaded at startup are known but not active. Starting one is an
//! explicit operator action.
//!
//! Two runs of the same automation (a manual run racing a tick) may overlap.
//! The store serializes their counter updates; `last_results` keeps whichever
//! run finished last.

pub mod store;

pub use store::AutomationStore;

use crate::constants::MAX_INTERVAL_MINUTES;
use crate::engine::FlowExecutor;
use crate::model::{Automation, AutomationSummary, Flow, Intent, RunResult};
use crate::secrets::{SecretsProvider, missing_keys};
use crate::{FlowsmithError, Result, integrations, telemetry};
use chrono::{Local, Utc};
use dashmap::DashMap;
use itertools::Itertools;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const DEFAULT_AUTOMATION_NAME: &str = "Automation";

/// What caused a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunTrigger {
    Manual,
    Scheduled,
}

impl RunTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunTrigger::Manual => "manual",
            RunTrigger::Scheduled => "scheduled",
        }
    }
}

/// Request to create an automation
#[derive(Debug, Clone)]
pub struct NewAutomation {
    /// Defaults to the flow name
    pub name: Option<String>,
    pub flow: Flow,
    pub intent: Intent,
    pub interval_minutes: u64,
    pub auto_start: bool,
    pub saved_flow_id: Option<i64>,
}

/// A registered recurring job
struct ScheduledJob {
    token: CancellationToken,
    interval_minutes: u64,
}

struct SchedulerInner {
    store: AutomationStore,
    executor: Arc<FlowExecutor>,
    secrets: Arc<dyn SecretsProvider>,
    jobs: DashMap<String, ScheduledJob>,
    last_results: DashMap<String, Vec<RunResult>>,
    seq: AtomicU64,
}

/// Handle to the automation scheduler; clones share state
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    pub fn new(
        store: AutomationStore,
        executor: Arc<FlowExecutor>,
        secrets: Arc<dyn SecretsProvider>,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                store,
                executor,
                secrets,
                jobs: DashMap::new(),
                last_results: DashMap::new(),
                seq: AtomicU64::new(0),
            }),
        }
    }

    /// Read the persisted automations without scheduling any of them
    pub async fn load(&self) -> Result<usize> {
        let automations = self.inner.store.list().await?;
        for automation in &automations {
            tracing::info!(
                automation_id = %automation.id,
                name = %automation.name,
                "Automation loaded"
            );
        }
        self.inner
            .seq
            .store(automations.len() as u64, Ordering::SeqCst);
        Ok(automations.len())
    }

    fn next_id(&self) -> String {
        let seq = self.inner.seq.fetch_add(1, Ordering::SeqCst);
        format!("auto_{}_{}", Local::now().format("%Y%m%d%H%M%S"), seq)
    }

    /// Credential keys the intent needs but the environment lacks
    ///
    /// Covers both the declared `required_credentials` and the registry keys
    /// of every declared integration.
    pub async fn missing_credentials(&self, intent: &Intent) -> Vec<String> {
        let declared = intent
            .required_credentials
            .iter()
            .flat_map(|c| c.keys.iter().cloned());
        let keys: Vec<String> = declared
            .chain(integrations::required_keys(&intent.integrations))
            .unique()
            .collect();
        missing_keys(self.inner.secrets.as_ref(), &keys).await
    }

    /// Persist a new automation; with `auto_start` also schedule it and run it once
    pub async fn create(&self, request: NewAutomation) -> Result<Automation> {
        if request.interval_minutes < 1 {
            return Err(FlowsmithError::validation(
                "interval_minutes must be at least 1",
            ));
        }
        if request.interval_minutes > MAX_INTERVAL_MINUTES {
            return Err(FlowsmithError::validation(format!(
                "interval_minutes must be at most {}",
                MAX_INTERVAL_MINUTES
            )));
        }

        let missing = self.missing_credentials(&request.intent).await;
        if !missing.is_empty() {
            return Err(FlowsmithError::MissingCredentials { missing });
        }

        let name = request
            .name
            .filter(|n| !n.trim().is_empty())
            .or_else(|| Some(request.flow.name.clone()).filter(|n| !n.trim().is_empty()))
            .unwrap_or_else(|| DEFAULT_AUTOMATION_NAME.to_string());

        let automation = Automation {
            id: self.next_id(),
            name,
            flow: request.flow,
            intent: request.intent,
            interval_minutes: request.interval_minutes,
            created_at: Utc::now(),
            run_count: 0,
            last_run: None,
            last_results: Vec::new(),
            saved_flow_id: request.saved_flow_id,
        };
        self.inner.store.insert(automation.clone()).await?;
        tracing::info!(
            automation_id = %automation.id,
            interval_minutes = automation.interval_minutes,
            auto_start = request.auto_start,
            "Automation created"
        );

        if request.auto_start {
            self.schedule(&automation.id, automation.interval_minutes);
            self.run_now(&automation.id, RunTrigger::Manual).await?;
        }

        self.get(&automation.id).await
    }

    /// Stored automation with its in-memory `last_results`
    pub async fn get(&self, id: &str) -> Result<Automation> {
        let mut automation = self
            .inner
            .store
            .get(id)
            .await?
            .ok_or_else(|| FlowsmithError::not_found("Automation not found"))?;
        if let Some(results) = self.inner.last_results.get(id) {
            automation.last_results = results.clone();
        }
        Ok(automation)
    }

    pub async fn list(&self) -> Result<Vec<AutomationSummary>> {
        let automations = self.inner.store.list().await?;
        Ok(automations
            .into_iter()
            .map(|a| AutomationSummary {
                active: self.is_active(&a.id),
                integrations: a.intent.integrations.clone(),
                id: a.id,
                name: a.name,
                interval_minutes: a.interval_minutes,
                last_run: a.last_run,
                run_count: a.run_count,
                created_at: a.created_at,
            })
            .collect())
    }

    /// Whether a job is registered for `id`
    pub fn is_active(&self, id: &str) -> bool {
        self.inner.jobs.contains_key(id)
    }

    /// Number of registered jobs
    pub fn active_jobs(&self) -> usize {
        self.inner.jobs.len()
    }

    /// Schedule a known automation and run it once
    pub async fn start(&self, id: &str) -> Result<Automation> {
        let automation = self.get(id).await?;
        let token = self.schedule(id, automation.interval_minutes);
        if let Err(err) = self.run_now(id, RunTrigger::Manual).await {
            // Deleted between the lookup and the first run
            if matches!(err, FlowsmithError::NotFound(_)) {
                self.retire(id, &token);
            }
            return Err(err);
        }
        self.get(id).await
    }

    /// Remove the job; a run already in progress finishes
    pub fn stop(&self, id: &str) -> Result<()> {
        let Some((_, job)) = self.inner.jobs.remove(id) else {
            return Err(FlowsmithError::validation("Automation is not running"));
        };
        job.token.cancel();
        tracing::info!(
            automation_id = %id,
            interval_minutes = job.interval_minutes,
            "Automation stopped"
        );
        Ok(())
    }

    /// Forget the automation entirely; a missing job is fine
    pub async fn delete(&self, id: &str) -> Result<()> {
        if let Some((_, job)) = self.inner.jobs.remove(id) {
            job.token.cancel();
        }
        self.inner.last_results.remove(id);

        let removed = self.inner.store.remove(id).await?;
        // A start racing this delete may have registered a job meanwhile
        if let Some((_, job)) = self.inner.jobs.remove(id) {
            job.token.cancel();
        }
        if !removed {
            return Err(FlowsmithError::not_found("Automation not found"));
        }
        tracing::info!(automation_id = %id, "Automation deleted");
        Ok(())
    }

    /// Run once, outside the schedule, and return the results
    pub async fn run(&self, id: &str) -> Result<Vec<RunResult>> {
        self.run_now(id, RunTrigger::Manual).await
    }

    /// Cancel every job
    pub fn shutdown(&self) {
        for job in self.inner.jobs.iter() {
            job.token.cancel();
        }
        self.inner.jobs.clear();
    }

    async fn run_now(&self, id: &str, trigger: RunTrigger) -> Result<Vec<RunResult>> {
        let automation = self
            .inner
            .store
            .get(id)
            .await?
            .ok_or_else(|| FlowsmithError::not_found("Automation not found"))?;

        let report = self
            .inner
            .executor
            .run_integrations(&automation.name, &automation.intent.integrations)
            .await;
        telemetry::record_automation_run(trigger.as_str());

        let Some(updated) = self.inner.store.record_run(id, Utc::now()).await? else {
            tracing::warn!(automation_id = %id, "Automation deleted during run");
            return Ok(report.results);
        };
        self.inner
            .last_results
            .insert(id.to_string(), report.results.clone());

        tracing::info!(
            automation_id = %id,
            trigger = trigger.as_str(),
            run_count = updated.run_count,
            errors = report.results.iter().filter(|r| r.is_error()).count(),
            "Automation executed"
        );
        Ok(report.results)
    }

    /// One scheduled run; false once the automation is gone and the job is retired
    async fn tick(&self, id: &str, token: &CancellationToken) -> bool {
        match self.run_now(id, RunTrigger::Scheduled).await {
            Ok(_) => true,
            Err(FlowsmithError::NotFound(_)) => {
                tracing::warn!(automation_id = %id, "Automation no longer exists, job retired");
                self.retire(id, token);
                false
            }
            Err(err) => {
                tracing::error!(automation_id = %id, error = %err, "Scheduled run failed");
                true
            }
        }
    }

    /// Cancel `token` and drop its job, leaving a newer job for the same id alone
    fn retire(&self, id: &str, token: &CancellationToken) {
        token.cancel();
        self.inner
            .jobs
            .remove_if(id, |_, job| job.token.is_cancelled());
    }

    /// Register a job for `id`, replacing and cancelling any previous one
    fn schedule(&self, id: &str, interval_minutes: u64) -> CancellationToken {
        let period = Duration::from_secs(interval_minutes.saturating_mul(60));
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let scheduler = self.clone();
        let job_id = id.to_string();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        if !scheduler.tick(&job_id, &cancelled).await {
                            break;
                        }
                    }
                }
            }
            tracing::debug!(automation_id = %job_id, "Job loop ended");
        });

        let job = ScheduledJob {
            token: token.clone(),
            interval_minutes,
        };
        if let Some(previous) = self.inner.jobs.insert(id.to_string(), job) {
            previous.token.cancel();
        }
        tracing::info!(automation_id = %id, interval_minutes, "Automation scheduled");
        token
    }
}
