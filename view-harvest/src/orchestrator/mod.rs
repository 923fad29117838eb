//! Batch orchestration behind one interface.
//!
//! A [`ScrapeOrchestrator`] accepts a batch of video records, plans the
//! tasks, and runs them with its backend. Each orchestrator owns at most one
//! active run; submitting a new batch tears the previous one down first.

mod polling;
mod serial;

pub use polling::PollingOrchestrator;
pub use serial::SerialOrchestrator;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::info;
use view_parser::ViewCountParser;

use crate::Result;
use crate::builder::TaskBuilder;
use crate::client::{AutomationClient, Clients};
use crate::config::{ExecutionMode, HarvestConfig};
use crate::domain::{Session, VideoRecord};
use crate::events::SessionEvent;
use crate::selector::{RuleTemplate, WorkflowCatalog, default_rule_templates};
use crate::tracker::SessionHandle;

/// A set of videos to scrape for one project and report date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeBatch {
    pub project_id: String,
    pub report_date: NaiveDate,
    pub videos: Vec<VideoRecord>,
}

impl ScrapeBatch {
    pub fn new(
        project_id: impl Into<String>,
        report_date: NaiveDate,
        videos: Vec<VideoRecord>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            report_date,
            videos,
        }
    }
}

/// Run bounded batches of external scrapes with progress and retry.
#[async_trait]
pub trait ScrapeOrchestrator: Send + Sync {
    fn mode(&self) -> ExecutionMode;

    /// Plan and start a batch, superseding any active one.
    async fn submit(&self, batch: ScrapeBatch) -> Result<SessionHandle>;

    /// Stop the run behind `handle`. Idempotent.
    async fn cancel(&self, handle: &SessionHandle);

    /// Retry the failed tasks of the session behind `handle`.
    async fn retry_failed(&self, handle: &SessionHandle) -> Result<SessionHandle>;

    /// Subscribe to events of every session run by this orchestrator.
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;

    /// Stop the active run and wait for it to finish.
    async fn shutdown(&self);
}

/// Settings shared by both backends.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub task_delay: Duration,
    pub poll_interval: Duration,
    pub persist_reports: bool,
    pub rule_templates: Vec<RuleTemplate>,
    pub view_count_keys: Vec<String>,
    pub event_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from(&HarvestConfig::default())
    }
}

impl From<&HarvestConfig> for OrchestratorConfig {
    fn from(config: &HarvestConfig) -> Self {
        Self {
            task_delay: config.task_delay(),
            poll_interval: config.poll_interval(),
            persist_reports: config.persist_reports,
            rule_templates: if config.workflow_rules.is_empty() {
                default_rule_templates()
            } else {
                config.workflow_rules.clone()
            },
            view_count_keys: config.view_count_keys.clone(),
            event_capacity: config.event_capacity,
        }
    }
}

impl OrchestratorConfig {
    pub(crate) fn parser(&self) -> ViewCountParser {
        if self.view_count_keys.is_empty() {
            ViewCountParser::default()
        } else {
            ViewCountParser::with_keys(self.view_count_keys.iter().cloned())
        }
    }
}

/// Build the orchestrator selected by `config.mode`.
pub fn build_orchestrator(config: &HarvestConfig, clients: Clients) -> Arc<dyn ScrapeOrchestrator> {
    let settings = OrchestratorConfig::from(config);
    info!(mode = %config.mode, "Using {} orchestrator", config.mode);
    match config.mode {
        ExecutionMode::Serial => Arc::new(SerialOrchestrator::new(clients, settings)),
        ExecutionMode::Polling => Arc::new(PollingOrchestrator::new(clients, settings)),
    }
}

/// Resolve the workflow catalog from the automation service.
pub async fn resolve_catalog(
    automation: &dyn AutomationClient,
    templates: &[RuleTemplate],
) -> Result<WorkflowCatalog> {
    let workflows = automation.get_workflows().await?;
    WorkflowCatalog::from_workflows(&workflows, templates)
}

/// Build the session for a batch against a freshly resolved catalog.
pub(crate) async fn plan_session(
    automation: &dyn AutomationClient,
    templates: &[RuleTemplate],
    batch: &ScrapeBatch,
) -> Result<Session> {
    let catalog = resolve_catalog(automation, templates).await?;
    let tasks = TaskBuilder::new(&catalog).build_all(&batch.videos);
    Ok(Session::new(
        batch.project_id.clone(),
        batch.report_date,
        tasks,
    ))
}
