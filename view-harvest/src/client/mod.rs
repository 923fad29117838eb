//! Remote services consumed by the scrape pipeline.
//!
//! The automation service runs workflows (directly or as server-side jobs)
//! and the report store receives the collected figures. Both are reached
//! through the traits below so the executors can run against the HTTP client
//! or an in-memory double.

mod http;
mod types;

pub use http::{HttpApiClient, HttpApiConfig};
pub use types::{
    CreateJobRequest, ExecuteTaskRequest, ExecuteTaskResponse, Job, JobTask, JobTaskMetadata,
    RemoteTaskStatus, SaveDailyStatsRequest, TaskMetadata, TaskTarget,
};

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::Result;
use crate::domain::{ReportEntry, Workflow};

/// Direct workflow execution.
#[async_trait]
pub trait AutomationClient: Send + Sync {
    async fn get_workflows(&self) -> Result<Vec<Workflow>>;
    async fn execute_task(&self, request: &ExecuteTaskRequest) -> Result<ExecuteTaskResponse>;
}

/// Server-side scrape jobs.
#[async_trait]
pub trait JobClient: Send + Sync {
    /// Submit a job and return its id.
    async fn create_job(&self, request: &CreateJobRequest) -> Result<String>;
    async fn get_job(&self, job_id: &str) -> Result<Job>;
    /// Reset a finished remote task so the backend runs it again.
    async fn rerun_task(&self, task_id: &str) -> Result<()>;
}

/// Daily report persistence.
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn save_daily_stats(
        &self,
        project_id: &str,
        date: NaiveDate,
        data: &[ReportEntry],
    ) -> Result<()>;
}

/// The set of remote collaborators an orchestrator needs.
#[derive(Clone)]
pub struct Clients {
    pub automation: Arc<dyn AutomationClient>,
    pub jobs: Arc<dyn JobClient>,
    pub reports: Arc<dyn ReportStore>,
}

impl Clients {
    /// Use one HTTP client for every collaborator.
    pub fn from_http(client: Arc<HttpApiClient>) -> Self {
        Self {
            automation: client.clone(),
            jobs: client.clone(),
            reports: client,
        }
    }
}
