#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use parking_lot::Mutex;
use serde_json::{Value, json};
use view_harvest::client::{
    AutomationClient, Clients, CreateJobRequest, ExecuteTaskRequest, ExecuteTaskResponse, Job,
    JobClient, JobTask, JobTaskMetadata, RemoteTaskStatus, ReportStore,
};
use view_harvest::domain::{ReportEntry, VideoRecord, Workflow};
use view_harvest::orchestrator::OrchestratorConfig;
use view_harvest::{Error, Result};

pub const RECENT_WORKFLOW: &str = "wf-recent";
pub const OVERDUE_WORKFLOW: &str = "wf-overdue";

pub fn workflows() -> Vec<Workflow> {
    vec![
        Workflow::new("wf-profile", "达人主页信息"),
        Workflow::new(RECENT_WORKFLOW, "视频播放量(14天内)"),
        Workflow::new(OVERDUE_WORKFLOW, "视频播放量(14天后)"),
    ]
}

pub fn report_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
}

pub fn days_ago(days: i64) -> DateTime<Utc> {
    Utc::now() - ChronoDuration::days(days)
}

pub fn recent_video(collab: &str, task_id: &str) -> VideoRecord {
    VideoRecord::new(collab, format!("talent-{collab}"))
        .with_task_id(task_id)
        .with_publish_date(days_ago(5))
}

pub fn overdue_video(collab: &str, video_id: &str) -> VideoRecord {
    VideoRecord::new(collab, format!("talent-{collab}"))
        .with_video_id(video_id)
        .with_publish_date(days_ago(20))
}

pub fn views_payload(views: &str) -> Value {
    json!({"result": {"data": {"播放量": views}}})
}

pub fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        task_delay: Duration::ZERO,
        poll_interval: Duration::from_millis(10),
        ..Default::default()
    }
}

/// Automation double answering from a per-input script.
///
/// Each input value pops the next scripted response; the last one repeats.
/// Tracks how many calls are in flight at once.
#[derive(Default)]
pub struct FakeAutomation {
    script: Mutex<HashMap<String, VecDeque<Result<ExecuteTaskResponse>>>>,
    pub calls: Mutex<Vec<ExecuteTaskRequest>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub latency: Duration,
}

impl FakeAutomation {
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Default::default()
        }
    }

    pub fn respond(&self, input: &str, response: ExecuteTaskResponse) -> &Self {
        self.script
            .lock()
            .entry(input.to_string())
            .or_default()
            .push_back(Ok(response));
        self
    }

    pub fn fail(&self, input: &str, error: Error) -> &Self {
        self.script
            .lock()
            .entry(input.to_string())
            .or_default()
            .push_back(Err(error));
        self
    }

    pub fn inputs(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .map(|r| r.input_value.clone())
            .collect()
    }

    fn next(&self, input: &str) -> Result<ExecuteTaskResponse> {
        let mut script = self.script.lock();
        let Some(queue) = script.get_mut(input) else {
            return Ok(ExecuteTaskResponse::ok(views_payload("1")));
        };
        if queue.len() > 1 {
            return queue.pop_front().unwrap();
        }
        match queue.front() {
            Some(Ok(response)) => Ok(response.clone()),
            Some(Err(e)) => Err(Error::Other(e.to_string())),
            None => Ok(ExecuteTaskResponse::ok(views_payload("1"))),
        }
    }
}

#[async_trait]
impl AutomationClient for FakeAutomation {
    async fn get_workflows(&self) -> Result<Vec<Workflow>> {
        Ok(workflows())
    }

    async fn execute_task(&self, request: &ExecuteTaskRequest) -> Result<ExecuteTaskResponse> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.lock().push(request.clone());

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let response = self.next(&request.input_value);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        response
    }
}

/// Job double. Each job walks through a list of snapshots, one per poll;
/// the last snapshot repeats.
#[derive(Default)]
pub struct FakeJobs {
    pub created: Mutex<Vec<CreateJobRequest>>,
    pub reruns: Mutex<Vec<String>>,
    pub polls: AtomicUsize,
    scripts: Mutex<HashMap<String, VecDeque<Job>>>,
    pub fail_create: Mutex<bool>,
}

impl FakeJobs {
    /// Script the snapshots returned for `job_id`.
    pub fn script(&self, job_id: &str, snapshots: Vec<Job>) {
        self.scripts
            .lock()
            .insert(job_id.to_string(), snapshots.into_iter().collect());
    }
}

#[async_trait]
impl JobClient for FakeJobs {
    async fn create_job(&self, request: &CreateJobRequest) -> Result<String> {
        if *self.fail_create.lock() {
            return Err(Error::Remote {
                status: 503,
                message: "job queue unavailable".to_string(),
            });
        }
        let mut created = self.created.lock();
        created.push(request.clone());
        Ok(format!("job-{}", created.len()))
    }

    async fn get_job(&self, job_id: &str) -> Result<Job> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let mut scripts = self.scripts.lock();
        let queue = scripts
            .get_mut(job_id)
            .ok_or_else(|| Error::not_found("Job", job_id))?;
        if queue.len() > 1 {
            return Ok(queue.pop_front().unwrap());
        }
        queue
            .front()
            .cloned()
            .ok_or_else(|| Error::not_found("Job", job_id))
    }

    async fn rerun_task(&self, task_id: &str) -> Result<()> {
        self.reruns.lock().push(task_id.to_string());
        Ok(())
    }
}

pub fn job(tasks: Vec<JobTask>) -> Job {
    Job { tasks }
}

pub fn job_task(id: &str, collab: &str, status: RemoteTaskStatus) -> JobTask {
    JobTask {
        id: id.to_string(),
        status,
        metadata: JobTaskMetadata {
            collaboration_id: collab.to_string(),
        },
        result: None,
        error_message: None,
    }
}

pub fn completed(id: &str, collab: &str, views: &str) -> JobTask {
    JobTask {
        result: Some(views_payload(views)),
        ..job_task(id, collab, RemoteTaskStatus::Completed)
    }
}

pub fn failed(id: &str, collab: &str, message: &str) -> JobTask {
    JobTask {
        error_message: Some(message.to_string()),
        ..job_task(id, collab, RemoteTaskStatus::Failed)
    }
}

/// Report store double recording every save.
#[derive(Default)]
pub struct FakeReports {
    pub saves: Mutex<Vec<(String, NaiveDate, Vec<ReportEntry>)>>,
    pub fail: Mutex<bool>,
}

#[async_trait]
impl ReportStore for FakeReports {
    async fn save_daily_stats(
        &self,
        project_id: &str,
        date: NaiveDate,
        data: &[ReportEntry],
    ) -> Result<()> {
        if *self.fail.lock() {
            return Err(Error::Remote {
                status: 500,
                message: "database unavailable".to_string(),
            });
        }
        self.saves
            .lock()
            .push((project_id.to_string(), date, data.to_vec()));
        Ok(())
    }
}

pub struct Fakes {
    pub automation: Arc<FakeAutomation>,
    pub jobs: Arc<FakeJobs>,
    pub reports: Arc<FakeReports>,
}

impl Fakes {
    pub fn new(automation: FakeAutomation) -> Self {
        Self {
            automation: Arc::new(automation),
            jobs: Arc::new(FakeJobs::default()),
            reports: Arc::new(FakeReports::default()),
        }
    }

    pub fn clients(&self) -> Clients {
        Clients {
            automation: self.automation.clone(),
            jobs: self.jobs.clone(),
            reports: self.reports.clone(),
        }
    }
}
