//! Scrape tasks and their lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{RequiredInput, VideoRecord, WorkflowRule};
use crate::Error;

/// Lifecycle status of a scrape task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Waiting to be executed.
    #[default]
    Pending,
    /// The remote call is in flight.
    Running,
    /// A view count was obtained.
    Success,
    /// The remote call or result parsing failed.
    Failed,
    /// Never executable: no workflow or no input value. Assigned at creation only.
    Skipped,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }

    /// Check if no further transition happens without an explicit rerun.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Skipped)
    }

    /// Validate a state transition.
    ///
    /// `Failed -> Pending` is the rerun path and is only reachable through
    /// [`ScrapeTask::reset_for_rerun`].
    pub fn can_transition_to(&self, target: TaskStatus) -> bool {
        use TaskStatus::*;

        matches!(
            (self, target),
            (Pending, Running) | (Running, Success | Failed) | (Failed, Pending)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of work: scrape one video's view count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeTask {
    pub collaboration_id: String,
    pub talent_name: String,
    pub video_id: Option<String>,
    pub task_id: Option<String>,
    pub publish_date: Option<DateTime<Utc>>,
    pub workflow_id: Option<String>,
    pub workflow_name: Option<String>,
    pub required_input: Option<RequiredInput>,
    pub input_value: Option<String>,
    pub status: TaskStatus,
    pub fetched_views: Option<u64>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub duration_ms: Option<u64>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Id of the backing remote task (job backend only).
    pub remote_task_id: Option<String>,
    /// Id of the job the remote task belongs to (job backend only).
    pub job_id: Option<String>,
    /// Execution attempt, starting at 1. Reruns of the same remote record increment it.
    pub attempt: u32,
}

impl ScrapeTask {
    /// Create an executable task for `video` routed through `rule`.
    pub fn pending(video: &VideoRecord, rule: &WorkflowRule, input_value: String) -> Self {
        Self {
            workflow_id: Some(rule.workflow_id.clone()),
            workflow_name: Some(rule.workflow_name.clone()),
            required_input: Some(rule.required_input),
            input_value: Some(input_value),
            ..Self::base(video, TaskStatus::Pending)
        }
    }

    /// Create a task that will never run, with a human-readable reason.
    pub fn skipped(video: &VideoRecord, rule: Option<&WorkflowRule>, reason: &str) -> Self {
        Self {
            workflow_id: rule.map(|r| r.workflow_id.clone()),
            workflow_name: rule.map(|r| r.workflow_name.clone()),
            required_input: rule.map(|r| r.required_input),
            error: Some(reason.to_string()),
            ..Self::base(video, TaskStatus::Skipped)
        }
    }

    fn base(video: &VideoRecord, status: TaskStatus) -> Self {
        Self {
            collaboration_id: video.collaboration_id.clone(),
            talent_name: video.talent_name.clone(),
            video_id: video.video_id.clone(),
            task_id: video.task_id.clone(),
            publish_date: video.publish_date,
            workflow_id: None,
            workflow_name: None,
            required_input: None,
            input_value: None,
            status,
            fetched_views: None,
            result: None,
            error: None,
            duration_ms: None,
            started_at: None,
            finished_at: None,
            remote_task_id: None,
            job_id: None,
            attempt: 1,
        }
    }

    /// Whether the task takes part in execution at all.
    pub fn is_executable(&self) -> bool {
        self.status != TaskStatus::Skipped
    }

    /// The minimal input record needed to plan this task again.
    pub fn to_video_record(&self) -> VideoRecord {
        VideoRecord {
            collaboration_id: self.collaboration_id.clone(),
            talent_name: self.talent_name.clone(),
            video_id: self.video_id.clone(),
            task_id: self.task_id.clone(),
            publish_date: self.publish_date,
        }
    }

    fn transition(&mut self, target: TaskStatus) -> Result<(), Error> {
        if !self.status.can_transition_to(target) {
            return Err(Error::InvalidStateTransition {
                from: self.status.to_string(),
                to: target.to_string(),
            });
        }
        self.status = target;
        Ok(())
    }

    /// `pending -> running`.
    pub fn mark_running(&mut self) -> Result<(), Error> {
        self.transition(TaskStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// `running -> success`.
    pub fn mark_success(&mut self, views: u64, result: Option<Value>) -> Result<(), Error> {
        self.transition(TaskStatus::Success)?;
        self.fetched_views = Some(views);
        self.result = result;
        self.error = None;
        self.stamp_finished();
        Ok(())
    }

    /// `running -> failed`.
    pub fn mark_failed(
        &mut self,
        error: impl Into<String>,
        result: Option<Value>,
    ) -> Result<(), Error> {
        self.transition(TaskStatus::Failed)?;
        self.error = Some(error.into());
        self.result = result;
        self.stamp_finished();
        Ok(())
    }

    /// `failed -> pending` for an in-place rerun of the same remote record.
    pub fn reset_for_rerun(&mut self) -> Result<(), Error> {
        self.transition(TaskStatus::Pending)?;
        self.attempt += 1;
        self.fetched_views = None;
        self.result = None;
        self.error = None;
        self.duration_ms = None;
        self.started_at = None;
        self.finished_at = None;
        Ok(())
    }

    fn stamp_finished(&mut self) {
        let now = Utc::now();
        self.finished_at = Some(now);
        if self.duration_ms.is_none() {
            self.duration_ms = self
                .started_at
                .and_then(|start| (now - start).to_std().ok())
                .map(|d| d.as_millis() as u64);
        }
    }
}
