//! Wire types of the automation and report APIs.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::ReportEntry;

/// Context sent along with a direct workflow execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMetadata {
    pub collaboration_id: String,
    pub talent_name: String,
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteTaskRequest {
    pub workflow_id: String,
    pub input_value: String,
    pub metadata: TaskMetadata,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteTaskResponse {
    pub success: bool,
    #[serde(default)]
    pub results: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ExecuteTaskResponse {
    pub fn ok(results: Value) -> Self {
        Self {
            success: true,
            results: Some(results),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            results: None,
            error: Some(error.into()),
        }
    }
}

/// One video inside a job submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskTarget {
    pub collaboration_id: String,
    pub nickname: String,
    pub report_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    pub project_id: String,
    pub workflow_id: String,
    pub targets: Vec<TaskTarget>,
}

/// Status of a remote job task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteTaskStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl RemoteTaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Position in the `pending -> processing -> {completed|failed}` lattice.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Processing => 1,
            Self::Completed | Self::Failed => 2,
        }
    }

    /// Whether the backend is still working on the task.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }
}

impl std::fmt::Display for RemoteTaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobTaskMetadata {
    #[serde(default)]
    pub collaboration_id: String,
}

/// A task inside a remote job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobTask {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub status: RemoteTaskStatus,
    #[serde(default)]
    pub metadata: JobTaskMetadata,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    #[serde(default)]
    pub tasks: Vec<JobTask>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveDailyStatsRequest {
    pub project_id: String,
    pub date: NaiveDate,
    pub data: Vec<ReportEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_job_task_deserialize() {
        let job: Job = serde_json::from_value(json!({
            "tasks": [
                {"_id": "t1", "status": "processing", "metadata": {"collaborationId": "c1"}},
                {"_id": "t2", "status": "failed", "metadata": {"collaborationId": "c2"}, "errorMessage": "captcha"}
            ]
        }))
        .unwrap();
        assert_eq!(job.tasks.len(), 2);
        assert_eq!(job.tasks[0].status, RemoteTaskStatus::Processing);
        assert_eq!(job.tasks[1].metadata.collaboration_id, "c2");
        assert_eq!(job.tasks[1].error_message.as_deref(), Some("captcha"));
    }

    #[test]
    fn test_target_omits_absent_ids() {
        let target = TaskTarget {
            collaboration_id: "c1".to_string(),
            nickname: "A".to_string(),
            report_date: NaiveDate::from_ymd_opt(2026, 10, 18).unwrap(),
            video_id: Some("V1".to_string()),
            task_id: None,
        };
        let value = serde_json::to_value(&target).unwrap();
        assert_eq!(value["videoId"], "V1");
        assert_eq!(value["reportDate"], "2026-10-18");
        assert!(value.get("taskId").is_none());
    }

    #[test]
    fn test_status_rank() {
        assert!(RemoteTaskStatus::Pending.rank() < RemoteTaskStatus::Processing.rank());
        assert_eq!(
            RemoteTaskStatus::Completed.rank(),
            RemoteTaskStatus::Failed.rank()
        );
        assert!(!RemoteTaskStatus::Failed.is_active());
    }

    #[test]
    fn test_execute_response_defaults() {
        let response: ExecuteTaskResponse = serde_json::from_str(r#"{"success":false}"#).unwrap();
        assert!(!response.success);
        assert!(response.error.is_none());
    }
}
