//! Aggregate view of one batch run.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{PersistOutcome, ScrapeTask, TaskStatus};

/// Client-side state of a batch run.
///
/// Aggregates are always recomputed from `tasks`, so
/// `completed_tasks == success_tasks + failed_tasks` and
/// `completed_tasks + skipped_tasks <= total_tasks` hold after every update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    pub project_id: String,
    pub report_date: NaiveDate,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub success_tasks: usize,
    pub failed_tasks: usize,
    pub skipped_tasks: usize,
    pub is_running: bool,
    /// Set when the run stopped because cancellation was requested.
    pub cancelled: bool,
    pub tasks: Vec<ScrapeTask>,
    /// Remote jobs backing this session (job backend only).
    #[serde(default)]
    pub job_ids: Vec<String>,
    pub persistence: Option<PersistOutcome>,
}

impl Session {
    pub fn new(project_id: impl Into<String>, report_date: NaiveDate, tasks: Vec<ScrapeTask>) -> Self {
        let mut session = Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            project_id: project_id.into(),
            report_date,
            start_time: Utc::now(),
            end_time: None,
            total_tasks: 0,
            completed_tasks: 0,
            success_tasks: 0,
            failed_tasks: 0,
            skipped_tasks: 0,
            is_running: true,
            cancelled: false,
            tasks,
            job_ids: Vec::new(),
            persistence: None,
        };
        session.recompute();
        session
    }

    /// Recompute aggregates by filtering the task list.
    pub fn recompute(&mut self) {
        let count = |status: TaskStatus| self.tasks.iter().filter(|t| t.status == status).count();
        let (success, failed, skipped) = (
            count(TaskStatus::Success),
            count(TaskStatus::Failed),
            count(TaskStatus::Skipped),
        );

        self.total_tasks = self.tasks.len();
        self.success_tasks = success;
        self.failed_tasks = failed;
        self.skipped_tasks = skipped;
        self.completed_tasks = success + failed;
    }

    /// Number of tasks that take part in execution.
    pub fn executable_tasks(&self) -> usize {
        self.total_tasks - self.skipped_tasks
    }

    /// Completion percentage over executable tasks; `0` when there are none.
    pub fn progress_percent(&self) -> u8 {
        let executable = self.executable_tasks();
        if executable == 0 {
            return 0;
        }
        ((self.completed_tasks as f64 / executable as f64) * 100.0).round() as u8
    }

    /// Whether every executable task reached a terminal status.
    pub fn all_executed(&self) -> bool {
        self.completed_tasks == self.executable_tasks()
    }

    pub fn failed(&self) -> impl Iterator<Item = &ScrapeTask> {
        self.tasks.iter().filter(|t| t.status == TaskStatus::Failed)
    }

    /// Executable tasks submitted to one of `job_ids` that have not reached a
    /// terminal status, whether or not the backend has reported them yet.
    pub fn unfinished_in_jobs(&self, job_ids: &[String]) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.is_executable() && !t.status.is_terminal())
            .filter(|t| t.job_id.as_ref().is_some_and(|id| job_ids.contains(id)))
            .count()
    }

    pub fn position_of(&self, collaboration_id: &str) -> Option<usize> {
        self.tasks
            .iter()
            .position(|t| t.collaboration_id == collaboration_id)
    }

    /// Stop the run and stamp the end time.
    pub fn finish(&mut self, cancelled: bool) {
        self.recompute();
        self.is_running = false;
        self.cancelled = cancelled;
        self.end_time = Some(Utc::now());
    }

    /// Re-open a finished session for an in-place rerun.
    pub fn resume(&mut self) {
        self.is_running = true;
        self.cancelled = false;
        self.end_time = None;
        self.persistence = None;
        self.recompute();
    }

    /// One-line human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "{} success, {} failed, {} skipped of {} ({}%)",
            self.success_tasks,
            self.failed_tasks,
            self.skipped_tasks,
            self.total_tasks,
            self.progress_percent()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DaysRange, RequiredInput, VideoRecord, WorkflowRule};

    fn rule() -> WorkflowRule {
        WorkflowRule {
            name: "recent".to_string(),
            days_range: DaysRange::bounded(0, 14),
            workflow_id: "wf".to_string(),
            workflow_name: "wf".to_string(),
            required_input: RequiredInput::TaskId,
        }
    }

    fn pending(id: &str) -> ScrapeTask {
        ScrapeTask::pending(&VideoRecord::new(id, id), &rule(), id.to_string())
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
    }

    #[test]
    fn test_aggregates_follow_tasks() {
        let mut tasks = vec![
            pending("a"),
            pending("b"),
            pending("c"),
            ScrapeTask::skipped(&VideoRecord::new("d", "d"), None, "no matching workflow"),
        ];
        tasks[0].mark_running().unwrap();
        tasks[0].mark_success(10, None).unwrap();
        tasks[1].mark_running().unwrap();
        tasks[1].mark_failed("boom", None).unwrap();

        let session = Session::new("p1", date(), tasks);
        assert_eq!(session.total_tasks, 4);
        assert_eq!(session.success_tasks, 1);
        assert_eq!(session.failed_tasks, 1);
        assert_eq!(session.skipped_tasks, 1);
        assert_eq!(session.completed_tasks, 2);
        assert_eq!(session.executable_tasks(), 3);
        assert_eq!(session.progress_percent(), 67);
        assert!(!session.all_executed());
        assert_eq!(session.failed().count(), 1);
    }

    #[test]
    fn test_progress_with_nothing_executable() {
        let tasks = vec![ScrapeTask::skipped(
            &VideoRecord::new("a", "a"),
            None,
            "no matching workflow",
        )];
        let session = Session::new("p1", date(), tasks);
        assert_eq!(session.progress_percent(), 0);
        assert!(session.all_executed());

        let empty = Session::new("p1", date(), Vec::new());
        assert_eq!(empty.progress_percent(), 0);
    }

    #[test]
    fn test_unfinished_in_jobs() {
        let mut tasks = vec![pending("a"), pending("b"), pending("c")];
        tasks[0].job_id = Some("job-1".to_string());
        tasks[1].job_id = Some("job-1".to_string());
        tasks[1].mark_running().unwrap();
        tasks[1].mark_success(3, None).unwrap();
        tasks[2].job_id = Some("job-2".to_string());

        let session = Session::new("p1", date(), tasks);
        let polled = vec!["job-1".to_string()];
        assert_eq!(session.unfinished_in_jobs(&polled), 1);
        assert_eq!(session.unfinished_in_jobs(&[]), 0);
    }

    #[test]
    fn test_finish_and_resume() {
        let mut session = Session::new("p1", date(), vec![pending("a")]);
        assert!(session.is_running);
        session.finish(true);
        assert!(!session.is_running);
        assert!(session.cancelled);
        assert!(session.end_time.is_some());

        session.resume();
        assert!(session.is_running);
        assert!(session.end_time.is_none());
    }
}
