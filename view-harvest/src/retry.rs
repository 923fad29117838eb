//! Retry planning for failed tasks.
//!
//! The two backends retry differently. The serial backend rebuilds a fresh
//! batch from the failed tasks and runs it as a new session, so the original
//! records stay as they were. The job backend asks the server to rerun the
//! same remote records and keeps the session, bumping each task's attempt.

use crate::domain::{Session, TaskStatus};
use crate::orchestrator::ScrapeBatch;

/// A failed remote task that can be rerun in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RerunTarget {
    pub remote_task_id: String,
    pub job_id: Option<String>,
    pub collaboration_id: String,
}

pub struct RetryCoordinator;

impl RetryCoordinator {
    /// A new batch holding the input records of every failed task, or `None`
    /// when nothing failed.
    pub fn rebuild_batch(session: &Session) -> Option<ScrapeBatch> {
        let videos: Vec<_> = session.failed().map(|t| t.to_video_record()).collect();
        if videos.is_empty() {
            return None;
        }
        Some(ScrapeBatch {
            project_id: session.project_id.clone(),
            report_date: session.report_date,
            videos,
        })
    }

    /// Failed tasks that are backed by a remote task.
    pub fn rerun_targets(session: &Session) -> Vec<RerunTarget> {
        session
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Failed)
            .filter_map(|t| {
                t.remote_task_id.as_ref().map(|id| RerunTarget {
                    remote_task_id: id.clone(),
                    job_id: t.job_id.clone(),
                    collaboration_id: t.collaboration_id.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DaysRange, RequiredInput, ScrapeTask, VideoRecord, WorkflowRule};
    use chrono::{NaiveDate, TimeZone, Utc};

    fn session() -> Session {
        let rule = WorkflowRule {
            name: "recent".to_string(),
            days_range: DaysRange::bounded(0, 14),
            workflow_id: "wf".to_string(),
            workflow_name: "wf".to_string(),
            required_input: RequiredInput::TaskId,
        };
        let published = Utc.with_ymd_and_hms(2026, 10, 10, 0, 0, 0).unwrap();

        let mut ok = ScrapeTask::pending(
            &VideoRecord::new("c1", "A").with_task_id("T1"),
            &rule,
            "T1".to_string(),
        );
        ok.mark_running().unwrap();
        ok.mark_success(1, None).unwrap();

        let mut bad = ScrapeTask::pending(
            &VideoRecord::new("c2", "B")
                .with_task_id("T2")
                .with_publish_date(published),
            &rule,
            "T2".to_string(),
        );
        bad.mark_running().unwrap();
        bad.mark_failed("timeout", None).unwrap();
        bad.remote_task_id = Some("r2".to_string());
        bad.job_id = Some("job-1".to_string());

        let mut local = ScrapeTask::pending(&VideoRecord::new("c3", "C"), &rule, "T3".to_string());
        local.mark_running().unwrap();
        local.mark_failed("network error", None).unwrap();

        Session::new(
            "p1",
            NaiveDate::from_ymd_opt(2026, 10, 18).unwrap(),
            vec![ok, bad, local],
        )
    }

    #[test]
    fn test_rebuild_batch_from_failures() {
        let session = session();
        let batch = RetryCoordinator::rebuild_batch(&session).unwrap();

        assert_eq!(batch.videos.len(), session.failed_tasks);
        assert_eq!(batch.videos[0].collaboration_id, "c2");
        assert_eq!(batch.videos[0].task_id.as_deref(), Some("T2"));
        assert!(batch.videos[0].publish_date.is_some());
        assert_eq!(batch.report_date, session.report_date);
    }

    #[test]
    fn test_nothing_to_rebuild() {
        let mut session = session();
        session.tasks.truncate(1);
        session.recompute();
        assert!(RetryCoordinator::rebuild_batch(&session).is_none());
    }

    #[test]
    fn test_rerun_targets_need_remote_id() {
        let targets = RetryCoordinator::rerun_targets(&session());
        assert_eq!(
            targets,
            vec![RerunTarget {
                remote_task_id: "r2".to_string(),
                job_id: Some("job-1".to_string()),
                collaboration_id: "c2".to_string(),
            }]
        );
    }
}
