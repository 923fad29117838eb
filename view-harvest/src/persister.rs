//! Daily report persistence.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::Result;
use crate::client::ReportStore;
use crate::domain::{PersistOutcome, ReportEntry, ScrapeTask, Session, TaskStatus};

/// Writes the successful results of a session to the report store.
#[derive(Clone)]
pub struct ReportPersister {
    store: Arc<dyn ReportStore>,
}

impl ReportPersister {
    pub fn new(store: Arc<dyn ReportStore>) -> Self {
        Self { store }
    }

    /// Report entries for every successful task with a view count.
    pub fn entries(tasks: &[ScrapeTask]) -> Vec<ReportEntry> {
        tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Success)
            .filter_map(|t| {
                t.fetched_views
                    .map(|views| ReportEntry::auto(t.collaboration_id.clone(), views))
            })
            .collect()
    }

    /// Save the entries in one call. Returns the number of entries written.
    pub async fn try_persist(
        &self,
        project_id: &str,
        date: NaiveDate,
        tasks: &[ScrapeTask],
    ) -> Result<usize> {
        let entries = Self::entries(tasks);
        if entries.is_empty() {
            debug!(project_id = %project_id, date = %date, "No successful results to persist");
            return Ok(0);
        }

        self.store
            .save_daily_stats(project_id, date, &entries)
            .await?;
        Ok(entries.len())
    }

    /// Persist a finished session.
    ///
    /// Failures are returned as [`PersistOutcome::Failed`]; task statuses
    /// are never touched, so the caller may simply invoke this again.
    pub async fn persist_session(&self, session: &Session) -> PersistOutcome {
        match self
            .try_persist(&session.project_id, session.report_date, &session.tasks)
            .await
        {
            Ok(0) => PersistOutcome::Skipped,
            Ok(count) => {
                info!(
                    session_id = %session.session_id,
                    project_id = %session.project_id,
                    date = %session.report_date,
                    count,
                    "Saved report entries"
                );
                PersistOutcome::Saved { count }
            }
            Err(e) => {
                warn!(
                    session_id = %session.session_id,
                    project_id = %session.project_id,
                    error = %e,
                    "Failed to save report"
                );
                PersistOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::domain::{DaysRange, RequiredInput, ReportSource, VideoRecord, WorkflowRule};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingStore {
        calls: Mutex<Vec<Vec<ReportEntry>>>,
        fail: bool,
    }

    #[async_trait]
    impl ReportStore for RecordingStore {
        async fn save_daily_stats(
            &self,
            _project_id: &str,
            _date: NaiveDate,
            data: &[ReportEntry],
        ) -> Result<()> {
            self.calls.lock().push(data.to_vec());
            if self.fail {
                return Err(Error::Remote {
                    status: 500,
                    message: "boom".to_string(),
                });
            }
            Ok(())
        }
    }

    fn session() -> Session {
        let rule = WorkflowRule {
            name: "recent".to_string(),
            days_range: DaysRange::bounded(0, 14),
            workflow_id: "wf".to_string(),
            workflow_name: "wf".to_string(),
            required_input: RequiredInput::TaskId,
        };
        let mut ok = ScrapeTask::pending(&VideoRecord::new("c1", "A"), &rule, "T1".to_string());
        ok.mark_running().unwrap();
        ok.mark_success(12345, None).unwrap();
        let mut bad = ScrapeTask::pending(&VideoRecord::new("c2", "B"), &rule, "T2".to_string());
        bad.mark_running().unwrap();
        bad.mark_failed("scrape failed", None).unwrap();
        let skipped = ScrapeTask::skipped(&VideoRecord::new("c3", "C"), None, "no matching workflow");

        Session::new(
            "p1",
            NaiveDate::from_ymd_opt(2026, 10, 18).unwrap(),
            vec![ok, bad, skipped],
        )
    }

    #[tokio::test]
    async fn test_persists_only_successes_once() {
        let store = Arc::new(RecordingStore::default());
        let persister = ReportPersister::new(store.clone());

        let outcome = persister.persist_session(&session()).await;
        assert_eq!(outcome, PersistOutcome::Saved { count: 1 });

        let calls = store.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].len(), 1);
        assert_eq!(calls[0][0].collaboration_id, "c1");
        assert_eq!(calls[0][0].total_views, 12345);
        assert_eq!(calls[0][0].source, ReportSource::Auto);
    }

    #[tokio::test]
    async fn test_empty_session_skips_store() {
        let store = Arc::new(RecordingStore::default());
        let persister = ReportPersister::new(store.clone());

        let mut session = session();
        session.tasks.remove(0);
        session.recompute();

        assert_eq!(
            persister.persist_session(&session).await,
            PersistOutcome::Skipped
        );
        assert!(store.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_failure_leaves_tasks_alone() {
        let store = Arc::new(RecordingStore {
            fail: true,
            ..Default::default()
        });
        let persister = ReportPersister::new(store);
        let session = session();

        let outcome = persister.persist_session(&session).await;
        assert!(outcome.is_failed());
        assert_eq!(session.tasks[0].status, TaskStatus::Success);
    }
}
