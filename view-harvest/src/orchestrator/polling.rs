//! Server-side job backend.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{OrchestratorConfig, ScrapeBatch, ScrapeOrchestrator, plan_session};
use crate::client::Clients;
use crate::config::ExecutionMode;
use crate::events::{SessionEvent, SessionEventBroadcaster};
use crate::executor::{CachedTask, PollingExecutor, PollingExecutorConfig};
use crate::persister::ReportPersister;
use crate::retry::RetryCoordinator;
use crate::tracker::{SessionHandle, SessionTracker};
use crate::{Error, Result};

struct ActiveSession {
    tracker: Arc<SessionTracker>,
    cancel: CancellationToken,
}

/// Runs batches as server-side jobs and follows them by polling.
///
/// Retrying reruns the same remote records in place; the session is kept
/// and resumed, and each rerun task's attempt counter goes up.
pub struct PollingOrchestrator {
    clients: Clients,
    config: OrchestratorConfig,
    executor: PollingExecutor,
    events: SessionEventBroadcaster,
    submit_lock: tokio::sync::Mutex<()>,
    active: Mutex<Option<ActiveSession>>,
}

impl PollingOrchestrator {
    pub fn new(clients: Clients, config: OrchestratorConfig) -> Self {
        let mut executor = PollingExecutor::new(
            clients.jobs.clone(),
            PollingExecutorConfig {
                poll_interval: config.poll_interval,
            },
        )
        .with_parser(config.parser());
        if config.persist_reports {
            executor = executor.with_persister(ReportPersister::new(clients.reports.clone()));
        }

        Self {
            events: SessionEventBroadcaster::with_capacity(config.event_capacity),
            executor,
            clients,
            config,
            submit_lock: tokio::sync::Mutex::new(()),
            active: Mutex::new(None),
        }
    }

    /// Id of the session currently owned by this orchestrator.
    pub fn active_session_id(&self) -> Option<String> {
        self.active
            .lock()
            .as_ref()
            .map(|a| a.tracker.session_id().to_string())
    }

    /// Whether a poll loop is alive.
    pub fn is_polling(&self) -> bool {
        self.executor.is_polling()
    }

    /// Last known remote state of a collaboration in the active session.
    pub fn cached(&self, collaboration_id: &str) -> Option<CachedTask> {
        self.executor.cached(collaboration_id)
    }

    /// Rerun one failed remote task of the active session in place.
    pub async fn rerun_task(
        &self,
        handle: &SessionHandle,
        remote_task_id: &str,
    ) -> Result<SessionHandle> {
        let _guard = self.submit_lock.lock().await;
        self.rerun(handle, vec![remote_task_id.to_string()]).await
    }

    async fn rerun(&self, handle: &SessionHandle, remote_task_ids: Vec<String>) -> Result<SessionHandle> {
        let (tracker, cancel) = self.owned(handle)?;

        // A cancelled session gets a fresh token so the new poll loop can run.
        let cancel = if cancel.is_cancelled() {
            let fresh = CancellationToken::new();
            if let Some(active) = self.active.lock().as_mut() {
                active.cancel = fresh.clone();
            }
            fresh
        } else {
            cancel
        };

        self.executor
            .rerun(&remote_task_ids, tracker.clone(), &cancel)
            .await?;
        Ok(tracker.handle(cancel))
    }

    fn owned(&self, handle: &SessionHandle) -> Result<(Arc<SessionTracker>, CancellationToken)> {
        match self.active.lock().as_ref() {
            Some(active) if active.tracker.session_id() == handle.session_id() => {
                Ok((active.tracker.clone(), active.cancel.clone()))
            }
            _ => Err(Error::not_found("Session", handle.session_id())),
        }
    }

    async fn stop_active(&self) {
        let active = self.active.lock().take();
        if let Some(active) = active {
            active.cancel.cancel();
            self.executor.stop_polling().await;
            if active.tracker.snapshot().is_running {
                active.tracker.finish(true);
            }
            debug!(session_id = %active.tracker.session_id(), "Previous session stopped");
        }
    }
}

#[async_trait]
impl ScrapeOrchestrator for PollingOrchestrator {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Polling
    }

    async fn submit(&self, batch: ScrapeBatch) -> Result<SessionHandle> {
        let _guard = self.submit_lock.lock().await;

        let session = plan_session(
            self.clients.automation.as_ref(),
            &self.config.rule_templates,
            &batch,
        )
        .await?;

        self.stop_active().await;

        info!(
            session_id = %session.session_id,
            project_id = %session.project_id,
            report_date = %session.report_date,
            "Submitting batch as jobs: {} tasks, {} skipped",
            session.total_tasks,
            session.skipped_tasks
        );

        let tracker = Arc::new(SessionTracker::new(session, self.events.clone()));
        let cancel = CancellationToken::new();
        let handle = tracker.handle(cancel.clone());
        tracker.announce();
        *self.active.lock() = Some(ActiveSession {
            tracker: tracker.clone(),
            cancel: cancel.clone(),
        });

        let job_ids = self.executor.submit_jobs(&tracker).await;
        if job_ids.is_empty() {
            self.executor
                .complete(&tracker, cancel.is_cancelled())
                .await;
        } else {
            self.executor
                .start_polling(job_ids, tracker, &cancel)
                .await;
        }

        Ok(handle)
    }

    async fn cancel(&self, handle: &SessionHandle) {
        debug!(session_id = %handle.session_id(), "Cancelling session");
        handle.cancel();

        let _guard = self.submit_lock.lock().await;
        if let Ok((tracker, _)) = self.owned(handle) {
            self.executor.stop_polling().await;
            if tracker.snapshot().is_running {
                self.executor.complete(&tracker, true).await;
            }
        }
    }

    async fn retry_failed(&self, handle: &SessionHandle) -> Result<SessionHandle> {
        let _guard = self.submit_lock.lock().await;

        let (tracker, _) = self.owned(handle)?;
        let targets = RetryCoordinator::rerun_targets(&tracker.snapshot());
        if targets.is_empty() {
            return Err(Error::validation(format!(
                "session {} has no failed remote tasks",
                handle.session_id()
            )));
        }

        info!(
            session_id = %handle.session_id(),
            "Rerunning {} failed remote tasks",
            targets.len()
        );
        let ids = targets.into_iter().map(|t| t.remote_task_id).collect();
        self.rerun(handle, ids).await
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn shutdown(&self) {
        let _guard = self.submit_lock.lock().await;
        self.stop_active().await;
    }
}
