//! Client-side serial backend.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{OrchestratorConfig, ScrapeBatch, ScrapeOrchestrator, plan_session};
use crate::client::Clients;
use crate::config::ExecutionMode;
use crate::domain::Session;
use crate::events::{SessionEvent, SessionEventBroadcaster};
use crate::executor::{SerialExecutor, SerialExecutorConfig};
use crate::persister::ReportPersister;
use crate::retry::RetryCoordinator;
use crate::tracker::{SessionHandle, SessionTracker};
use crate::{Error, Result};

struct ActiveRun {
    session_id: String,
    cancel: CancellationToken,
    join: JoinHandle<Session>,
}

/// Runs batches one task at a time on the client.
///
/// Retrying builds a new session from the failed tasks; the original
/// session is left untouched.
pub struct SerialOrchestrator {
    clients: Clients,
    config: OrchestratorConfig,
    executor: Arc<SerialExecutor>,
    events: SessionEventBroadcaster,
    submit_lock: tokio::sync::Mutex<()>,
    active: Mutex<Option<ActiveRun>>,
}

impl SerialOrchestrator {
    pub fn new(clients: Clients, config: OrchestratorConfig) -> Self {
        let mut executor = SerialExecutor::new(
            clients.automation.clone(),
            SerialExecutorConfig {
                task_delay: config.task_delay,
            },
        )
        .with_parser(config.parser());
        if config.persist_reports {
            executor = executor.with_persister(ReportPersister::new(clients.reports.clone()));
        }

        Self {
            events: SessionEventBroadcaster::with_capacity(config.event_capacity),
            executor: Arc::new(executor),
            clients,
            config,
            submit_lock: tokio::sync::Mutex::new(()),
            active: Mutex::new(None),
        }
    }

    /// Id of the session currently owned by this orchestrator.
    pub fn active_session_id(&self) -> Option<String> {
        self.active.lock().as_ref().map(|run| run.session_id.clone())
    }

    async fn stop_active(&self) {
        let active = self.active.lock().take();
        if let Some(run) = active {
            run.cancel.cancel();
            match run.join.await {
                Ok(session) => debug!(
                    session_id = %session.session_id,
                    "Previous run stopped: {}",
                    session.summary()
                ),
                Err(e) => warn!(session_id = %run.session_id, "Previous run ended abnormally: {}", e),
            }
        }
    }
}

#[async_trait]
impl ScrapeOrchestrator for SerialOrchestrator {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Serial
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

        let session_id = session.session_id.clone();
        info!(
            session_id = %session_id,
            project_id = %session.project_id,
            report_date = %session.report_date,
            "Submitting batch: {} tasks, {} skipped",
            session.total_tasks,
            session.skipped_tasks
        );

        let tracker = SessionTracker::new(session, self.events.clone());
        let cancel = CancellationToken::new();
        let handle = tracker.handle(cancel.clone());
        tracker.announce();

        let executor = self.executor.clone();
        let run_cancel = cancel.clone();
        let join = tokio::spawn(async move { executor.run(&tracker, &run_cancel).await });

        *self.active.lock() = Some(ActiveRun {
            session_id,
            cancel,
            join,
        });
        Ok(handle)
    }

    async fn cancel(&self, handle: &SessionHandle) {
        debug!(session_id = %handle.session_id(), "Cancelling session");
        handle.cancel();
    }

    async fn retry_failed(&self, handle: &SessionHandle) -> Result<SessionHandle> {
        let session = handle.snapshot();
        if session.is_running {
            return Err(Error::validation(format!(
                "session {} is still running",
                session.session_id
            )));
        }

        let batch = RetryCoordinator::rebuild_batch(&session).ok_or_else(|| {
            Error::validation(format!("session {} has no failed tasks", session.session_id))
        })?;
        info!(
            session_id = %session.session_id,
            "Retrying {} failed tasks in a new session",
            batch.videos.len()
        );
        self.submit(batch).await
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn shutdown(&self) {
        let _guard = self.submit_lock.lock().await;
        self.stop_active().await;
    }
}

impl Drop for SerialOrchestrator {
    fn drop(&mut self) {
        if let Some(run) = self.active.get_mut().take() {
            run.cancel.cancel();
            run.join.abort();
        }
    }
}
