//! One-at-a-time execution against the automation service.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use view_parser::ViewCountParser;

use super::{TaskOutcome, finalize};
use crate::client::{AutomationClient, ExecuteTaskRequest, TaskMetadata};
use crate::domain::{ScrapeTask, Session, TaskStatus};
use crate::persister::ReportPersister;
use crate::tracker::SessionTracker;

#[derive(Debug, Clone)]
pub struct SerialExecutorConfig {
    /// Pause between two consecutive tasks.
    pub task_delay: Duration,
}

impl Default for SerialExecutorConfig {
    fn default() -> Self {
        Self {
            task_delay: Duration::from_millis(2000),
        }
    }
}

/// Runs the pending tasks of a session strictly in order, never more than
/// one remote call in flight.
pub struct SerialExecutor {
    client: Arc<dyn AutomationClient>,
    persister: Option<ReportPersister>,
    parser: ViewCountParser,
    config: SerialExecutorConfig,
}

impl SerialExecutor {
    pub fn new(client: Arc<dyn AutomationClient>, config: SerialExecutorConfig) -> Self {
        Self {
            client,
            persister: None,
            parser: ViewCountParser::default(),
            config,
        }
    }

    pub fn with_persister(mut self, persister: ReportPersister) -> Self {
        self.persister = Some(persister);
        self
    }

    pub fn with_parser(mut self, parser: ViewCountParser) -> Self {
        self.parser = parser;
        self
    }

    /// Execute every pending task, persist, and finish the session.
    ///
    /// Cancellation is checked before each task; an in-flight call is allowed
    /// to complete and tasks not yet started stay `pending`.
    pub async fn run(&self, tracker: &SessionTracker, cancel: &CancellationToken) -> Session {
        let pending: Vec<usize> = tracker
            .snapshot()
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.status == TaskStatus::Pending)
            .map(|(i, _)| i)
            .collect();

        info!(
            session_id = %tracker.session_id(),
            tasks = pending.len(),
            "Starting serial run"
        );

        for (position, &index) in pending.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(
                    session_id = %tracker.session_id(),
                    remaining = pending.len() - position,
                    "Run cancelled"
                );
                break;
            }

            self.execute(tracker, index).await;

            let is_last = position + 1 == pending.len();
            if !is_last && !self.config.task_delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.config.task_delay) => {}
                }
            }
        }

        let cancelled = cancel.is_cancelled() && !tracker.snapshot().all_executed();
        let session = finalize(tracker, self.persister.as_ref(), cancelled).await;
        info!(
            session_id = %session.session_id,
            cancelled,
            "Serial run finished: {}",
            session.summary()
        );
        session
    }

    async fn execute(&self, tracker: &SessionTracker, index: usize) {
        let task = match tracker.update_task(index, ScrapeTask::mark_running) {
            Ok(task) => task,
            Err(e) => {
                warn!("Cannot start task {}: {}", index, e);
                return;
            }
        };

        let outcome = match (task.workflow_id.clone(), task.input_value.clone()) {
            (Some(workflow_id), Some(input_value)) => {
                let request = ExecuteTaskRequest {
                    workflow_id,
                    input_value,
                    metadata: TaskMetadata {
                        collaboration_id: task.collaboration_id.clone(),
                        talent_name: task.talent_name.clone(),
                        session_id: tracker.session_id().to_string(),
                    },
                };
                debug!(
                    collaboration_id = %task.collaboration_id,
                    workflow_id = %request.workflow_id,
                    "Executing task"
                );

                match self.client.execute_task(&request).await {
                    Ok(response) if response.success => {
                        TaskOutcome::from_result(&self.parser, response.results)
                    }
                    Ok(response) => TaskOutcome::failure(response.error, response.results),
                    Err(e) => {
                        warn!(
                            collaboration_id = %task.collaboration_id,
                            "Task execution failed: {}", e
                        );
                        TaskOutcome::from_error(&e)
                    }
                }
            }
            _ => TaskOutcome::failure(Some("task has no workflow input".to_string()), None),
        };

        if let Err(e) = tracker.update_task(index, |t| outcome.apply(t)) {
            warn!("Cannot record result of task {}: {}", index, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Result;
    use crate::client::{ExecuteTaskResponse, HttpApiClient, HttpApiConfig};
    use crate::domain::{DaysRange, RequiredInput, VideoRecord, Workflow, WorkflowRule};
    use crate::events::SessionEventBroadcaster;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct ScriptedClient {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AutomationClient for ScriptedClient {
        async fn get_workflows(&self) -> Result<Vec<Workflow>> {
            Ok(Vec::new())
        }

        async fn execute_task(&self, request: &ExecuteTaskRequest) -> Result<ExecuteTaskResponse> {
            self.calls.lock().push(request.input_value.clone());
            Ok(match request.input_value.as_str() {
                "ok" => ExecuteTaskResponse::ok(json!({"data": {"views": 42}})),
                "empty" => ExecuteTaskResponse::ok(json!({"data": {}})),
                _ => ExecuteTaskResponse::failed("timeout"),
            })
        }
    }

    fn tracker(inputs: &[&str]) -> SessionTracker {
        let rule = WorkflowRule {
            name: "recent".to_string(),
            days_range: DaysRange::bounded(0, 14),
            workflow_id: "wf".to_string(),
            workflow_name: "wf".to_string(),
            required_input: RequiredInput::TaskId,
        };
        let tasks = inputs
            .iter()
            .enumerate()
            .map(|(i, input)| {
                ScrapeTask::pending(
                    &VideoRecord::new(format!("c{i}"), "talent"),
                    &rule,
                    input.to_string(),
                )
            })
            .collect();
        let session = Session::new("p1", NaiveDate::from_ymd_opt(2026, 10, 18).unwrap(), tasks);
        SessionTracker::new(session, SessionEventBroadcaster::new())
    }

    fn executor(client: Arc<ScriptedClient>) -> SerialExecutor {
        SerialExecutor::new(
            client,
            SerialExecutorConfig {
                task_delay: Duration::ZERO,
            },
        )
    }

    #[tokio::test]
    async fn test_runs_in_input_order() {
        let client = Arc::new(ScriptedClient::default());
        let tracker = tracker(&["ok", "bad", "empty"]);

        let session = executor(client.clone())
            .run(&tracker, &CancellationToken::new())
            .await;

        assert_eq!(*client.calls.lock(), vec!["ok", "bad", "empty"]);
        assert!(!session.is_running);
        assert!(!session.cancelled);
        assert_eq!(session.success_tasks, 1);
        assert_eq!(session.failed_tasks, 2);
        assert_eq!(session.tasks[0].fetched_views, Some(42));
        assert_eq!(session.tasks[1].error.as_deref(), Some("timeout"));
        assert_eq!(
            session.tasks[2].error.as_deref(),
            Some(crate::executor::VIEWS_NOT_FOUND)
        );
    }

    #[tokio::test]
    async fn test_unreachable_service_records_network_error() {
        let client = HttpApiClient::new(HttpApiConfig {
            base_url: "http://127.0.0.1:1/".to_string(),
            request_timeout: Duration::from_secs(5),
            execute_timeout: Duration::from_secs(5),
            ..Default::default()
        })
        .unwrap();
        let tracker = tracker(&["T1", "T2"]);

        let session = SerialExecutor::new(
            Arc::new(client),
            SerialExecutorConfig {
                task_delay: Duration::ZERO,
            },
        )
        .run(&tracker, &CancellationToken::new())
        .await;

        assert!(!session.is_running);
        assert_eq!(session.failed_tasks, 2);
        for task in &session.tasks {
            assert_eq!(task.status, TaskStatus::Failed);
            assert_eq!(task.error.as_deref(), Some(crate::executor::NETWORK_ERROR));
            assert!(task.result.is_none());
        }
    }

    #[tokio::test]
    async fn test_cancelled_before_start_leaves_pending() {
        let client = Arc::new(ScriptedClient::default());
        let tracker = tracker(&["ok", "ok"]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let session = executor(client.clone()).run(&tracker, &cancel).await;

        assert!(client.calls.lock().is_empty());
        assert!(session.cancelled);
        assert!(!session.is_running);
        assert!(session.end_time.is_some());
        assert!(session.tasks.iter().all(|t| t.status == TaskStatus::Pending));
    }
}
