//! Session state ownership and observer notification.

use chrono::Utc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::domain::{PersistOutcome, ScrapeTask, Session};
use crate::events::{SessionEvent, SessionEventBroadcaster};
use crate::{Error, Result};

/// Owns the live [`Session`] of one run.
///
/// All mutations go through here so aggregates are recomputed and observers
/// are notified in the same step. The current state is published on a
/// `watch` channel for handles and the change feed on the broadcaster.
pub struct SessionTracker {
    session_id: String,
    state: watch::Sender<Session>,
    events: SessionEventBroadcaster,
}

impl SessionTracker {
    pub fn new(session: Session, events: SessionEventBroadcaster) -> Self {
        let session_id = session.session_id.clone();
        let (state, _) = watch::channel(session);
        Self {
            session_id,
            state,
            events,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Clone of the current session state.
    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    /// Create a handle observing this session, cancelled through `cancel`.
    pub fn handle(&self, cancel: CancellationToken) -> SessionHandle {
        SessionHandle {
            session_id: self.session_id.clone(),
            state: self.state.subscribe(),
            cancel,
        }
    }

    /// Publish the start event.
    pub fn announce(&self) {
        let session = self.state.borrow();
        self.events.publish(SessionEvent::SessionStarted {
            session_id: self.session_id.clone(),
            total_tasks: session.total_tasks,
            skipped_tasks: session.skipped_tasks,
            timestamp: Utc::now(),
        });
    }

    /// Mutate one task and notify observers.
    ///
    /// If `f` fails the session is left untouched and nobody is notified.
    pub fn update_task<F>(&self, index: usize, f: F) -> Result<ScrapeTask>
    where
        F: FnOnce(&mut ScrapeTask) -> Result<()>,
    {
        let mut outcome = Err(Error::not_found("Task", index.to_string()));

        self.state.send_if_modified(|session| {
            let Some(task) = session.tasks.get_mut(index) else {
                return false;
            };
            match f(task) {
                Ok(()) => {
                    outcome = Ok(task.clone());
                    session.recompute();
                    true
                }
                Err(e) => {
                    outcome = Err(e);
                    false
                }
            }
        });

        let task = outcome?;
        self.publish_task(index, &task);
        self.publish_progress();
        Ok(task)
    }

    /// Apply a batch of task changes atomically.
    ///
    /// `f` returns the indices it changed. Observers receive one
    /// `TaskUpdated` per index and a single `Progress` afterwards.
    pub fn update_tasks<F>(&self, f: F) -> Vec<usize>
    where
        F: FnOnce(&mut Session) -> Vec<usize>,
    {
        let mut changed = Vec::new();
        let mut tasks = Vec::new();

        self.state.send_if_modified(|session| {
            changed = f(session);
            if changed.is_empty() {
                return false;
            }
            session.recompute();
            tasks = changed
                .iter()
                .filter_map(|&i| session.tasks.get(i).cloned().map(|t| (i, t)))
                .collect();
            true
        });

        if !tasks.is_empty() {
            for (index, task) in &tasks {
                self.publish_task(*index, task);
            }
            self.publish_progress();
        }

        changed
    }

    pub fn set_job_ids(&self, job_ids: Vec<String>) {
        self.state.send_modify(|session| session.job_ids = job_ids);
    }

    /// Record the outcome of the persistence step.
    pub fn set_persistence(&self, outcome: PersistOutcome) {
        if let PersistOutcome::Failed { error } = &outcome {
            self.events.publish(SessionEvent::PersistFailed {
                session_id: self.session_id.clone(),
                error: error.clone(),
                timestamp: Utc::now(),
            });
        }
        self.state
            .send_modify(|session| session.persistence = Some(outcome));
    }

    /// Re-open a finished session for an in-place rerun.
    pub fn resume(&self) {
        self.state.send_modify(Session::resume);
        self.publish_progress();
    }

    /// Mark the run stopped and publish the final snapshot.
    pub fn finish(&self, cancelled: bool) -> Session {
        self.state.send_modify(|session| session.finish(cancelled));
        let session = self.snapshot();
        self.events.publish(SessionEvent::SessionCompleted {
            session: Box::new(session.clone()),
            timestamp: Utc::now(),
        });
        session
    }

    /// Publish a poll tick for observers that refresh on every poll.
    /// Tasks of `job_ids` still waiting on the backend.
    pub fn unfinished_in_jobs(&self, job_ids: &[String]) -> usize {
        self.state.borrow().unfinished_in_jobs(job_ids)
    }

    pub fn publish_tick(&self, job_ids: &[String], active_tasks: usize, all_done: bool) {
        self.events.publish(SessionEvent::PollTick {
            session_id: self.session_id.clone(),
            job_ids: job_ids.to_vec(),
            active_tasks,
            all_done,
            timestamp: Utc::now(),
        });
    }

    fn publish_task(&self, index: usize, task: &ScrapeTask) {
        self.events.publish(SessionEvent::TaskUpdated {
            session_id: self.session_id.clone(),
            index,
            task: Box::new(task.clone()),
            timestamp: Utc::now(),
        });
    }

    fn publish_progress(&self) {
        let (completed_tasks, executable_tasks, percent) = {
            let session = self.state.borrow();
            (
                session.completed_tasks,
                session.executable_tasks(),
                session.progress_percent(),
            )
        };
        self.events.publish(SessionEvent::Progress {
            session_id: self.session_id.clone(),
            completed_tasks,
            executable_tasks,
            percent,
            timestamp: Utc::now(),
        });
    }
}

/// Caller-side handle to a submitted batch.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    session_id: String,
    state: watch::Receiver<Session>,
    cancel: CancellationToken,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Clone of the latest session state.
    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.state.borrow().is_running
    }

    /// Request cooperative cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// A receiver that changes whenever the session does.
    pub fn watch(&self) -> watch::Receiver<Session> {
        self.state.clone()
    }

    /// Wait until the run stops and return the final session.
    pub async fn wait(&self) -> Session {
        let mut state = self.state.clone();
        loop {
            {
                let session = state.borrow_and_update();
                if !session.is_running {
                    return session.clone();
                }
            }
            if state.changed().await.is_err() {
                return state.borrow().clone();
            }
        }
    }
}
