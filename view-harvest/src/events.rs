//! Session events for observers.
//!
//! Every orchestrator owns one [`SessionEventBroadcaster`]. Any number of
//! observers can subscribe; dropping the receiver unsubscribes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::domain::{ScrapeTask, Session};

/// Events emitted while a batch runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionEvent {
    /// A session was created and is about to execute.
    SessionStarted {
        session_id: String,
        total_tasks: usize,
        skipped_tasks: usize,
        timestamp: DateTime<Utc>,
    },
    /// A task changed status.
    TaskUpdated {
        session_id: String,
        index: usize,
        task: Box<ScrapeTask>,
        timestamp: DateTime<Utc>,
    },
    /// Aggregates changed.
    Progress {
        session_id: String,
        completed_tasks: usize,
        executable_tasks: usize,
        percent: u8,
        timestamp: DateTime<Utc>,
    },
    /// A job poll finished, whether or not anything changed.
    PollTick {
        session_id: String,
        job_ids: Vec<String>,
        active_tasks: usize,
        all_done: bool,
        timestamp: DateTime<Utc>,
    },
    /// Writing the report failed. Task results are kept.
    PersistFailed {
        session_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
    /// The run stopped, either finished or cancelled.
    SessionCompleted {
        session: Box<Session>,
        timestamp: DateTime<Utc>,
    },
}

impl SessionEvent {
    /// The session the event belongs to.
    pub fn session_id(&self) -> &str {
        match self {
            SessionEvent::SessionStarted { session_id, .. }
            | SessionEvent::TaskUpdated { session_id, .. }
            | SessionEvent::Progress { session_id, .. }
            | SessionEvent::PollTick { session_id, .. }
            | SessionEvent::PersistFailed { session_id, .. } => session_id,
            SessionEvent::SessionCompleted { session, .. } => &session.session_id,
        }
    }

    /// Get a human-readable description of the event.
    pub fn description(&self) -> String {
        match self {
            SessionEvent::SessionStarted {
                total_tasks,
                skipped_tasks,
                ..
            } => format!("session started: {} tasks, {} skipped", total_tasks, skipped_tasks),
            SessionEvent::TaskUpdated { task, .. } => {
                format!("{} ({}): {}", task.talent_name, task.collaboration_id, task.status)
            }
            SessionEvent::Progress {
                completed_tasks,
                executable_tasks,
                percent,
                ..
            } => format!("{}/{} done ({}%)", completed_tasks, executable_tasks, percent),
            SessionEvent::PollTick {
                job_ids,
                active_tasks,
                ..
            } => format!("polled {} job(s), {} task(s) active", job_ids.len(), active_tasks),
            SessionEvent::PersistFailed { error, .. } => format!("report save failed: {}", error),
            SessionEvent::SessionCompleted { session, .. } => {
                let state = if session.cancelled { "cancelled" } else { "finished" };
                format!("session {}: {}", state, session.summary())
            }
        }
    }

    /// Check if this event ends a session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionEvent::SessionCompleted { .. })
    }
}

/// Broadcaster for session events.
#[derive(Clone)]
pub struct SessionEventBroadcaster {
    sender: broadcast::Sender<SessionEvent>,
}

impl SessionEventBroadcaster {
    /// Create a new broadcaster with default capacity (256).
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    /// Create a new broadcaster with specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: SessionEvent) {
        let _ = self.sender.send(event);
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for SessionEventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
