//! Task execution backends.
//!
//! [`SerialExecutor`] runs one task at a time against the automation
//! service. [`PollingExecutor`] hands the batch to the server as jobs and
//! follows their progress by polling.

mod polling;
mod serial;

pub use polling::{CachedTask, PollingExecutor, PollingExecutorConfig, TaskStatusCache};
pub use serial::{SerialExecutor, SerialExecutorConfig};

use serde_json::Value;
use tracing::warn;
use view_parser::ViewCountParser;

use crate::domain::{PersistOutcome, ScrapeTask, Session};
use crate::persister::ReportPersister;
use crate::tracker::SessionTracker;
use crate::{Error, Result};

/// Error recorded when the transport failed.
pub const NETWORK_ERROR: &str = "network error";
/// Error recorded when the remote side failed without a message.
pub const SCRAPE_FAILED: &str = "scrape failed";
/// Error recorded when a successful result had no usable view count.
pub const VIEWS_NOT_FOUND: &str = "view count not found in result";

/// Terminal result of one task attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Success { views: u64, result: Option<Value> },
    Failed { error: String, result: Option<Value> },
}

impl TaskOutcome {
    /// Outcome of a successful remote run, depending on whether a view count
    /// can be read from the payload.
    pub fn from_result(parser: &ViewCountParser, result: Option<Value>) -> Self {
        match result.as_ref().and_then(|payload| parser.extract(payload)) {
            Some(views) => Self::Success { views, result },
            None => {
                warn!("Remote run succeeded but no view count was found");
                Self::Failed {
                    error: VIEWS_NOT_FOUND.to_string(),
                    result,
                }
            }
        }
    }

    /// Outcome of a failed remote run.
    pub fn failure(error: Option<String>, result: Option<Value>) -> Self {
        let error = error
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| SCRAPE_FAILED.to_string());
        Self::Failed { error, result }
    }

    /// Outcome of a call that never produced a response.
    pub fn from_error(error: &Error) -> Self {
        let error = if error.is_network() {
            NETWORK_ERROR.to_string()
        } else {
            error.to_string()
        };
        Self::Failed {
            error,
            result: None,
        }
    }

    /// Apply to a running task.
    pub fn apply(self, task: &mut ScrapeTask) -> Result<()> {
        match self {
            Self::Success { views, result } => task.mark_success(views, result),
            Self::Failed { error, result } => task.mark_failed(error, result),
        }
    }
}

/// Persist the session if configured, then stop it.
pub(crate) async fn finalize(
    tracker: &SessionTracker,
    persister: Option<&ReportPersister>,
    cancelled: bool,
) -> Session {
    if let Some(persister) = persister {
        let outcome = persister.persist_session(&tracker.snapshot()).await;
        tracker.set_persistence(outcome);
    } else {
        tracker.set_persistence(PersistOutcome::Skipped);
    }
    tracker.finish(cancelled)
}
