//! Report entries written to the daily report store.

use serde::{Deserialize, Serialize};

/// Origin of a report figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportSource {
    /// Collected by the scrape pipeline.
    #[default]
    Auto,
    /// Entered by hand.
    Manual,
}

/// One collaboration's view count for a report date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEntry {
    pub collaboration_id: String,
    pub total_views: u64,
    pub source: ReportSource,
}

impl ReportEntry {
    pub fn auto(collaboration_id: impl Into<String>, total_views: u64) -> Self {
        Self {
            collaboration_id: collaboration_id.into(),
            total_views,
            source: ReportSource::Auto,
        }
    }
}

/// Result of the persistence step of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PersistOutcome {
    /// Entries were written in a single batch save.
    Saved { count: usize },
    /// Nothing to write; the store was not called.
    Skipped,
    /// The batch save failed. Task statuses are unaffected.
    Failed { error: String },
}

impl PersistOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}
