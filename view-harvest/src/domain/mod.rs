//! Core data model shared by both execution backends.

mod report;
mod session;
mod task;
mod video;
mod workflow;

pub use report::{PersistOutcome, ReportEntry, ReportSource};
pub use session::Session;
pub use task::{ScrapeTask, TaskStatus};
pub use video::VideoRecord;
pub use workflow::{DaysRange, RequiredInput, Workflow, WorkflowRule};
