//! Materialises scrape tasks from missing-data video records.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::domain::{ScrapeTask, VideoRecord};
use crate::selector::WorkflowCatalog;

/// Skip reason when no rule covers the video's age.
pub const NO_MATCHING_WORKFLOW: &str = "no matching workflow";

/// Builds [`ScrapeTask`]s against a resolved workflow catalog.
pub struct TaskBuilder<'a> {
    catalog: &'a WorkflowCatalog,
    now: DateTime<Utc>,
}

impl<'a> TaskBuilder<'a> {
    pub fn new(catalog: &'a WorkflowCatalog) -> Self {
        Self::at(catalog, Utc::now())
    }

    /// Builder that measures video age against a fixed instant.
    pub fn at(catalog: &'a WorkflowCatalog, now: DateTime<Utc>) -> Self {
        Self { catalog, now }
    }

    /// Build one task. Videos that cannot be fetched become `skipped` tasks.
    pub fn build(&self, video: &VideoRecord) -> ScrapeTask {
        let Some(rule) = self.catalog.select(video.publish_date, self.now) else {
            return ScrapeTask::skipped(video, None, NO_MATCHING_WORKFLOW);
        };

        match video.input_for(rule.required_input) {
            Some(value) => ScrapeTask::pending(video, rule, value.to_string()),
            None => ScrapeTask::skipped(video, Some(rule), rule.required_input.missing_reason()),
        }
    }

    /// Build tasks for a batch, preserving input order.
    ///
    /// A collaboration appearing more than once keeps only its first record.
    pub fn build_all(&self, videos: &[VideoRecord]) -> Vec<ScrapeTask> {
        let mut seen = HashSet::with_capacity(videos.len());
        let mut tasks = Vec::with_capacity(videos.len());

        for video in videos {
            if !seen.insert(video.collaboration_id.as_str()) {
                warn!(
                    collaboration_id = %video.collaboration_id,
                    "Duplicate collaboration in batch, ignoring later record"
                );
                continue;
            }
            tasks.push(self.build(video));
        }

        let skipped = tasks.iter().filter(|t| !t.is_executable()).count();
        debug!(total = tasks.len(), skipped, "Built scrape tasks");

        tasks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RequiredInput, TaskStatus, Workflow};
    use crate::selector::default_rule_templates;
    use chrono::Duration;

    fn catalog(workflows: &[Workflow]) -> WorkflowCatalog {
        WorkflowCatalog::from_workflows(workflows, &default_rule_templates()).unwrap()
    }

    fn full_catalog() -> WorkflowCatalog {
        catalog(&[
            Workflow::new("wf-recent", "播放量 14天内"),
            Workflow::new("wf-overdue", "播放量 14天后"),
        ])
    }

    #[test]
    fn test_routes_by_age_and_input() {
        let catalog = full_catalog();
        let now = Utc::now();
        let builder = TaskBuilder::at(&catalog, now);

        let v1 = VideoRecord::new("c1", "A")
            .with_task_id("T1")
            .with_publish_date(now - Duration::days(5));
        let v2 = VideoRecord::new("c2", "B")
            .with_video_id("V2")
            .with_publish_date(now - Duration::days(20));
        let v3 = VideoRecord::new("c3", "C").with_publish_date(now - Duration::days(5));

        let tasks = builder.build_all(&[v1, v2, v3]);
        assert_eq!(tasks.len(), 3);

        assert_eq!(tasks[0].status, TaskStatus::Pending);
        assert_eq!(tasks[0].workflow_id.as_deref(), Some("wf-recent"));
        assert_eq!(tasks[0].required_input, Some(RequiredInput::TaskId));
        assert_eq!(tasks[0].input_value.as_deref(), Some("T1"));

        assert_eq!(tasks[1].status, TaskStatus::Pending);
        assert_eq!(tasks[1].workflow_id.as_deref(), Some("wf-overdue"));
        assert_eq!(tasks[1].input_value.as_deref(), Some("V2"));

        assert_eq!(tasks[2].status, TaskStatus::Skipped);
        assert_eq!(tasks[2].error.as_deref(), Some("missing task id"));
    }

    #[test]
    fn test_overdue_without_rule_is_skipped() {
        let catalog = catalog(&[Workflow::new("wf-recent", "播放量 14天内")]);
        let now = Utc::now();
        let builder = TaskBuilder::at(&catalog, now);

        for days in [14, 15, 90] {
            let video = VideoRecord::new("c", "A")
                .with_task_id("T")
                .with_video_id("V")
                .with_publish_date(now - Duration::days(days));
            let task = builder.build(&video);
            assert_eq!(task.status, TaskStatus::Skipped);
            assert_eq!(task.error.as_deref(), Some(NO_MATCHING_WORKFLOW));
        }

        let undated = VideoRecord::new("c", "A").with_task_id("T");
        assert_eq!(
            builder.build(&undated).error.as_deref(),
            Some(NO_MATCHING_WORKFLOW)
        );
    }

    #[test]
    fn test_missing_video_id() {
        let catalog = full_catalog();
        let now = Utc::now();
        let video = VideoRecord::new("c", "A")
            .with_task_id("T")
            .with_publish_date(now - Duration::days(30));
        let task = TaskBuilder::at(&catalog, now).build(&video);
        assert_eq!(task.status, TaskStatus::Skipped);
        assert_eq!(task.error.as_deref(), Some("missing video id"));
        assert_eq!(task.workflow_id.as_deref(), Some("wf-overdue"));
    }

    #[test]
    fn test_duplicate_collaborations_dropped() {
        let catalog = full_catalog();
        let now = Utc::now();
        let video = VideoRecord::new("c1", "A")
            .with_task_id("T1")
            .with_publish_date(now);
        let tasks = TaskBuilder::at(&catalog, now).build_all(&[video.clone(), video]);
        assert_eq!(tasks.len(), 1);
    }
}
