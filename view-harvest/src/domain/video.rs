//! Input records: published videos that still need metrics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::RequiredInput;

/// A published collaboration video whose view count is missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
    /// Collaboration the video belongs to.
    pub collaboration_id: String,
    /// Display name of the talent who published it.
    #[serde(default)]
    pub talent_name: String,
    /// Platform video id.
    #[serde(default)]
    pub video_id: Option<String>,
    /// Platform publishing-task id.
    #[serde(default)]
    pub task_id: Option<String>,
    /// When the video went public.
    #[serde(default)]
    pub publish_date: Option<DateTime<Utc>>,
}

impl VideoRecord {
    pub fn new(collaboration_id: impl Into<String>, talent_name: impl Into<String>) -> Self {
        Self {
            collaboration_id: collaboration_id.into(),
            talent_name: talent_name.into(),
            video_id: None,
            task_id: None,
            publish_date: None,
        }
    }

    pub fn with_video_id(mut self, video_id: impl Into<String>) -> Self {
        self.video_id = Some(video_id.into());
        self
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_publish_date(mut self, publish_date: DateTime<Utc>) -> Self {
        self.publish_date = Some(publish_date);
        self
    }

    /// Value of the field a workflow needs, ignoring blank strings.
    pub fn input_for(&self, required: RequiredInput) -> Option<&str> {
        let value = match required {
            RequiredInput::TaskId => self.task_id.as_deref(),
            RequiredInput::VideoId => self.video_id.as_deref(),
        };
        value.map(str::trim).filter(|v| !v.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_for_ignores_blank() {
        let video = VideoRecord::new("c1", "talent")
            .with_task_id("  ")
            .with_video_id(" v1 ");
        assert_eq!(video.input_for(RequiredInput::TaskId), None);
        assert_eq!(video.input_for(RequiredInput::VideoId), Some("v1"));
    }

    #[test]
    fn test_deserialize_camel_case() {
        let video: VideoRecord = serde_json::from_str(
            r#"{"collaborationId":"c1","talentName":"A","taskId":"T1","publishDate":"2026-10-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(video.collaboration_id, "c1");
        assert_eq!(video.task_id.as_deref(), Some("T1"));
        assert!(video.video_id.is_none());
        assert!(video.publish_date.is_some());
    }
}
