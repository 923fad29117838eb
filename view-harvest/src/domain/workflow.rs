//! Automation workflows and the day-range rules that route videos to them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An automation workflow as listed by the automation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub name: String,
}

impl Workflow {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// The video field a workflow takes as its input value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequiredInput {
    TaskId,
    VideoId,
}

impl RequiredInput {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskId => "taskId",
            Self::VideoId => "videoId",
        }
    }

    /// Skip reason used when a video lacks this field.
    pub fn missing_reason(&self) -> &'static str {
        match self {
            Self::TaskId => "missing task id",
            Self::VideoId => "missing video id",
        }
    }
}

impl fmt::Display for RequiredInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Half-open range of days since publish, `[min, max)`. `max = None` is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaysRange {
    pub min: u32,
    #[serde(default)]
    pub max: Option<u32>,
}

impl DaysRange {
    pub const fn new(min: u32, max: Option<u32>) -> Self {
        Self { min, max }
    }

    pub const fn bounded(min: u32, max: u32) -> Self {
        Self::new(min, Some(max))
    }

    pub const fn unbounded(min: u32) -> Self {
        Self::new(min, None)
    }

    /// Whether the range contains no day at all.
    pub fn is_empty(&self) -> bool {
        matches!(self.max, Some(max) if max <= self.min)
    }

    /// Check membership. `None` stands for an unknown publish date, i.e. infinitely old.
    pub fn contains(&self, days: Option<u32>) -> bool {
        match (days, self.max) {
            (None, None) => true,
            (None, Some(_)) => false,
            (Some(d), max) => d >= self.min && max.is_none_or(|m| d < m),
        }
    }

    /// Whether two ranges share at least one day.
    pub fn overlaps(&self, other: &DaysRange) -> bool {
        let below = |min: u32, max: Option<u32>| max.is_none_or(|m| min < m);
        below(self.min, other.max) && below(other.min, self.max)
    }
}

impl fmt::Display for DaysRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) => write!(f, "[{}, {})", self.min, max),
            None => write!(f, "[{}, ∞)", self.min),
        }
    }
}

/// A resolved routing rule: videos whose age falls in `days_range` use `workflow_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRule {
    pub name: String,
    pub days_range: DaysRange,
    pub workflow_id: String,
    pub workflow_name: String,
    pub required_input: RequiredInput,
}
