//! Workflow selection by video age.
//!
//! The automation service lists workflows by display name only. Rule
//! templates classify those names with include/exclude keyword sets and pin
//! each match to a day range and the video field it consumes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{DaysRange, RequiredInput, Workflow, WorkflowRule};
use crate::{Error, Result};

/// Keyword classifier producing a [`WorkflowRule`] from a workflow listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleTemplate {
    /// Rule name, e.g. `recent`.
    pub name: String,
    /// The workflow name must contain at least one of these.
    pub include: Vec<String>,
    /// The workflow name must contain none of these.
    #[serde(default)]
    pub exclude: Vec<String>,
    pub days_range: DaysRange,
    pub required_input: RequiredInput,
}

impl RuleTemplate {
    /// Check whether a workflow name satisfies the keyword sets (Unicode case-insensitive).
    pub fn matches(&self, workflow_name: &str) -> bool {
        let name = workflow_name.to_lowercase();
        let contains = |keyword: &String| name.contains(&keyword.to_lowercase());

        self.include.iter().any(contains) && !self.exclude.iter().any(contains)
    }

    /// Check the template itself is usable.
    pub fn validate(&self) -> Result<()> {
        if self.include.iter().all(|k| k.trim().is_empty()) {
            return Err(Error::config(format!(
                "rule template '{}' has no include keywords",
                self.name
            )));
        }
        if self.days_range.is_empty() {
            return Err(Error::config(format!(
                "rule template '{}' has an empty day range {}",
                self.name, self.days_range
            )));
        }
        Ok(())
    }
}

/// The recent (`[0, 14)`, by task id) and overdue (`[14, ∞)`, by video id) templates.
pub fn default_rule_templates() -> Vec<RuleTemplate> {
    let overdue_markers = vec![
        "14天后".to_string(),
        "14天以上".to_string(),
        "after 14 days".to_string(),
    ];

    vec![
        RuleTemplate {
            name: "recent".to_string(),
            include: vec!["14天内".to_string(), "within 14 days".to_string()],
            exclude: overdue_markers.clone(),
            days_range: DaysRange::bounded(0, 14),
            required_input: RequiredInput::TaskId,
        },
        RuleTemplate {
            name: "overdue".to_string(),
            include: overdue_markers,
            exclude: Vec::new(),
            days_range: DaysRange::unbounded(14),
            required_input: RequiredInput::VideoId,
        },
    ]
}

/// Whole days elapsed since publish. `None` for an unknown date, i.e. infinitely old.
///
/// Dates in the future count as day zero.
pub fn days_since_publish(publish_date: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<u32> {
    publish_date.map(|published| {
        let days = (now - published).num_days().max(0);
        u32::try_from(days).unwrap_or(u32::MAX)
    })
}

/// Immutable set of non-overlapping rules, checked in a stable order.
#[derive(Debug, Clone, Default)]
pub struct WorkflowCatalog {
    rules: Vec<WorkflowRule>,
}

impl WorkflowCatalog {
    /// Build the catalog by classifying `workflows` with `templates`.
    ///
    /// A template without a matching workflow is dropped, leaving its day
    /// range unservable. Overlapping ranges are a configuration error.
    pub fn from_workflows(workflows: &[Workflow], templates: &[RuleTemplate]) -> Result<Self> {
        let mut rules = Vec::with_capacity(templates.len());

        for template in templates {
            template.validate()?;

            match workflows.iter().find(|w| template.matches(&w.name)) {
                Some(workflow) => {
                    debug!(
                        rule = %template.name,
                        workflow_id = %workflow.id,
                        workflow_name = %workflow.name,
                        range = %template.days_range,
                        "Resolved workflow rule"
                    );
                    rules.push(WorkflowRule {
                        name: template.name.clone(),
                        days_range: template.days_range,
                        workflow_id: workflow.id.clone(),
                        workflow_name: workflow.name.clone(),
                        required_input: template.required_input,
                    });
                }
                None => {
                    warn!(
                        rule = %template.name,
                        range = %template.days_range,
                        "No workflow matches rule, its day range cannot be served"
                    );
                }
            }
        }

        Self::from_rules(rules)
    }

    /// Build the catalog from already-resolved rules.
    pub fn from_rules(rules: Vec<WorkflowRule>) -> Result<Self> {
        for (i, a) in rules.iter().enumerate() {
            if a.days_range.is_empty() {
                return Err(Error::config(format!(
                    "workflow rule '{}' has an empty day range {}",
                    a.name, a.days_range
                )));
            }
            for b in &rules[i + 1..] {
                if a.days_range.overlaps(&b.days_range) {
                    return Err(Error::config(format!(
                        "workflow rules '{}' {} and '{}' {} overlap",
                        a.name, a.days_range, b.name, b.days_range
                    )));
                }
            }
        }

        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[WorkflowRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rule for a video published at `publish_date`, as seen at `now`.
    pub fn select(
        &self,
        publish_date: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<&WorkflowRule> {
        let days = days_since_publish(publish_date, now);
        self.rules.iter().find(|rule| rule.days_range.contains(days))
    }
}
