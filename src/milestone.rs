//! Task milestones and the overall installation percentage.
//!
//! A milestone says how far (in percent) the whole installation is once a task
//! has finished. Softupdate runs skip most of the install work and use their own
//! targets where declared. Tasks dominated by per-package steps may also
//! declare how many recurring steps they usually take.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// A milestone as declared in a table file.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilestoneRecord {
    pub task: String,
    #[serde(default)]
    pub description: String,
    pub target_percent: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub softupdate_percent: Option<f64>,
    /// Usual number of recurring steps, used until package totals are known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurring_estimate: Option<u64>,
}

/// A validated milestone.
#[derive(Debug, Clone, PartialEq)]
pub struct Milestone {
    task: String,
    description: String,
    target_percent: f64,
    softupdate_percent: Option<f64>,
    recurring_estimate: Option<u64>,
}

fn check_percent(task: &str, field: &str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && (0.0..=100.0).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::InvalidMilestone {
            task: task.to_string(),
            reason: format!("{field} {value} is outside [0, 100]"),
        })
    }
}

impl Milestone {
    /// Validates a record.
    pub fn from_record(record: &MilestoneRecord) -> Result<Self, ConfigError> {
        let task = record.task.trim();
        if task.is_empty() {
            return Err(ConfigError::InvalidMilestone {
                task: record.task.clone(),
                reason: "task name is empty".to_string(),
            });
        }

        let target_percent = check_percent(task, "target_percent", record.target_percent)?;
        let softupdate_percent = record
            .softupdate_percent
            .map(|v| check_percent(task, "softupdate_percent", v))
            .transpose()?;

        if record.recurring_estimate == Some(0) {
            return Err(ConfigError::InvalidMilestone {
                task: task.to_string(),
                reason: "recurring_estimate must be >= 1".to_string(),
            });
        }

        let description = if record.description.trim().is_empty() {
            task.to_string()
        } else {
            record.description.clone()
        };

        Ok(Self {
            task: task.to_string(),
            description,
            target_percent,
            softupdate_percent,
            recurring_estimate: record.recurring_estimate,
        })
    }

    /// Task this milestone belongs to.
    #[must_use]
    pub fn task(&self) -> &str {
        &self.task
    }

    /// Human-readable task description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Overall percent reached when the task finishes.
    #[must_use]
    pub fn target(&self, softupdate: bool) -> f64 {
        if softupdate {
            self.softupdate_percent.unwrap_or(self.target_percent)
        } else {
            self.target_percent
        }
    }

    /// Usual number of recurring steps of the task, if declared.
    #[must_use]
    pub const fn recurring_estimate(&self) -> Option<u64> {
        self.recurring_estimate
    }
}

/// Monotonic overall percentage of one session.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OverallProgress {
    base: f64,
    ceiling: f64,
    current: f64,
}

impl OverallProgress {
    /// Current overall percentage.
    #[must_use]
    pub const fn current(&self) -> f64 {
        self.current
    }

    /// Range the active task interpolates over.
    #[must_use]
    pub const fn range(&self) -> (f64, f64) {
        (self.base, self.ceiling)
    }

    /// Completes the previous task and starts interpolating toward `target`.
    ///
    /// Tasks without a milestone hold the overall value where it is.
    pub fn enter(&mut self, target: Option<f64>) {
        self.current = self.current.max(self.ceiling);
        self.base = self.current;
        self.ceiling = target.map_or(self.current, |t| t.max(self.current));
    }

    /// Moves toward the ceiling by `task_fraction` of the active range.
    pub fn advance(&mut self, task_fraction: f64) -> f64 {
        let value = self.base + (self.ceiling - self.base) * task_fraction.clamp(0.0, 1.0);
        self.current = self.current.max(value);
        self.current
    }

    /// Marks the whole installation as done.
    pub fn finish(&mut self) -> f64 {
        self.base = 100.0;
        self.ceiling = 100.0;
        self.current = 100.0;
        self.current
    }
}
