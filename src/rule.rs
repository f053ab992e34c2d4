//! Rule records and compiled rules.
//!
//! A `RuleRecord` is the loosely-typed shape found in a rule table file. Loading
//! turns each record into an immutable `Rule` with a compiled pattern and a
//! typed action, so line processing never inspects raw fields.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::action::ActionKind;
use crate::error::ConfigError;
use crate::render;

/// Position of a rule in its table. Declaration order is the match tie-break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(usize);

impl RuleId {
    /// Wraps a declaration index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Declaration index of the rule.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

fn default_expected_hits() -> i64 {
    1
}

/// Matching parameters of a rule record.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleParameters {
    #[serde(default)]
    pub message_template: String,
    pub pattern: String,
    #[serde(default)]
    pub recurring: bool,
    #[serde(default = "default_expected_hits")]
    pub expected_hits: i64,
}

/// A rule as declared in a table file.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRecord {
    pub tasks: Vec<String>,
    pub action: String,
    pub parameters: RuleParameters,
}

impl RuleRecord {
    /// Creates a record for a single task with an empty template.
    #[must_use]
    pub fn new(task: impl Into<String>, action: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            tasks: vec![task.into()],
            action: action.into(),
            parameters: RuleParameters {
                message_template: String::new(),
                pattern: pattern.into(),
                recurring: false,
                expected_hits: default_expected_hits(),
            },
        }
    }

    /// Adds another task the rule applies to.
    #[must_use]
    pub fn also_for(mut self, task: impl Into<String>) -> Self {
        self.tasks.push(task.into());
        self
    }

    /// Sets the message template.
    #[must_use]
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.parameters.message_template = template.into();
        self
    }

    /// Marks the rule as recurring.
    #[must_use]
    pub fn recurring(mut self) -> Self {
        self.parameters.recurring = true;
        self
    }

    /// Sets the expected hit count.
    #[must_use]
    pub fn expected_hits(mut self, hits: i64) -> Self {
        self.parameters.expected_hits = hits;
        self
    }
}

/// A validated, compiled rule. Immutable after load.
#[derive(Debug, Clone)]
pub struct Rule {
    id: RuleId,
    tasks: Vec<String>,
    action: ActionKind,
    message_template: String,
    pattern: Regex,
    recurring: bool,
    expected_hits: u32,
}

impl Rule {
    /// Validates and compiles the record declared at position `index`.
    pub fn compile(index: usize, record: &RuleRecord) -> Result<Self, ConfigError> {
        let action_name = record.action.trim();
        if action_name.is_empty() {
            return Err(ConfigError::EmptyAction { record: index });
        }

        let mut tasks: Vec<String> = Vec::with_capacity(record.tasks.len());
        for task in &record.tasks {
            let task = task.trim();
            if !task.is_empty() && !tasks.iter().any(|t| t == task) {
                tasks.push(task.to_string());
            }
        }
        if tasks.is_empty() {
            return Err(ConfigError::EmptyTaskSet {
                record: index,
                action: action_name.to_string(),
            });
        }

        let params = &record.parameters;
        let expected_hits = u32::try_from(params.expected_hits)
            .ok()
            .filter(|hits| *hits >= 1)
            .ok_or_else(|| ConfigError::InvalidExpectedHits {
                record: index,
                action: action_name.to_string(),
                value: params.expected_hits,
            })?;

        let pattern = Regex::new(&params.pattern).map_err(|e| ConfigError::InvalidPattern {
            record: index,
            pattern: params.pattern.clone(),
            reason: e.to_string(),
        })?;

        for name in render::template_names(&params.message_template) {
            if !pattern.capture_names().flatten().any(|group| group == name) {
                tracing::warn!(
                    record = index,
                    capture = %name,
                    "message template references a capture the pattern does not define"
                );
            }
        }

        Ok(Self {
            id: RuleId::new(index),
            tasks,
            action: ActionKind::parse(action_name),
            message_template: params.message_template.clone(),
            pattern,
            recurring: params.recurring,
            expected_hits,
        })
    }

    /// Declaration position of the rule.
    #[must_use]
    pub const fn id(&self) -> RuleId {
        self.id
    }

    /// Tasks this rule is eligible for, in declaration order.
    #[must_use]
    pub fn tasks(&self) -> &[String] {
        &self.tasks
    }

    /// Returns true if the rule is eligible while `task` is active.
    #[must_use]
    pub fn applies_to(&self, task: &str) -> bool {
        self.tasks.iter().any(|t| t == task)
    }

    /// The action bound to this rule.
    #[must_use]
    pub const fn action(&self) -> &ActionKind {
        &self.action
    }

    /// Message template with `{name}` capture tokens.
    #[must_use]
    pub fn message_template(&self) -> &str {
        &self.message_template
    }

    /// Compiled pattern.
    #[must_use]
    pub const fn pattern(&self) -> &Regex {
        &self.pattern
    }

    /// Whether successive matches carry distinct data.
    #[must_use]
    pub const fn is_recurring(&self) -> bool {
        self.recurring
    }

    /// Hit count that defines full completion for this rule.
    #[must_use]
    pub const fn expected_hits(&self) -> u32 {
        self.expected_hits
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rule{}({} /{}/)", self.id, self.action, self.pattern.as_str())
    }
}
