//! Line classification.
//!
//! The classifier walks the active task's rules in declaration order and stops
//! at the first pattern that matches anywhere in the line. Lines that match
//! nothing are ordinary installer noise and yield `None`.

use std::sync::Arc;

use crate::render::{self, Captures};
use crate::rule::Rule;
use crate::table::RuleTable;

/// The rule selected for a line and the line's named captures.
#[derive(Debug, Clone)]
pub struct Classification {
    /// First matching rule.
    pub rule: Arc<Rule>,
    /// Named captures of the match.
    pub captures: Captures,
}

/// Selects the rule that handles a line.
#[derive(Debug, Clone)]
pub struct LineClassifier {
    table: Arc<RuleTable>,
}

impl LineClassifier {
    /// Creates a classifier over `table`.
    #[must_use]
    pub fn new(table: Arc<RuleTable>) -> Self {
        Self { table }
    }

    /// The table rules are drawn from.
    #[must_use]
    pub fn table(&self) -> &RuleTable {
        &self.table
    }

    /// Returns the first rule for `task` matching `line`.
    #[must_use]
    pub fn classify(&self, task: &str, line: &str) -> Option<Classification> {
        self.table.lookup(task).iter().find_map(|rule| {
            render::extract(rule.pattern(), line).map(|captures| Classification {
                rule: Arc::clone(rule),
                captures,
            })
        })
    }
}
