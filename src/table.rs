//! The rule table.
//!
//! Rules keep their declaration order, which is the tie-break when several
//! rules match a line. `lookup` reads a per-task index built at load time.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::milestone::{Milestone, MilestoneRecord};
use crate::rule::{Rule, RuleRecord};

/// Source of the bundled FAI rule table.
pub const FAI_RULES: &str = include_str!("../rules/fai.yaml");

/// A table file with milestones and rules.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleDocument {
    #[serde(default)]
    pub milestones: Vec<MilestoneRecord>,
    pub rules: Vec<RuleRecord>,
}

/// Either a bare record list or a full document.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RuleSource {
    Records(Vec<RuleRecord>),
    Document(RuleDocument),
}

impl From<RuleSource> for RuleDocument {
    fn from(source: RuleSource) -> Self {
        match source {
            RuleSource::Records(rules) => Self {
                milestones: Vec::new(),
                rules,
            },
            RuleSource::Document(doc) => doc,
        }
    }
}

/// Validated, compiled rules shared read-only by every session.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: Vec<Arc<Rule>>,
    by_task: HashMap<String, Vec<Arc<Rule>>>,
    task_order: Vec<String>,
    milestones: Vec<Milestone>,
    milestone_index: HashMap<String, usize>,
}

impl RuleTable {
    /// Validates and compiles `records` in order.
    pub fn load(records: impl IntoIterator<Item = RuleRecord>) -> Result<Self, ConfigError> {
        Self::load_document(RuleDocument {
            milestones: Vec::new(),
            rules: records.into_iter().collect(),
        })
    }

    /// Validates and compiles a document.
    pub fn load_document(doc: RuleDocument) -> Result<Self, ConfigError> {
        let mut table = Self::default();

        for (index, record) in doc.rules.iter().enumerate() {
            let rule = Arc::new(Rule::compile(index, record)?);
            for task in rule.tasks() {
                if !table.by_task.contains_key(task) {
                    table.task_order.push(task.clone());
                }
                table.by_task.entry(task.clone()).or_default().push(Arc::clone(&rule));
            }
            table.rules.push(rule);
        }

        for record in &doc.milestones {
            let milestone = Milestone::from_record(record)?;
            if table.milestone_index.contains_key(milestone.task()) {
                return Err(ConfigError::DuplicateMilestone {
                    task: milestone.task().to_string(),
                });
            }
            table
                .milestone_index
                .insert(milestone.task().to_string(), table.milestones.len());
            table.milestones.push(milestone);
        }

        Ok(table)
    }

    /// Parses YAML (bare record list or document).
    pub fn from_yaml_str(input: &str) -> Result<Self, ConfigError> {
        let source: RuleSource = serde_yaml::from_str(input).map_err(|e| ConfigError::Parse {
            format: "YAML",
            message: e.to_string(),
        })?;
        Self::load_document(source.into())
    }

    /// Parses JSON (bare record list or document).
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let source: RuleSource = serde_json::from_str(input).map_err(|e| ConfigError::Parse {
            format: "JSON",
            message: e.to_string(),
        })?;
        Self::load_document(source.into())
    }

    /// Reads a table file; `.json` files are JSON, everything else YAML.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&data)
        } else {
            Self::from_yaml_str(&data)
        }
    }

    /// The bundled FAI rule table.
    pub fn fai() -> Result<Self, ConfigError> {
        Self::from_yaml_str(FAI_RULES)
    }

    /// Rules applicable to `task`, in declaration order.
    #[must_use]
    pub fn lookup(&self, task: &str) -> &[Arc<Rule>] {
        self.by_task.get(task).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All rules in declaration order.
    #[must_use]
    pub fn rules(&self) -> &[Arc<Rule>] {
        &self.rules
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true if the table has no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Tasks that have rules, in order of first appearance.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.task_order.iter().map(String::as_str)
    }

    /// Returns true if `task` has at least one rule.
    #[must_use]
    pub fn has_rules(&self, task: &str) -> bool {
        self.by_task.contains_key(task)
    }

    /// Returns true if `task` has rules or a milestone.
    #[must_use]
    pub fn knows_task(&self, task: &str) -> bool {
        self.has_rules(task) || self.milestone_index.contains_key(task)
    }

    /// Milestone of `task`, if declared.
    #[must_use]
    pub fn milestone(&self, task: &str) -> Option<&Milestone> {
        self.milestone_index.get(task).map(|&i| &self.milestones[i])
    }

    /// All milestones in declaration order.
    #[must_use]
    pub fn milestones(&self) -> &[Milestone] {
        &self.milestones
    }

    /// Returns true if the table declares any milestone.
    #[must_use]
    pub fn has_milestones(&self) -> bool {
        !self.milestones.is_empty()
    }
}
