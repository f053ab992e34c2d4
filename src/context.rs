//! Per-task, per-session mutable state.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::ExecutionError;
use crate::rule::RuleId;
use crate::session::SessionId;

/// Package totals announced by the package manager for a task.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageTotals {
    pub upgrades: u64,
    pub installs: u64,
    pub removes: u64,
}

impl PackageTotals {
    /// Sum of all three counts.
    #[must_use]
    pub const fn sum(&self) -> u64 {
        self.upgrades.saturating_add(self.installs).saturating_add(self.removes)
    }
}

/// State of one task within one session.
///
/// Hit counters are unsaturated. `fractions` keeps the highest `rule_fraction`
/// reported per rule since the last activation and `shares` the highest
/// fraction each rule contributes to `task_fraction`, so a changing
/// denominator never makes either regress.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskContext {
    task: String,
    active_action_label: Option<String>,
    hit_counts: BTreeMap<RuleId, u64>,
    fractions: BTreeMap<RuleId, f64>,
    shares: BTreeMap<RuleId, f64>,
    package_totals: Option<PackageTotals>,
    activations: u32,
}

impl TaskContext {
    /// Creates a context with zeroed counters.
    #[must_use]
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            active_action_label: None,
            hit_counts: BTreeMap::new(),
            fractions: BTreeMap::new(),
            shares: BTreeMap::new(),
            package_totals: None,
            activations: 0,
        }
    }

    /// The task this context belongs to.
    #[must_use]
    pub fn task(&self) -> &str {
        &self.task
    }

    /// Label set by `update_action`, if any.
    #[must_use]
    pub fn active_action_label(&self) -> Option<&str> {
        self.active_action_label.as_deref()
    }

    /// Replaces the action label.
    pub fn set_label(&mut self, label: impl Into<String>) {
        self.active_action_label = Some(label.into());
    }

    /// Package totals, if announced.
    #[must_use]
    pub const fn package_totals(&self) -> Option<PackageTotals> {
        self.package_totals
    }

    /// Overwrites the package totals.
    pub fn set_package_totals(&mut self, totals: PackageTotals) {
        self.package_totals = Some(totals);
    }

    /// Raw hit count of `rule` since the last activation.
    #[must_use]
    pub fn hits(&self, rule: RuleId) -> u64 {
        self.hit_counts.get(&rule).copied().unwrap_or(0)
    }

    /// Sum of all hit counters.
    #[must_use]
    pub fn total_hits(&self) -> u64 {
        self.hit_counts.values().sum()
    }

    /// Increments the counter of `rule` and returns the new count.
    pub fn record_hit(&mut self, rule: RuleId) -> u64 {
        let count = self.hit_counts.entry(rule).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// Highest fraction reported for `rule`, 0 if never hit.
    #[must_use]
    pub fn fraction(&self, rule: RuleId) -> f64 {
        self.fractions.get(&rule).copied().unwrap_or(0.0)
    }

    /// Raises the reported fraction of `rule` to at least `fraction`.
    pub fn raise_fraction(&mut self, rule: RuleId, fraction: f64) -> f64 {
        let entry = self.fractions.entry(rule).or_insert(0.0);
        if fraction > *entry {
            *entry = fraction;
        }
        *entry
    }

    /// Highest contribution of `rule` to `task_fraction`, 0 if never hit.
    #[must_use]
    pub fn share(&self, rule: RuleId) -> f64 {
        self.shares.get(&rule).copied().unwrap_or(0.0)
    }

    /// Raises the contribution of `rule` to at least `share`.
    pub fn raise_share(&mut self, rule: RuleId, share: f64) -> f64 {
        let entry = self.shares.entry(rule).or_insert(0.0);
        if share > *entry {
            *entry = share;
        }
        *entry
    }

    /// Number of times the task has been activated in its session.
    #[must_use]
    pub const fn activations(&self) -> u32 {
        self.activations
    }

    fn reset(&mut self) {
        self.hit_counts.clear();
        self.fractions.clear();
        self.shares.clear();
        self.activations = self.activations.saturating_add(1);
    }
}

/// Owns the task contexts of one session.
#[derive(Debug, Clone)]
pub struct TaskContextManager {
    session: SessionId,
    contexts: HashMap<String, TaskContext>,
}

impl TaskContextManager {
    /// Creates an empty manager for `session`.
    #[must_use]
    pub fn new(session: SessionId) -> Self {
        Self {
            session,
            contexts: HashMap::new(),
        }
    }

    /// Creates the task's context, or zeroes its counters if it already exists.
    ///
    /// Labels and package totals survive re-activation.
    pub fn activate(&mut self, task: &str) -> &mut TaskContext {
        let ctx = self
            .contexts
            .entry(task.to_string())
            .or_insert_with(|| TaskContext::new(task));
        ctx.reset();
        ctx
    }

    /// Returns the task's context.
    pub fn get(&self, task: &str) -> Result<&TaskContext, ExecutionError> {
        self.contexts.get(task).ok_or_else(|| self.not_active(task))
    }

    /// Returns the task's context mutably.
    pub fn get_mut(&mut self, task: &str) -> Result<&mut TaskContext, ExecutionError> {
        let session = self.session;
        self.contexts.get_mut(task).ok_or_else(|| ExecutionError::NotActive {
            session,
            task: task.to_string(),
        })
    }

    /// Number of tasks ever activated.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Returns true if no task was activated yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Discards every context.
    pub fn clear(&mut self) {
        self.contexts.clear();
    }

    fn not_active(&self, task: &str) -> ExecutionError {
        ExecutionError::NotActive {
            session: self.session,
            task: task.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_hit_counts() {
        let mut ctx = TaskContext::new("partition");
        let rule = RuleId::new(2);
        assert_eq!(ctx.hits(rule), 0);
        assert_eq!(ctx.record_hit(rule), 1);
        assert_eq!(ctx.record_hit(rule), 2);
        assert_eq!(ctx.total_hits(), 2);
    }

    #[test]
    fn test_raise_fraction_never_lowers() {
        let mut ctx = TaskContext::new("instsoft");
        let rule = RuleId::new(0);
        assert!((ctx.raise_fraction(rule, 1.0) - 1.0).abs() < f64::EPSILON);
        assert!((ctx.raise_fraction(rule, 0.1) - 1.0).abs() < f64::EPSILON);
        assert!((ctx.fraction(rule) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_package_totals_sum() {
        let totals = PackageTotals {
            upgrades: 3,
            installs: 10,
            removes: 2,
        };
        assert_eq!(totals.sum(), 15);
    }

    #[test]
    fn test_activate_creates_then_resets() {
        let mut manager = TaskContextManager::new(SessionId::new());
        assert!(manager.is_empty());

        let ctx = manager.activate("instsoft");
        ctx.record_hit(RuleId::new(1));
        ctx.raise_fraction(RuleId::new(1), 0.5);
        ctx.raise_share(RuleId::new(1), 0.25);
        ctx.set_label("Performing install");
        ctx.set_package_totals(PackageTotals {
            upgrades: 1,
            installs: 2,
            removes: 0,
        });
        assert_eq!(ctx.activations(), 1);

        let ctx = manager.activate("instsoft");
        assert_eq!(ctx.total_hits(), 0);
        assert!(ctx.fraction(RuleId::new(1)).abs() < f64::EPSILON);
        assert!(ctx.share(RuleId::new(1)).abs() < f64::EPSILON);
        assert_eq!(ctx.active_action_label(), Some("Performing install"));
        assert_eq!(ctx.package_totals().map(|t| t.sum()), Some(3));
        assert_eq!(ctx.activations(), 2);
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_get_not_active() {
        let session = SessionId::new();
        let mut manager = TaskContextManager::new(session);
        let err = manager.get("partition").unwrap_err();
        assert!(matches!(err, ExecutionError::NotActive { session: s, ref task } if s == session && task == "partition"));
        assert!(manager.get_mut("partition").is_err());

        manager.activate("partition");
        assert_eq!(manager.get("partition").unwrap().task(), "partition");
        manager.clear();
        assert!(manager.get("partition").is_err());
    }
}
