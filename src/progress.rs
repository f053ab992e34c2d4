//! Progress arithmetic and snapshots.
//!
//! `rule_fraction = min(hits, denominator) / denominator`, where the
//! denominator is the rule's `expected_hits`. Under
//! `WeightingPolicy::PackageCount` recurring rules use the task's announced
//! package total instead, or its milestone `recurring_estimate` until totals
//! are known.
//!
//! `task_fraction` is the equal-weighted mean of each progress-tracking rule's
//! share (rules never hit count as 0). A non-recurring rule's share is its
//! `rule_fraction`. A recurring rule's share is always measured against the
//! package total or the task's estimate when one exists, so one package does
//! not complete a task that usually installs thousands.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::action::ActionKind;
use crate::context::TaskContext;
use crate::rule::{Rule, RuleId};
use crate::session::SessionId;
use crate::table::RuleTable;

/// How recurring rules are normalized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightingPolicy {
    /// Every rule normalizes by its own `expected_hits`.
    #[default]
    Equal,
    /// Recurring rules normalize by the task's package total once announced.
    PackageCount,
}

/// Result of counting one hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitStep {
    /// Unsaturated hit count after this hit.
    pub hits: u64,
    /// Reported fraction of the rule.
    pub rule_fraction: f64,
    /// Fraction of the whole task.
    pub task_fraction: f64,
}

/// Converts hit counters into rule and task fractions.
#[derive(Debug, Clone)]
pub struct ProgressAggregator {
    weighting: WeightingPolicy,
    tracked: HashMap<String, Vec<RuleId>>,
    estimates: HashMap<String, u64>,
}

impl ProgressAggregator {
    /// Indexes the progress-tracking rules of every task in `table`.
    pub fn new(table: &RuleTable, weighting: WeightingPolicy, tracks_progress: impl Fn(&ActionKind) -> bool) -> Self {
        let mut tracked: HashMap<String, Vec<RuleId>> = HashMap::new();
        for rule in table.rules() {
            if !tracks_progress(rule.action()) {
                continue;
            }
            for task in rule.tasks() {
                tracked.entry(task.clone()).or_default().push(rule.id());
            }
        }
        let estimates = table
            .milestones()
            .iter()
            .filter_map(|m| m.recurring_estimate().map(|n| (m.task().to_string(), n)))
            .collect();
        Self {
            weighting,
            tracked,
            estimates,
        }
    }

    /// The active weighting policy.
    #[must_use]
    pub const fn weighting(&self) -> WeightingPolicy {
        self.weighting
    }

    /// Rules that count toward `task_fraction` for `task`.
    #[must_use]
    pub fn tracked_rules(&self, task: &str) -> &[RuleId] {
        self.tracked.get(task).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Counts a hit of `rule` in `ctx` and returns the updated fractions.
    pub fn record_hit(&self, ctx: &mut TaskContext, rule: &Rule) -> HitStep {
        let hits = ctx.record_hit(rule.id());
        let expected = u64::from(rule.expected_hits()).max(1);
        let steps = self.recurring_steps(ctx, rule);

        let reported = match (self.weighting, steps) {
            (WeightingPolicy::PackageCount, Some(steps)) => steps,
            _ => expected,
        };
        let rule_fraction = ctx.raise_fraction(rule.id(), ratio(hits, reported));
        ctx.raise_share(rule.id(), ratio(hits, steps.unwrap_or(expected)));

        HitStep {
            hits,
            rule_fraction,
            task_fraction: self.task_fraction(ctx),
        }
    }

    /// Reported fraction of `rule` in `ctx`.
    #[must_use]
    pub fn rule_fraction(&self, ctx: &TaskContext, rule: &Rule) -> f64 {
        ctx.fraction(rule.id())
    }

    /// Equal-weighted mean of the tracked rules' shares, 0 when there are none.
    #[must_use]
    pub fn task_fraction(&self, ctx: &TaskContext) -> f64 {
        let rules = self.tracked_rules(ctx.task());
        if rules.is_empty() {
            return 0.0;
        }
        let sum: f64 = rules.iter().map(|id| ctx.share(*id)).sum();
        #[allow(clippy::cast_precision_loss)]
        let mean = sum / rules.len() as f64;
        mean.clamp(0.0, 1.0)
    }

    /// Steps a recurring rule is measured against, if the task provides a count.
    ///
    /// Announced package totals win under package-count weighting; otherwise
    /// the task's milestone estimate applies.
    fn recurring_steps(&self, ctx: &TaskContext, rule: &Rule) -> Option<u64> {
        if !rule.is_recurring() {
            return None;
        }
        let announced = match (self.weighting, ctx.package_totals()) {
            (WeightingPolicy::PackageCount, Some(totals)) if totals.sum() > 0 => Some(totals.sum()),
            _ => None,
        };
        announced.or_else(|| self.estimates.get(ctx.task()).copied())
    }
}

#[allow(clippy::cast_precision_loss)]
fn ratio(hits: u64, denominator: u64) -> f64 {
    let denominator = denominator.max(1);
    hits.min(denominator) as f64 / denominator as f64
}

/// Immutable progress state emitted after a classified line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Emitting session.
    pub session: SessionId,
    /// Task active when the line was processed.
    pub task: String,
    /// Completion of the matched rule, in `[0, 1]`.
    pub rule_fraction: f64,
    /// Completion of the task, in `[0, 1]`.
    pub task_fraction: f64,
    /// Overall installation percentage, when the table declares milestones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_percent: Option<f64>,
    /// Current phase label.
    pub label: String,
    /// Human-readable status message.
    pub message: String,
}
