//! The built-in actions: `update_progress`, `update_action`, `update_package_count`.

use crate::context::{PackageTotals, TaskContext};
use crate::error::DispatchError;
use crate::render::render;

use super::{ActionHandler, ActionInput, ActionKind, ActionOutcome, ProgressUpdate};

/// Counts a hit and emits updated fractions with the rendered message.
///
/// Non-recurring rules describe one fixed event expected `expected_hits` times;
/// once saturated, further matches still count but emit nothing. Recurring
/// rules emit on every match because each occurrence carries new captures.
#[derive(Debug, Default, Clone, Copy)]
pub struct UpdateProgressHandler;

impl ActionHandler for UpdateProgressHandler {
    fn apply(&self, input: &ActionInput<'_>, ctx: &mut TaskContext) -> Result<ActionOutcome, DispatchError> {
        let rule = input.rule;
        let step = input.aggregator.record_hit(ctx, rule);

        if !rule.is_recurring() && step.hits > u64::from(rule.expected_hits()) {
            return Ok(ActionOutcome::Silent);
        }

        let rendered = render(rule.message_template(), input.captures);
        Ok(ActionOutcome::Progress(ProgressUpdate {
            rule_fraction: step.rule_fraction,
            task_fraction: step.task_fraction,
            message: rendered.text,
            warnings: rendered.warnings,
        }))
    }

    fn tracks_progress(&self) -> bool {
        true
    }
}

/// Sets the task's action label without touching hit counters.
///
/// The label is the rendered template, or the raw `action` capture when the
/// template is empty.
#[derive(Debug, Default, Clone, Copy)]
pub struct UpdateActionHandler;

impl UpdateActionHandler {
    /// Conventional capture holding the action value.
    pub const CAPTURE: &'static str = "action";
}

impl ActionHandler for UpdateActionHandler {
    fn apply(&self, input: &ActionInput<'_>, ctx: &mut TaskContext) -> Result<ActionOutcome, DispatchError> {
        let value = input.captures.get(Self::CAPTURE).cloned();

        let (label, warnings) = if input.rule.message_template().is_empty() {
            let label = value.clone().ok_or_else(|| DispatchError::MissingCapture {
                action: ActionKind::UPDATE_ACTION.to_string(),
                name: Self::CAPTURE.to_string(),
            })?;
            (label, Vec::new())
        } else {
            let rendered = render(input.rule.message_template(), input.captures);
            (rendered.text, rendered.warnings)
        };

        ctx.set_label(label.clone());
        Ok(ActionOutcome::Label { label, value, warnings })
    }
}

/// Stores the upgrade/install/remove totals announced by the package manager.
#[derive(Debug, Default, Clone, Copy)]
pub struct UpdatePackageCountHandler;

impl UpdatePackageCountHandler {
    /// Captures read by this handler. Absent ones count as zero.
    pub const CAPTURES: [&'static str; 3] = ["upgrades", "installs", "removes"];

    fn count(input: &ActionInput<'_>, name: &str) -> Result<Option<u64>, DispatchError> {
        let Some(raw) = input.captures.get(name) else {
            return Ok(None);
        };
        raw.trim().parse::<u64>().map(Some).map_err(|e| DispatchError::InvalidCapture {
            action: ActionKind::UPDATE_PACKAGE_COUNT.to_string(),
            name: name.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        })
    }
}

impl ActionHandler for UpdatePackageCountHandler {
    fn apply(&self, input: &ActionInput<'_>, ctx: &mut TaskContext) -> Result<ActionOutcome, DispatchError> {
        let [upgrades, installs, removes] = Self::CAPTURES;
        let counts = (
            Self::count(input, upgrades)?,
            Self::count(input, installs)?,
            Self::count(input, removes)?,
        );

        if let (None, None, None) = counts {
            return Err(DispatchError::MissingCapture {
                action: ActionKind::UPDATE_PACKAGE_COUNT.to_string(),
                name: installs.to_string(),
            });
        }

        ctx.set_package_totals(PackageTotals {
            upgrades: counts.0.unwrap_or(0),
            installs: counts.1.unwrap_or(0),
            removes: counts.2.unwrap_or(0),
        });
        Ok(ActionOutcome::Silent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionDispatcher;
    use crate::progress::{ProgressAggregator, WeightingPolicy};
    use crate::render::{extract, Captures};
    use crate::rule::RuleRecord;
    use crate::table::RuleTable;

    fn table() -> RuleTable {
        RuleTable::load(vec![
            RuleRecord::new("partition", "update_progress", "^Executing: parted")
                .with_template("Partitioning harddisk")
                .expected_hits(2),
            RuleRecord::new("instsoft", "update_progress", r"^Get:\s?[0-9]+ (?P<package>[^ ]+)")
                .with_template("Retrieving {package} ...")
                .recurring(),
            RuleRecord::new("action", "update_action", "^FAI_ACTION: (?P<action>[^ ]+)")
                .with_template("Performing {action}"),
            RuleRecord::new("action", "update_action", "^MODE: (?P<action>[^ ]+)"),
            RuleRecord::new(
                "instsoft",
                "update_package_count",
                r"(?P<upgrades>[0-9]+) upgraded, (?P<installs>[0-9]+) newly installed, (?P<removes>[0-9]+) to remove",
            ),
            RuleRecord::new("instsoft", "update_package_count", r"^(?P<installs>[a-z]+) newly installed"),
        ])
        .unwrap()
    }

    fn apply(table: &RuleTable, index: usize, line: &str, ctx: &mut TaskContext) -> Result<ActionOutcome, DispatchError> {
        let dispatcher = ActionDispatcher::new();
        let aggregator = ProgressAggregator::new(table, WeightingPolicy::Equal, |k| dispatcher.tracks_progress(k));
        let rule = &table.rules()[index];
        let captures = extract(rule.pattern(), line).unwrap_or_default();
        let input = ActionInput {
            rule,
            captures: &captures,
            aggregator: &aggregator,
        };
        dispatcher.dispatch(&input, ctx)
    }

    #[test]
    fn test_update_progress_saturates_non_recurring() {
        let table = table();
        let mut ctx = TaskContext::new("partition");

        for expected in [0.5, 1.0] {
            let ActionOutcome::Progress(update) = apply(&table, 0, "Executing: parted -s", &mut ctx).unwrap() else {
                panic!("expected progress");
            };
            assert_eq!(update.message, "Partitioning harddisk");
            assert!((update.rule_fraction - expected).abs() < 1e-9);
        }

        let third = apply(&table, 0, "Executing: parted -s", &mut ctx).unwrap();
        assert_eq!(third, ActionOutcome::Silent);
        assert_eq!(ctx.hits(table.rules()[0].id()), 3);
    }

    #[test]
    fn test_update_progress_recurring_keeps_emitting() {
        let table = table();
        let mut ctx = TaskContext::new("instsoft");

        let mut messages = Vec::new();
        for line in ["Get:1 libfoo", "Get:2 libbar"] {
            let ActionOutcome::Progress(update) = apply(&table, 1, line, &mut ctx).unwrap() else {
                panic!("expected progress");
            };
            assert!((update.rule_fraction - 1.0).abs() < f64::EPSILON);
            messages.push(update.message);
        }
        assert_eq!(messages, vec!["Retrieving libfoo ...", "Retrieving libbar ..."]);
    }

    #[test]
    fn test_update_action_renders_label() {
        let table = table();
        let mut ctx = TaskContext::new("action");
        let outcome = apply(&table, 2, "FAI_ACTION: partition", &mut ctx).unwrap();

        assert_eq!(
            outcome,
            ActionOutcome::Label {
                label: "Performing partition".to_string(),
                value: Some("partition".to_string()),
                warnings: Vec::new(),
            }
        );
        assert_eq!(ctx.active_action_label(), Some("Performing partition"));
        assert_eq!(ctx.total_hits(), 0);
    }

    #[test]
    fn test_update_action_without_template_uses_capture() {
        let table = table();
        let mut ctx = TaskContext::new("action");
        apply(&table, 3, "MODE: softupdate", &mut ctx).unwrap();
        assert_eq!(ctx.active_action_label(), Some("softupdate"));
    }

    #[test]
    fn test_update_action_missing_capture() {
        let table = table();
        let mut ctx = TaskContext::new("action");
        let rule = &table.rules()[3];
        let dispatcher = ActionDispatcher::new();
        let aggregator = ProgressAggregator::new(&table, WeightingPolicy::Equal, |_| false);
        let captures = Captures::new();
        let input = ActionInput {
            rule,
            captures: &captures,
            aggregator: &aggregator,
        };
        let err = dispatcher.dispatch(&input, &mut ctx).unwrap_err();
        assert!(matches!(err, DispatchError::MissingCapture { .. }));
        assert_eq!(ctx.active_action_label(), None);
    }

    #[test]
    fn test_update_package_count_sets_totals() {
        let table = table();
        let mut ctx = TaskContext::new("instsoft");
        let outcome = apply(&table, 4, "3 upgraded, 10 newly installed, 2 to remove", &mut ctx).unwrap();

        assert_eq!(outcome, ActionOutcome::Silent);
        assert_eq!(
            ctx.package_totals(),
            Some(PackageTotals {
                upgrades: 3,
                installs: 10,
                removes: 2
            })
        );
    }

    #[test]
    fn test_update_package_count_rejects_non_integer() {
        let table = table();
        let mut ctx = TaskContext::new("instsoft");
        let err = apply(&table, 5, "many newly installed", &mut ctx).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidCapture { ref name, .. } if name == "installs"));
        assert_eq!(ctx.package_totals(), None);
    }
}
