//! Action dispatch for classified lines.
//!
//! Every rule names an action. The three built-in actions are a closed enum and
//! dispatch statically; anything else is `ActionKind::Custom` and resolves
//! through handlers registered on the `ActionDispatcher`. An engine built in
//! strict mode rejects tables whose custom actions have no handler, so the
//! runtime `DispatchError::UnknownAction` path only exists for lenient engines.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::context::TaskContext;
use crate::error::DispatchError;
use crate::progress::ProgressAggregator;
use crate::render::{Captures, RenderWarning};
use crate::rule::Rule;

/// Built-in handlers.
pub mod builtin;

pub use builtin::{UpdateActionHandler, UpdatePackageCountHandler, UpdateProgressHandler};

/// The action a rule triggers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// Count a hit and emit progress.
    UpdateProgress,
    /// Set the task's action label.
    UpdateAction,
    /// Record package totals.
    UpdatePackageCount,
    /// Resolved through a registered handler.
    Custom(String),
}

impl ActionKind {
    /// Action id of `update_progress`.
    pub const UPDATE_PROGRESS: &'static str = "update_progress";
    /// Action id of `update_action`.
    pub const UPDATE_ACTION: &'static str = "update_action";
    /// Action id of `update_package_count`.
    pub const UPDATE_PACKAGE_COUNT: &'static str = "update_package_count";

    /// Maps an action id to its kind.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name {
            Self::UPDATE_PROGRESS => Self::UpdateProgress,
            Self::UPDATE_ACTION => Self::UpdateAction,
            Self::UPDATE_PACKAGE_COUNT => Self::UpdatePackageCount,
            other => Self::Custom(other.to_string()),
        }
    }

    /// The action id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::UpdateProgress => Self::UPDATE_PROGRESS,
            Self::UpdateAction => Self::UPDATE_ACTION,
            Self::UpdatePackageCount => Self::UPDATE_PACKAGE_COUNT,
            Self::Custom(name) => name,
        }
    }

    /// Returns true for the built-in actions.
    #[must_use]
    pub const fn is_builtin(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fractions and message produced by a progress-tracking handler.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// Completion of the matched rule, in `[0, 1]`.
    pub rule_fraction: f64,
    /// Completion of the active task, in `[0, 1]`.
    pub task_fraction: f64,
    /// Rendered message.
    pub message: String,
    /// Template tokens that had no capture.
    pub warnings: Vec<RenderWarning>,
}

/// What a handler did with a classified line.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    /// Progress changed; a snapshot is emitted.
    Progress(ProgressUpdate),
    /// The task's action label changed; a snapshot is emitted.
    Label {
        /// New label.
        label: String,
        /// Raw `action` capture, if any.
        value: Option<String>,
        /// Template tokens that had no capture.
        warnings: Vec<RenderWarning>,
    },
    /// State may have changed but nothing is emitted.
    Silent,
}

/// Inputs a handler receives for one classified line.
#[derive(Clone, Copy)]
pub struct ActionInput<'a> {
    /// The matched rule.
    pub rule: &'a Rule,
    /// Named captures of the line.
    pub captures: &'a Captures,
    /// Shared progress arithmetic.
    pub aggregator: &'a ProgressAggregator,
}

/// A state-mutating handler bound to an action id.
///
/// Handlers must validate everything they need before mutating `ctx`, so a
/// returned error leaves the context untouched.
pub trait ActionHandler: Send + Sync {
    /// Applies the action to the active task's context.
    fn apply(&self, input: &ActionInput<'_>, ctx: &mut TaskContext) -> Result<ActionOutcome, DispatchError>;

    /// Whether rules bound to this handler count toward `task_fraction`.
    fn tracks_progress(&self) -> bool {
        false
    }
}

/// Routes a matched rule to its handler.
#[derive(Clone, Default)]
pub struct ActionDispatcher {
    custom: HashMap<String, Arc<dyn ActionHandler>>,
}

impl fmt::Debug for ActionDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.custom.keys().collect();
        names.sort();
        f.debug_struct("ActionDispatcher").field("custom", &names).finish()
    }
}

impl ActionDispatcher {
    /// Creates a dispatcher with only the built-in actions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for a custom action id.
    ///
    /// Built-in ids always dispatch to the built-in handlers; registering one
    /// of them has no effect on dispatch.
    pub fn register(&mut self, action: impl Into<String>, handler: Arc<dyn ActionHandler>) -> &mut Self {
        let action = action.into();
        if ActionKind::parse(&action).is_builtin() {
            tracing::warn!(action = %action, "ignoring handler registered for a built-in action");
        } else {
            self.custom.insert(action, handler);
        }
        self
    }

    /// Returns true if `kind` has a handler.
    #[must_use]
    pub fn resolves(&self, kind: &ActionKind) -> bool {
        match kind {
            ActionKind::Custom(name) => self.custom.contains_key(name),
            _ => true,
        }
    }

    /// Returns true if rules bound to `kind` count toward `task_fraction`.
    #[must_use]
    pub fn tracks_progress(&self, kind: &ActionKind) -> bool {
        match kind {
            ActionKind::UpdateProgress => UpdateProgressHandler.tracks_progress(),
            ActionKind::UpdateAction => UpdateActionHandler.tracks_progress(),
            ActionKind::UpdatePackageCount => UpdatePackageCountHandler.tracks_progress(),
            ActionKind::Custom(name) => self.custom.get(name).is_some_and(|h| h.tracks_progress()),
        }
    }

    /// Invokes the handler bound to the input rule's action.
    pub fn dispatch(&self, input: &ActionInput<'_>, ctx: &mut TaskContext) -> Result<ActionOutcome, DispatchError> {
        match input.rule.action() {
            ActionKind::UpdateProgress => UpdateProgressHandler.apply(input, ctx),
            ActionKind::UpdateAction => UpdateActionHandler.apply(input, ctx),
            ActionKind::UpdatePackageCount => UpdatePackageCountHandler.apply(input, ctx),
            ActionKind::Custom(name) => {
                let handler = self.custom.get(name).ok_or_else(|| DispatchError::UnknownAction {
                    action: name.clone(),
                })?;
                handler.apply(input, ctx)
            }
        }
    }
}
