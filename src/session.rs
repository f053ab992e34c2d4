//! One monitored installer run.
//!
//! A session owns its task contexts, its overall percentage and its snapshot
//! emitter. Lines must be ingested in production order; nothing here is shared
//! with other sessions except the read-only pipeline.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::action::{ActionInput, ActionOutcome};
use crate::context::{TaskContext, TaskContextManager};
use crate::directive::Directive;
use crate::engine::Pipeline;
use crate::error::{ExecutionError, ProgressError, ProgressResult};
use crate::milestone::OverallProgress;
use crate::monitor::{SnapshotEmitter, SnapshotStream};
use crate::progress::ProgressSnapshot;
use crate::render::RenderWarning;
use crate::rule::Rule;

/// Task name of the snapshot published on hangup.
pub const FINISHED_TASK: &str = "faiend";

const FINISHED_MESSAGE: &str = "Finished";

/// Unique identifier for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Create a new random session id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for SessionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a session stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// The caller closed it.
    Requested,
    /// The log source announced the end of the stream.
    Hangup,
    /// The installer reported a fatal error.
    Fault(String),
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Accepting lines.
    Open,
    /// Closed; further lines are rejected.
    Closed(CloseReason),
}

/// Line counters of a session.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub lines: u64,
    pub matched: u64,
    pub snapshots: u64,
    /// Matched lines dropped because their action failed.
    pub ignored: u64,
    pub render_warnings: u64,
}

/// An isolated monitoring instance.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    pipeline: Arc<Pipeline>,
    contexts: TaskContextManager,
    active_task: Option<String>,
    install_action: Option<String>,
    overall: OverallProgress,
    emitter: SnapshotEmitter,
    state: SessionState,
    stats: SessionStats,
}

impl Session {
    pub(crate) fn new(id: SessionId, pipeline: Arc<Pipeline>) -> Self {
        let emitter = SnapshotEmitter::new(pipeline.config.stream_capacity);
        info!(session = %id, "session opened");
        Self {
            id,
            pipeline,
            contexts: TaskContextManager::new(id),
            active_task: None,
            install_action: None,
            overall: OverallProgress::default(),
            emitter,
            state: SessionState::Open,
            stats: SessionStats::default(),
        }
    }

    /// Session id.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Lifecycle state.
    #[must_use]
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    /// Returns true while the session accepts lines.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self.state, SessionState::Open)
    }

    /// The task lines are currently classified against.
    #[must_use]
    pub fn active_task(&self) -> Option<&str> {
        self.active_task.as_deref()
    }

    /// Last value captured by `update_action` (e.g. `install`, `softupdate`).
    #[must_use]
    pub fn install_action(&self) -> Option<&str> {
        self.install_action.as_deref()
    }

    /// Line counters.
    #[must_use]
    pub const fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Snapshots dropped because a subscriber fell behind.
    #[must_use]
    pub fn dropped_snapshots(&self) -> u64 {
        self.emitter.dropped_snapshots()
    }

    /// Overall installation percentage, when the table declares milestones.
    #[must_use]
    pub fn overall_percent(&self) -> Option<f64> {
        self.pipeline.table.has_milestones().then(|| self.overall.current())
    }

    /// State of `task` in this session.
    pub fn task_context(&self, task: &str) -> ProgressResult<&TaskContext> {
        self.ensure_open()?;
        Ok(self.contexts.get(task)?)
    }

    /// Makes `task` the active task and zeroes its counters.
    ///
    /// Re-activating the active task also resets it.
    pub fn activate_task(&mut self, task: &str) -> ProgressResult<()> {
        self.ensure_open()?;
        if !self.pipeline.table.knows_task(task) {
            return Err(ExecutionError::TaskNotFound { task: task.to_string() }.into());
        }
        self.enter_task(task);
        Ok(())
    }

    /// Subscribes to future snapshots. The stream ends when the session closes.
    pub fn subscribe(&mut self) -> SnapshotStream {
        self.emitter.subscribe()
    }

    /// Processes one line.
    ///
    /// Returns the emitted snapshot, or `None` for lines that change nothing
    /// visible. Per-line failures are logged and the line is ignored.
    pub fn ingest(&mut self, line: &str) -> ProgressResult<Option<ProgressSnapshot>> {
        self.ensure_open()?;
        self.stats.lines += 1;

        if let Some(directive) = self.pipeline.directives.detect(line) {
            match directive {
                Directive::SwitchTask(task) if self.pipeline.table.knows_task(&task) => {
                    return Ok(self.switch_task(&task));
                }
                Directive::SwitchTask(task) => {
                    debug!(session = %self.id, task = %task, "ignoring switch to unknown task");
                }
                Directive::Hangup => return Ok(Some(self.finish())),
                Directive::Fault(message) => {
                    error!(session = %self.id, fault = %message, "installer reported a fatal error");
                    self.close(CloseReason::Fault(message));
                    return Ok(None);
                }
            }
        }

        let task = self
            .active_task
            .clone()
            .ok_or(ExecutionError::NoActiveTask { session: self.id })?;

        let Some(hit) = self.pipeline.classifier.classify(&task, line) else {
            return Ok(None);
        };
        self.stats.matched += 1;
        debug!(session = %self.id, task = %task, rule = %hit.rule.id(), "line classified");

        let pipeline = Arc::clone(&self.pipeline);
        let ctx = self.contexts.get_mut(&task)?;
        let input = ActionInput {
            rule: &hit.rule,
            captures: &hit.captures,
            aggregator: &pipeline.aggregator,
        };

        let outcome = match pipeline.dispatcher.dispatch(&input, ctx) {
            Ok(outcome) => outcome,
            Err(err) => {
                self.stats.ignored += 1;
                warn!(session = %self.id, task = %task, rule = %hit.rule.id(), error = %err, "line ignored");
                return Ok(None);
            }
        };

        let (rule_fraction, task_fraction, message, warnings) = match outcome {
            ActionOutcome::Silent => return Ok(None),
            ActionOutcome::Progress(update) => {
                self.overall.advance(update.task_fraction);
                (update.rule_fraction, update.task_fraction, update.message, update.warnings)
            }
            ActionOutcome::Label { label, value, warnings } => {
                if let Some(value) = value {
                    self.install_action = Some(value);
                }
                (
                    pipeline.aggregator.rule_fraction(ctx, &hit.rule),
                    pipeline.aggregator.task_fraction(ctx),
                    label,
                    warnings,
                )
            }
        };

        let label = ctx.active_action_label().map(str::to_string);
        self.log_warnings(&hit.rule, &warnings);
        let snapshot = self.snapshot(&task, label, rule_fraction, task_fraction, message);
        self.publish(&snapshot);
        Ok(Some(snapshot))
    }

    /// Stops the session, discards its task contexts and ends every stream.
    ///
    /// Returns false if it was already closed.
    pub fn close(&mut self, reason: CloseReason) -> bool {
        if !self.is_open() {
            return false;
        }
        info!(session = %self.id, reason = ?reason, lines = self.stats.lines, "session closed");
        self.contexts.clear();
        self.emitter.close();
        self.state = SessionState::Closed(reason);
        true
    }

    fn finish(&mut self) -> ProgressSnapshot {
        self.overall.finish();
        let snapshot = self.snapshot(
            FINISHED_TASK,
            Some(FINISHED_MESSAGE.to_string()),
            1.0,
            1.0,
            FINISHED_MESSAGE.to_string(),
        );
        self.publish(&snapshot);
        self.close(CloseReason::Hangup);
        snapshot
    }

    fn ensure_open(&self) -> Result<(), ProgressError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(ExecutionError::SessionClosed { session: self.id }.into())
        }
    }

    fn enter_task(&mut self, task: &str) {
        let softupdate = self.install_action.as_deref() == Some(self.pipeline.config.softupdate_action.as_str());
        let target = self.pipeline.table.milestone(task).map(|m| m.target(softupdate));

        let activations = self.contexts.activate(task).activations();
        if self.active_task.as_deref() != Some(task) {
            self.overall.enter(target);
            self.active_task = Some(task.to_string());
        }
        debug!(session = %self.id, task = %task, activations, "task activated");
    }

    fn switch_task(&mut self, task: &str) -> Option<ProgressSnapshot> {
        if self.active_task.as_deref() == Some(task) {
            debug!(session = %self.id, task = %task, "already active");
            return None;
        }
        self.enter_task(task);

        let message = self
            .pipeline
            .table
            .milestone(task)
            .map_or_else(|| task.to_string(), |m| m.description().to_string());
        let snapshot = self.snapshot(task, None, 0.0, 0.0, message);
        self.publish(&snapshot);
        Some(snapshot)
    }

    fn snapshot(
        &self,
        task: &str,
        label: Option<String>,
        rule_fraction: f64,
        task_fraction: f64,
        message: String,
    ) -> ProgressSnapshot {
        let label = label.unwrap_or_else(|| {
            self.pipeline
                .table
                .milestone(task)
                .map_or_else(|| task.to_string(), |m| m.description().to_string())
        });
        ProgressSnapshot {
            session: self.id,
            task: task.to_string(),
            rule_fraction,
            task_fraction,
            overall_percent: self.overall_percent(),
            label,
            message,
        }
    }

    fn publish(&mut self, snapshot: &ProgressSnapshot) {
        self.stats.snapshots += 1;
        self.emitter.publish(snapshot);
    }

    fn log_warnings(&mut self, rule: &Rule, warnings: &[RenderWarning]) {
        for warning in warnings {
            warn!(session = %self.id, rule = %rule.id(), "{warning}");
        }
        self.stats.render_warnings += warnings.len() as u64;
    }
}
