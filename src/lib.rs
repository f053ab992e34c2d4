//! # fai-progress - Rule-driven progress tracking for FAI installations
//!
//! fai-progress turns the unstructured log output of an FAI (Fully Automatic
//! Installation) run into structured progress snapshots: how far the current
//! rule and task have come, the current phase label and a status message.
//!
//! ## Core Concepts
//!
//! - **Task**: an installation phase (`partition`, `extrbase`, `instsoft`) that scopes which rules may match
//! - **Rule**: a compiled pattern bound to tasks and an action
//! - **Action**: what a match does (`update_progress`, `update_action`, `update_package_count`, or a registered handler)
//! - **Session**: one monitored installer run with isolated counters
//! - **Snapshot**: the immutable progress state emitted for a processed line
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fai_progress::{ProgressEngine, RuleTable};
//!
//! let engine = ProgressEngine::new(RuleTable::fai()?)?;
//! let session = engine.open_session()?;
//! let stream = engine.subscribe(session)?;
//!
//! engine.activate_task(session, "partition")?;
//! if let Some(snapshot) = engine.ingest(session, "Executing: parted -s /dev/sda mklabel gpt")? {
//!     println!("{} {:.0}%", snapshot.message, snapshot.task_fraction * 100.0);
//! }
//!
//! engine.close_session(session)?;
//! for snapshot in stream {
//!     println!("{}", snapshot.message);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Rules and their inputs
pub mod config;
pub mod error;
pub mod milestone;
pub mod rule;
pub mod table;

// Line processing
pub mod action;
pub mod classifier;
pub mod context;
pub mod directive;
pub mod progress;
pub mod render;

// Sessions and delivery
pub mod engine;
pub mod monitor;
pub mod session;

pub use action::{ActionDispatcher, ActionHandler, ActionInput, ActionKind, ActionOutcome, ProgressUpdate};
pub use classifier::{Classification, LineClassifier};
pub use config::{DirectiveConfig, EngineConfig};
pub use context::{PackageTotals, TaskContext, TaskContextManager};
pub use directive::{Directive, DirectiveSet};
pub use engine::{EngineBuilder, ProgressEngine};
pub use error::{ConfigError, DispatchError, ExecutionError, ProgressError, ProgressResult};
pub use milestone::{Milestone, MilestoneRecord, OverallProgress};
pub use monitor::{SnapshotEmitter, SnapshotStream, SubscriptionId};
pub use progress::{ProgressAggregator, ProgressSnapshot, WeightingPolicy};
pub use render::{Captures, RenderWarning, Rendered};
pub use rule::{Rule, RuleId, RuleParameters, RuleRecord};
pub use session::{CloseReason, Session, SessionId, SessionState, SessionStats, FINISHED_TASK};
pub use table::{RuleDocument, RuleTable, FAI_RULES};
