//! Progress engine for FAI log streams.
//!
//! The engine compiles a rule table into a shared, read-only pipeline and
//! keeps a registry of sessions. Each session is processed under its own lock,
//! so independent installer runs proceed in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use tracing::info;

use crate::action::{ActionDispatcher, ActionHandler};
use crate::classifier::LineClassifier;
use crate::config::EngineConfig;
use crate::context::TaskContext;
use crate::directive::DirectiveSet;
use crate::error::{ConfigError, ExecutionError, ProgressError, ProgressResult};
use crate::monitor::SnapshotStream;
use crate::progress::{ProgressAggregator, ProgressSnapshot};
use crate::session::{CloseReason, Session, SessionId, SessionStats};
use crate::table::RuleTable;

fn lock_err(context: &'static str) -> ProgressError {
    ProgressError::internal(format!("poisoned lock: {context}"))
}

/// Everything a session needs that is shared and never mutated.
#[derive(Debug)]
pub(crate) struct Pipeline {
    pub(crate) table: Arc<RuleTable>,
    pub(crate) classifier: LineClassifier,
    pub(crate) dispatcher: ActionDispatcher,
    pub(crate) aggregator: ProgressAggregator,
    pub(crate) directives: DirectiveSet,
    pub(crate) config: EngineConfig,
}

/// Builds a [`ProgressEngine`].
#[derive(Debug)]
pub struct EngineBuilder {
    table: RuleTable,
    config: EngineConfig,
    dispatcher: ActionDispatcher,
}

impl EngineBuilder {
    /// Starts from `table` with the default configuration.
    #[must_use]
    pub fn new(table: RuleTable) -> Self {
        Self {
            table,
            config: EngineConfig::default(),
            dispatcher: ActionDispatcher::new(),
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers a handler for a custom action id.
    #[must_use]
    pub fn register_handler(mut self, action: impl Into<String>, handler: Arc<dyn ActionHandler>) -> Self {
        self.dispatcher.register(action, handler);
        self
    }

    /// Validates the table against the registered handlers and compiles the pipeline.
    pub fn build(self) -> Result<ProgressEngine, ConfigError> {
        let Self {
            table,
            config,
            dispatcher,
        } = self;

        if config.strict_actions {
            if let Some(rule) = table.rules().iter().find(|r| !dispatcher.resolves(r.action())) {
                return Err(ConfigError::UnknownAction {
                    record: rule.id().index(),
                    action: rule.action().to_string(),
                });
            }
        }

        let directives = DirectiveSet::compile(&config.directives)?;
        let aggregator = ProgressAggregator::new(&table, config.weighting, |kind| dispatcher.tracks_progress(kind));
        let table = Arc::new(table);

        info!(
            rules = table.len(),
            milestones = table.milestones().len(),
            weighting = ?config.weighting,
            strict_actions = config.strict_actions,
            "progress engine ready"
        );

        Ok(ProgressEngine {
            pipeline: Arc::new(Pipeline {
                classifier: LineClassifier::new(Arc::clone(&table)),
                table,
                dispatcher,
                aggregator,
                directives,
                config,
            }),
            sessions: RwLock::new(HashMap::new()),
        })
    }
}

/// Rule-driven progress engine.
#[derive(Debug)]
pub struct ProgressEngine {
    pipeline: Arc<Pipeline>,
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<Session>>>>,
}

impl ProgressEngine {
    /// Creates an engine over `table` with the default configuration.
    pub fn new(table: RuleTable) -> Result<Self, ConfigError> {
        EngineBuilder::new(table).build()
    }

    /// Starts building an engine over `table`.
    #[must_use]
    pub fn builder(table: RuleTable) -> EngineBuilder {
        EngineBuilder::new(table)
    }

    /// The compiled rule table.
    #[must_use]
    pub fn table(&self) -> &RuleTable {
        &self.pipeline.table
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.pipeline.config
    }

    /// Opens a session with a fresh id.
    pub fn open_session(&self) -> ProgressResult<SessionId> {
        self.open_session_with_id(SessionId::new())
    }

    /// Opens a session with a caller-chosen id.
    pub fn open_session_with_id(&self, id: SessionId) -> ProgressResult<SessionId> {
        let mut sessions = self.sessions.write().map_err(|_| lock_err("sessions.open"))?;
        if sessions.contains_key(&id) {
            return Err(ExecutionError::SessionExists { session: id }.into());
        }
        let session = Session::new(id, Arc::clone(&self.pipeline));
        sessions.insert(id, Arc::new(Mutex::new(session)));
        Ok(id)
    }

    /// A session outside the registry, driven directly by its owner.
    #[must_use]
    pub fn detached_session(&self) -> Session {
        Session::new(SessionId::new(), Arc::clone(&self.pipeline))
    }

    /// Makes `task` the active task of `session`, resetting its counters.
    pub fn activate_task(&self, session: SessionId, task: &str) -> ProgressResult<()> {
        self.with_session(session, "session.activate_task", |s| s.activate_task(task))
    }

    /// Processes one line of `session`.
    pub fn ingest(&self, session: SessionId, line: &str) -> ProgressResult<Option<ProgressSnapshot>> {
        self.with_session(session, "session.ingest", |s| s.ingest(line))
    }

    /// Subscribes to the future snapshots of `session`.
    pub fn subscribe(&self, session: SessionId) -> ProgressResult<SnapshotStream> {
        self.with_session(session, "session.subscribe", |s| Ok(s.subscribe()))
    }

    /// A copy of the state of `task` in `session`.
    pub fn task_context(&self, session: SessionId, task: &str) -> ProgressResult<TaskContext> {
        self.with_session(session, "session.task_context", |s| s.task_context(task).cloned())
    }

    /// The active task of `session`.
    pub fn active_task(&self, session: SessionId) -> ProgressResult<Option<String>> {
        self.with_session(session, "session.active_task", |s| Ok(s.active_task().map(str::to_string)))
    }

    /// Line counters of `session`.
    pub fn session_stats(&self, session: SessionId) -> ProgressResult<SessionStats> {
        self.with_session(session, "session.stats", |s| Ok(s.stats()))
    }

    /// Overall percentage of `session`, when the table declares milestones.
    pub fn overall_percent(&self, session: SessionId) -> ProgressResult<Option<f64>> {
        self.with_session(session, "session.overall_percent", |s| Ok(s.overall_percent()))
    }

    /// Returns true if `session` is registered and still accepting lines.
    pub fn is_open(&self, session: SessionId) -> ProgressResult<bool> {
        self.with_session(session, "session.is_open", |s| Ok(s.is_open()))
    }

    /// Removes `session`, discarding its contexts and ending its streams.
    ///
    /// A line being processed when this is called completes first.
    pub fn close_session(&self, session: SessionId) -> ProgressResult<()> {
        let removed = self
            .sessions
            .write()
            .map_err(|_| lock_err("sessions.close"))?
            .remove(&session)
            .ok_or(ExecutionError::SessionNotFound { session })?;
        let mut guard = removed.lock().map_err(|_| lock_err("session.close"))?;
        guard.close(CloseReason::Requested);
        Ok(())
    }

    /// Ids of every registered session, sorted.
    pub fn session_ids(&self) -> ProgressResult<Vec<SessionId>> {
        let sessions = self.sessions.read().map_err(|_| lock_err("sessions.ids"))?;
        let mut ids: Vec<SessionId> = sessions.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }

    fn with_session<T>(
        &self,
        session: SessionId,
        context: &'static str,
        f: impl FnOnce(&mut Session) -> ProgressResult<T>,
    ) -> ProgressResult<T> {
        let entry = {
            let sessions = self.sessions.read().map_err(|_| lock_err("sessions.get"))?;
            sessions
                .get(&session)
                .cloned()
                .ok_or(ExecutionError::SessionNotFound { session })?
        };
        let mut guard = entry.lock().map_err(|_| lock_err(context))?;
        f(&mut *guard)
    }
}
