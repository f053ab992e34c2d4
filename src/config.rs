//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::progress::WeightingPolicy;

/// Patterns for lines that steer the session rather than a task.
///
/// `None` disables a directive.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectiveConfig {
    /// Must define a `name` group holding the task id.
    pub task_switch: Option<String>,
    pub hangup: Option<String>,
    /// Must define a `payload` group holding base64 data.
    pub fault: Option<String>,
}

impl Default for DirectiveConfig {
    fn default() -> Self {
        Self {
            task_switch: Some(r"^((Skip|Call)ing task_|(Calling|Source) hook: )(?P<name>[A-Za-z0-9_-]+)".to_string()),
            hangup: Some(r"^fai-progress: hangup$".to_string()),
            fault: Some(r"^ldap2fai-error:(?P<payload>.*)$".to_string()),
        }
    }
}

impl DirectiveConfig {
    /// All directives disabled.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            task_switch: None,
            hangup: None,
            fault: None,
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Per-subscriber snapshot buffer before snapshots are dropped.
    pub stream_capacity: usize,
    /// Normalization of recurring rules.
    pub weighting: WeightingPolicy,
    /// Reject tables whose actions have no handler.
    pub strict_actions: bool,
    /// `update_action` value that selects softupdate milestone targets.
    pub softupdate_action: String,
    /// Session-level directives.
    pub directives: DirectiveConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stream_capacity: 1024,
            weighting: WeightingPolicy::Equal,
            strict_actions: true,
            softupdate_action: "softupdate".to_string(),
            directives: DirectiveConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parses a YAML configuration; missing fields take their defaults.
    pub fn from_yaml_str(input: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(input).map_err(|e| ConfigError::Parse {
            format: "YAML",
            message: e.to_string(),
        })
    }
}
