//! Session-level directives: task switches, hangup and installer faults.
//!
//! Directives are checked before any task rule, whatever task is active.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use regex::Regex;

use crate::config::DirectiveConfig;
use crate::error::ConfigError;

/// Message used when a fault payload is not valid base64.
pub const UNDECODABLE_FAULT: &str = "ldap2fai-error occurred, however the cause could not be decoded!";

/// A recognized directive line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Switch to the named task.
    SwitchTask(String),
    /// The log source is done.
    Hangup,
    /// The installer reported a fatal error.
    Fault(String),
}

/// Compiled directive patterns.
#[derive(Debug, Clone, Default)]
pub struct DirectiveSet {
    task_switch: Option<Regex>,
    hangup: Option<Regex>,
    fault: Option<Regex>,
}

fn compile(name: &'static str, pattern: Option<&str>, group: Option<&str>) -> Result<Option<Regex>, ConfigError> {
    let Some(pattern) = pattern else {
        return Ok(None);
    };
    let re = Regex::new(pattern).map_err(|e| ConfigError::InvalidDirective {
        name,
        reason: e.to_string(),
    })?;
    if let Some(group) = group {
        if !re.capture_names().flatten().any(|n| n == group) {
            return Err(ConfigError::InvalidDirective {
                name,
                reason: format!("pattern must define a '{group}' group"),
            });
        }
    }
    Ok(Some(re))
}

impl DirectiveSet {
    /// Compiles the configured patterns.
    pub fn compile(cfg: &DirectiveConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            task_switch: compile("task_switch", cfg.task_switch.as_deref(), Some("name"))?,
            hangup: compile("hangup", cfg.hangup.as_deref(), None)?,
            fault: compile("fault", cfg.fault.as_deref(), Some("payload"))?,
        })
    }

    /// Recognizes a directive line. Faults win over hangups, hangups over task switches.
    #[must_use]
    pub fn detect(&self, line: &str) -> Option<Directive> {
        if let Some(caps) = self.fault.as_ref().and_then(|re| re.captures(line)) {
            let payload = caps.name("payload").map_or("", |m| m.as_str());
            return Some(Directive::Fault(decode_fault(payload)));
        }
        if self.hangup.as_ref().is_some_and(|re| re.is_match(line)) {
            return Some(Directive::Hangup);
        }
        let caps = self.task_switch.as_ref()?.captures(line)?;
        caps.name("name").map(|m| Directive::SwitchTask(m.as_str().to_string()))
    }
}

/// Decodes a base64 fault payload into a message.
#[must_use]
pub fn decode_fault(payload: &str) -> String {
    match STANDARD.decode(payload.trim()) {
        Ok(bytes) => format!("ldap2fai-error: {}", String::from_utf8_lossy(&bytes).trim_end()),
        Err(_) => UNDECODABLE_FAULT.to_string(),
    }
}
