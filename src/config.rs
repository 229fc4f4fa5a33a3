//! Engine configuration
//!
//! Every setting has a default, so an empty YAML document is a valid config.

use crate::error::{CalcError, CalcResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tunables for parsing, fuzzy matching and evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum AST nodes visited in one top-level evaluation (siblings included)
    pub max_steps: usize,
    /// Maximum nesting depth accepted by the parser
    pub max_nesting: usize,
    /// Shorter side of a substring match must be at least this long
    pub min_substring_match: usize,
    /// Fixed evaluation time for `CURRENT_TIMESTAMP` and `now()`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub now: Option<DateTime<Utc>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: 100_000,
            max_nesting: 256,
            min_substring_match: 3,
            now: None,
        }
    }
}

impl EngineConfig {
    /// Load a config from a YAML (or JSON) file
    pub fn from_file(path: &Path) -> CalcResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CalcResult<()> {
        if self.max_steps == 0 {
            return Err(CalcError::Config("max_steps must be greater than 0".into()));
        }
        if self.max_nesting == 0 {
            return Err(CalcError::Config(
                "max_nesting must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Evaluation time: the configured instant, or the wall clock
    pub fn now(&self) -> DateTime<Utc> {
        self.now.unwrap_or_else(Utc::now)
    }
}
