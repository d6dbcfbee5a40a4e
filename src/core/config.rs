/// Engine configuration: run budgets and the writing-system format.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::core::format::Format;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("max_stack_depth must be at least 1")]
    ZeroStackDepth,
}

pub const DEFAULT_MAX_STACK_DEPTH: usize = 64;

/// Budgets applied to every run plus the format passed to every formatting
/// call. Zero budgets mean unlimited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum characters a run may print.
    pub size_limit: usize,
    /// Wall-clock budget per run, in milliseconds.
    pub timeout_ms: u64,
    pub max_stack_depth: usize,
    pub format: Format,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            size_limit: 0,
            timeout_ms: 0,
            max_stack_depth: DEFAULT_MAX_STACK_DEPTH,
            format: Format::default(),
        }
    }
}

impl EngineConfig {
    /// Load a config from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<EngineConfig, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse a config from a RON string.
    pub fn parse_ron(input: &str) -> Result<EngineConfig, ConfigError> {
        let config: EngineConfig = ron::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_stack_depth == 0 {
            return Err(ConfigError::ZeroStackDepth);
        }
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = EngineConfig::parse_ron("()").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn partial_config_overrides_fields() {
        let config = EngineConfig::parse_ron(
            r#"(size_limit: 500, timeout_ms: 250, format: (space: "_"))"#,
        )
        .unwrap();
        assert_eq!(config.size_limit, 500);
        assert_eq!(config.timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.format.space, "_");
        assert_eq!(config.max_stack_depth, DEFAULT_MAX_STACK_DEPTH);
    }

    #[test]
    fn zero_depth_rejected() {
        assert!(matches!(
            EngineConfig::parse_ron("(max_stack_depth: 0)"),
            Err(ConfigError::ZeroStackDepth)
        ));
    }
}
