/// Named, compiled patterns and their RON loading.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::schema::node::{Node, NodeRef};

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// A compiled pattern ready to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    #[serde(default)]
    pub name: String,
    pub root: NodeRef,
}

impl Pattern {
    pub fn new(name: &str, root: NodeRef) -> Self {
        Self {
            name: name.to_string(),
            root,
        }
    }

    /// Wraps a bare node tree.
    pub fn from_node(node: Node) -> Self {
        Self {
            name: String::new(),
            root: Arc::new(node),
        }
    }

    /// Load a pattern from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<Pattern, PatternError> {
        let contents = std::fs::read_to_string(path)?;
        let mut pattern = Self::parse_ron(&contents)?;
        if pattern.name.is_empty() {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                pattern.name = stem.to_string();
            }
        }
        Ok(pattern)
    }

    /// Parse a pattern from a RON string.
    pub fn parse_ron(input: &str) -> Result<Pattern, PatternError> {
        Ok(ron::from_str(input)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::node::NodeKind;

    #[test]
    fn parses_minimal_pattern() {
        let pattern = Pattern::parse_ron(r#"(root: (kind: Text("hello")))"#).unwrap();
        assert!(pattern.name.is_empty());
        assert_eq!(pattern.root.kind, NodeKind::Text("hello".to_string()));
    }

    #[test]
    fn rejects_malformed_ron() {
        assert!(matches!(
            Pattern::parse_ron("(root: "),
            Err(PatternError::Ron(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = Pattern::load_from_ron(Path::new("tests/fixtures/does_not_exist.ron"));
        assert!(matches!(err, Err(PatternError::Io(_))));
    }
}
