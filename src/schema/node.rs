/// Compiled pattern trees.
///
/// Nodes are immutable and carry no interpreter state; the sandbox walks
/// them through resumable cursors. Children are shared `Arc`s so cursors and
/// subroutine tables can hold onto sub-trees cheaply.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::schema::builtin::Builtin;

pub type NodeRef = Arc<Node>;

/// Source position of a node, for error reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineCol {
    pub line: u32,
    pub col: u32,
}

impl fmt::Display for LineCol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub kind: NodeKind,
    #[serde(default)]
    pub location: LineCol,
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            location: LineCol::default(),
        }
    }

    pub fn at(kind: NodeKind, line: u32, col: u32) -> Self {
        Self {
            kind,
            location: LineCol { line, col },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Literal text.
    Text(String),
    /// Escape sequence such as `\n`, `\d` or `\a`.
    Escape(Escape),
    /// Children executed in order.
    Sequence(Vec<NodeRef>),
    Block(Block),
    /// Call to a built-in function.
    Function { func: Builtin, args: Vec<NodeRef> },
    Query(Query),
    Replacer(Replacer),
    DefineSubroutine(SubroutineDef),
    CallSubroutine { name: String, args: Vec<NodeRef> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escape {
    pub code: char,
    #[serde(default = "one")]
    pub times: u32,
    /// Print `code` literally instead of interpreting it.
    #[serde(default)]
    pub unicode: bool,
}

fn one() -> u32 {
    1
}

/// Alternatives of which one is chosen per iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub items: Vec<BlockItem>,
}

impl Block {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether any item carries a weight.
    pub fn is_weighted(&self) -> bool {
        self.items.iter().any(|item| item.weight.is_some())
    }

    pub fn has_dynamic_weights(&self) -> bool {
        self.items
            .iter()
            .any(|item| matches!(item.weight, Some(Weight::Dynamic(_))))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockItem {
    pub body: NodeRef,
    /// Unweighted items count as weight 1.
    #[serde(default)]
    pub weight: Option<Weight>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Weight {
    Constant(f64),
    /// Evaluated once per block invocation; must render a number.
    Dynamic(NodeRef),
}

/// Dictionary lookup handed to the vocabulary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub table: String,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub excluded_classes: Vec<String>,
    #[serde(default)]
    pub carrier: Carrier,
    /// Printed inside a split entry, e.g. "look [complement] up".
    #[serde(default)]
    pub complement: Option<NodeRef>,
}

/// Cross-query constraints, keyed by carrier id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Carrier {
    /// Queries sharing a match id return the same entry.
    #[serde(default)]
    pub matches: Vec<String>,
    /// Queries sharing a unique id never return the same entry twice.
    #[serde(default)]
    pub uniques: Vec<String>,
}

impl Carrier {
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty() && self.uniques.is_empty()
    }
}

/// Regex substitution over the output of `source`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Replacer {
    pub pattern: String,
    pub source: NodeRef,
    /// Run once per match; its output replaces the match.
    pub evaluator: NodeRef,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamMode {
    /// Evaluated once at the call site.
    #[default]
    Eager,
    /// Re-run every time the argument is read.
    Lazy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    #[serde(default)]
    pub mode: ParamMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubroutineDef {
    pub name: String,
    #[serde(default)]
    pub params: Vec<Param>,
    pub body: NodeRef,
}
