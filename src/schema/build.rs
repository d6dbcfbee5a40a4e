/// Helpers for assembling node trees in code.

use std::sync::Arc;

use crate::schema::builtin::Builtin;
use crate::schema::node::{
    Block, BlockItem, Escape, Node, NodeKind, NodeRef, Param, ParamMode, Query, Replacer,
    SubroutineDef, Weight,
};

fn node(kind: NodeKind) -> NodeRef {
    Arc::new(Node::new(kind))
}

pub fn text(value: &str) -> NodeRef {
    node(NodeKind::Text(value.to_string()))
}

pub fn seq(children: impl IntoIterator<Item = NodeRef>) -> NodeRef {
    node(NodeKind::Sequence(children.into_iter().collect()))
}

pub fn esc(code: char) -> NodeRef {
    esc_times(code, 1)
}

pub fn esc_times(code: char, times: u32) -> NodeRef {
    node(NodeKind::Escape(Escape {
        code,
        times,
        unicode: false,
    }))
}

/// A literal character, printed `times` times.
pub fn unicode(c: char, times: u32) -> NodeRef {
    node(NodeKind::Escape(Escape {
        code: c,
        times,
        unicode: true,
    }))
}

/// Unweighted block.
pub fn block(items: impl IntoIterator<Item = NodeRef>) -> NodeRef {
    node(NodeKind::Block(Block {
        items: items
            .into_iter()
            .map(|body| BlockItem { body, weight: None })
            .collect(),
    }))
}

/// Unweighted block of literal alternatives.
pub fn choice(words: &[&str]) -> NodeRef {
    block(words.iter().map(|w| text(w)))
}

pub fn weighted(items: impl IntoIterator<Item = (f64, NodeRef)>) -> NodeRef {
    node(NodeKind::Block(Block {
        items: items
            .into_iter()
            .map(|(w, body)| BlockItem {
                body,
                weight: Some(Weight::Constant(w)),
            })
            .collect(),
    }))
}

pub fn block_items(items: Vec<BlockItem>) -> NodeRef {
    node(NodeKind::Block(Block { items }))
}

pub fn func(func: Builtin, args: impl IntoIterator<Item = NodeRef>) -> NodeRef {
    node(NodeKind::Function {
        func,
        args: args.into_iter().collect(),
    })
}

/// Resolves a built-in by name and arity.
pub fn builtin(name: &str, args: Vec<NodeRef>) -> Option<NodeRef> {
    let func = Builtin::lookup(name, args.len())?;
    Some(node(NodeKind::Function { func, args }))
}

/// Defines a subroutine whose parameters are all evaluated at the call site.
pub fn define(name: &str, params: &[&str], body: NodeRef) -> NodeRef {
    define_with(
        name,
        params
            .iter()
            .map(|p| Param {
                name: p.to_string(),
                mode: ParamMode::Eager,
            })
            .collect(),
        body,
    )
}

pub fn define_with(name: &str, params: Vec<Param>, body: NodeRef) -> NodeRef {
    node(NodeKind::DefineSubroutine(SubroutineDef {
        name: name.to_string(),
        params,
        body,
    }))
}

pub fn call(name: &str, args: impl IntoIterator<Item = NodeRef>) -> NodeRef {
    node(NodeKind::CallSubroutine {
        name: name.to_string(),
        args: args.into_iter().collect(),
    })
}

pub fn query(query: Query) -> NodeRef {
    node(NodeKind::Query(query))
}

pub fn replace(pattern: &str, source: NodeRef, evaluator: NodeRef) -> NodeRef {
    node(NodeKind::Replacer(Replacer {
        pattern: pattern.to_string(),
        source,
        evaluator,
    }))
}

/// Copy of `node` tagged with a source location.
pub fn located(node: &NodeRef, line: u32, col: u32) -> NodeRef {
    Arc::new(Node::at(node.kind.clone(), line, col))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_resolves_arity() {
        let node = builtin("series", vec![text(", "), text("and")]).unwrap();
        assert!(matches!(
            node.kind,
            NodeKind::Function {
                func: Builtin::Series,
                ..
            }
        ));
        assert!(builtin("series", vec![]).is_none());
    }

    #[test]
    fn located_keeps_kind() {
        let original = text("x");
        let tagged = located(&original, 7, 3);
        assert_eq!(tagged.kind, original.kind);
        assert_eq!(tagged.location.line, 7);
    }

    #[test]
    fn choice_builds_unweighted_block() {
        let node = choice(&["a", "b", "c"]);
        match &node.kind {
            NodeKind::Block(block) => {
                assert_eq!(block.len(), 3);
                assert!(!block.is_weighted());
            }
            other => panic!("expected block, got {:?}", other),
        }
    }
}
