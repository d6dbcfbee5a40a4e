/// Resumable per-node execution state.
///
/// A frame pairs a node with a cursor recording which child it is waiting
/// on. Resuming a frame either yields the next child to run or finishes it.

use rand::Rng;
use regex_lite::Regex;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::warn;

use crate::core::block::BlockCursor;
use crate::core::error::ErrorKind;
use crate::core::functions::FunctionCursor;
use crate::core::output::TargetKey;
use crate::core::sandbox::{Argument, CallArgs, ReplacerMatch, Sandbox};
use crate::core::scope::Value;
use crate::core::vocab::QueryResult;
use crate::schema::node::{Escape, LineCol, NodeKind, NodeRef, ParamMode, Query, Replacer};

pub const MISSING_TABLE: &str = "[Missing Table]";
pub const NO_MATCH: &str = "[No Match]";

#[derive(Debug)]
pub enum Step {
    /// Run this node next, then resume the current frame.
    Child(NodeRef),
    Done,
}

#[derive(Debug)]
pub(crate) struct Frame {
    node: NodeRef,
    cursor: Cursor,
}

#[derive(Debug)]
enum Cursor {
    /// Nodes that finish in a single resume.
    Leaf,
    Sequence(usize),
    Block(Box<BlockCursor>),
    Function(Box<FunctionCursor>),
    Query(QueryCursor),
    Replacer(Box<ReplacerCursor>),
    Call(Box<CallCursor>),
}

impl Frame {
    pub(crate) fn new(node: NodeRef) -> Self {
        let cursor = match &node.kind {
            NodeKind::Text(_) | NodeKind::Escape(_) | NodeKind::DefineSubroutine(_) => Cursor::Leaf,
            NodeKind::Sequence(_) => Cursor::Sequence(0),
            NodeKind::Block(_) => Cursor::Block(Box::default()),
            NodeKind::Function { .. } => Cursor::Function(Box::default()),
            NodeKind::Query(_) => Cursor::Query(QueryCursor::Start),
            NodeKind::Replacer(_) => Cursor::Replacer(Box::default()),
            NodeKind::CallSubroutine { .. } => Cursor::Call(Box::default()),
        };
        Self { node, cursor }
    }

    pub(crate) fn location(&self) -> LineCol {
        self.node.location
    }

    pub(crate) fn resume(&mut self, sb: &mut Sandbox<'_>) -> Result<Step, ErrorKind> {
        let node = Arc::clone(&self.node);
        match (&node.kind, &mut self.cursor) {
            (NodeKind::Text(text), _) => {
                sb.print(text)?;
                Ok(Step::Done)
            }
            (NodeKind::Escape(escape), _) => {
                print_escape(sb, escape)?;
                Ok(Step::Done)
            }
            (NodeKind::DefineSubroutine(def), _) => {
                sb.objects
                    .define_subroutine(&def.name, def.params.clone(), Arc::clone(&def.body));
                Ok(Step::Done)
            }
            (NodeKind::Sequence(children), Cursor::Sequence(next)) => match children.get(*next) {
                Some(child) => {
                    *next += 1;
                    Ok(Step::Child(Arc::clone(child)))
                }
                None => Ok(Step::Done),
            },
            (NodeKind::Block(block), Cursor::Block(cursor)) => cursor.resume(sb, block),
            (NodeKind::Function { func, args }, Cursor::Function(cursor)) => {
                cursor.resume(sb, *func, args)
            }
            (NodeKind::Query(query), Cursor::Query(cursor)) => cursor.resume(sb, query),
            (NodeKind::Replacer(replacer), Cursor::Replacer(cursor)) => cursor.resume(sb, replacer),
            (NodeKind::CallSubroutine { name, args }, Cursor::Call(cursor)) => {
                cursor.resume(sb, name, args)
            }
            (_, cursor) => unreachable!(
                "frame at {} holds {cursor:?}, which was not built for its node",
                node.location
            ),
        }
    }
}

#[cfg(windows)]
const PLATFORM_NEWLINE: &str = "\r\n";
#[cfg(not(windows))]
const PLATFORM_NEWLINE: &str = "\n";

/// Repeats between deadline checks while printing a repeated escape.
const ESCAPE_TIMEOUT_STRIDE: u32 = 1024;

fn print_escape(sb: &mut Sandbox<'_>, escape: &Escape) -> Result<(), ErrorKind> {
    for i in 0..escape.times {
        if i % ESCAPE_TIMEOUT_STRIDE == 0 {
            sb.check_timeout()?;
        }
        if escape.unicode {
            let mut buf = [0u8; 4];
            sb.print(escape.code.encode_utf8(&mut buf))?;
        } else if escape.code == 'a' {
            sb.print_article()?;
        } else {
            let text = escape_text(sb, escape.code);
            sb.print(&text)?;
        }
    }
    Ok(())
}

const HEX_DIGITS: &str = "0123456789abcdef";
const DIGITS: &str = "0123456789";

fn random_char(sb: &mut Sandbox<'_>, pool: &str) -> Option<char> {
    let count = pool.chars().count();
    if count == 0 {
        return None;
    }
    let i = sb.rng.gen_range(0..count);
    pool.chars().nth(i)
}

fn escape_text(sb: &mut Sandbox<'_>, code: char) -> String {
    let format = sb.format;
    match code {
        'n' => "\n".to_string(),
        'N' => PLATFORM_NEWLINE.to_string(),
        'r' => "\r".to_string(),
        't' => "\t".to_string(),
        'b' => "\u{8}".to_string(),
        'f' => "\u{c}".to_string(),
        'v' => "\u{b}".to_string(),
        '0' => "\0".to_string(),
        's' => format.space.clone(),
        'd' => sb.rng.gen_range(0..10u32).to_string(),
        'D' => sb.rng.gen_range(1..10u32).to_string(),
        'c' | 'C' | 'x' | 'X' | 'w' | 'W' => {
            let pool = match code {
                'c' | 'C' => format.alphabet.clone(),
                'x' | 'X' => HEX_DIGITS.to_string(),
                _ => format!("{}{}", format.alphabet, DIGITS),
            };
            let picked = random_char(sb, &pool).unwrap_or_default();
            if code.is_uppercase() {
                picked.to_uppercase().collect()
            } else {
                picked.to_lowercase().collect()
            }
        }
        other => other.to_string(),
    }
}

/// What a query still has to print once its complement has run.
#[derive(Debug)]
enum QueryTail {
    /// A space if the complement printed anything, then this text.
    Text(String),
    /// A space into this target if the complement printed anything.
    Target(TargetKey),
}

#[derive(Debug)]
enum QueryCursor {
    Start,
    Complement { tail: QueryTail, mark: usize },
}

impl QueryCursor {
    fn resume(&mut self, sb: &mut Sandbox<'_>, query: &Query) -> Result<Step, ErrorKind> {
        match self {
            QueryCursor::Start => {
                let Some(vocabulary) = sb.vocabulary() else {
                    sb.print(MISSING_TABLE)?;
                    return Ok(Step::Done);
                };
                let Some(result) = vocabulary.query(&mut sb.rng, query, &mut sb.carrier) else {
                    warn!(table = %query.table, classes = ?query.classes, "query found no match");
                    sb.print(NO_MATCH)?;
                    return Ok(Step::Done);
                };
                let Some(complement) = &query.complement else {
                    print_without_complement(sb, &result)?;
                    return Ok(Step::Done);
                };
                let tail = match result.split {
                    Some(0) => QueryTail::Text(result.value),
                    Some(i) if i < result.value.len() => {
                        sb.print(result.left())?;
                        sb.print_space()?;
                        QueryTail::Text(result.right().to_string())
                    }
                    _ => {
                        sb.print(&result.value)?;
                        QueryTail::Target(sb.writer_mut().insert_anonymous_target())
                    }
                };
                *self = QueryCursor::Complement {
                    tail,
                    mark: sb.limit_value(),
                };
                Ok(Step::Child(Arc::clone(complement)))
            }
            QueryCursor::Complement { tail, mark } => {
                let grew = sb.limit_value() > *mark;
                match tail {
                    QueryTail::Text(text) => {
                        if grew {
                            sb.print_space()?;
                        }
                        sb.print(text)?;
                    }
                    QueryTail::Target(key) => {
                        if grew {
                            let format = sb.format;
                            sb.with_output(|writer, ctx| {
                                writer.print_to_target(key, &format.space, ctx)
                            })?;
                        }
                    }
                }
                Ok(Step::Done)
            }
        }
    }
}

fn print_without_complement(sb: &mut Sandbox<'_>, result: &QueryResult) -> Result<(), ErrorKind> {
    if result.is_split() && !result.left().is_empty() && !result.right().is_empty() {
        sb.print(result.left())?;
        sb.print_space()?;
        sb.print(result.right())
    } else {
        sb.print(&result.value)
    }
}

#[derive(Debug, Default)]
enum ReplacerState {
    #[default]
    Start,
    Source,
    Evaluating {
        subject: String,
        matches: Vec<ReplacerMatch>,
        next: usize,
        awaiting: bool,
        result: String,
        copied_to: usize,
    },
}

#[derive(Debug, Default)]
pub(crate) struct ReplacerCursor {
    state: ReplacerState,
}

impl ReplacerCursor {
    fn resume(&mut self, sb: &mut Sandbox<'_>, replacer: &Replacer) -> Result<Step, ErrorKind> {
        loop {
            match &mut self.state {
                ReplacerState::Start => {
                    sb.push_writer();
                    self.state = ReplacerState::Source;
                    return Ok(Step::Child(Arc::clone(&replacer.source)));
                }
                ReplacerState::Source => {
                    let subject = sb.pop_writer();
                    let regex = Regex::new(&replacer.pattern)
                        .map_err(|e| ErrorKind::InvalidRegex(e.to_string()))?;
                    let names: Vec<Option<&str>> = regex.capture_names().collect();
                    let matches = regex
                        .captures_iter(&subject)
                        .filter_map(|caps| {
                            let whole = caps.get(0)?;
                            Some(ReplacerMatch {
                                start: whole.start(),
                                end: whole.end(),
                                groups: caps
                                    .iter()
                                    .map(|g| g.map(|m| m.as_str().to_string()))
                                    .collect(),
                                named: names
                                    .iter()
                                    .flatten()
                                    .filter_map(|name| {
                                        caps.name(name)
                                            .map(|m| (name.to_string(), m.as_str().to_string()))
                                    })
                                    .collect(),
                            })
                        })
                        .collect();
                    self.state = ReplacerState::Evaluating {
                        subject,
                        matches,
                        next: 0,
                        awaiting: false,
                        result: String::new(),
                        copied_to: 0,
                    };
                }
                ReplacerState::Evaluating {
                    subject,
                    matches,
                    next,
                    awaiting,
                    result,
                    copied_to,
                } => {
                    if *awaiting {
                        let replacement = sb.pop_writer();
                        let current = sb.matches.pop().unwrap_or_default();
                        result.push_str(subject.get(*copied_to..current.start).unwrap_or_default());
                        result.push_str(&replacement);
                        *copied_to = current.end;
                        *awaiting = false;
                    }
                    if let Some(m) = matches.get(*next) {
                        sb.matches.push(m.clone());
                        sb.push_writer();
                        *next += 1;
                        *awaiting = true;
                        return Ok(Step::Child(Arc::clone(&replacer.evaluator)));
                    }
                    result.push_str(subject.get(*copied_to..).unwrap_or_default());
                    sb.print(result)?;
                    return Ok(Step::Done);
                }
            }
        }
    }
}

#[derive(Debug, Default)]
enum CallState {
    #[default]
    Start,
    Arguments {
        params: Vec<(String, ParamMode)>,
        body: NodeRef,
        values: CallArgs,
        next: usize,
        awaiting: bool,
    },
    Body,
}

#[derive(Debug, Default)]
pub(crate) struct CallCursor {
    state: CallState,
}

impl CallCursor {
    fn resume(&mut self, sb: &mut Sandbox<'_>, name: &str, args: &[NodeRef]) -> Result<Step, ErrorKind> {
        loop {
            match &mut self.state {
                CallState::Start => {
                    let Some(Value::Subroutine(sub)) = sb.objects.get(name) else {
                        return Err(ErrorKind::UndefinedSubroutine(name.to_string()));
                    };
                    let overload = sub.overload(args.len()).ok_or_else(|| {
                        ErrorKind::ArgumentCountMismatch {
                            name: name.to_string(),
                            got: args.len(),
                        }
                    })?;
                    self.state = CallState::Arguments {
                        params: overload
                            .params
                            .iter()
                            .map(|p| (p.name.clone(), p.mode))
                            .collect(),
                        body: Arc::clone(&overload.body),
                        values: FxHashMap::default(),
                        next: 0,
                        awaiting: false,
                    };
                }
                CallState::Arguments {
                    params,
                    body,
                    values,
                    next,
                    awaiting,
                } => {
                    if *awaiting {
                        let text = sb.pop_writer();
                        values.insert(params[*next - 1].0.clone(), Argument::Text(text));
                        *awaiting = false;
                    }
                    while let Some((param, mode)) = params.get(*next) {
                        let arg = Arc::clone(&args[*next]);
                        *next += 1;
                        match mode {
                            ParamMode::Eager => {
                                sb.push_writer();
                                *awaiting = true;
                                return Ok(Step::Child(arg));
                            }
                            ParamMode::Lazy => {
                                values.insert(param.clone(), Argument::Lazy(arg));
                            }
                        }
                    }
                    let body = Arc::clone(body);
                    sb.call_args.push(std::mem::take(values));
                    sb.objects.enter_scope();
                    self.state = CallState::Body;
                    return Ok(Step::Child(body));
                }
                CallState::Body => {
                    sb.objects.exit_scope();
                    sb.call_args.pop();
                    return Ok(Step::Done);
                }
            }
        }
    }
}
