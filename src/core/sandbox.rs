/// The interpreter.
///
/// A `Sandbox` runs one pattern over an explicit stack of frames. Each frame
/// is resumed until it either hands back a child node to run next or reports
/// that it is finished, so timeout and depth checks happen at every step and
/// a run can pause at yield points and carry on later.

use rustc_hash::FxHashMap;
use std::iter::FusedIterator;
use std::mem;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::core::block::{AttribManager, BlockState};
use crate::core::config::EngineConfig;
use crate::core::cursor::{Frame, Step};
use crate::core::error::{ErrorKind, RuntimeError};
use crate::core::format::Format;
use crate::core::limit::Limit;
use crate::core::output::{OutputContext, OutputWriter, RunOutput};
use crate::core::rng::GenRng;
use crate::core::scope::{Globals, ObjectStack};
use crate::core::sync::SyncManager;
use crate::core::vocab::{CarrierState, Vocabulary};
use crate::schema::node::NodeRef;

/// A subroutine argument as seen from inside the body.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    /// Evaluated once at the call site.
    Text(String),
    /// Re-run each time it is read.
    Lazy(NodeRef),
}

pub type CallArgs = FxHashMap<String, Argument>;

/// One regex match made available to a replacer's evaluator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplacerMatch {
    pub start: usize,
    pub end: usize,
    /// Numbered groups; group 0 is the whole match.
    pub groups: Vec<Option<String>>,
    pub named: Vec<(String, String)>,
}

impl ReplacerMatch {
    pub fn text(&self) -> &str {
        self.groups
            .first()
            .and_then(|g| g.as_deref())
            .unwrap_or_default()
    }

    /// Group by number or by name. Missing groups read as empty.
    pub fn group(&self, key: &str) -> &str {
        if let Ok(i) = key.trim().parse::<usize>() {
            return self
                .groups
                .get(i)
                .and_then(|g| g.as_deref())
                .unwrap_or_default();
        }
        self.named
            .iter()
            .find(|(name, _)| name == key)
            .map_or("", |(_, value)| value.as_str())
    }
}

pub struct Sandbox<'a> {
    pub(crate) format: &'a Format,
    vocabulary: Option<&'a dyn Vocabulary>,
    program_args: Option<&'a FxHashMap<String, String>>,
    pub(crate) rng: GenRng,
    pub(crate) objects: ObjectStack<'a>,
    /// States of the block iterations currently running, innermost last.
    pub(crate) blocks: Vec<BlockState>,
    pub(crate) attribs: AttribManager,
    pub(crate) syncs: SyncManager,
    pub(crate) carrier: CarrierState,
    pub(crate) call_args: Vec<CallArgs>,
    pub(crate) matches: Vec<ReplacerMatch>,
    pub(crate) quote_level: usize,
    base: OutputWriter,
    /// Isolated writers of nested evaluations, innermost last.
    nested: Vec<OutputWriter>,
    limit: Limit,
    timeout: Option<Duration>,
    started: Instant,
    max_depth: usize,
    stack: Vec<Frame>,
    yield_requested: bool,
    seed: u64,
    starting_generation: u64,
}

impl<'a> Sandbox<'a> {
    pub fn new(config: &'a EngineConfig, globals: &'a mut Globals, seed: u64) -> Self {
        Self {
            format: &config.format,
            vocabulary: None,
            program_args: None,
            rng: GenRng::new(seed),
            objects: ObjectStack::new(globals),
            blocks: Vec::new(),
            attribs: AttribManager::new(),
            syncs: SyncManager::new(),
            carrier: CarrierState::default(),
            call_args: Vec::new(),
            matches: Vec::new(),
            quote_level: 0,
            base: OutputWriter::new(),
            nested: Vec::new(),
            limit: Limit::new(config.size_limit),
            timeout: config.timeout(),
            started: Instant::now(),
            max_depth: config.max_stack_depth.max(1),
            stack: Vec::new(),
            yield_requested: false,
            seed,
            starting_generation: 0,
        }
    }

    pub fn with_vocabulary(mut self, vocabulary: Option<&'a dyn Vocabulary>) -> Self {
        self.vocabulary = vocabulary;
        self
    }

    pub fn with_program_args(mut self, args: &'a FxHashMap<String, String>) -> Self {
        self.program_args = Some(args);
        self
    }

    /// Starts the RNG at `generation` instead of zero.
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.rng = GenRng::with_generation(self.seed, generation);
        self.starting_generation = generation;
        self
    }

    /// Runs `root` to completion.
    pub fn run(mut self, root: &NodeRef) -> Result<RunOutput, RuntimeError> {
        debug!(seed = self.seed, generation = self.starting_generation, "run started");
        self.started = Instant::now();
        self.push_frame(Arc::clone(root))?;
        self.execute(false)?;
        debug!(
            chars = self.limit.value(),
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "run finished"
        );
        Ok(self.base.to_output(self.seed, self.starting_generation))
    }

    /// Runs `root` lazily, producing one output per yield point plus any
    /// output left over at the end.
    pub fn run_serial(mut self, root: &NodeRef) -> RunSerial<'a> {
        debug!(seed = self.seed, "serial run started");
        self.started = Instant::now();
        RunSerial {
            sandbox: self,
            root: Some(Arc::clone(root)),
            finished: false,
        }
    }

    fn push_frame(&mut self, node: NodeRef) -> Result<(), RuntimeError> {
        if self.stack.len() >= self.max_depth {
            return Err(RuntimeError::new(
                ErrorKind::StackOverflow(self.max_depth),
                node.location,
            ));
        }
        trace!(depth = self.stack.len(), location = %node.location, "push frame");
        self.stack.push(Frame::new(node));
        Ok(())
    }

    /// Drives the frame stack until it is empty (`None`) or, in serial mode,
    /// until a yield point has been reached.
    fn execute(&mut self, serial: bool) -> Result<Option<RunOutput>, RuntimeError> {
        while let Some(mut frame) = self.stack.pop() {
            let location = frame.location();
            self.check_timeout()
                .map_err(|kind| RuntimeError::new(kind, location))?;
            match frame.resume(self) {
                Ok(Step::Child(child)) => {
                    self.stack.push(frame);
                    self.push_frame(child)?;
                }
                Ok(Step::Done) => {
                    if self.yield_requested {
                        self.yield_requested = false;
                        if serial {
                            return Ok(Some(self.take_segment()));
                        }
                    }
                }
                Err(kind) => return Err(RuntimeError::new(kind, location)),
            }
        }
        Ok(None)
    }

    /// Fails once the run has used up its time budget.
    pub(crate) fn check_timeout(&self) -> Result<(), ErrorKind> {
        match self.timeout {
            Some(timeout) if self.started.elapsed() >= timeout => {
                Err(ErrorKind::Timeout(timeout))
            }
            _ => Ok(()),
        }
    }

    /// Replaces the active writer with a fresh one and returns what it held.
    fn take_segment(&mut self) -> RunOutput {
        let writer = match self.nested.last_mut() {
            Some(writer) => writer,
            None => &mut self.base,
        };
        mem::take(writer).to_output(self.seed, self.starting_generation)
    }

    pub(crate) fn request_yield(&mut self) {
        self.yield_requested = true;
    }

    pub(crate) fn vocabulary(&self) -> Option<&'a dyn Vocabulary> {
        self.vocabulary
    }

    pub(crate) fn program_arg(&self, name: &str) -> Option<&'a str> {
        self.program_args
            .and_then(|args| args.get(name))
            .map(String::as_str)
    }

    pub(crate) fn limit_value(&self) -> usize {
        self.limit.value()
    }

    pub(crate) fn writer(&self) -> &OutputWriter {
        self.nested.last().unwrap_or(&self.base)
    }

    /// Runs `action` against the active writer with the run's format and
    /// size limit.
    pub(crate) fn with_output<F, R>(&mut self, action: F) -> Result<R, ErrorKind>
    where
        F: FnOnce(&mut OutputWriter, &mut OutputContext<'_>) -> Result<R, ErrorKind>,
    {
        let writer = match self.nested.last_mut() {
            Some(writer) => writer,
            None => &mut self.base,
        };
        let mut ctx = OutputContext {
            format: self.format,
            limit: &mut self.limit,
        };
        action(writer, &mut ctx)
    }

    pub(crate) fn writer_mut(&mut self) -> &mut OutputWriter {
        match self.nested.last_mut() {
            Some(writer) => writer,
            None => &mut self.base,
        }
    }

    pub(crate) fn print(&mut self, text: &str) -> Result<(), ErrorKind> {
        self.with_output(|writer, ctx| writer.print(text, ctx))
    }

    pub(crate) fn print_number(&mut self, number: f64) -> Result<(), ErrorKind> {
        self.with_output(|writer, ctx| writer.print_number(number, ctx))
    }

    pub(crate) fn print_space(&mut self) -> Result<(), ErrorKind> {
        let format = self.format;
        self.print(&format.space)
    }

    pub(crate) fn print_article(&mut self) -> Result<(), ErrorKind> {
        self.with_output(|writer, ctx| writer.print_article(ctx))
    }

    /// Starts a nested evaluation whose output is read back with
    /// [`pop_writer`](Self::pop_writer).
    pub(crate) fn push_writer(&mut self) {
        self.nested.push(OutputWriter::new());
    }

    /// Ends the innermost nested evaluation and returns its `main` text.
    /// The characters it printed are released from the size limit.
    pub(crate) fn pop_writer(&mut self) -> String {
        match self.nested.pop() {
            Some(writer) => {
                self.limit.release(writer.charged());
                writer.main_text()
            }
            None => String::new(),
        }
    }
}

/// Lazy sequence of outputs from one run, split at yield points.
///
/// State (RNG, variables, the frame stack) carries over between items. The
/// sequence ends after the pattern finishes or after the first error.
pub struct RunSerial<'a> {
    sandbox: Sandbox<'a>,
    root: Option<NodeRef>,
    finished: bool,
}

impl Iterator for RunSerial<'_> {
    type Item = Result<RunOutput, RuntimeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if let Some(root) = self.root.take() {
            if let Err(e) = self.sandbox.push_frame(root) {
                self.finished = true;
                return Some(Err(e));
            }
        }
        match self.sandbox.execute(true) {
            Ok(Some(segment)) => Some(Ok(segment)),
            Ok(None) => {
                self.finished = true;
                debug!("serial run finished");
                if self.sandbox.writer().is_empty() {
                    None
                } else {
                    Some(Ok(self.sandbox.take_segment()))
                }
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

impl FusedIterator for RunSerial<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::build::{choice, func, seq, text};
    use crate::schema::builtin::Builtin;

    fn run(root: &NodeRef, config: &EngineConfig, seed: u64) -> Result<RunOutput, RuntimeError> {
        let mut globals = Globals::default();
        Sandbox::new(config, &mut globals, seed).run(root)
    }

    #[test]
    fn prints_sequence() {
        let root = seq([text("Hello"), text(", "), text("world")]);
        let out = run(&root, &EngineConfig::default(), 1).unwrap();
        assert_eq!(out.main(), "Hello, world");
        assert_eq!(out.seed, 1);
    }

    #[test]
    fn depth_limit_is_enforced() {
        let mut node = text("deep");
        for _ in 0..10 {
            node = seq([node]);
        }
        let config = EngineConfig {
            max_stack_depth: 5,
            ..EngineConfig::default()
        };
        let err = run(&node, &config, 0).unwrap_err();
        assert_eq!(err.kind, ErrorKind::StackOverflow(5));
    }

    #[test]
    fn nested_writer_text_is_isolated_and_refunded() {
        let config = EngineConfig::default();
        let mut globals = Globals::default();
        let mut sb = Sandbox::new(&config, &mut globals, 0);
        sb.print("outer").unwrap();
        sb.push_writer();
        sb.print("inner").unwrap();
        assert_eq!(sb.limit_value(), 10);
        assert_eq!(sb.pop_writer(), "inner");
        assert_eq!(sb.limit_value(), 5);
        assert_eq!(sb.writer().main_text(), "outer");
    }

    #[test]
    fn serial_run_splits_at_yields() {
        let root = seq([
            text("one"),
            func(Builtin::Yield, []),
            text("two"),
            func(Builtin::Yield, []),
            choice(&["three"]),
        ]);
        let config = EngineConfig::default();
        let mut globals = Globals::default();
        let parts: Vec<String> = Sandbox::new(&config, &mut globals, 3)
            .run_serial(&root)
            .map(|r| r.unwrap().main().to_string())
            .collect();
        assert_eq!(parts, ["one", "two", "three"]);
    }

    #[test]
    fn single_shot_ignores_yields() {
        let root = seq([text("a"), func(Builtin::Yield, []), text("b")]);
        let out = run(&root, &EngineConfig::default(), 0).unwrap();
        assert_eq!(out.main(), "ab");
    }

    #[test]
    fn replacer_match_groups() {
        let m = ReplacerMatch {
            start: 0,
            end: 3,
            groups: vec![Some("cat".into()), Some("c".into()), None],
            named: vec![("tail".into(), "at".into())],
        };
        assert_eq!(m.text(), "cat");
        assert_eq!(m.group("1"), "c");
        assert_eq!(m.group("2"), "");
        assert_eq!(m.group("tail"), "at");
        assert_eq!(m.group("nope"), "");
    }
}
