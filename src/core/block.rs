/// Block attributes, their persistence layers, and per-iteration block state.
///
/// Attribute functions write to the *current* attribute set; the next block
/// to run takes it. How long taken attributes survive is decided by their
/// persistence mode, modelled as a stack of layers pushed on block entry and
/// popped on block exit.

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::mem;
use std::sync::Arc;
use strum::{Display, EnumString};

use crate::core::cursor::Step;
use crate::core::error::ErrorKind;
use crate::core::sandbox::Sandbox;
use crate::schema::node::{Block, NodeRef, Weight};

/// How many times a block runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reps {
    Fixed(u32),
    /// Once per item.
    Each,
}

impl Reps {
    pub fn count(self, items: usize) -> usize {
        match self {
            Reps::Fixed(n) => n as usize,
            Reps::Each => items,
        }
    }
}

/// Lifetime of attributes once a block has taken them.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, EnumString, Display,
)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum AttribPersistence {
    /// Consumed by the next block.
    #[default]
    Off,
    /// Same as `Off`.
    On,
    /// Survive for exactly one more block.
    Once,
    /// Restored after the block finishes.
    Outer,
    /// Used inside the block as well, and restored after it.
    OuterShared,
    /// Used by every block one level down, consumed afterwards.
    Inner,
    /// Used by every descendant block, consumed afterwards.
    InnerShared,
    /// Frozen until the persistence mode changes.
    ReadOnly,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockAttribs {
    pub reps: Reps,
    /// Percent chance the block runs at all.
    pub chance: f64,
    /// Item chosen on the first iteration.
    pub start_index: Option<usize>,
    pub series: bool,
    pub separator: Option<NodeRef>,
    /// Printed before the conjunction of a series longer than two.
    pub end_separator: Option<NodeRef>,
    pub conjunction: Option<NodeRef>,
    pub start: Option<NodeRef>,
    pub end: Option<NodeRef>,
    pub before: Option<NodeRef>,
    pub after: Option<NodeRef>,
    pub sync: Option<String>,
    pub persistence: AttribPersistence,
}

impl Default for BlockAttribs {
    fn default() -> Self {
        Self {
            reps: Reps::Fixed(1),
            chance: 100.0,
            start_index: None,
            series: false,
            separator: None,
            end_separator: None,
            conjunction: None,
            start: None,
            end: None,
            before: None,
            after: None,
            sync: None,
            persistence: AttribPersistence::Off,
        }
    }
}

impl BlockAttribs {
    pub fn set_chance(&mut self, chance: f64) {
        self.chance = if chance.is_nan() {
            0.0
        } else {
            chance.clamp(0.0, 100.0)
        };
    }

    fn with_persistence(&self, persistence: AttribPersistence) -> Self {
        Self {
            persistence,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Layer {
    current: BlockAttribs,
    /// Installed as `current` when the block this layer spawned exits.
    after: Option<BlockAttribs>,
}

/// Stack of attribute layers, one per block currently running plus the
/// top level.
#[derive(Debug, Clone)]
pub struct AttribManager {
    layers: Vec<Layer>,
}

impl Default for AttribManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AttribManager {
    pub fn new() -> Self {
        Self {
            layers: vec![Layer::default()],
        }
    }

    fn top(&mut self) -> &mut Layer {
        if self.layers.is_empty() {
            self.layers.push(Layer::default());
        }
        let last = self.layers.len() - 1;
        &mut self.layers[last]
    }

    pub fn current(&self) -> Option<&BlockAttribs> {
        self.layers.last().map(|layer| &layer.current)
    }

    /// Edits the current attributes unless they are read-only.
    pub fn update<F>(&mut self, edit: F)
    where
        F: FnOnce(&mut BlockAttribs),
    {
        let current = &mut self.top().current;
        if current.persistence != AttribPersistence::ReadOnly {
            edit(current);
        }
    }

    /// Always allowed, so read-only attributes can be released.
    pub fn set_persistence(&mut self, persistence: AttribPersistence) {
        self.top().current.persistence = persistence;
    }

    /// Takes the current attributes for a block about to run and pushes the
    /// layer its children will see.
    pub fn take(&mut self) -> BlockAttribs {
        let top = self.top();
        let attribs = mem::take(&mut top.current);
        let (inside, after) = match attribs.persistence {
            AttribPersistence::Off | AttribPersistence::On => (BlockAttribs::default(), None),
            AttribPersistence::Once => (
                BlockAttribs::default(),
                Some(attribs.with_persistence(AttribPersistence::Off)),
            ),
            AttribPersistence::Outer => (BlockAttribs::default(), Some(attribs.clone())),
            AttribPersistence::OuterShared | AttribPersistence::ReadOnly => {
                (attribs.clone(), Some(attribs.clone()))
            }
            AttribPersistence::Inner => (attribs.with_persistence(AttribPersistence::Outer), None),
            AttribPersistence::InnerShared => (
                attribs.with_persistence(AttribPersistence::OuterShared),
                None,
            ),
        };
        top.after = after;
        self.layers.push(Layer {
            current: inside,
            after: None,
        });
        attribs
    }

    /// Pops the layer pushed by [`take`](Self::take) and restores whatever
    /// the taken attributes leave behind.
    pub fn exit(&mut self) {
        if self.layers.len() > 1 {
            self.layers.pop();
        }
        let top = self.top();
        if let Some(after) = top.after.take() {
            top.current = after;
        }
    }

    pub fn depth(&self) -> usize {
        self.layers.len() - 1
    }
}

/// Position of a running block, read by the block query functions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockState {
    /// Total iterations the block will run.
    pub count: usize,
    /// 1-based; zero before the first item.
    pub iteration: usize,
    /// Item chosen for the current iteration.
    pub index: usize,
}

impl BlockState {
    pub fn new(count: usize) -> Self {
        Self {
            count,
            iteration: 0,
            index: 0,
        }
    }

    pub fn next(&mut self, index: usize) {
        self.iteration += 1;
        self.index = index;
    }

    pub fn is_first(&self) -> bool {
        self.iteration == 1
    }

    pub fn is_last(&self) -> bool {
        self.iteration == self.count
    }

    pub fn is_middle(&self) -> bool {
        !self.is_first() && !self.is_last()
    }

    pub fn remaining(&self) -> usize {
        self.count.saturating_sub(self.iteration)
    }

    /// True when `iteration - offset` is a multiple of `interval`.
    pub fn is_nth(&self, interval: i64, offset: i64) -> bool {
        interval != 0 && (self.iteration as i64 - offset).rem_euclid(interval) == 0
    }
}

#[derive(Debug)]
enum BlockOp {
    Run(NodeRef),
    Space,
    PushState,
    PopState,
    EnterScope,
    ExitScope,
}

#[derive(Debug, Clone, Copy, Default)]
enum BlockPhase {
    #[default]
    Start,
    /// Evaluating dynamic weights, item `next` onwards.
    Weights { next: usize, awaiting: bool },
    Iterate,
    Finish,
    Done,
}

/// Execution state of one block invocation.
#[derive(Debug, Default)]
pub(crate) struct BlockCursor {
    phase: BlockPhase,
    attribs: BlockAttribs,
    reps: usize,
    state: BlockState,
    weights: Vec<f64>,
    distribution: Option<WeightedIndex<f64>>,
    queue: VecDeque<BlockOp>,
}

impl BlockCursor {
    pub(crate) fn resume(&mut self, sb: &mut Sandbox<'_>, block: &Block) -> Result<Step, ErrorKind> {
        loop {
            if let Some(op) = self.queue.pop_front() {
                match op {
                    BlockOp::Run(node) => return Ok(Step::Child(node)),
                    BlockOp::Space => sb.print_space()?,
                    BlockOp::PushState => sb.blocks.push(self.state),
                    BlockOp::PopState => {
                        sb.blocks.pop();
                    }
                    BlockOp::EnterScope => sb.objects.enter_scope(),
                    BlockOp::ExitScope => sb.objects.exit_scope(),
                }
                continue;
            }
            match self.phase {
                BlockPhase::Start => self.start(sb, block)?,
                BlockPhase::Weights { next, awaiting } => {
                    if let Some(node) = self.weigh(sb, block, next, awaiting)? {
                        return Ok(Step::Child(node));
                    }
                }
                BlockPhase::Iterate => self.iterate(sb, block)?,
                BlockPhase::Finish => {
                    sb.attribs.exit();
                    self.phase = BlockPhase::Done;
                    return Ok(Step::Done);
                }
                BlockPhase::Done => return Ok(Step::Done),
            }
        }
    }

    fn start(&mut self, sb: &mut Sandbox<'_>, block: &Block) -> Result<(), ErrorKind> {
        self.attribs = sb.attribs.take();
        self.phase = BlockPhase::Finish;
        let chance = (self.attribs.chance / 100.0).clamp(0.0, 1.0);
        if chance < 1.0 && !sb.rng.gen_bool(chance) {
            return Ok(());
        }
        if block.is_empty() {
            return Ok(());
        }
        self.reps = self.attribs.reps.count(block.len());
        if let Some(start) = &self.attribs.start {
            self.queue.push_back(BlockOp::Run(Arc::clone(start)));
        }
        if block.is_weighted() && self.attribs.sync.is_none() {
            self.weights = block
                .items
                .iter()
                .map(|item| match item.weight {
                    Some(Weight::Constant(w)) if w.is_finite() => w.max(0.0),
                    Some(Weight::Constant(_)) => 0.0,
                    _ => 1.0,
                })
                .collect();
            if block.has_dynamic_weights() {
                self.phase = BlockPhase::Weights {
                    next: 0,
                    awaiting: false,
                };
                return Ok(());
            }
        }
        self.begin(sb, block.len())
    }

    fn weigh(
        &mut self,
        sb: &mut Sandbox<'_>,
        block: &Block,
        mut next: usize,
        awaiting: bool,
    ) -> Result<Option<NodeRef>, ErrorKind> {
        if awaiting {
            let text = sb.pop_writer();
            self.weights[next] = parse_weight(&text)?;
            next += 1;
        }
        while let Some(item) = block.items.get(next) {
            if let Some(Weight::Dynamic(node)) = &item.weight {
                sb.push_writer();
                self.phase = BlockPhase::Weights {
                    next,
                    awaiting: true,
                };
                return Ok(Some(Arc::clone(node)));
            }
            next += 1;
        }
        self.begin(sb, block.len())?;
        Ok(None)
    }

    /// Settles the selection strategy and starts iterating.
    fn begin(&mut self, sb: &mut Sandbox<'_>, count: usize) -> Result<(), ErrorKind> {
        if let Some(name) = &self.attribs.sync {
            let sync = sb
                .syncs
                .get_mut(name)
                .ok_or_else(|| ErrorKind::UndefinedSynchronizer(name.clone()))?;
            sync.resize(count);
            if let (0, Some(start)) = (sync.index(), self.attribs.start_index) {
                sync.set_index(start.min(count.saturating_sub(1)));
            }
        }
        if !self.weights.is_empty() {
            match WeightedIndex::new(&self.weights) {
                Ok(distribution) => self.distribution = Some(distribution),
                // all weights zero
                Err(_) => self.reps = 0,
            }
        }
        self.state = BlockState::new(self.reps);
        self.phase = BlockPhase::Iterate;
        Ok(())
    }

    fn select(&self, sb: &mut Sandbox<'_>, count: usize) -> Result<usize, ErrorKind> {
        if let (0, None, Some(start)) = (
            self.state.iteration,
            &self.attribs.sync,
            self.attribs.start_index,
        ) {
            return Ok(start.min(count - 1));
        }
        if let Some(name) = &self.attribs.sync {
            return sb
                .syncs
                .get_mut(name)
                .map(|sync| sync.next_item(count))
                .ok_or_else(|| ErrorKind::UndefinedSynchronizer(name.clone()));
        }
        Ok(match &self.distribution {
            Some(distribution) => distribution.sample(&mut sb.rng),
            None => sb.rng.gen_range(0..count),
        })
    }

    fn iterate(&mut self, sb: &mut Sandbox<'_>, block: &Block) -> Result<(), ErrorKind> {
        let i = self.state.iteration;
        if i >= self.reps {
            if let Some(end) = &self.attribs.end {
                self.queue.push_back(BlockOp::Run(Arc::clone(end)));
            }
            self.phase = BlockPhase::Finish;
            return Ok(());
        }
        let index = self.select(sb, block.len())?;
        self.state.next(index);

        if let (true, Some(separator)) = (i > 0, &self.attribs.separator) {
            if !self.attribs.series {
                self.queue.push_back(BlockOp::Run(Arc::clone(separator)));
            } else if i == self.reps - 1 {
                if let (true, Some(end_separator)) = (self.reps > 2, &self.attribs.end_separator) {
                    self.queue.push_back(BlockOp::Run(Arc::clone(end_separator)));
                }
                self.queue.push_back(BlockOp::Space);
                if let Some(conjunction) = &self.attribs.conjunction {
                    self.queue.push_back(BlockOp::Run(Arc::clone(conjunction)));
                    self.queue.push_back(BlockOp::Space);
                }
            } else if self.reps > 2 {
                self.queue.push_back(BlockOp::Run(Arc::clone(separator)));
                self.queue.push_back(BlockOp::Space);
            }
        }

        self.queue.push_back(BlockOp::PushState);
        if let Some(before) = &self.attribs.before {
            self.queue.push_back(BlockOp::Run(Arc::clone(before)));
        }
        self.queue.push_back(BlockOp::EnterScope);
        self.queue
            .push_back(BlockOp::Run(Arc::clone(&block.items[index].body)));
        self.queue.push_back(BlockOp::ExitScope);
        if let Some(after) = &self.attribs.after {
            self.queue.push_back(BlockOp::Run(Arc::clone(after)));
        }
        self.queue.push_back(BlockOp::PopState);
        Ok(())
    }
}

/// Parses the output of a dynamic weight. Empty output weighs zero.
fn parse_weight(text: &str) -> Result<f64, ErrorKind> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(0.0);
    }
    match trimmed.parse::<f64>() {
        Ok(w) if w.is_finite() && w >= 0.0 => Ok(w),
        _ => Err(ErrorKind::InvalidWeight(text.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::EngineConfig;
    use crate::core::scope::Globals;
    use crate::schema::build::{block, block_items, choice, func, seq, text, weighted};
    use crate::schema::builtin::Builtin;
    use crate::schema::node::BlockItem;
    use rstest::rstest;

    fn run(root: NodeRef, seed: u64) -> Result<String, ErrorKind> {
        let config = EngineConfig::default();
        let mut globals = Globals::default();
        Sandbox::new(&config, &mut globals, seed)
            .run(&root)
            .map(|out| out.main().to_string())
            .map_err(|e| e.kind)
    }

    fn with_reps(manager: &mut AttribManager, n: u32, persistence: AttribPersistence) {
        manager.update(|a| a.reps = Reps::Fixed(n));
        manager.set_persistence(persistence);
    }

    fn reps_of(attribs: &BlockAttribs) -> Reps {
        attribs.reps
    }

    #[test]
    fn off_is_consumed_by_next_block() {
        let mut m = AttribManager::new();
        with_reps(&mut m, 3, AttribPersistence::Off);
        assert_eq!(reps_of(&m.take()), Reps::Fixed(3));
        m.exit();
        assert_eq!(reps_of(&m.take()), Reps::Fixed(1));
    }

    #[test]
    fn once_survives_one_more_block() {
        let mut m = AttribManager::new();
        with_reps(&mut m, 3, AttribPersistence::Once);
        assert_eq!(reps_of(&m.take()), Reps::Fixed(3));
        m.exit();
        assert_eq!(reps_of(&m.take()), Reps::Fixed(3));
        m.exit();
        assert_eq!(reps_of(&m.take()), Reps::Fixed(1));
    }

    #[test]
    fn outer_restores_after_but_not_inside() {
        let mut m = AttribManager::new();
        with_reps(&mut m, 4, AttribPersistence::Outer);
        assert_eq!(reps_of(&m.take()), Reps::Fixed(4));
        assert_eq!(reps_of(&m.take()), Reps::Fixed(1));
        m.exit();
        m.exit();
        assert_eq!(reps_of(&m.take()), Reps::Fixed(4));
    }

    #[test]
    fn outer_shared_reaches_children() {
        let mut m = AttribManager::new();
        with_reps(&mut m, 2, AttribPersistence::OuterShared);
        m.take();
        assert_eq!(reps_of(&m.take()), Reps::Fixed(2));
        m.exit();
        assert_eq!(reps_of(&m.take()), Reps::Fixed(2));
    }

    #[test]
    fn inner_applies_one_level_down_only() {
        let mut m = AttribManager::new();
        with_reps(&mut m, 5, AttribPersistence::Inner);
        assert_eq!(reps_of(&m.take()), Reps::Fixed(5));
        // first child
        assert_eq!(reps_of(&m.take()), Reps::Fixed(5));
        assert_eq!(reps_of(&m.take()), Reps::Fixed(1));
        m.exit();
        m.exit();
        // sibling child
        assert_eq!(reps_of(&m.take()), Reps::Fixed(5));
        m.exit();
        m.exit();
        assert_eq!(reps_of(&m.take()), Reps::Fixed(1));
    }

    #[test]
    fn inner_shared_reaches_all_descendants() {
        let mut m = AttribManager::new();
        with_reps(&mut m, 6, AttribPersistence::InnerShared);
        m.take();
        m.take();
        assert_eq!(reps_of(&m.take()), Reps::Fixed(6));
        m.exit();
        m.exit();
        m.exit();
        assert_eq!(reps_of(&m.take()), Reps::Fixed(1));
    }

    #[test]
    fn read_only_ignores_setters_until_released() {
        let mut m = AttribManager::new();
        with_reps(&mut m, 2, AttribPersistence::ReadOnly);
        m.update(|a| a.reps = Reps::Fixed(9));
        assert_eq!(reps_of(m.current().unwrap()), Reps::Fixed(2));
        m.take();
        m.exit();
        assert_eq!(reps_of(m.current().unwrap()), Reps::Fixed(2));
        m.set_persistence(AttribPersistence::Off);
        m.update(|a| a.reps = Reps::Fixed(9));
        assert_eq!(reps_of(m.current().unwrap()), Reps::Fixed(9));
    }

    #[test]
    fn exit_at_top_level_is_harmless() {
        let mut m = AttribManager::new();
        m.exit();
        assert_eq!(m.depth(), 0);
        assert!(m.current().is_some());
    }

    #[rstest]
    #[case(-5.0, 0.0)]
    #[case(42.5, 42.5)]
    #[case(250.0, 100.0)]
    #[case(f64::NAN, 0.0)]
    fn chance_is_clamped(#[case] input: f64, #[case] expected: f64) {
        let mut attribs = BlockAttribs::default();
        attribs.set_chance(input);
        assert_eq!(attribs.chance, expected);
    }

    #[rstest]
    #[case("outer-shared", AttribPersistence::OuterShared)]
    #[case("ONCE", AttribPersistence::Once)]
    #[case("read-only", AttribPersistence::ReadOnly)]
    fn persistence_parses(#[case] input: &str, #[case] expected: AttribPersistence) {
        assert_eq!(input.parse::<AttribPersistence>().unwrap(), expected);
    }

    #[test]
    fn block_state_positions() {
        let mut state = BlockState::new(4);
        state.next(2);
        assert!(state.is_first() && !state.is_last() && !state.is_middle());
        state.next(0);
        assert!(state.is_middle());
        assert_eq!(state.remaining(), 2);
        assert!(state.is_nth(2, 0));
        assert!(!state.is_nth(2, 1));
        state.next(1);
        state.next(3);
        assert!(state.is_last());
        assert!(!state.is_nth(0, 0));
        assert_eq!(Reps::Each.count(7), 7);
    }

    fn rep(n: &str) -> NodeRef {
        func(Builtin::Rep, [text(n)])
    }

    #[test]
    fn plain_separator_between_items() {
        let root = seq([rep("3"), func(Builtin::Sep, [text("-")]), choice(&["x"])]);
        assert_eq!(run(root, 1).unwrap(), "x-x-x");
    }

    #[rstest]
    #[case(4, false, "X, X, X and X")]
    #[case(4, true, "X, X, X, and X")]
    #[case(2, false, "X and X")]
    #[case(2, true, "X and X")]
    #[case(1, true, "X")]
    fn series_formatting(#[case] reps: u32, #[case] oxford: bool, #[case] expected: &str) {
        let series = if oxford {
            func(Builtin::SeriesOxford, [text(","), text(","), text("and")])
        } else {
            func(Builtin::Series, [text(","), text("and")])
        };
        let root = seq([rep(&reps.to_string()), series, choice(&["X"])]);
        assert_eq!(run(root, 5).unwrap(), expected);
    }

    #[test]
    fn repeach_runs_once_per_item() {
        let root = seq([
            rep("each"),
            func(Builtin::Sync, [text("d"), text("deck")]),
            choice(&["a", "b", "c", "d"]),
        ]);
        let mut out: Vec<char> = run(root, 11).unwrap().chars().collect();
        out.sort_unstable();
        assert_eq!(out, ['a', 'b', 'c', 'd']);
    }

    #[test]
    fn locked_sync_repeats_choice() {
        let root = seq([
            rep("12"),
            func(Builtin::Sync, [text("l"), text("locked")]),
            choice(&["a", "b", "c", "d", "e"]),
        ]);
        let out = run(root, 2).unwrap();
        let first = out.chars().next().unwrap();
        assert!(out.chars().all(|c| c == first));
    }

    #[test]
    fn forward_sync_shared_across_blocks() {
        let root = seq([
            func(Builtin::Sync, [text("f"), text("forward")]),
            choice(&["a", "b", "c"]),
            func(Builtin::SyncUse, [text("f")]),
            choice(&["a", "b", "c"]),
            func(Builtin::SyncUse, [text("f")]),
            choice(&["a", "b", "c"]),
        ]);
        assert_eq!(run(root, 0).unwrap(), "abc");
    }

    #[test]
    fn start_index_picks_first_item() {
        let root = seq([
            rep("3"),
            func(Builtin::Init, [text("9")]),
            func(Builtin::Sync, [text("f"), text("forward")]),
            choice(&["a", "b", "c"]),
            func(Builtin::Init, [text("9")]),
            choice(&["z", "y"]),
        ]);
        assert_eq!(run(root, 0).unwrap(), "caby");
    }

    #[test]
    fn zero_chance_skips_block_and_hooks() {
        let root = seq([
            func(Builtin::Chance, [text("0")]),
            func(Builtin::Start, [text("<")]),
            choice(&["x"]),
            choice(&["y"]),
        ]);
        assert_eq!(run(root, 3).unwrap(), "y");
    }

    #[test]
    fn half_chance_runs_some_of_the_time() {
        let ran = (0..200)
            .filter(|&seed| {
                let root = seq([func(Builtin::Chance, [text("50")]), choice(&["x"])]);
                run(root, seed).unwrap() == "x"
            })
            .count();
        assert!((50..150).contains(&ran), "ran {ran} of 200");

        let root = seq([func(Builtin::Chance, [text("100")]), choice(&["x"])]);
        assert_eq!(run(root, 7).unwrap(), "x");
    }

    #[test]
    fn hooks_wrap_the_block_and_items() {
        let root = seq([
            rep("2"),
            func(Builtin::Start, [text("[")]),
            func(Builtin::End, [text("]")]),
            func(Builtin::Before, [text("(")]),
            func(Builtin::After, [text(")")]),
            choice(&["x"]),
        ]);
        assert_eq!(run(root, 3).unwrap(), "[(x)(x)]");
    }

    #[test]
    fn weight_phase_only_for_dynamic_weights() {
        let config = EngineConfig::default();
        let mut globals = Globals::default();
        let mut sb = Sandbox::new(&config, &mut globals, 1);
        let item = |weight| BlockItem {
            body: text("a"),
            weight: Some(weight),
        };

        let fixed = Block {
            items: vec![item(Weight::Constant(2.0)), item(Weight::Constant(1.0))],
        };
        let mut cursor = BlockCursor::default();
        cursor.start(&mut sb, &fixed).unwrap();
        assert!(matches!(cursor.phase, BlockPhase::Iterate));
        assert_eq!(cursor.weights, [2.0, 1.0]);

        let dynamic = Block {
            items: vec![item(Weight::Constant(1.0)), item(Weight::Dynamic(text("3")))],
        };
        let mut cursor = BlockCursor::default();
        cursor.start(&mut sb, &dynamic).unwrap();
        assert!(matches!(cursor.phase, BlockPhase::Weights { next: 0, .. }));
    }

    #[test]
    fn zero_weight_items_never_chosen() {
        let root = seq([
            rep("30"),
            weighted([(0.0, text("never")), (2.0, text("a")), (1.0, text("b"))]),
        ]);
        let out = run(root, 8).unwrap();
        assert!(!out.contains("never"));
        assert_eq!(out.len(), 30);
    }

    #[test]
    fn all_zero_weights_print_nothing() {
        let root = seq([
            func(Builtin::End, [text("end")]),
            weighted([(0.0, text("a")), (0.0, text("b"))]),
        ]);
        assert_eq!(run(root, 8).unwrap(), "end");
    }

    #[test]
    fn dynamic_weights_are_evaluated() {
        let root = seq([
            rep("10"),
            block_items(vec![
                BlockItem {
                    body: text("a"),
                    weight: Some(Weight::Dynamic(text(""))),
                },
                BlockItem {
                    body: text("b"),
                    weight: Some(Weight::Dynamic(text("3"))),
                },
            ]),
        ]);
        assert_eq!(run(root, 4).unwrap(), "bbbbbbbbbb");
    }

    #[test]
    fn non_numeric_dynamic_weight_fails() {
        let root = block_items(vec![BlockItem {
            body: text("a"),
            weight: Some(Weight::Dynamic(text("heavy"))),
        }]);
        assert_eq!(run(root, 4), Err(ErrorKind::InvalidWeight("heavy".into())));
    }

    #[test]
    fn block_state_visible_to_queries() {
        let root = seq([
            rep("3"),
            func(Builtin::Sep, [text(",")]),
            block([seq([
                func(Builtin::RepNum, []),
                func(Builtin::Last, [text("!")]),
            ])]),
        ]);
        assert_eq!(run(root, 0).unwrap(), "1,2,3!");
    }

    #[test]
    fn missing_sync_is_an_error() {
        let root = seq([func(Builtin::SyncUse, [text("ghost")]), choice(&["a"])]);
        assert_eq!(
            run(root, 0),
            Err(ErrorKind::UndefinedSynchronizer("ghost".into()))
        );
    }

    #[test]
    fn same_seed_same_output() {
        let root = seq([rep("20"), choice(&["a", "b", "c", "d"])]);
        assert_eq!(run(root.clone(), 77).unwrap(), run(root, 77).unwrap());
    }

    #[test]
    fn parse_weight_rules() {
        assert_eq!(parse_weight(" "), Ok(0.0));
        assert_eq!(parse_weight("2.5"), Ok(2.5));
        assert!(parse_weight("-1").is_err());
    }
}
