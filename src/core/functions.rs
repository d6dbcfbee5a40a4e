/// Built-in function calls.
///
/// A function frame first evaluates its text and number arguments as nested
/// evaluations, then invokes the built-in. Invocation applies immediate side
/// effects and returns a queue of follow-up operations: sub-patterns to run
/// and effects to apply once they have finished (closing a channel, closing a
/// quote, merging an RNG branch).

use rand::{Rng, RngCore};
use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::Arc;

use crate::core::block::{AttribPersistence, BlockState, Reps};
use crate::core::cursor::Step;
use crate::core::error::ErrorKind;
use crate::core::format::{Capitalization, Format, NumberFormat};
use crate::core::output::{ChannelVisibility, TargetKey};
use crate::core::sandbox::{Argument, CallArgs, Sandbox};
use crate::core::scope::{parse_bool, Value};
use crate::core::sync::{name_hash, SyncType};
use crate::schema::builtin::{Builtin, ParamKind};
use crate::schema::node::{Node, NodeKind, NodeRef};

#[derive(Debug, Clone)]
enum Arg {
    Pattern(NodeRef),
    Text(String),
}

#[derive(Debug)]
enum Effect {
    CloseChannel,
    CloseQuote,
    MergeRng,
    RestoreNumberFormat(NumberFormat),
    RestoreArgs(CallArgs),
}

#[derive(Debug)]
enum Op {
    Run(NodeRef),
    Effect(Effect),
}

#[derive(Debug, Default)]
pub(crate) struct FunctionCursor {
    args: Vec<Arg>,
    awaiting: bool,
    ops: Option<VecDeque<Op>>,
}

impl FunctionCursor {
    pub(crate) fn resume(
        &mut self,
        sb: &mut Sandbox<'_>,
        func: Builtin,
        nodes: &[NodeRef],
    ) -> Result<Step, ErrorKind> {
        if self.ops.is_none() {
            let signature = func.signature();
            if self.args.is_empty() && !self.awaiting && !signature.accepts(nodes.len()) {
                return Err(ErrorKind::ArgumentCountMismatch {
                    name: func.name().to_string(),
                    got: nodes.len(),
                });
            }
            if self.awaiting {
                self.awaiting = false;
                self.args.push(Arg::Text(sb.pop_writer()));
            }
            while let Some(node) = nodes.get(self.args.len()) {
                match signature.kind_of(self.args.len()) {
                    ParamKind::Pattern => self.args.push(Arg::Pattern(Arc::clone(node))),
                    ParamKind::Text | ParamKind::Number => {
                        sb.push_writer();
                        self.awaiting = true;
                        return Ok(Step::Child(Arc::clone(node)));
                    }
                }
            }
            self.ops = Some(invoke(sb, func, &Args(&self.args))?);
        }
        while let Some(op) = self.ops.as_mut().and_then(VecDeque::pop_front) {
            match op {
                Op::Run(node) => return Ok(Step::Child(node)),
                Op::Effect(effect) => apply(sb, effect)?,
            }
        }
        Ok(Step::Done)
    }
}

struct Args<'a>(&'a [Arg]);

impl Args<'_> {
    fn text(&self, i: usize) -> &str {
        match self.0.get(i) {
            Some(Arg::Text(text)) => text,
            _ => "",
        }
    }

    fn number(&self, i: usize) -> Result<f64, ErrorKind> {
        let text = self.text(i);
        text.trim().parse().map_err(|_| ErrorKind::InvalidOperand {
            expected: "number",
            value: text.to_string(),
        })
    }

    fn pattern(&self, i: usize) -> NodeRef {
        match self.0.get(i) {
            Some(Arg::Pattern(node)) => Arc::clone(node),
            Some(Arg::Text(text)) => Arc::new(Node::new(NodeKind::Text(text.clone()))),
            None => Arc::new(Node::new(NodeKind::Sequence(Vec::new()))),
        }
    }
}

fn parse_mode<T: FromStr>(kind: &'static str, value: &str) -> Result<T, ErrorKind> {
    value.trim().parse().map_err(|_| ErrorKind::UnknownMode {
        kind,
        value: value.to_string(),
    })
}

fn parse_reps(value: &str) -> Result<Reps, ErrorKind> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("each") {
        return Ok(Reps::Each);
    }
    value
        .parse()
        .map(Reps::Fixed)
        .map_err(|_| ErrorKind::InvalidOperand {
            expected: "repetition count",
            value: value.to_string(),
        })
}

/// Runs `body` when the innermost block state satisfies `test`.
fn when_block(sb: &Sandbox<'_>, body: NodeRef, test: impl Fn(&BlockState) -> bool) -> VecDeque<Op> {
    let mut ops = VecDeque::new();
    if sb.blocks.last().is_some_and(test) {
        ops.push_back(Op::Run(body));
    }
    ops
}

fn print_block_number(sb: &mut Sandbox<'_>, read: impl Fn(&BlockState) -> usize) -> Result<(), ErrorKind> {
    match sb.blocks.last().map(read) {
        Some(n) => sb.print_number(n as f64),
        None => Ok(()),
    }
}

fn print_value(sb: &mut Sandbox<'_>, value: Value) -> Result<(), ErrorKind> {
    match value {
        Value::Number(n) => sb.print_number(n),
        other => sb.print(&other.to_string()),
    }
}

fn invoke(sb: &mut Sandbox<'_>, func: Builtin, args: &Args<'_>) -> Result<VecDeque<Op>, ErrorKind> {
    let mut ops = VecDeque::new();
    match func {
        Builtin::Rep => {
            let reps = parse_reps(args.text(0))?;
            sb.attribs.update(|a| a.reps = reps);
        }
        Builtin::Sep => {
            let separator = args.pattern(0);
            sb.attribs.update(|a| {
                a.separator = Some(separator);
                a.series = false;
            });
        }
        Builtin::Series => {
            let (separator, conjunction) = (args.pattern(0), args.pattern(1));
            sb.attribs.update(|a| {
                a.separator = Some(separator);
                a.end_separator = None;
                a.conjunction = Some(conjunction);
                a.series = true;
            });
        }
        Builtin::SeriesOxford => {
            let (separator, end_separator, conjunction) =
                (args.pattern(0), args.pattern(1), args.pattern(2));
            sb.attribs.update(|a| {
                a.separator = Some(separator);
                a.end_separator = Some(end_separator);
                a.conjunction = Some(conjunction);
                a.series = true;
            });
        }
        Builtin::RepSep => {
            let reps = parse_reps(args.text(0))?;
            let separator = args.pattern(1);
            sb.attribs.update(|a| {
                a.reps = reps;
                a.separator = Some(separator);
            });
        }
        Builtin::Before => {
            let node = args.pattern(0);
            sb.attribs.update(|a| a.before = Some(node));
        }
        Builtin::After => {
            let node = args.pattern(0);
            sb.attribs.update(|a| a.after = Some(node));
        }
        Builtin::Start => {
            let node = args.pattern(0);
            sb.attribs.update(|a| a.start = Some(node));
        }
        Builtin::End => {
            let node = args.pattern(0);
            sb.attribs.update(|a| a.end = Some(node));
        }
        Builtin::Chance => {
            let chance = args.number(0)?;
            sb.attribs.update(|a| a.set_chance(chance));
        }
        Builtin::Init => {
            let index = args.number(0)?;
            sb.attribs
                .update(|a| a.start_index = (index >= 0.0).then_some(index as usize));
        }
        Builtin::Persist => {
            let persistence: AttribPersistence = parse_mode("persistence", args.text(0))?;
            sb.attribs.set_persistence(persistence);
        }
        Builtin::Sync => {
            let name = args.text(0).to_string();
            let kind: SyncType = parse_mode("synchronizer type", args.text(1))?;
            let seed = sb.rng.next_u64();
            sb.syncs.create(&name, kind, seed);
            sb.attribs.update(|a| a.sync = Some(name));
        }
        Builtin::SyncUse => {
            let name = args.text(0).to_string();
            if !sb.syncs.contains(&name) {
                return Err(ErrorKind::UndefinedSynchronizer(name));
            }
            sb.attribs.update(|a| a.sync = Some(name));
        }
        Builtin::SyncPin => sb.syncs.set_pinned(args.text(0), true),
        Builtin::SyncUnpin => sb.syncs.set_pinned(args.text(0), false),
        Builtin::SyncStep => {
            if !sb.syncs.step(args.text(0)) {
                return Err(ErrorKind::UndefinedSynchronizer(args.text(0).to_string()));
            }
        }
        Builtin::SyncReset => {
            if !sb.syncs.reset(args.text(0)) {
                return Err(ErrorKind::UndefinedSynchronizer(args.text(0).to_string()));
            }
        }
        Builtin::Case => {
            let caps: Capitalization = parse_mode("capitalization", args.text(0))?;
            sb.writer_mut().capitalize(caps);
        }
        Builtin::CapsInfer => {
            let caps = infer_caps(args.text(0), sb.format);
            sb.writer_mut().capitalize(caps);
        }
        Builtin::NumFmt => {
            let format: NumberFormat = parse_mode("number format", args.text(0))?;
            sb.writer_mut().set_number_format(format);
        }
        Builtin::NumFmtScoped => {
            let format: NumberFormat = parse_mode("number format", args.text(0))?;
            let previous = sb.writer().number_format();
            sb.writer_mut().set_number_format(format);
            ops.push_back(Op::Run(args.pattern(1)));
            ops.push_back(Op::Effect(Effect::RestoreNumberFormat(previous)));
        }
        Builtin::Quote => {
            let format = sb.format;
            sb.print(format.open_quote_for(sb.quote_level))?;
            sb.quote_level += 1;
            ops.push_back(Op::Run(args.pattern(0)));
            ops.push_back(Op::Effect(Effect::CloseQuote));
        }
        Builtin::RepNum => print_block_number(sb, |s| s.iteration)?,
        Builtin::RepIndex => print_block_number(sb, |s| s.iteration.saturating_sub(1))?,
        Builtin::RepCount => print_block_number(sb, |s| s.count)?,
        Builtin::RepRem => print_block_number(sb, BlockState::remaining)?,
        Builtin::ItemIndex => print_block_number(sb, |s| s.index)?,
        Builtin::Depth => {
            let depth = sb.blocks.len();
            sb.print_number(depth as f64)?;
        }
        Builtin::First => return Ok(when_block(sb, args.pattern(0), BlockState::is_first)),
        Builtin::NotFirst => return Ok(when_block(sb, args.pattern(0), |s| !s.is_first())),
        Builtin::Last => return Ok(when_block(sb, args.pattern(0), BlockState::is_last)),
        Builtin::NotLast => return Ok(when_block(sb, args.pattern(0), |s| !s.is_last())),
        Builtin::Middle => return Ok(when_block(sb, args.pattern(0), BlockState::is_middle)),
        Builtin::Ends => {
            return Ok(when_block(sb, args.pattern(0), |s| {
                s.is_first() || s.is_last()
            }))
        }
        Builtin::Odd => return Ok(when_block(sb, args.pattern(0), |s| s.iteration % 2 == 1)),
        Builtin::Even => return Ok(when_block(sb, args.pattern(0), |s| s.iteration % 2 == 0)),
        Builtin::Nth => {
            let interval = args.number(0)? as i64;
            let offset = args.number(1)? as i64;
            if interval == 0 {
                return Err(ErrorKind::InvalidOperand {
                    expected: "non-zero interval",
                    value: args.text(0).to_string(),
                });
            }
            return Ok(when_block(sb, args.pattern(2), |s| s.is_nth(interval, offset)));
        }
        Builtin::Chan => {
            let visibility: ChannelVisibility = parse_mode("channel visibility", args.text(1))?;
            sb.writer_mut().open_channel(args.text(0), visibility);
            ops.push_back(Op::Run(args.pattern(2)));
            ops.push_back(Op::Effect(Effect::CloseChannel));
        }
        Builtin::Target => {
            sb.writer_mut()
                .insert_target(TargetKey::Named(args.text(0).to_string()));
        }
        Builtin::Send => {
            let key = TargetKey::Named(args.text(0).to_string());
            let value = args.text(1);
            sb.with_output(|writer, ctx| writer.print_to_target(&key, value, ctx))?;
        }
        Builtin::SendOver => {
            let key = TargetKey::Named(args.text(0).to_string());
            let value = args.text(1);
            sb.with_output(|writer, ctx| {
                writer.clear_target(&key, ctx)?;
                writer.print_to_target(&key, value, ctx)
            })?;
        }
        Builtin::TargetVal => {
            let value = sb
                .writer()
                .target_value(&TargetKey::Named(args.text(0).to_string()));
            sb.print(&value)?;
        }
        Builtin::ClearTarget => {
            let key = TargetKey::Named(args.text(0).to_string());
            sb.with_output(|writer, ctx| writer.clear_target(&key, ctx))?;
        }
        Builtin::Len => {
            let len = sb.writer().channel_len(args.text(0));
            sb.print_number(len as f64)?;
        }
        Builtin::Num => {
            let (a, b) = (args.number(0)?.round() as i64, args.number(1)?.round() as i64);
            let n = sb.rng.gen_range(a.min(b)..=a.max(b));
            sb.print_number(n as f64)?;
        }
        Builtin::VarSet => {
            sb.objects
                .set(args.text(0), Value::Text(args.text(1).to_string()));
        }
        Builtin::VarNum => {
            let n = args.number(1)?;
            sb.objects.set(args.text(0), Value::Number(n));
        }
        Builtin::VarList => {
            let items = args.0[1..]
                .iter()
                .map(|arg| match arg {
                    Arg::Text(text) => Value::Text(text.clone()),
                    Arg::Pattern(_) => Value::Text(String::new()),
                })
                .collect();
            sb.objects.set(args.text(0), Value::List(items));
        }
        Builtin::VarGet => {
            let name = args.text(0);
            let value = sb
                .objects
                .get(name)
                .cloned()
                .ok_or_else(|| ErrorKind::UndefinedVariable(name.to_string()))?;
            print_value(sb, value)?;
        }
        Builtin::VarDelete => {
            if !sb.objects.remove(args.text(0)) {
                return Err(ErrorKind::UndefinedVariable(args.text(0).to_string()));
            }
        }
        Builtin::ListItem => {
            let name = args.text(0);
            let index = args.number(1)? as i64;
            let item = match sb.objects.get(name) {
                None => return Err(ErrorKind::UndefinedVariable(name.to_string())),
                Some(Value::List(items)) => {
                    let len = items.len();
                    let resolved = if index < 0 { index + len as i64 } else { index };
                    usize::try_from(resolved)
                        .ok()
                        .and_then(|i| items.get(i))
                        .cloned()
                        .ok_or_else(|| ErrorKind::IndexOutOfBounds {
                            name: name.to_string(),
                            index,
                            len,
                        })?
                }
                Some(other) => {
                    return Err(ErrorKind::InvalidOperand {
                        expected: "list",
                        value: other.to_string(),
                    })
                }
            };
            print_value(sb, item)?;
        }
        Builtin::Arg => {
            let name = args.text(0);
            let argument = sb
                .call_args
                .last()
                .and_then(|frame| frame.get(name))
                .cloned()
                .ok_or_else(|| ErrorKind::UndefinedVariable(name.to_string()))?;
            match argument {
                Argument::Text(text) => sb.print(&text)?,
                Argument::Lazy(node) => {
                    // The argument runs in the caller's context.
                    let frame = sb.call_args.pop().unwrap_or_default();
                    ops.push_back(Op::Run(node));
                    ops.push_back(Op::Effect(Effect::RestoreArgs(frame)));
                }
            }
        }
        Builtin::If => {
            if condition(args.text(0))? {
                ops.push_back(Op::Run(args.pattern(1)));
            }
        }
        Builtin::IfElse => {
            let branch = if condition(args.text(0))? { 1 } else { 2 };
            ops.push_back(Op::Run(args.pattern(branch)));
        }
        Builtin::Yield => sb.request_yield(),
        Builtin::Branch => {
            sb.rng.branch(name_hash(args.text(0)));
            ops.push_back(Op::Run(args.pattern(1)));
            ops.push_back(Op::Effect(Effect::MergeRng));
        }
        Builtin::Match => {
            let text = sb
                .matches
                .last()
                .map(|m| m.text().to_string())
                .unwrap_or_default();
            sb.print(&text)?;
        }
        Builtin::Group => {
            let text = sb
                .matches
                .last()
                .map(|m| m.group(args.text(0)).to_string())
                .unwrap_or_default();
            sb.print(&text)?;
        }
        Builtin::In => {
            if let Some(value) = sb.program_arg(args.text(0)) {
                sb.print(value)?;
            }
        }
    }
    Ok(ops)
}

fn condition(value: &str) -> Result<bool, ErrorKind> {
    parse_bool(value).ok_or_else(|| ErrorKind::NonBooleanCondition(value.to_string()))
}

fn apply(sb: &mut Sandbox<'_>, effect: Effect) -> Result<(), ErrorKind> {
    match effect {
        Effect::CloseChannel => {
            sb.writer_mut().close_channel();
        }
        Effect::CloseQuote => {
            sb.quote_level = sb.quote_level.saturating_sub(1);
            let format = sb.format;
            sb.print(format.close_quote_for(sb.quote_level))?;
        }
        Effect::MergeRng => {
            sb.rng.merge();
        }
        Effect::RestoreNumberFormat(format) => sb.writer_mut().set_number_format(format),
        Effect::RestoreArgs(frame) => sb.call_args.push(frame),
    }
    Ok(())
}

fn is_all_caps(s: &str) -> bool {
    s.chars().any(char::is_alphabetic) && !s.chars().any(char::is_lowercase)
}

fn first_letter_is_upper(s: &str) -> bool {
    s.chars()
        .find(|c| c.is_alphabetic())
        .is_some_and(char::is_uppercase)
}

/// Guesses the capitalization mode that produced `sample`.
pub fn infer_caps(sample: &str, format: &Format) -> Capitalization {
    let words: Vec<&str> = sample.split(' ').filter(|w| !w.is_empty()).collect();
    let leading_upper = sample
        .chars()
        .find(|c| c.is_alphanumeric())
        .is_some_and(char::is_uppercase);
    match words.as_slice() {
        [] => Capitalization::None,
        [word] if word.chars().count() == 1 => {
            if leading_upper {
                Capitalization::First
            } else {
                Capitalization::None
            }
        }
        [word] if is_all_caps(word) => Capitalization::Upper,
        [_] if leading_upper => Capitalization::First,
        [_] => Capitalization::None,
        _ => {
            if !sample.chars().any(char::is_alphabetic) {
                return Capitalization::None;
            }
            if is_all_caps(sample) {
                return Capitalization::Upper;
            }
            let sentences: Vec<&str> = sample
                .split(&['.', '?', '!'][..])
                .map(str::trim)
                .filter(|s| !s.is_empty() && !s.starts_with(|c: char| c.is_ascii_digit()))
                .collect();
            let lettered: Vec<&str> = words
                .iter()
                .copied()
                .filter(|w| w.starts_with(char::is_alphabetic))
                .collect();
            let multi_word_sentence = sentences
                .iter()
                .any(|s| s.split(' ').filter(|w| !w.is_empty()).count() > 1);
            if !lettered.is_empty() && (sentences.len() == 1 || multi_word_sentence) {
                if lettered.iter().all(|w| first_letter_is_upper(w)) {
                    return Capitalization::Word;
                }
                let titled = lettered.iter().enumerate().all(|(i, w)| {
                    let upper = first_letter_is_upper(w);
                    if i == 0 {
                        upper
                    } else {
                        upper != format.excludes_from_title(w)
                    }
                });
                if titled {
                    return Capitalization::Title;
                }
            }
            let capitalized: Vec<bool> = sentences.iter().map(|s| first_letter_is_upper(s)).collect();
            if sentences.len() > 1 && capitalized.iter().all(|&c| c) {
                Capitalization::Sentence
            } else if !capitalized.iter().any(|&c| c) {
                Capitalization::Lower
            } else if leading_upper {
                Capitalization::First
            } else {
                Capitalization::None
            }
        }
    }
}
