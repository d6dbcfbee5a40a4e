/// Channel stack and visibility cascade for one evaluation frame.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::core::error::ErrorKind;
use crate::core::format::{Capitalization, NumberFormat};
use crate::core::output::chain::{OutputChain, TargetKey};
use crate::core::output::{ChannelOutput, ChannelVisibility, OutputContext, RunOutput};

pub const MAIN_CHANNEL: &str = "main";

const MAIN: usize = 0;

/// Owns every channel written during one evaluation. Nested evaluations get
/// their own writer so their text never reaches the parent's buffers.
#[derive(Debug, Clone)]
pub struct OutputWriter {
    chains: Vec<OutputChain>,
    by_name: FxHashMap<String, usize>,
    /// Open channels, outermost (`main`) first.
    stack: Vec<usize>,
    active: FxHashSet<usize>,
    next_anonymous: u64,
}

impl Default for OutputWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputWriter {
    pub fn new() -> Self {
        let mut by_name = FxHashMap::default();
        by_name.insert(MAIN_CHANNEL.to_string(), MAIN);
        let mut active = FxHashSet::default();
        active.insert(MAIN);
        Self {
            chains: vec![OutputChain::new(MAIN_CHANNEL)],
            by_name,
            stack: vec![MAIN],
            active,
            next_anonymous: 0,
        }
    }

    /// Opens `name` on top of the channel stack. Reopening a channel that
    /// is already open does nothing.
    pub fn open_channel(&mut self, name: &str, visibility: ChannelVisibility) {
        let idx = match self.by_name.get(name) {
            Some(&idx) if self.active.contains(&idx) => return,
            Some(&idx) => idx,
            None => {
                let idx = self.chains.len();
                self.chains.push(OutputChain::new(name));
                self.by_name.insert(name.to_string(), idx);
                idx
            }
        };
        self.chains[idx].set_visibility(visibility);
        self.stack.push(idx);
        self.active.insert(idx);
    }

    /// Closes the innermost channel. Returns `false` when only `main` is open.
    pub fn close_channel(&mut self) -> bool {
        if self.stack.len() <= 1 {
            return false;
        }
        if let Some(idx) = self.stack.pop() {
            self.active.remove(&idx);
        }
        true
    }

    /// Chains a write reaches, innermost first.
    fn cascade(&self) -> Vec<usize> {
        let mut reached = Vec::with_capacity(2);
        let mut internal = false;
        for &idx in self.stack.iter().rev() {
            let visibility = self.chains[idx].visibility();
            if internal && (idx == MAIN || visibility != ChannelVisibility::Internal) {
                break;
            }
            reached.push(idx);
            match visibility {
                ChannelVisibility::Public => {
                    if idx != MAIN {
                        reached.push(MAIN);
                    }
                    break;
                }
                ChannelVisibility::Private => break,
                ChannelVisibility::Internal => internal = true,
            }
        }
        reached
    }

    /// Applies `action` to every chain the cascade reaches.
    fn apply<F>(&mut self, mut action: F) -> Result<(), ErrorKind>
    where
        F: FnMut(&mut OutputChain) -> Result<(), ErrorKind>,
    {
        for idx in self.cascade() {
            action(&mut self.chains[idx])?;
        }
        Ok(())
    }

    pub fn print(&mut self, text: &str, ctx: &mut OutputContext<'_>) -> Result<(), ErrorKind> {
        self.apply(|chain| chain.print(text, ctx))
    }

    pub fn print_number(&mut self, number: f64, ctx: &mut OutputContext<'_>) -> Result<(), ErrorKind> {
        self.apply(|chain| chain.print_number(number, ctx))
    }

    pub fn print_article(&mut self, ctx: &mut OutputContext<'_>) -> Result<(), ErrorKind> {
        self.apply(|chain| chain.add_article(ctx))
    }

    pub fn capitalize(&mut self, caps: Capitalization) {
        let _ = self.apply(|chain| {
            chain.set_caps(caps);
            Ok(())
        });
    }

    /// Capitalization of the innermost open channel.
    pub fn caps(&self) -> Capitalization {
        self.current().caps()
    }

    pub fn set_number_format(&mut self, format: NumberFormat) {
        let _ = self.apply(|chain| {
            chain.set_number_format(format);
            Ok(())
        });
    }

    pub fn number_format(&self) -> NumberFormat {
        self.current().number_format()
    }

    pub fn insert_target(&mut self, key: TargetKey) {
        let _ = self.apply(|chain| {
            chain.insert_target(key.clone());
            Ok(())
        });
    }

    /// Places a fresh anonymous target and returns its key.
    pub fn insert_anonymous_target(&mut self) -> TargetKey {
        let key = TargetKey::Anonymous(self.next_anonymous);
        self.next_anonymous += 1;
        self.insert_target(key.clone());
        key
    }

    pub fn print_to_target(
        &mut self,
        key: &TargetKey,
        text: &str,
        ctx: &mut OutputContext<'_>,
    ) -> Result<(), ErrorKind> {
        self.apply(|chain| chain.print_to_target(key.clone(), text, ctx))
    }

    pub fn clear_target(&mut self, key: &TargetKey, ctx: &mut OutputContext<'_>) -> Result<(), ErrorKind> {
        self.apply(|chain| chain.clear_target(key, ctx))
    }

    /// Value of target `key` in the innermost open channel.
    pub fn target_value(&self, key: &TargetKey) -> String {
        self.current().target_value(key)
    }

    fn current(&self) -> &OutputChain {
        let idx = self.stack.last().copied().unwrap_or(MAIN);
        &self.chains[idx]
    }

    /// Rendered length of channel `name`, or 0 if it does not exist.
    pub fn channel_len(&self, name: &str) -> usize {
        self.by_name
            .get(name)
            .map_or(0, |&idx| self.chains[idx].len())
    }

    /// Characters this writer has charged to the size limit.
    pub fn charged(&self) -> usize {
        self.chains.iter().map(OutputChain::charged).sum()
    }

    /// Rendered text of `main`.
    pub fn main_text(&self) -> String {
        self.chains[MAIN].render()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.iter().all(OutputChain::is_empty)
    }

    pub fn to_output(&self, seed: u64, starting_generation: u64) -> RunOutput {
        RunOutput {
            seed,
            starting_generation,
            channels: self
                .chains
                .iter()
                .map(|chain| ChannelOutput {
                    name: chain.name().to_string(),
                    visibility: chain.visibility(),
                    text: chain.render(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::format::Format;
    use crate::core::limit::Limit;

    fn write(writer: &mut OutputWriter, text: &str) {
        let format = Format::default();
        let mut limit = Limit::new(0);
        let mut ctx = OutputContext {
            format: &format,
            limit: &mut limit,
        };
        writer.print(text, &mut ctx).unwrap();
    }

    fn render(writer: &OutputWriter) -> RunOutput {
        writer.to_output(0, 0)
    }

    #[test]
    fn main_is_first_and_always_open() {
        let mut writer = OutputWriter::new();
        assert!(!writer.close_channel());
        write(&mut writer, "hi");
        let out = render(&writer);
        assert_eq!(out.channels[0].name, MAIN_CHANNEL);
        assert_eq!(out.main(), "hi");
    }

    #[test]
    fn public_writes_reach_main() {
        let mut writer = OutputWriter::new();
        writer.open_channel("loud", ChannelVisibility::Public);
        write(&mut writer, "x");
        assert!(writer.close_channel());
        let out = render(&writer);
        assert_eq!(out.get("loud"), Some("x"));
        assert_eq!(out.main(), "x");
    }

    #[test]
    fn private_writes_stay_put() {
        let mut writer = OutputWriter::new();
        writer.open_channel("secret", ChannelVisibility::Private);
        write(&mut writer, "x");
        writer.close_channel();
        write(&mut writer, "y");
        let out = render(&writer);
        assert_eq!(out.get("secret"), Some("x"));
        assert_eq!(out.main(), "y");
    }

    #[test]
    fn public_inside_private_skips_to_main() {
        let mut writer = OutputWriter::new();
        writer.open_channel("outer", ChannelVisibility::Private);
        writer.open_channel("inner", ChannelVisibility::Public);
        write(&mut writer, "z");
        let out = render(&writer);
        assert_eq!(out.get("inner"), Some("z"));
        assert_eq!(out.get("outer"), Some(""));
        assert_eq!(out.main(), "z");
    }

    #[test]
    fn internal_chains_through_internal_parents_only() {
        let mut writer = OutputWriter::new();
        writer.open_channel("a", ChannelVisibility::Public);
        writer.open_channel("b", ChannelVisibility::Internal);
        writer.open_channel("c", ChannelVisibility::Internal);
        write(&mut writer, "q");
        let out = render(&writer);
        assert_eq!(out.get("c"), Some("q"));
        assert_eq!(out.get("b"), Some("q"));
        assert_eq!(out.get("a"), Some(""));
        assert_eq!(out.main(), "");
    }

    #[test]
    fn internal_never_reaches_main() {
        let mut writer = OutputWriter::new();
        writer.open_channel("notes", ChannelVisibility::Internal);
        write(&mut writer, "hidden");
        let out = render(&writer);
        assert_eq!(out.get("notes"), Some("hidden"));
        assert_eq!(out.main(), "");
    }

    #[test]
    fn reopening_an_active_channel_is_a_no_op() {
        let mut writer = OutputWriter::new();
        writer.open_channel("c", ChannelVisibility::Private);
        writer.open_channel("c", ChannelVisibility::Public);
        write(&mut writer, "x");
        assert!(writer.close_channel());
        assert!(!writer.close_channel());
        assert_eq!(render(&writer).main(), "");
        assert_eq!(writer.channel_len("c"), 1);
        assert_eq!(writer.channel_len("nope"), 0);
    }

    #[test]
    fn anonymous_targets_are_unique() {
        let mut writer = OutputWriter::new();
        let a = writer.insert_anonymous_target();
        let b = writer.insert_anonymous_target();
        assert_ne!(a, b);
    }
}
