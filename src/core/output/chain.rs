/// A channel's chain of output buffers.
///
/// Buffers live in an arena and link to their neighbours by index. Text is
/// held in separate stores so that a target can appear at several positions
/// in the chain while every position renders the same content.

use rustc_hash::FxHashMap;

use crate::core::error::ErrorKind;
use crate::core::format::{format_number, Capitalization, NumberFormat};
use crate::core::output::article::article_for;
use crate::core::output::caps;
use crate::core::output::{ChannelVisibility, OutputContext};

pub type BufId = usize;
type StoreId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BufferKind {
    Plain,
    /// Holds "a" or "an" depending on the next word in the chain.
    Article,
}

#[derive(Debug, Clone)]
struct Buffer {
    store: StoreId,
    prev: Option<BufId>,
    next: Option<BufId>,
    kind: BufferKind,
    caps: Capitalization,
    printed_since_caps: bool,
    number_format: NumberFormat,
}

#[derive(Debug, Clone, Default)]
struct Store {
    text: String,
    /// Buffers rendering this store.
    views: Vec<BufId>,
    /// Characters currently charged to the size limit.
    charged: usize,
}

/// Key of a target buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TargetKey {
    Named(String),
    /// Created internally, e.g. for split query complements.
    Anonymous(u64),
}

#[derive(Debug, Clone)]
pub struct OutputChain {
    name: String,
    visibility: ChannelVisibility,
    buffers: Vec<Buffer>,
    stores: Vec<Store>,
    first: BufId,
    last: BufId,
    targets: FxHashMap<TargetKey, BufId>,
}

impl OutputChain {
    pub fn new(name: &str) -> Self {
        let mut chain = Self {
            name: name.to_string(),
            visibility: ChannelVisibility::Public,
            buffers: Vec::new(),
            stores: Vec::new(),
            first: 0,
            last: 0,
            targets: FxHashMap::default(),
        };
        let first = chain.new_buffer(None, None, BufferKind::Plain);
        chain.first = first;
        chain.last = first;
        chain
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn visibility(&self) -> ChannelVisibility {
        self.visibility
    }

    pub fn set_visibility(&mut self, visibility: ChannelVisibility) {
        self.visibility = visibility;
    }

    /// Creates a buffer linked after `prev` (detached when `None`), viewing
    /// `store` or a fresh one.
    fn new_buffer(&mut self, prev: Option<BufId>, store: Option<StoreId>, kind: BufferKind) -> BufId {
        let id = self.buffers.len();
        let store = store.unwrap_or_else(|| {
            self.stores.push(Store::default());
            self.stores.len() - 1
        });
        self.stores[store].views.push(id);

        let (caps, printed_since_caps, number_format) = match prev {
            Some(p) => {
                let prev = &self.buffers[p];
                let caps = if prev.kind == BufferKind::Article
                    && prev.caps == Capitalization::First
                {
                    Capitalization::None
                } else {
                    prev.caps
                };
                // An inherited mode continues where the previous buffer left off.
                let printed = caps == prev.caps && prev.printed_since_caps;
                (caps, printed, prev.number_format)
            }
            None => (Capitalization::None, false, NumberFormat::Normal),
        };

        self.buffers.push(Buffer {
            store,
            prev,
            next: None,
            kind,
            caps,
            printed_since_caps,
            number_format,
        });
        if let Some(p) = prev {
            self.buffers[p].next = Some(id);
        }
        id
    }

    fn add_buffer(&mut self) -> BufId {
        self.last = self.new_buffer(Some(self.last), None, BufferKind::Plain);
        self.last
    }

    fn ensure_plain_tail(&mut self) {
        if self.buffers[self.last].kind != BufferKind::Plain {
            self.add_buffer();
        }
    }

    /// Appends `text` to the end of the chain.
    pub fn print(&mut self, text: &str, ctx: &mut OutputContext<'_>) -> Result<(), ErrorKind> {
        if text.is_empty() {
            return Ok(());
        }
        self.ensure_plain_tail();
        self.print_into(self.last, text, ctx)
    }

    /// Prints a number using the tail buffer's number format.
    pub fn print_number(&mut self, number: f64, ctx: &mut OutputContext<'_>) -> Result<(), ErrorKind> {
        self.ensure_plain_tail();
        let text = format_number(number, self.buffers[self.last].number_format);
        self.print_into(self.last, &text, ctx)
    }

    fn print_into(&mut self, id: BufId, text: &str, ctx: &mut OutputContext<'_>) -> Result<(), ErrorKind> {
        let store = self.buffers[id].store;
        self.write(id, text, ctx)?;
        self.refresh_articles(store, ctx)
    }

    /// Formats and appends without notifying neighbours.
    fn write(&mut self, id: BufId, text: &str, ctx: &mut OutputContext<'_>) -> Result<(), ErrorKind> {
        if text.is_empty() {
            return Ok(());
        }
        let formatted = self.apply_caps(id, text, ctx);
        let added = formatted.chars().count();
        let buffer = &mut self.buffers[id];
        buffer.printed_since_caps = true;
        let store = &mut self.stores[buffer.store];
        store.text.push_str(&formatted);
        store.charged += added;
        ctx.limit.accumulate(added as isize)
    }

    fn clear_store(&mut self, store: StoreId, ctx: &mut OutputContext<'_>) -> Result<(), ErrorKind> {
        let store = &mut self.stores[store];
        store.text.clear();
        let charged = std::mem::take(&mut store.charged);
        ctx.limit.accumulate(-(charged as isize))
    }

    fn apply_caps(&mut self, id: BufId, text: &str, ctx: &OutputContext<'_>) -> String {
        if text.trim().is_empty() {
            return text.to_string();
        }
        let Buffer {
            caps: mode,
            kind,
            printed_since_caps,
            ..
        } = self.buffers[id];
        match mode {
            Capitalization::None => text.to_string(),
            Capitalization::Upper => text.to_uppercase(),
            Capitalization::Lower => text.to_lowercase(),
            Capitalization::First => match caps::capitalize_first(text) {
                Some(capped) => {
                    if kind == BufferKind::Plain {
                        self.buffers[id].caps = Capitalization::None;
                    }
                    capped
                }
                None => text.to_string(),
            },
            Capitalization::Title => {
                caps::title_case(text, ctx.format, !printed_since_caps)
            }
            Capitalization::Word => {
                let at_word_start = self
                    .last_char_before(id)
                    .map_or(true, caps::is_word_separator);
                if at_word_start {
                    caps::capitalize_first(text).unwrap_or_else(|| text.to_string())
                } else {
                    text.to_string()
                }
            }
            Capitalization::Sentence => {
                let text = caps::capitalize_sentences(text);
                let at_sentence_start = self
                    .last_significant_before(id)
                    .map_or(true, caps::is_sentence_terminator);
                if at_sentence_start {
                    caps::capitalize_first(&text).unwrap_or(text)
                } else {
                    text
                }
            }
        }
    }

    /// Buffers from `id` backwards through the chain.
    fn walk_back(&self, id: BufId) -> impl Iterator<Item = &Buffer> + '_ {
        std::iter::successors(Some(&self.buffers[id]), |b| {
            b.prev.map(|p| &self.buffers[p])
        })
    }

    /// Last character rendered at or before `id`.
    fn last_char_before(&self, id: BufId) -> Option<char> {
        self.walk_back(id)
            .find_map(|b| self.stores[b.store].text.chars().next_back())
    }

    /// Last letter, digit or sentence terminator rendered at or before `id`.
    fn last_significant_before(&self, id: BufId) -> Option<char> {
        self.walk_back(id).find_map(|b| {
            self.stores[b.store]
                .text
                .chars()
                .rev()
                .find(|&c| c.is_alphanumeric() || caps::is_sentence_terminator(c))
        })
    }

    /// First word rendered after `id`, possibly spanning several buffers.
    fn next_word_after(&self, id: BufId) -> Option<String> {
        let mut word = String::new();
        let mut cursor = self.buffers[id].next;
        while let Some(b) = cursor {
            let buffer = &self.buffers[b];
            for c in self.stores[buffer.store].text.chars() {
                if c.is_alphanumeric() {
                    word.push(c);
                } else if !word.is_empty() {
                    return Some(word);
                }
            }
            cursor = buffer.next;
        }
        (!word.is_empty()).then_some(word)
    }

    /// Re-evaluates article buffers that precede any view of `store`,
    /// cascading when an article's own text changes.
    fn refresh_articles(&mut self, store: StoreId, ctx: &mut OutputContext<'_>) -> Result<(), ErrorKind> {
        let mut pending: Vec<BufId> = self.stores[store].views.clone();
        while let Some(id) = pending.pop() {
            let mut cursor = self.buffers[id].prev;
            while let Some(p) = cursor {
                let buffer = &self.buffers[p];
                if buffer.kind == BufferKind::Article {
                    if self.update_article(p, ctx)? {
                        pending.extend(self.stores[self.buffers[p].store].views.iter().copied());
                    }
                    break;
                }
                if self.stores[buffer.store]
                    .text
                    .chars()
                    .any(char::is_alphanumeric)
                {
                    break;
                }
                cursor = buffer.prev;
            }
        }
        Ok(())
    }

    /// Returns whether the article text changed.
    fn update_article(&mut self, id: BufId, ctx: &mut OutputContext<'_>) -> Result<bool, ErrorKind> {
        let Some(word) = self.next_word_after(id) else {
            return Ok(false);
        };
        let article = article_for(&word);
        let store = self.buffers[id].store;
        if self.stores[store].text.eq_ignore_ascii_case(article) {
            return Ok(false);
        }
        self.clear_store(store, ctx)?;
        self.write(id, article, ctx)?;
        Ok(true)
    }

    /// Appends an article buffer holding "a" until a following word decides.
    pub fn add_article(&mut self, ctx: &mut OutputContext<'_>) -> Result<(), ErrorKind> {
        self.last = self.new_buffer(Some(self.last), None, BufferKind::Article);
        self.write(self.last, "a", ctx)
    }

    /// Sets the capitalization of the tail buffer.
    pub fn set_caps(&mut self, caps: Capitalization) {
        let buffer = &mut self.buffers[self.last];
        buffer.caps = caps;
        buffer.printed_since_caps = false;
    }

    pub fn caps(&self) -> Capitalization {
        self.buffers[self.last].caps
    }

    pub fn set_number_format(&mut self, format: NumberFormat) {
        self.buffers[self.last].number_format = format;
    }

    pub fn number_format(&self) -> NumberFormat {
        self.buffers[self.last].number_format
    }

    /// Places target `key` at the end of the chain. A target placed twice
    /// shares one store at both positions.
    pub fn insert_target(&mut self, key: TargetKey) {
        match self.targets.get(&key) {
            Some(&origin) => {
                let store = self.buffers[origin].store;
                self.last = self.new_buffer(Some(self.last), Some(store), BufferKind::Plain);
            }
            None => {
                let id = self.add_buffer();
                self.targets.insert(key, id);
            }
        }
        self.add_buffer();
    }

    /// Appends `text` to target `key`, creating a detached target if it
    /// has not been placed yet.
    pub fn print_to_target(
        &mut self,
        key: TargetKey,
        text: &str,
        ctx: &mut OutputContext<'_>,
    ) -> Result<(), ErrorKind> {
        let id = match self.targets.get(&key) {
            Some(&id) => id,
            None => {
                let id = self.new_buffer(None, None, BufferKind::Plain);
                self.targets.insert(key, id);
                id
            }
        };
        self.print_into(id, text, ctx)
    }

    pub fn clear_target(&mut self, key: &TargetKey, ctx: &mut OutputContext<'_>) -> Result<(), ErrorKind> {
        let Some(&id) = self.targets.get(key) else {
            return Ok(());
        };
        let store = self.buffers[id].store;
        self.clear_store(store, ctx)?;
        self.refresh_articles(store, ctx)
    }

    pub fn target_value(&self, key: &TargetKey) -> String {
        self.targets
            .get(key)
            .map(|&id| self.stores[self.buffers[id].store].text.clone())
            .unwrap_or_default()
    }

    /// Characters charged to the size limit by this chain.
    pub fn charged(&self) -> usize {
        self.stores.iter().map(|s| s.charged).sum()
    }

    /// Rendered length in characters.
    pub fn len(&self) -> usize {
        self.iter_text().map(|t| t.chars().count()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.iter_text().all(str::is_empty)
    }

    fn iter_text(&self) -> impl Iterator<Item = &str> + '_ {
        std::iter::successors(Some(self.first), |&id| self.buffers[id].next)
            .map(|id| self.stores[self.buffers[id].store].text.as_str())
    }

    /// The chain rendered from first to last buffer.
    pub fn render(&self) -> String {
        self.iter_text().collect()
    }
}
