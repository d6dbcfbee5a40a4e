/// Vocabulary lookups: the query contract and a table-backed implementation.

use rand::distributions::WeightedIndex;
use rand::prelude::Distribution;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::trace;

use crate::core::rng::GenRng;
use crate::schema::node::Query;

#[derive(Debug, Error)]
pub enum VocabularyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// A term picked by a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResult {
    pub value: String,
    /// Byte offset where a complement may be inserted.
    pub split: Option<usize>,
}

impl QueryResult {
    pub fn whole(value: &str) -> Self {
        Self {
            value: value.to_string(),
            split: None,
        }
    }

    pub fn is_split(&self) -> bool {
        self.split.is_some()
    }

    pub fn left(&self) -> &str {
        match self.split {
            Some(i) => self.value.get(..i).unwrap_or(&self.value),
            None => &self.value,
        }
    }

    pub fn right(&self) -> &str {
        match self.split {
            Some(i) => self.value.get(i..).unwrap_or(""),
            None => "",
        }
    }
}

/// Carrier bookkeeping threaded through every query of one run.
#[derive(Debug, Clone, Default)]
pub struct CarrierState {
    /// Entry chosen for each `(table, match id)`.
    matches: FxHashMap<(String, String), usize>,
    /// Entries already used for each `(table, unique id)`.
    uniques: FxHashMap<(String, String), FxHashSet<usize>>,
}

impl CarrierState {
    pub fn matched(&self, table: &str, id: &str) -> Option<usize> {
        self.matches
            .get(&(table.to_string(), id.to_string()))
            .copied()
    }

    pub fn set_match(&mut self, table: &str, id: &str, entry: usize) {
        self.matches
            .insert((table.to_string(), id.to_string()), entry);
    }

    pub fn is_used(&self, table: &str, id: &str, entry: usize) -> bool {
        self.uniques
            .get(&(table.to_string(), id.to_string()))
            .is_some_and(|used| used.contains(&entry))
    }

    pub fn mark_used(&mut self, table: &str, id: &str, entry: usize) {
        self.uniques
            .entry((table.to_string(), id.to_string()))
            .or_default()
            .insert(entry);
    }

    pub fn clear(&mut self) {
        self.matches.clear();
        self.uniques.clear();
    }
}

/// Source of dictionary terms. `None` means nothing matched.
pub trait Vocabulary: Send + Sync {
    fn query(&self, rng: &mut GenRng, query: &Query, carrier: &mut CarrierState) -> Option<QueryResult>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub value: String,
    #[serde(default)]
    pub split: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// One term per subtype of the table.
    pub terms: Vec<Term>,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

impl Entry {
    pub fn new(terms: &[&str], classes: &[&str]) -> Self {
        Self {
            terms: terms
                .iter()
                .map(|t| Term {
                    value: t.to_string(),
                    split: None,
                })
                .collect(),
            classes: classes.iter().map(|c| c.to_string()).collect(),
            weight: 1.0,
        }
    }

    fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub subtypes: Vec<String>,
    pub entries: Vec<Entry>,
}

impl Table {
    pub fn subtype_index(&self, subtype: Option<&str>) -> usize {
        subtype
            .and_then(|s| self.subtypes.iter().position(|t| t == s))
            .unwrap_or(0)
    }
}

/// Vocabulary backed by in-memory tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableVocabulary {
    tables: FxHashMap<String, Table>,
}

impl TableVocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: Table) -> Self {
        self.insert(table);
        self
    }

    pub fn insert(&mut self, table: Table) {
        self.tables.insert(table.name.clone(), table);
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Load tables from a RON file holding a list of tables.
    pub fn load_from_ron(path: &Path) -> Result<TableVocabulary, VocabularyError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<TableVocabulary, VocabularyError> {
        let tables: Vec<Table> = ron::from_str(input)?;
        let mut vocab = TableVocabulary::new();
        for table in tables {
            vocab.insert(table);
        }
        Ok(vocab)
    }
}

impl Vocabulary for TableVocabulary {
    fn query(&self, rng: &mut GenRng, query: &Query, carrier: &mut CarrierState) -> Option<QueryResult> {
        let table = self.tables.get(&query.table)?;
        let subtype = table.subtype_index(query.subtype.as_deref());
        let term_of = |entry: &Entry| {
            entry.terms.get(subtype).map(|t| QueryResult {
                value: t.value.clone(),
                split: t.split,
            })
        };

        for id in &query.carrier.matches {
            if let Some(entry) = carrier.matched(&table.name, id) {
                return table.entries.get(entry).and_then(term_of);
            }
        }

        let candidates: Vec<usize> = table
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| query.classes.iter().all(|c| e.has_class(c)))
            .filter(|(_, e)| !query.excluded_classes.iter().any(|c| e.has_class(c)))
            .filter(|(i, _)| {
                !query
                    .carrier
                    .uniques
                    .iter()
                    .any(|id| carrier.is_used(&table.name, id, *i))
            })
            .map(|(i, _)| i)
            .collect();

        let weights: Vec<f64> = candidates.iter().map(|&i| table.entries[i].weight).collect();
        let dist = WeightedIndex::new(&weights).ok()?;
        let chosen = candidates[dist.sample(rng)];
        trace!(table = %table.name, entry = chosen, "vocabulary query");

        for id in &query.carrier.matches {
            carrier.set_match(&table.name, id, chosen);
        }
        for id in &query.carrier.uniques {
            carrier.mark_used(&table.name, id, chosen);
        }
        term_of(&table.entries[chosen])
    }
}
