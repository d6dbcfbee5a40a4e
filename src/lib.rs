//! Pattern Engine: a suspendable interpreter for procedural text patterns.
//!
//! A compiled pattern is a tree of nodes (text, blocks of weighted
//! alternatives, built-in function calls, vocabulary queries, regex
//! replacers, subroutines). Running it with a seed produces randomized,
//! formatted text on one or more named output channels. Execution is driven
//! by an explicit frame stack, so runs obey timeout and depth budgets and can
//! be paused at `yield` points to stream output piece by piece.

pub mod core;
pub mod schema;

pub use crate::core::config::EngineConfig;
pub use crate::core::engine::{Engine, EngineBuilder, EngineError, ProgramArgs};
pub use crate::core::error::{ErrorKind, RuntimeError};
pub use crate::core::output::RunOutput;
pub use crate::core::sandbox::{RunSerial, Sandbox};
pub use crate::core::vocab::{TableVocabulary, Vocabulary};
pub use crate::schema::pattern::Pattern;
