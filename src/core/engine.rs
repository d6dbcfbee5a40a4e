/// The embedding surface: an `Engine` owns configuration, an optional
/// vocabulary and the global variable table, and runs patterns against them.
///
/// Built via `Engine::builder()`.

use rustc_hash::FxHashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use crate::core::config::{ConfigError, EngineConfig};
use crate::core::error::RuntimeError;
use crate::core::output::RunOutput;
use crate::core::sandbox::{RunSerial, Sandbox};
use crate::core::scope::{Globals, Value};
use crate::core::vocab::{TableVocabulary, Vocabulary, VocabularyError};
use crate::schema::pattern::{Pattern, PatternError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("vocabulary error: {0}")]
    Vocabulary(#[from] VocabularyError),
    #[error("pattern error: {0}")]
    Pattern(#[from] PatternError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Named string arguments readable by the `in` built-in.
///
/// Clones share one table. A run holds the table's lock for its whole
/// duration, so runs sharing a table never overlap.
#[derive(Debug, Clone, Default)]
pub struct ProgramArgs(Arc<Mutex<FxHashMap<String, String>>>);

impl ProgramArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, name: &str, value: &str) {
        self.lock().insert(name.to_string(), value.to_string());
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.lock().get(name).cloned()
    }

    pub fn remove(&self, name: &str) -> Option<String> {
        self.lock().remove(name)
    }

    fn lock(&self) -> MutexGuard<'_, FxHashMap<String, String>> {
        // A panicked run leaves the table itself intact.
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub struct Engine {
    config: EngineConfig,
    vocabulary: Option<Arc<dyn Vocabulary>>,
    globals: Globals,
}

/// Builder for constructing an `Engine`.
#[derive(Default)]
pub struct EngineBuilder {
    config_path: Option<String>,
    vocabulary_path: Option<String>,
    size_limit: Option<usize>,
    timeout_ms: Option<u64>,
    max_stack_depth: Option<usize>,
    /// Directly provided config (for use without files).
    config: Option<EngineConfig>,
    /// Directly provided vocabulary (for use without files).
    vocabulary: Option<Arc<dyn Vocabulary>>,
    globals: Globals,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Variables that outlive individual runs.
    pub fn globals(&self) -> &Globals {
        &self.globals
    }

    pub fn set_global(&mut self, name: &str, value: Value) {
        self.globals.insert(name.to_string(), value);
    }

    pub fn clear_globals(&mut self) {
        self.globals.clear();
    }

    fn sandbox(&mut self, seed: u64) -> Sandbox<'_> {
        Sandbox::new(&self.config, &mut self.globals, seed)
            .with_vocabulary(self.vocabulary.as_deref())
    }

    /// Runs `pattern` to completion with `seed`.
    pub fn run(&mut self, pattern: &Pattern, seed: u64) -> Result<RunOutput, RuntimeError> {
        self.sandbox(seed).run(&pattern.root)
    }

    /// Runs `pattern` with the RNG starting at `generation`.
    pub fn run_at(
        &mut self,
        pattern: &Pattern,
        seed: u64,
        generation: u64,
    ) -> Result<RunOutput, RuntimeError> {
        self.sandbox(seed).with_generation(generation).run(&pattern.root)
    }

    /// Runs `pattern` with `args` readable through `in`.
    pub fn run_with_args(
        &mut self,
        pattern: &Pattern,
        seed: u64,
        args: &ProgramArgs,
    ) -> Result<RunOutput, RuntimeError> {
        let table = args.lock();
        self.sandbox(seed).with_program_args(&table).run(&pattern.root)
    }

    /// Runs `pattern` lazily, one output per `yield`.
    pub fn run_serial(&mut self, pattern: &Pattern, seed: u64) -> RunSerial<'_> {
        self.sandbox(seed).run_serial(&pattern.root)
    }

    /// Loads a pattern file and runs it.
    pub fn run_file(&mut self, path: &Path, seed: u64) -> Result<RunOutput, EngineError> {
        let pattern = Pattern::load_from_ron(path)?;
        Ok(self.run(&pattern, seed)?)
    }
}

impl EngineBuilder {
    /// Path of a RON config file.
    pub fn config(mut self, path: &str) -> Self {
        self.config_path = Some(path.to_string());
        self
    }

    /// Path of a RON vocabulary file.
    pub fn vocabulary(mut self, path: &str) -> Self {
        self.vocabulary_path = Some(path.to_string());
        self
    }

    pub fn size_limit(mut self, limit: usize) -> Self {
        self.size_limit = Some(limit);
        self
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }

    pub fn max_stack_depth(mut self, depth: usize) -> Self {
        self.max_stack_depth = Some(depth);
        self
    }

    /// Provide a config directly (for use without files).
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Provide a vocabulary directly (for use without files).
    pub fn with_vocabulary(mut self, vocabulary: impl Vocabulary + 'static) -> Self {
        self.vocabulary = Some(Arc::new(vocabulary));
        self
    }

    /// Share a vocabulary with other engines.
    pub fn with_shared_vocabulary(mut self, vocabulary: Arc<dyn Vocabulary>) -> Self {
        self.vocabulary = Some(vocabulary);
        self
    }

    /// Seed the global variable table.
    pub fn with_globals(mut self, globals: Globals) -> Self {
        self.globals = globals;
        self
    }

    pub fn build(self) -> Result<Engine, EngineError> {
        // A config file wins over a directly provided config; explicit
        // setters win over both.
        let mut config = match self.config_path {
            Some(ref path) => EngineConfig::load_from_ron(Path::new(path))?,
            None => self.config.unwrap_or_default(),
        };
        if let Some(limit) = self.size_limit {
            config.size_limit = limit;
        }
        if let Some(ms) = self.timeout_ms {
            config.timeout_ms = ms;
        }
        if let Some(depth) = self.max_stack_depth {
            config.max_stack_depth = depth;
        }
        config.validate()?;

        let vocabulary = match self.vocabulary_path {
            Some(ref path) => {
                let table: Arc<dyn Vocabulary> =
                    Arc::new(TableVocabulary::load_from_ron(Path::new(path))?);
                Some(table)
            }
            None => self.vocabulary,
        };

        Ok(Engine {
            config,
            vocabulary,
            globals: self.globals,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::schema::build::{func, seq, text};
    use crate::schema::builtin::Builtin;

    fn pattern(root: crate::schema::node::NodeRef) -> Pattern {
        Pattern::new("test", root)
    }

    #[test]
    fn builder_defaults() {
        let engine = Engine::builder().build().unwrap();
        assert_eq!(engine.config(), &EngineConfig::default());
    }

    #[test]
    fn setters_override_config() {
        let engine = Engine::builder()
            .with_config(EngineConfig {
                size_limit: 10,
                ..EngineConfig::default()
            })
            .size_limit(20)
            .timeout_ms(5)
            .build()
            .unwrap();
        assert_eq!(engine.config().size_limit, 20);
        assert_eq!(engine.config().timeout_ms, 5);
    }

    #[test]
    fn zero_depth_is_rejected() {
        let err = Engine::builder().max_stack_depth(0).build();
        assert!(matches!(
            err,
            Err(EngineError::Config(ConfigError::ZeroStackDepth))
        ));
    }

    #[test]
    fn missing_config_file_is_io_error() {
        let err = Engine::builder().config("does/not/exist.ron").build();
        assert!(matches!(err, Err(EngineError::Config(ConfigError::Io(_)))));
    }

    #[test]
    fn globals_persist_between_runs() {
        let mut engine = Engine::builder().build().unwrap();
        let set = pattern(func(Builtin::VarSet, [text("hero"), text("Ada")]));
        let get = pattern(func(Builtin::VarGet, [text("hero")]));
        engine.run(&set, 1).unwrap();
        assert_eq!(engine.run(&get, 2).unwrap().main(), "Ada");
        engine.clear_globals();
        assert_eq!(
            engine.run(&get, 2).unwrap_err().kind,
            ErrorKind::UndefinedVariable("hero".into())
        );
    }

    #[test]
    fn program_args_reach_the_run() {
        let mut engine = Engine::builder().build().unwrap();
        let args = ProgramArgs::new();
        args.set("name", "Quill");
        let shared = args.clone();
        let out = engine
            .run_with_args(
                &pattern(seq([text("Hi "), func(Builtin::In, [text("name")])])),
                0,
                &shared,
            )
            .unwrap();
        assert_eq!(out.main(), "Hi Quill");
        assert_eq!(args.remove("name"), Some("Quill".to_string()));
        assert_eq!(shared.get("name"), None);
    }

    #[test]
    fn serial_runs_through_engine() {
        let mut engine = Engine::builder().build().unwrap();
        let p = pattern(seq([text("a"), func(Builtin::Yield, []), text("b")]));
        let parts: Vec<String> = engine
            .run_serial(&p, 0)
            .map(|r| r.unwrap().main().to_string())
            .collect();
        assert_eq!(parts, ["a", "b"]);
    }
}
