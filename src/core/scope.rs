/// Variables and their scopes.
///
/// Globals outlive a run and are owned by the engine; locals belong to the
/// lexical scopes a run enters and leaves (one per block item, one per
/// subroutine call).

use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

use crate::core::format::{format_number, NumberFormat};
use crate::schema::node::{NodeRef, Param};

/// One overload of a subroutine, selected by argument count.
#[derive(Debug, Clone, PartialEq)]
pub struct Overload {
    pub params: Vec<Param>,
    pub body: NodeRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subroutine {
    pub name: String,
    overloads: Vec<Overload>,
}

impl Subroutine {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            overloads: Vec::new(),
        }
    }

    /// Adds an overload, replacing any with the same arity.
    pub fn define(&mut self, params: Vec<Param>, body: NodeRef) {
        self.overloads.retain(|o| o.params.len() != params.len());
        self.overloads.push(Overload { params, body });
    }

    pub fn overload(&self, argc: usize) -> Option<&Overload> {
        self.overloads.iter().find(|o| o.params.len() == argc)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Number(f64),
    Bool(bool),
    List(Vec<Value>),
    Subroutine(Arc<Subroutine>),
}

impl Value {
    /// Interprets the value as a condition.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Text(s) => parse_bool(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// `true` / `false`, ignoring case and surrounding whitespace.
pub fn parse_bool(s: &str) -> Option<bool> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("true") {
        Some(true)
    } else if s.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => f.write_str(s),
            Value::Number(n) => f.write_str(&format_number(*n, NumberFormat::Normal)),
            Value::Bool(b) => write!(f, "{}", b),
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
            Value::Subroutine(sub) => write!(f, "[subroutine {}]", sub.name),
        }
    }
}

pub type Globals = FxHashMap<String, Value>;

/// Globals plus the locals of every scope a run currently has open.
#[derive(Debug)]
pub struct ObjectStack<'a> {
    globals: &'a mut Globals,
    locals: FxHashMap<String, Value>,
    /// Names introduced by each open scope, innermost last.
    scopes: Vec<Vec<String>>,
}

impl<'a> ObjectStack<'a> {
    pub fn new(globals: &'a mut Globals) -> Self {
        Self {
            globals,
            locals: FxHashMap::default(),
            scopes: Vec::new(),
        }
    }

    pub fn level(&self) -> usize {
        self.scopes.len()
    }

    pub fn enter_scope(&mut self) {
        self.scopes.push(Vec::new());
    }

    /// Drops every local the innermost scope introduced.
    pub fn exit_scope(&mut self) {
        if let Some(names) = self.scopes.pop() {
            for name in names {
                self.locals.remove(&name);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.globals.get(name).or_else(|| self.locals.get(name))
    }

    /// Assigns `name`. Existing globals are updated in place; otherwise the
    /// value lands in the innermost scope, or the globals at top level.
    pub fn set(&mut self, name: &str, value: Value) {
        if self.scopes.is_empty() || self.globals.contains_key(name) {
            self.globals.insert(name.to_string(), value);
            return;
        }
        if !self.locals.contains_key(name) {
            if let Some(scope) = self.scopes.last_mut() {
                scope.push(name.to_string());
            }
        }
        self.locals.insert(name.to_string(), value);
    }

    /// Removes `name` from the innermost place it is visible.
    pub fn remove(&mut self, name: &str) -> bool {
        if self.scopes.is_empty() {
            return self.globals.remove(name).is_some();
        }
        self.locals.remove(name).is_some() || self.globals.remove(name).is_some()
    }

    /// Adds an overload to subroutine `name`, creating it if needed.
    pub fn define_subroutine(&mut self, name: &str, params: Vec<Param>, body: NodeRef) {
        let mut sub = match self.get(name) {
            Some(Value::Subroutine(existing)) => existing.as_ref().clone(),
            _ => Subroutine::new(name),
        };
        sub.define(params, body);
        self.set(name, Value::Subroutine(Arc::new(sub)));
    }
}
