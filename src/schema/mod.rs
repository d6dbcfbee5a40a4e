pub mod build;
pub mod builtin;
pub mod node;
pub mod pattern;
