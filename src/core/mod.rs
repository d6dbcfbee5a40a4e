pub mod block;
pub mod config;
pub mod cursor;
pub mod engine;
pub mod error;
pub mod format;
pub mod functions;
pub mod limit;
pub mod output;
pub mod rng;
pub mod sandbox;
pub mod scope;
pub mod sync;
pub mod vocab;
