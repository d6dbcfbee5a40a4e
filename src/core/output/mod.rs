/// Multi-channel output: buffer chains, writers and finished run output.

pub mod article;
pub mod caps;
pub mod chain;
pub mod writer;

use serde::{Deserialize, Serialize};
use std::fmt;
use strum::EnumString;

use crate::core::format::Format;
use crate::core::limit::Limit;

pub use chain::{OutputChain, TargetKey};
pub use writer::{OutputWriter, MAIN_CHANNEL};

/// How a channel's writes propagate to the channels enclosing it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ChannelVisibility {
    /// Written to itself and to `main`.
    #[default]
    Public,
    /// Written to itself only.
    Private,
    /// Written to itself and enclosing internal channels, never to `main`.
    Internal,
}

/// Shared state every buffer write needs.
pub struct OutputContext<'a> {
    pub format: &'a Format,
    pub limit: &'a mut Limit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelOutput {
    pub name: String,
    pub visibility: ChannelVisibility,
    pub text: String,
}

/// Rendered channels of one run (or one serial segment), `main` first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutput {
    pub seed: u64,
    pub starting_generation: u64,
    pub channels: Vec<ChannelOutput>,
}

impl RunOutput {
    /// Text of the `main` channel.
    pub fn main(&self) -> &str {
        self.get(MAIN_CHANNEL).unwrap_or_default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.channels
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.text.as_str())
    }

    pub fn channel_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.channels.iter().map(|c| c.name.as_str())
    }
}

impl fmt::Display for RunOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.main())
    }
}
