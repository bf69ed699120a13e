//! Configuration: storage location, backend choice and per-channel settings.
//!
//! ```toml
//! data_dir = "/var/lib/karma"
//! backend = "sled"
//!
//! [defaults]
//! response = true
//!
//! [channels."#rust"]
//! allow_self_rating = true
//! ranking_display = 5
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{KarmaError, Result};
use crate::host::{irc_lower, PolicyProvider};

/// Settings the host supplies for one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelSettings {
    /// Users may rate their own nick.
    pub allow_self_rating: bool,
    /// Karma expressions are picked up from messages not addressed to the bot.
    pub allow_unaddressed_karma: bool,
    /// Single-name queries answer `name: total` instead of the long form.
    pub simple_output: bool,
    /// Acknowledge each applied karma change.
    pub response: bool,
    /// How many entries the highest/lowest summary shows.
    pub ranking_display: usize,
    /// How many entries `most` shows.
    pub most_display: usize,
    /// Queries with several names report each name separately instead of
    /// treating the words as one name.
    pub multi_name_query: bool,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            allow_self_rating: false,
            allow_unaddressed_karma: false,
            simple_output: false,
            response: false,
            ranking_display: 3,
            most_display: 25,
            multi_name_query: false,
        }
    }
}

/// Partial settings for one channel; unset fields fall back to the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelOverrides {
    /// Overrides `allow_self_rating`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_self_rating: Option<bool>,
    /// Overrides `allow_unaddressed_karma`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_unaddressed_karma: Option<bool>,
    /// Overrides `simple_output`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simple_output: Option<bool>,
    /// Overrides `response`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<bool>,
    /// Overrides `ranking_display`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ranking_display: Option<usize>,
    /// Overrides `most_display`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub most_display: Option<usize>,
    /// Overrides `multi_name_query`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multi_name_query: Option<bool>,
}

impl ChannelOverrides {
    fn apply(&self, base: &ChannelSettings) -> ChannelSettings {
        ChannelSettings {
            allow_self_rating: self.allow_self_rating.unwrap_or(base.allow_self_rating),
            allow_unaddressed_karma: self
                .allow_unaddressed_karma
                .unwrap_or(base.allow_unaddressed_karma),
            simple_output: self.simple_output.unwrap_or(base.simple_output),
            response: self.response.unwrap_or(base.response),
            ranking_display: self.ranking_display.unwrap_or(base.ranking_display),
            most_display: self.most_display.unwrap_or(base.most_display),
            multi_name_query: self.multi_name_query.unwrap_or(base.multi_name_query),
        }
    }
}

/// Storage backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// One sled database per channel under `data_dir`.
    #[default]
    Sled,
    /// Process-local maps, lost on exit.
    Memory,
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sled" => Ok(Self::Sled),
            "memory" | "mem" => Ok(Self::Memory),
            other => Err(format!("Unknown backend: {other}")),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KarmaConfig {
    /// Directory holding channel databases and dump files.
    pub data_dir: PathBuf,
    /// Which backend to construct.
    pub backend: BackendKind,
    /// Settings used for every channel without an override.
    pub defaults: ChannelSettings,
    /// Per-channel overrides keyed by channel name.
    pub channels: HashMap<String, ChannelOverrides>,
}

impl Default for KarmaConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            backend: BackendKind::default(),
            defaults: ChannelSettings::default(),
            channels: HashMap::new(),
        }
    }
}

/// `<platform data dir>/karma-ledger`, or `.karma` when there is none.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir().map_or_else(|| PathBuf::from(".karma"), |p| p.join("karma-ledger"))
}

/// `filename` itself when absolute, otherwise `filename` inside `dir`.
pub fn resolve_in(dir: &Path, filename: impl AsRef<Path>) -> PathBuf {
    let filename = filename.as_ref();
    if filename.is_absolute() {
        filename.to_path_buf()
    } else {
        dir.join(filename)
    }
}

impl KarmaConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| KarmaError::Config(e.to_string()))
    }

    /// Read a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| KarmaError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| KarmaError::Config(e.to_string()))
    }

    /// Override settings for one channel.
    pub fn set_channel(&mut self, channel: &str, overrides: ChannelOverrides) {
        self.channels.insert(channel.to_string(), overrides);
    }
}

impl PolicyProvider for KarmaConfig {
    fn settings(&self, channel: &str) -> ChannelSettings {
        let wanted = irc_lower(channel);
        self.channels
            .iter()
            .find(|(name, _)| irc_lower(name) == wanted)
            .map_or_else(|| self.defaults.clone(), |(_, o)| o.apply(&self.defaults))
    }
}
