//! karma-ledger: per-channel karma counters driven by chat text
//!
//! This library recognizes karma expressions (`name++`, `name--`, `name+-`,
//! `"a phrase"++`) in free-form chat lines and keeps a signed score for every
//! name, independently per channel.
//!
//! ## Features
//!
//! - **Tokenizer**: lazy scan of chat text for karma expressions, with quoted
//!   multi-word names and escaped quotes
//! - **Karma Store**: increment/decrement, lookup, ranking, top/bottom,
//!   most-changed, reset and CSV dump/load
//! - **Backends**: one sled database per channel, or in-memory
//! - **Host Seams**: `Responder` and `PolicyProvider` traits for embedding in a
//!   chat bot

pub mod config;
pub mod error;
pub mod host;
pub mod karma;
pub mod render;
pub mod store;
pub mod tokenizer;

pub use config::{BackendKind, ChannelOverrides, ChannelSettings, KarmaConfig};
pub use error::{KarmaError, Result};
pub use host::{IgnoreReason, Message, Outcome, PolicyProvider, Responder};
pub use karma::Karma;
pub use store::{
    KarmaBackend, KarmaEntry, KarmaRow, KarmaStore, KarmaSummary, MemoryBackend, MostKind,
    SledBackend,
};
pub use tokenizer::{tokenize, KarmaToken, Operator, Tokens};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
