//! Per-channel karma storage.
//!
//! A [`KarmaBackend`] persists [`KarmaEntry`] rows, one independent namespace
//! per channel. [`KarmaStore`] sits on top of any backend and implements the
//! ranking and query operations plus CSV dump/load.

pub mod memory;
pub mod sled_backend;
pub mod transfer;

use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{BackendKind, KarmaConfig};
use crate::error::{KarmaError, Result};

pub use self::memory::MemoryBackend;
pub use self::sled_backend::SledBackend;
pub use self::transfer::KarmaRow;

/// Lowercase form of a name, the uniqueness key within a channel.
pub fn normalize(name: &str) -> String {
    name.to_lowercase()
}

/// Counters for one name in one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KarmaEntry {
    /// Insertion sequence number; defines storage order.
    pub id: u64,
    /// First-seen spelling, used for output.
    pub name: String,
    /// Times increased.
    pub added: u64,
    /// Times decreased.
    pub subtracted: u64,
}

impl KarmaEntry {
    /// A fresh entry with zeroed counters.
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            added: 0,
            subtracted: 0,
        }
    }

    /// Lowercased key.
    pub fn normalized(&self) -> String {
        normalize(&self.name)
    }

    /// `added - subtracted`, saturating at the `i64` bounds.
    #[allow(clippy::cast_possible_truncation, clippy::cast_lossless)]
    pub const fn total(&self) -> i64 {
        let total = self.added as i128 - self.subtracted as i128;
        if total > i64::MAX as i128 {
            i64::MAX
        } else if total < i64::MIN as i128 {
            i64::MIN
        } else {
            total as i64
        }
    }

    /// `added + subtracted`.
    pub const fn activity(&self) -> u64 {
        self.added.saturating_add(self.subtracted)
    }
}

/// Ordering used by `most`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MostKind {
    /// By `added`.
    Increased,
    /// By `subtracted`.
    Decreased,
    /// By `added + subtracted`.
    Active,
}

impl MostKind {
    const ALL: [(&'static str, Self); 3] = [
        ("increased", Self::Increased),
        ("decreased", Self::Decreased),
        ("active", Self::Active),
    ];

    /// Metric of `entry` under this ordering.
    pub const fn metric(self, entry: &KarmaEntry) -> u64 {
        match self {
            Self::Increased => entry.added,
            Self::Decreased => entry.subtracted,
            Self::Active => entry.activity(),
        }
    }

    /// Canonical name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Increased => "increased",
            Self::Decreased => "decreased",
            Self::Active => "active",
        }
    }
}

/// Accepts the full kind name or any unambiguous prefix of it.
impl FromStr for MostKind {
    type Err = KarmaError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        let mut matches = Self::ALL
            .iter()
            .filter(|(name, _)| !wanted.is_empty() && name.starts_with(&wanted));
        match (matches.next(), matches.next()) {
            (Some((_, kind)), None) => Ok(*kind),
            _ => Err(KarmaError::invalid_argument(format!(
                "invalid kind '{s}', expected increased, decreased or active"
            ))),
        }
    }
}

/// Answer to a multi-name lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KarmaSummary {
    /// Known names with their totals, highest first.
    pub known: Vec<(String, i64)>,
    /// Requested names without an entry, sorted.
    pub neutral: Vec<String>,
}

/// Storage primitives a backend provides. All methods are scoped to one
/// channel; channels never share entries.
///
/// Names passed to `adjust` are display names; names passed to `get` and
/// `clear` are already normalized.
pub trait KarmaBackend: Send + Sync {
    /// Add to the counters of `name`, creating the entry if absent. Both
    /// counters move in a single atomic write.
    fn adjust(&self, channel: &str, name: &str, added: u64, subtracted: u64) -> Result<KarmaEntry>;

    /// Point lookup by normalized name.
    fn get(&self, channel: &str, normalized: &str) -> Result<Option<KarmaEntry>>;

    /// Every entry of the channel in storage order.
    fn entries(&self, channel: &str) -> Result<Vec<KarmaEntry>>;

    /// Number of entries in the channel.
    fn size(&self, channel: &str) -> Result<usize> {
        Ok(self.entries(channel)?.len())
    }

    /// Zero both counters; returns whether the entry existed.
    fn clear(&self, channel: &str, normalized: &str) -> Result<bool>;

    /// Drop every entry of the channel and insert `rows` in order. Later rows
    /// whose normalized name was already inserted are skipped. Returns the
    /// number of rows inserted.
    fn replace_all(&self, channel: &str, rows: Vec<KarmaRow>) -> Result<usize>;

    /// Make all writes durable.
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Query facade over a backend.
#[derive(Clone)]
pub struct KarmaStore {
    backend: Arc<dyn KarmaBackend>,
}

impl std::fmt::Debug for KarmaStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KarmaStore").finish_non_exhaustive()
    }
}

impl KarmaStore {
    /// Wrap an existing backend.
    pub fn new(backend: Arc<dyn KarmaBackend>) -> Self {
        Self { backend }
    }

    /// Construct the backend named by the configuration.
    pub fn open(config: &KarmaConfig) -> Self {
        let backend: Arc<dyn KarmaBackend> = match config.backend {
            BackendKind::Sled => Arc::new(SledBackend::new(&config.data_dir)),
            BackendKind::Memory => Arc::new(MemoryBackend::new()),
        };
        Self::new(backend)
    }

    /// A store backed by process memory.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// `added += 1` for `name`.
    pub fn increment(&self, channel: &str, name: &str) -> Result<()> {
        self.backend.adjust(channel, name, 1, 0).map(drop)
    }

    /// `subtracted += 1` for `name`.
    pub fn decrement(&self, channel: &str, name: &str) -> Result<()> {
        self.backend.adjust(channel, name, 0, 1).map(drop)
    }

    /// Apply several increments and decrements in one write.
    pub fn adjust(&self, channel: &str, name: &str, added: u64, subtracted: u64) -> Result<KarmaEntry> {
        self.backend.adjust(channel, name, added, subtracted)
    }

    /// `(added, subtracted)` for `name`, compared case-insensitively.
    pub fn get(&self, channel: &str, name: &str) -> Result<Option<(u64, u64)>> {
        Ok(self
            .backend
            .get(channel, &normalize(name))?
            .map(|e| (e.added, e.subtracted)))
    }

    /// Full entry for `name`.
    pub fn entry(&self, channel: &str, name: &str) -> Result<Option<KarmaEntry>> {
        self.backend.get(channel, &normalize(name))
    }

    /// Totals for several names, plus the names nobody has rated.
    pub fn get_many<S: AsRef<str>>(&self, channel: &str, names: &[S]) -> Result<KarmaSummary> {
        let mut seen = HashSet::new();
        let wanted: Vec<(String, &str)> = names
            .iter()
            .map(AsRef::as_ref)
            .filter(|n| seen.insert(normalize(n)))
            .map(|n| (normalize(n), n))
            .collect();

        let mut found = HashSet::new();
        let mut known: Vec<KarmaEntry> = Vec::new();
        for (key, _) in &wanted {
            if let Some(entry) = self.backend.get(channel, key)? {
                found.insert(key.clone());
                known.push(entry);
            }
        }
        known.sort_by_key(|e| e.id);
        known.sort_by_key(|e| std::cmp::Reverse(e.total()));

        let mut neutral: Vec<String> = wanted
            .into_iter()
            .filter(|(key, _)| !found.contains(key))
            .map(|(_, name)| name.to_string())
            .collect();
        neutral.sort();

        Ok(KarmaSummary {
            known: known.into_iter().map(|e| (e.name.clone(), e.total())).collect(),
            neutral,
        })
    }

    /// Highest totals first; ties keep storage order.
    pub fn top(&self, channel: &str, limit: usize) -> Result<Vec<(String, i64)>> {
        Ok(self
            .by_total_desc(channel)?
            .into_iter()
            .take(limit)
            .map(|e| {
                let total = e.total();
                (e.name, total)
            })
            .collect())
    }

    /// Lowest totals first; ties keep storage order.
    pub fn bottom(&self, channel: &str, limit: usize) -> Result<Vec<(String, i64)>> {
        let mut entries = self.backend.entries(channel)?;
        entries.sort_by_key(KarmaEntry::total);
        Ok(entries
            .into_iter()
            .take(limit)
            .map(|e| {
                let total = e.total();
                (e.name, total)
            })
            .collect())
    }

    /// One more than the number of entries with a strictly greater total, so
    /// tied names share a rank.
    pub fn rank(&self, channel: &str, name: &str) -> Result<Option<usize>> {
        let Some(target) = self.backend.get(channel, &normalize(name))? else {
            return Ok(None);
        };
        let total = target.total();
        let above = self
            .backend
            .entries(channel)?
            .iter()
            .filter(|e| e.total() > total)
            .count();
        Ok(Some(above + 1))
    }

    /// Number of entries in the channel.
    pub fn size(&self, channel: &str) -> Result<usize> {
        self.backend.size(channel)
    }

    /// Entries with the largest metric for `kind`; ties keep storage order.
    pub fn most(&self, channel: &str, kind: MostKind, limit: usize) -> Result<Vec<(String, u64)>> {
        let mut entries = self.backend.entries(channel)?;
        entries.sort_by_key(|e| std::cmp::Reverse(kind.metric(e)));
        Ok(entries
            .into_iter()
            .take(limit)
            .map(|e| {
                let metric = kind.metric(&e);
                (e.name, metric)
            })
            .collect())
    }

    /// Zero both counters of `name`; absent names are left alone.
    pub fn clear(&self, channel: &str, name: &str) -> Result<()> {
        self.backend.clear(channel, &normalize(name)).map(drop)
    }

    /// Every entry in storage order.
    pub fn entries(&self, channel: &str) -> Result<Vec<KarmaEntry>> {
        self.backend.entries(channel)
    }

    /// Write the channel to `path` as CSV; returns the row count.
    pub fn dump(&self, channel: &str, path: &Path) -> Result<usize> {
        let entries = self.backend.entries(channel)?;
        transfer::write_csv(path, &entries)?;
        info!(channel, path = %path.display(), rows = entries.len(), "Dumped karma");
        Ok(entries.len())
    }

    /// Replace the channel with the rows of the CSV file at `path`. The file
    /// is fully validated before anything is written.
    pub fn load(&self, channel: &str, path: &Path) -> Result<usize> {
        let rows = transfer::read_csv(path)?;
        let inserted = self.backend.replace_all(channel, rows)?;
        info!(channel, path = %path.display(), rows = inserted, "Loaded karma");
        Ok(inserted)
    }

    /// Make all writes durable.
    pub fn flush(&self) -> Result<()> {
        self.backend.flush()
    }

    fn by_total_desc(&self, channel: &str) -> Result<Vec<KarmaEntry>> {
        let mut entries = self.backend.entries(channel)?;
        entries.sort_by_key(|e| std::cmp::Reverse(e.total()));
        Ok(entries)
    }
}
