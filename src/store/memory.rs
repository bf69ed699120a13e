//! In-memory karma storage, for tests and throwaway sessions.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{normalize, KarmaBackend, KarmaEntry, KarmaRow};
use crate::error::Result;
use crate::host::irc_lower;

#[derive(Debug, Default)]
struct Table {
    rows: HashMap<String, KarmaEntry>,
}

/// Backend keeping every channel in process memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    channels: Mutex<HashMap<String, Table>>,
    next_id: Mutex<u64>,
}

impl MemoryBackend {
    /// Empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, HashMap<String, Table>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_id(&self) -> u64 {
        let mut id = self.next_id.lock().unwrap_or_else(PoisonError::into_inner);
        *id += 1;
        *id
    }
}

impl KarmaBackend for MemoryBackend {
    fn adjust(&self, channel: &str, name: &str, added: u64, subtracted: u64) -> Result<KarmaEntry> {
        let mut tables = self.tables();
        let table = tables.entry(irc_lower(channel)).or_default();
        let entry = table
            .rows
            .entry(normalize(name))
            .or_insert_with(|| KarmaEntry::new(self.next_id(), name));
        entry.added = entry.added.saturating_add(added);
        entry.subtracted = entry.subtracted.saturating_add(subtracted);
        Ok(entry.clone())
    }

    fn get(&self, channel: &str, normalized: &str) -> Result<Option<KarmaEntry>> {
        Ok(self
            .tables()
            .get(&irc_lower(channel))
            .and_then(|t| t.rows.get(normalized).cloned()))
    }

    fn entries(&self, channel: &str) -> Result<Vec<KarmaEntry>> {
        let mut entries: Vec<KarmaEntry> = self
            .tables()
            .get(&irc_lower(channel))
            .map(|t| t.rows.values().cloned().collect())
            .unwrap_or_default();
        entries.sort_by_key(|e| e.id);
        Ok(entries)
    }

    fn size(&self, channel: &str) -> Result<usize> {
        Ok(self.tables().get(&irc_lower(channel)).map_or(0, |t| t.rows.len()))
    }

    fn clear(&self, channel: &str, normalized: &str) -> Result<bool> {
        let mut tables = self.tables();
        let Some(entry) = tables
            .get_mut(&irc_lower(channel))
            .and_then(|t| t.rows.get_mut(normalized))
        else {
            return Ok(false);
        };
        entry.added = 0;
        entry.subtracted = 0;
        Ok(true)
    }

    fn replace_all(&self, channel: &str, rows: Vec<KarmaRow>) -> Result<usize> {
        let mut fresh = Table::default();
        let mut seen = HashSet::new();
        for row in rows {
            let key = normalize(&row.name);
            if !seen.insert(key.clone()) {
                continue;
            }
            fresh.rows.insert(
                key,
                KarmaEntry {
                    id: self.next_id(),
                    name: row.name,
                    added: row.added,
                    subtracted: row.subtracted,
                },
            );
        }
        let inserted = fresh.rows.len();
        self.tables().insert(irc_lower(channel), fresh);
        Ok(inserted)
    }
}
