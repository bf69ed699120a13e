//! Sled-backed karma storage.
//!
//! Each channel gets its own sled database under the data directory, opened
//! on first access and kept open for the life of the backend. Inside a
//! database the `karma` tree maps the normalized name to a bincode-encoded
//! [`KarmaEntry`]; `id` comes from `generate_id` and fixes storage order.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use sled::{Batch, Db, Tree};
use tracing::{debug, info, warn};

use super::{normalize, KarmaBackend, KarmaEntry, KarmaRow};
use crate::error::{KarmaError, Result};
use crate::host::irc_lower;

const KARMA_TREE: &str = "karma";

/// One open channel database.
struct ChannelDb {
    db: Db,
    karma: Tree,
    /// Serializes read-modify-write sequences on this channel.
    write_lock: Mutex<()>,
}

impl ChannelDb {
    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load(&self, normalized: &str) -> Result<Option<KarmaEntry>> {
        self.karma
            .get(normalized.as_bytes())?
            .map(|bytes| bincode::deserialize(&bytes).map_err(KarmaError::from))
            .transpose()
    }

    fn store(&self, normalized: &str, entry: &KarmaEntry) -> Result<()> {
        self.karma
            .insert(normalized.as_bytes(), bincode::serialize(entry)?)?;
        self.karma.flush()?;
        Ok(())
    }
}

/// Durable backend: one sled database per channel.
pub struct SledBackend {
    data_dir: PathBuf,
    temporary: bool,
    channels: RwLock<HashMap<String, Arc<ChannelDb>>>,
}

impl std::fmt::Debug for SledBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledBackend")
            .field("data_dir", &self.data_dir)
            .field("temporary", &self.temporary)
            .finish_non_exhaustive()
    }
}

impl SledBackend {
    /// Backend rooted at `data_dir`. Nothing is opened until a channel is used.
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            temporary: false,
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Backend whose databases are deleted when dropped.
    pub fn temporary(data_dir: impl AsRef<Path>) -> Self {
        Self {
            temporary: true,
            ..Self::new(data_dir)
        }
    }

    /// Database path used for `channel`.
    pub fn channel_path(&self, channel: &str) -> PathBuf {
        self.data_dir.join(channel_file_name(channel))
    }

    /// Channels opened so far.
    pub fn open_channels(&self) -> usize {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn channel(&self, channel: &str) -> Result<Arc<ChannelDb>> {
        let key = channel_file_name(channel);
        if let Some(db) = self
            .channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(Arc::clone(db));
        }

        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(db) = channels.get(&key) {
            return Ok(Arc::clone(db));
        }

        let path = self.data_dir.join(&key);
        let unavailable = |source: sled::Error| KarmaError::StorageUnavailable {
            channel: channel.to_string(),
            source,
        };
        std::fs::create_dir_all(&self.data_dir).map_err(|e| unavailable(sled::Error::Io(e)))?;
        let db = sled::Config::new()
            .path(&path)
            .temporary(self.temporary)
            .open()
            .map_err(unavailable)?;
        let karma = db.open_tree(KARMA_TREE).map_err(unavailable)?;
        info!(channel, path = %path.display(), entries = karma.len(), "Opened channel database");

        let handle = Arc::new(ChannelDb {
            db,
            karma,
            write_lock: Mutex::new(()),
        });
        channels.insert(key, Arc::clone(&handle));
        Ok(handle)
    }
}

impl KarmaBackend for SledBackend {
    fn adjust(&self, channel: &str, name: &str, added: u64, subtracted: u64) -> Result<KarmaEntry> {
        let ch = self.channel(channel)?;
        let key = normalize(name);
        let _guard = ch.lock();

        let mut entry = match ch.load(&key)? {
            Some(entry) => entry,
            None => KarmaEntry::new(ch.db.generate_id()?, name),
        };
        entry.added = entry.added.saturating_add(added);
        entry.subtracted = entry.subtracted.saturating_add(subtracted);
        ch.store(&key, &entry)?;
        debug!(channel, name = %entry.name, added = entry.added, subtracted = entry.subtracted, "Adjusted karma");
        Ok(entry)
    }

    fn get(&self, channel: &str, normalized: &str) -> Result<Option<KarmaEntry>> {
        self.channel(channel)?.load(normalized)
    }

    fn entries(&self, channel: &str) -> Result<Vec<KarmaEntry>> {
        let ch = self.channel(channel)?;
        let mut entries = ch
            .karma
            .iter()
            .values()
            .map(|value| -> Result<KarmaEntry> { Ok(bincode::deserialize(&value?)?) })
            .collect::<Result<Vec<_>>>()?;
        entries.sort_by_key(|e| e.id);
        Ok(entries)
    }

    fn size(&self, channel: &str) -> Result<usize> {
        Ok(self.channel(channel)?.karma.len())
    }

    fn clear(&self, channel: &str, normalized: &str) -> Result<bool> {
        let ch = self.channel(channel)?;
        let _guard = ch.lock();
        let Some(mut entry) = ch.load(normalized)? else {
            return Ok(false);
        };
        entry.added = 0;
        entry.subtracted = 0;
        ch.store(normalized, &entry)?;
        Ok(true)
    }

    fn replace_all(&self, channel: &str, rows: Vec<KarmaRow>) -> Result<usize> {
        let ch = self.channel(channel)?;
        let _guard = ch.lock();

        let mut batch = Batch::default();
        for key in ch.karma.iter().keys() {
            batch.remove(key?);
        }

        let mut seen = HashSet::new();
        for row in rows {
            let key = normalize(&row.name);
            if !seen.insert(key.clone()) {
                warn!(channel, name = %row.name, "Skipping duplicate name in import");
                continue;
            }
            let entry = KarmaEntry {
                id: ch.db.generate_id()?,
                name: row.name,
                added: row.added,
                subtracted: row.subtracted,
            };
            batch.insert(key.as_bytes(), bincode::serialize(&entry)?);
        }

        ch.karma.apply_batch(batch)?;
        ch.karma.flush()?;
        Ok(seen.len())
    }

    fn flush(&self) -> Result<()> {
        let channels: Vec<Arc<ChannelDb>> = self
            .channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for ch in channels {
            ch.db.flush()?;
        }
        Ok(())
    }
}

/// File name of a channel database: the RFC1459-lowercased channel with
/// every byte outside `[a-z0-9#&+!._-]` percent-encoded, plus `.karma`.
pub fn channel_file_name(channel: &str) -> String {
    let mut out = String::with_capacity(channel.len() + 6);
    for byte in irc_lower(channel).bytes() {
        match byte {
            b'a'..=b'z' | b'0'..=b'9' | b'#' | b'&' | b'+' | b'!' | b'.' | b'_' | b'-' => {
                out.push(char::from(byte));
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out.push_str(".karma");
    out
}
