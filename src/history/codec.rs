//! Fixed-layout persistence of the history buffer.
//!
//! Two keys under a namespace:
//! - `<ns>/count`: `u32` little-endian, the number of live entries
//! - `<ns>/entries`: packed `{u32 timestamp, u8 level}` records, oldest first

use crate::history::entry::{HistoryEntry, ENTRY_SIZE};
use crate::history::error::{DecodeError, StorageError};
use crate::history::store::KvStore;

/// Width of the persisted count scalar.
pub const COUNT_WIDTH: usize = std::mem::size_of::<u32>();

/// Canonical persisted form of the buffer.
///
/// `count` is the declared count read from storage. After a decode it can
/// exceed `entries.len()` when the entries blob is short, so the loader can
/// still reject an over-capacity declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedBlob {
    pub count: u32,
    pub entries: Vec<HistoryEntry>,
}

impl PersistedBlob {
    pub fn entries_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.entries.len() * ENTRY_SIZE);
        for entry in &self.entries {
            out.extend_from_slice(&entry.to_bytes());
        }
        out
    }
}

/// Encoder/decoder bound to one namespace and buffer capacity.
#[derive(Debug, Clone)]
pub struct PersistenceCodec {
    count_key: String,
    entries_key: String,
    capacity: usize,
}

impl PersistenceCodec {
    pub fn new(namespace: &str, capacity: usize) -> Self {
        Self {
            count_key: format!("{namespace}/count"),
            entries_key: format!("{namespace}/entries"),
            capacity,
        }
    }

    pub fn count_key(&self) -> &str {
        &self.count_key
    }

    pub fn entries_key(&self) -> &str {
        &self.entries_key
    }

    /// Upper bound on the entries blob.
    pub fn max_entries_len(&self) -> usize {
        self.capacity * ENTRY_SIZE
    }

    pub fn encode<I>(&self, entries: I) -> PersistedBlob
    where
        I: IntoIterator<Item = HistoryEntry>,
    {
        let entries: Vec<HistoryEntry> = entries.into_iter().take(self.capacity).collect();
        PersistedBlob {
            count: entries.len() as u32,
            entries,
        }
    }

    /// Read the persisted blob back. A missing count key means first run.
    pub fn decode(&self, store: &dyn KvStore) -> Result<PersistedBlob, DecodeError> {
        let Some(raw_count) = store.read(&self.count_key)? else {
            return Ok(PersistedBlob::default());
        };
        let count_bytes: [u8; COUNT_WIDTH] =
            raw_count
                .as_slice()
                .try_into()
                .map_err(|_| DecodeError::SizeMismatch {
                    key: self.count_key.clone(),
                    expected: COUNT_WIDTH,
                    actual: raw_count.len(),
                })?;
        let count = u32::from_le_bytes(count_bytes);

        let raw_entries = store.read(&self.entries_key)?.unwrap_or_default();
        if raw_entries.len() > self.max_entries_len() {
            return Err(DecodeError::OversizedPayload {
                key: self.entries_key.clone(),
                len: raw_entries.len(),
                max: self.max_entries_len(),
            });
        }
        if raw_entries.len() % ENTRY_SIZE != 0 {
            return Err(DecodeError::MisalignedPayload {
                key: self.entries_key.clone(),
                len: raw_entries.len(),
            });
        }

        // Bytes past `count` entries are leftovers of an earlier, longer save.
        let entries = raw_entries
            .chunks_exact(ENTRY_SIZE)
            .take(count as usize)
            .map(|chunk| {
                let mut packed = [0u8; ENTRY_SIZE];
                packed.copy_from_slice(chunk);
                HistoryEntry::from_bytes(packed)
            })
            .collect();

        Ok(PersistedBlob { count, entries })
    }

    /// Write count then entries. A failed count write skips the entries write.
    pub fn save(&self, blob: &PersistedBlob, store: &dyn KvStore) -> Result<(), StorageError> {
        store.write(&self.count_key, &blob.count.to_le_bytes())?;
        store.write(&self.entries_key, &blob.entries_bytes())?;
        tracing::debug!("saved {} battery history entries to storage", blob.count);
        Ok(())
    }
}
