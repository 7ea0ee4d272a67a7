use crate::history::buffer::HistoryBuffer;
use crate::history::codec::PersistenceCodec;
use crate::history::entry::HistoryEntry;
use crate::history::error::{HistoryError, StorageError};
use crate::history::store::KvStore;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::Arc;

/// Copy of the buffer taken under the lock, handed to storage and relay I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Mutation counter at the time of the copy.
    pub revision: u64,
    pub entries: Vec<HistoryEntry>,
}

/// What startup found in persistent storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    Empty,
    Restored { count: usize },
    CapacityExceeded { declared: usize, capacity: usize },
    Corrupt { reason: String },
}

impl fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("nothing stored"),
            Self::Restored { count } => write!(f, "restored {count}"),
            Self::CapacityExceeded { declared, capacity } => {
                write!(f, "discarded {declared} stored entries over capacity {capacity}")
            }
            Self::Corrupt { reason } => write!(f, "discarded unreadable history: {reason}"),
        }
    }
}

struct State {
    buffer: HistoryBuffer,
    revision: u64,
}

impl State {
    fn snapshot(&self) -> Snapshot {
        Snapshot {
            revision: self.revision,
            entries: self.buffer.entries().collect(),
        }
    }
}

/// Owned history state shared by the recorder and the query surface.
///
/// Mutations and snapshots go through one `RwLock`; storage writes happen
/// outside it and are ordered by snapshot revision so an older snapshot
/// never overwrites a newer one.
pub struct HistoryContext {
    codec: PersistenceCodec,
    store: Arc<dyn KvStore>,
    state: RwLock<State>,
    persisted_revision: Mutex<Option<u64>>,
    load_status: LoadStatus,
}

impl HistoryContext {
    /// Create the buffer and populate it from storage.
    ///
    /// Only an invalid `capacity` fails; unreadable or over-capacity
    /// persisted state is logged and leaves the history empty.
    pub fn init(
        capacity: usize,
        namespace: &str,
        store: Arc<dyn KvStore>,
    ) -> Result<Self, HistoryError> {
        let mut buffer = HistoryBuffer::with_capacity(capacity)?;
        let codec = PersistenceCodec::new(namespace, capacity);

        let load_status = match codec.decode(store.as_ref()) {
            Ok(blob) if blob.count == 0 => LoadStatus::Empty,
            Ok(blob) => {
                let declared = blob.count as usize;
                match buffer.load_from(blob.entries, declared) {
                    Ok(count) => {
                        if count < declared {
                            tracing::warn!(
                                "battery history declared {declared} entries but only {count} were stored"
                            );
                        }
                        tracing::info!("loaded {count} battery history entries from storage");
                        LoadStatus::Restored { count }
                    }
                    Err(HistoryError::CapacityExceeded { declared, capacity }) => {
                        tracing::warn!(
                            "persisted battery history has {declared} entries, capacity is {capacity}; starting empty"
                        );
                        LoadStatus::CapacityExceeded { declared, capacity }
                    }
                    Err(e) => LoadStatus::Corrupt {
                        reason: e.to_string(),
                    },
                }
            }
            Err(e) => {
                tracing::warn!("ignoring unreadable battery history: {e}");
                LoadStatus::Corrupt {
                    reason: e.to_string(),
                }
            }
        };

        Ok(Self {
            codec,
            store,
            state: RwLock::new(State { buffer, revision: 0 }),
            persisted_revision: Mutex::new(None),
            load_status,
        })
    }

    pub fn load_status(&self) -> &LoadStatus {
        &self.load_status
    }

    pub fn codec(&self) -> &PersistenceCodec {
        &self.codec
    }

    pub fn capacity(&self) -> usize {
        self.state.read().buffer.capacity()
    }

    pub fn count(&self) -> usize {
        self.state.read().buffer.count()
    }

    /// Up to `max` entries, oldest first.
    pub fn entries(&self, max: usize) -> Vec<HistoryEntry> {
        self.state.read().buffer.entries().take(max).collect()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.state.read().snapshot()
    }

    /// Append the entry chosen by `decide`, all under the write lock.
    ///
    /// `decide` sees the newest stored entry and either returns the entry to
    /// append or a rejection value that is passed back unchanged.
    pub fn record<F, R>(&self, decide: F) -> Result<(HistoryEntry, Snapshot), R>
    where
        F: FnOnce(Option<&HistoryEntry>) -> Result<HistoryEntry, R>,
    {
        let mut state = self.state.write();
        let entry = decide(state.buffer.last())?;
        state.buffer.append(entry);
        state.revision += 1;
        Ok((entry, state.snapshot()))
    }

    /// Empty the buffer. Persisting the result is up to the caller.
    pub fn clear(&self) -> Snapshot {
        let mut state = self.state.write();
        state.buffer.clear();
        state.revision += 1;
        state.snapshot()
    }

    /// Write `snapshot` to storage unless a newer one already made it there.
    pub fn persist(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        let mut persisted = self.persisted_revision.lock();
        if persisted.is_some_and(|rev| snapshot.revision < rev) {
            tracing::debug!(
                "skipping stale battery history snapshot r{}",
                snapshot.revision
            );
            return Ok(());
        }
        let blob = self.codec.encode(snapshot.entries.iter().copied());
        self.codec.save(&blob, self.store.as_ref())?;
        *persisted = Some(snapshot.revision);
        Ok(())
    }

    /// Persist the final state before shutdown.
    pub fn teardown(&self) -> Result<(), StorageError> {
        let snapshot = self.snapshot();
        self.persist(&snapshot)?;
        tracing::info!(
            "battery history saved on shutdown ({} entries)",
            snapshot.entries.len()
        );
        Ok(())
    }
}
