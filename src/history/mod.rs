pub mod buffer;
pub mod clock;
pub mod codec;
pub mod collector;
pub mod context;
pub mod entry;
pub mod error;
pub mod policy;
pub mod query;
pub mod relay;
pub mod schema;
pub mod source;
pub mod store;
pub mod trigger;

pub use buffer::HistoryBuffer;
pub use clock::{Clock, MonotonicClock};
pub use codec::{PersistedBlob, PersistenceCodec};
pub use context::{HistoryContext, LoadStatus, Snapshot};
pub use entry::HistoryEntry;
pub use error::{DecodeError, HistoryError, StorageError, TransportError};
pub use policy::{RecordOutcome, RecordingPolicy};
pub use query::QueryService;
pub use relay::{RelayChunk, RelayRole, Role};
pub use source::BatterySource;
pub use store::{KvStore, SqliteKvStore};
pub use trigger::{RecordingTrigger, TriggerBus, TriggerSubscriber};
