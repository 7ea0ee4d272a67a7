use crate::history::context::HistoryContext;
use crate::history::entry::HistoryEntry;
use crate::history::error::{HistoryError, StorageError};
use crate::history::source::BatterySource;
use std::sync::Arc;

/// Read and clear access to the history for the RPC layer.
#[derive(Clone)]
pub struct QueryService {
    ctx: Arc<HistoryContext>,
    source: Arc<dyn BatterySource>,
}

impl QueryService {
    pub fn new(ctx: Arc<HistoryContext>, source: Arc<dyn BatterySource>) -> Self {
        Self { ctx, source }
    }

    /// Live reading from the telemetry source; never cached.
    pub fn get_current_level(&self) -> u8 {
        self.source.current_level()
    }

    pub fn get_count(&self) -> usize {
        self.ctx.count()
    }

    pub fn capacity(&self) -> usize {
        self.ctx.capacity()
    }

    /// The oldest `min(count, max)` entries.
    pub fn get_entries(&self, max: usize) -> Result<Vec<HistoryEntry>, HistoryError> {
        if max == 0 {
            return Err(HistoryError::InvalidArgument(
                "max entries must be positive".into(),
            ));
        }
        Ok(self.ctx.entries(max))
    }

    /// Clear the history and persist the empty state.
    ///
    /// The in-memory clear stands even when the write fails.
    pub fn clear(&self) -> Result<(), StorageError> {
        let snapshot = self.ctx.clear();
        self.ctx.persist(&snapshot)?;
        tracing::info!("battery history cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::source::FixedBatterySource;
    use crate::history::store::MemoryKvStore;
    use std::convert::Infallible;

    const NS: &str = "battery_history";

    fn service_with(levels: &[u8]) -> (QueryService, Arc<MemoryKvStore>, Arc<FixedBatterySource>) {
        let store = Arc::new(MemoryKvStore::new());
        let ctx = Arc::new(HistoryContext::init(8, NS, store.clone()).unwrap());
        for (i, level) in levels.iter().enumerate() {
            let (_, snapshot) = ctx
                .record(|_| Ok::<_, Infallible>(HistoryEntry::new(i as u32, *level)))
                .unwrap();
            ctx.persist(&snapshot).unwrap();
        }
        let source = Arc::new(FixedBatterySource::new(66));
        (QueryService::new(ctx, source.clone()), store, source)
    }

    #[test]
    fn current_level_is_read_live() {
        let (service, _, source) = service_with(&[]);
        assert_eq!(service.get_current_level(), 66);
        source.set(12);
        assert_eq!(service.get_current_level(), 12);
    }

    #[test]
    fn get_entries_caps_at_max_oldest_first() {
        let (service, _, _) = service_with(&[90, 80, 70]);
        assert_eq!(service.get_count(), 3);
        let two = service.get_entries(2).unwrap();
        assert_eq!(two, vec![HistoryEntry::new(0, 90), HistoryEntry::new(1, 80)]);
        assert_eq!(service.get_entries(100).unwrap().len(), 3);
    }

    #[test]
    fn zero_max_is_invalid_argument() {
        let (service, _, _) = service_with(&[90]);
        assert!(matches!(
            service.get_entries(0),
            Err(HistoryError::InvalidArgument(_))
        ));
        assert_eq!(service.get_count(), 1);
    }

    #[test]
    fn clear_empties_memory_and_storage() {
        let (service, store, _) = service_with(&[90, 80]);
        service.clear().unwrap();
        assert_eq!(service.get_count(), 0);

        let reloaded = HistoryContext::init(8, NS, store).unwrap();
        assert_eq!(reloaded.count(), 0);
    }

    #[test]
    fn clear_surfaces_storage_failure_but_still_clears() {
        let (service, store, _) = service_with(&[90, 80]);
        store.fail_writes_to("battery_history/count", true);
        assert!(service.clear().is_err());
        assert_eq!(service.get_count(), 0);
        assert_eq!(
            HistoryContext::init(8, NS, store).unwrap().count(),
            2
        );
    }
}
