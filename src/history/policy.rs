use crate::history::clock::Clock;
use crate::history::context::HistoryContext;
use crate::history::entry::{HistoryEntry, MAX_LEVEL};
use crate::history::relay::{RelayRole, StreamReport};
use crate::history::source::BatterySource;
use crate::history::trigger::{RecordingTrigger, TriggerSubscriber};
use std::sync::Arc;

/// Default minimum level delta for change-triggered entries.
pub const DEFAULT_CHANGE_THRESHOLD: u8 = 5;

/// Result of handling one trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Stored(HistoryEntry),
    BelowThreshold { level: u8, last: u8 },
}

/// Decides which samples become history entries.
///
/// Periodic ticks always record the current reading; level changes record
/// only when the buffer is empty or the level moved by at least `threshold`
/// from the newest entry. Every stored entry is persisted and relayed.
pub struct RecordingPolicy {
    ctx: Arc<HistoryContext>,
    source: Arc<dyn BatterySource>,
    clock: Arc<dyn Clock>,
    relay: Arc<dyn RelayRole>,
    threshold: u8,
}

impl RecordingPolicy {
    pub fn new(
        ctx: Arc<HistoryContext>,
        source: Arc<dyn BatterySource>,
        clock: Arc<dyn Clock>,
        relay: Arc<dyn RelayRole>,
        threshold: u8,
    ) -> Self {
        Self {
            ctx,
            source,
            clock,
            relay,
            threshold,
        }
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    pub fn handle(&self, trigger: &RecordingTrigger) -> RecordOutcome {
        let (level, unconditional) = match *trigger {
            RecordingTrigger::PeriodicTick => (self.source.current_level(), true),
            RecordingTrigger::LevelChanged(level) => {
                tracing::debug!("battery state changed: {level}%");
                (level.min(MAX_LEVEL), false)
            }
        };

        let recorded = self.ctx.record(|last| {
            if let (false, Some(last)) = (unconditional, last) {
                if level.abs_diff(last.level) < self.threshold {
                    return Err(last.level);
                }
            }
            // Stamped under the lock so stored timestamps never go backwards.
            Ok(HistoryEntry::new(self.clock.now_secs(), level))
        });

        let (entry, snapshot) = match recorded {
            Ok(stored) => stored,
            Err(last) => return RecordOutcome::BelowThreshold { level, last },
        };
        tracing::debug!(
            "added battery history entry: {}% at timestamp {} (total: {})",
            entry.level,
            entry.timestamp,
            snapshot.entries.len()
        );

        if let Err(e) = self.ctx.persist(&snapshot) {
            tracing::error!("failed to save battery history: {e}");
        }
        let report = self.relay.stream(&snapshot.entries);
        if report.failed > 0 {
            tracing::warn!(
                "relay stream dropped {} of {} chunks",
                report.failed,
                report.failed + report.sent
            );
        }

        RecordOutcome::Stored(entry)
    }

    /// Re-send the whole buffer on request, without recording anything.
    pub fn trigger_send(&self) -> StreamReport {
        let snapshot = self.ctx.snapshot();
        tracing::info!(
            "sending {} battery history entries on request",
            snapshot.entries.len()
        );
        self.relay.stream(&snapshot.entries)
    }
}

impl TriggerSubscriber for RecordingPolicy {
    fn on_trigger(&self, trigger: &RecordingTrigger) {
        self.handle(trigger);
    }

    fn name(&self) -> &str {
        "recording-policy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::clock::testing::ManualClock;
    use crate::history::error::{NotifyError, RelayError};
    use crate::history::relay::{chunks, NotificationSink, Receiver, RelayChunk, Role};
    use crate::history::source::FixedBatterySource;
    use crate::history::store::MemoryKvStore;
    use crate::history::trigger::TriggerBus;
    use parking_lot::Mutex;

    const NS: &str = "battery_history";

    /// Relay role that remembers every stream it was asked to send.
    #[derive(Default)]
    struct RecordingRelay(Mutex<Vec<Vec<HistoryEntry>>>);

    impl RelayRole for RecordingRelay {
        fn role(&self) -> Role {
            Role::Reporting
        }

        fn stream(&self, entries: &[HistoryEntry]) -> StreamReport {
            self.0.lock().push(entries.to_vec());
            StreamReport {
                sent: entries.len(),
                failed: 0,
            }
        }

        fn on_frame(&self, _frame: &[u8]) -> Result<(), RelayError> {
            Err(RelayError::UnexpectedInbound)
        }
    }

    struct Harness {
        store: Arc<MemoryKvStore>,
        ctx: Arc<HistoryContext>,
        source: Arc<FixedBatterySource>,
        clock: Arc<ManualClock>,
        relay: Arc<RecordingRelay>,
        policy: RecordingPolicy,
    }

    fn harness(capacity: usize) -> Harness {
        let store = Arc::new(MemoryKvStore::new());
        let ctx = Arc::new(HistoryContext::init(capacity, NS, store.clone()).unwrap());
        let source = Arc::new(FixedBatterySource::new(75));
        let clock = Arc::new(ManualClock::at(100));
        let relay = Arc::new(RecordingRelay::default());
        let policy = RecordingPolicy::new(
            ctx.clone(),
            source.clone(),
            clock.clone(),
            relay.clone(),
            DEFAULT_CHANGE_THRESHOLD,
        );
        Harness {
            store,
            ctx,
            source,
            clock,
            relay,
            policy,
        }
    }

    fn levels(ctx: &HistoryContext) -> Vec<u8> {
        ctx.entries(usize::MAX).iter().map(|e| e.level).collect()
    }

    #[test]
    fn change_threshold_filters_small_moves() {
        let h = harness(16);
        for level in [80, 83, 90, 88] {
            h.policy.handle(&RecordingTrigger::LevelChanged(level));
            h.clock.advance(1);
        }
        assert_eq!(levels(&h.ctx), vec![80, 90]);
    }

    #[test]
    fn threshold_applies_in_both_directions_and_at_the_boundary() {
        let h = harness(16);
        assert!(matches!(
            h.policy.handle(&RecordingTrigger::LevelChanged(50)),
            RecordOutcome::Stored(_)
        ));
        assert_eq!(
            h.policy.handle(&RecordingTrigger::LevelChanged(46)),
            RecordOutcome::BelowThreshold { level: 46, last: 50 }
        );
        assert!(matches!(
            h.policy.handle(&RecordingTrigger::LevelChanged(45)),
            RecordOutcome::Stored(_)
        ));
        assert!(matches!(
            h.policy.handle(&RecordingTrigger::LevelChanged(50)),
            RecordOutcome::Stored(_)
        ));
        assert_eq!(levels(&h.ctx), vec![50, 45, 50]);
    }

    #[test]
    fn periodic_tick_always_records_current_reading() {
        let h = harness(16);
        h.policy.handle(&RecordingTrigger::LevelChanged(80));
        h.source.set(81);
        h.policy.handle(&RecordingTrigger::PeriodicTick);
        h.policy.handle(&RecordingTrigger::PeriodicTick);
        h.policy.handle(&RecordingTrigger::LevelChanged(83));
        assert_eq!(levels(&h.ctx), vec![80, 81, 81]);
    }

    #[test]
    fn timestamps_come_from_the_clock() {
        let h = harness(16);
        h.policy.handle(&RecordingTrigger::LevelChanged(90));
        h.clock.advance(3600);
        let outcome = h.policy.handle(&RecordingTrigger::PeriodicTick);
        assert_eq!(outcome, RecordOutcome::Stored(HistoryEntry::new(3700, 75)));
        assert_eq!(h.ctx.entries(1)[0].timestamp, 100);
    }

    #[test]
    fn out_of_range_levels_are_clamped() {
        let h = harness(4);
        h.policy.handle(&RecordingTrigger::LevelChanged(200));
        assert_eq!(levels(&h.ctx), vec![100]);
    }

    #[test]
    fn every_append_is_persisted_and_relayed() {
        let h = harness(2);
        h.policy.handle(&RecordingTrigger::LevelChanged(90));
        h.policy.handle(&RecordingTrigger::LevelChanged(50));
        h.policy.handle(&RecordingTrigger::LevelChanged(10));
        h.policy.handle(&RecordingTrigger::LevelChanged(12));

        let blob = h.ctx.codec().decode(h.store.as_ref()).unwrap();
        assert_eq!(blob.count, 2);
        assert_eq!(
            blob.entries.iter().map(|e| e.level).collect::<Vec<_>>(),
            vec![50, 10]
        );

        let streams = h.relay.0.lock();
        let lens: Vec<_> = streams.iter().map(Vec::len).collect();
        assert_eq!(lens, vec![1, 2, 2]);
        assert_eq!(streams[2].iter().map(|e| e.level).collect::<Vec<_>>(), vec![50, 10]);
    }

    #[test]
    fn persistence_failure_does_not_roll_back_append() {
        let h = harness(4);
        h.store.fail_writes_to("battery_history/count", true);
        h.policy.handle(&RecordingTrigger::LevelChanged(60));
        assert_eq!(levels(&h.ctx), vec![60]);
        assert_eq!(h.ctx.codec().decode(h.store.as_ref()).unwrap().count, 0);

        h.store.fail_writes_to("battery_history/count", false);
        h.policy.handle(&RecordingTrigger::PeriodicTick);
        assert_eq!(h.ctx.codec().decode(h.store.as_ref()).unwrap().count, 2);
    }

    #[test]
    fn trigger_send_streams_without_recording() {
        let h = harness(4);
        h.policy.handle(&RecordingTrigger::LevelChanged(60));
        let report = h.policy.trigger_send();
        assert_eq!(report.sent, 1);
        assert_eq!(h.ctx.count(), 1);
        assert_eq!(h.relay.0.lock().len(), 2);
    }

    #[test]
    fn subscribes_through_the_trigger_bus() {
        let h = harness(4);
        let policy = Arc::new(h.policy);
        let bus = TriggerBus::new();
        bus.register(policy.clone());
        bus.publish(&RecordingTrigger::LevelChanged(30));
        bus.publish(&RecordingTrigger::PeriodicTick);
        assert_eq!(levels(&h.ctx), vec![30, 75]);
    }

    #[test]
    fn receiver_role_records_locally_without_streaming() {
        #[derive(Default)]
        struct Sink(Mutex<Vec<RelayChunk>>);
        impl NotificationSink for Sink {
            fn notify(&self, chunk: &RelayChunk) -> Result<(), NotifyError> {
                self.0.lock().push(*chunk);
                Ok(())
            }
        }

        let store = Arc::new(MemoryKvStore::new());
        let ctx = Arc::new(HistoryContext::init(4, NS, store).unwrap());
        let sink = Arc::new(Sink::default());
        let policy = RecordingPolicy::new(
            ctx.clone(),
            Arc::new(FixedBatterySource::new(40)),
            Arc::new(ManualClock::at(0)),
            Arc::new(Receiver::new(sink.clone())),
            DEFAULT_CHANGE_THRESHOLD,
        );
        policy.handle(&RecordingTrigger::PeriodicTick);
        assert_eq!(ctx.count(), 1);
        assert_eq!(policy.trigger_send(), StreamReport::default());
        assert!(sink.0.lock().is_empty());
        assert_eq!(chunks(&ctx.entries(4)).count(), 1);
    }

    #[test]
    fn concurrent_triggers_never_break_capacity_or_tear_entries() {
        let h = harness(8);
        let policy = Arc::new(h.policy);
        let mut workers = Vec::new();
        for worker in 0..4u8 {
            let policy = policy.clone();
            let ctx = h.ctx.clone();
            workers.push(std::thread::spawn(move || {
                for i in 0..200u32 {
                    let trigger = if (i + u32::from(worker)) % 3 == 0 {
                        RecordingTrigger::PeriodicTick
                    } else {
                        RecordingTrigger::LevelChanged(((i * 7 + u32::from(worker) * 13) % 101) as u8)
                    };
                    policy.handle(&trigger);
                    let count = ctx.count();
                    assert!(count <= 8);
                }
            }));
        }
        for worker in workers {
            worker.join().unwrap();
        }

        let entries = h.ctx.entries(usize::MAX);
        assert_eq!(entries.len(), 8);
        assert!(entries.iter().all(|e| e.level <= 100));
        assert!(entries.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(h.ctx.codec().decode(h.store.as_ref()).unwrap().entries, entries);
    }
}
