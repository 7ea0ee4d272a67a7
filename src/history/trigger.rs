use parking_lot::RwLock;
use std::sync::Arc;

/// Event that may cause a new history entry to be recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingTrigger {
    /// Fixed-interval sample, always recorded.
    PeriodicTick,
    /// The telemetry source reported a new level.
    LevelChanged(u8),
}

/// Consumer of recording triggers.
pub trait TriggerSubscriber: Send + Sync {
    fn on_trigger(&self, trigger: &RecordingTrigger);

    fn name(&self) -> &str;
}

/// Explicit publish/subscribe hub between trigger producers (timer, telemetry
/// watcher) and their subscribers.
#[derive(Default)]
pub struct TriggerBus {
    subscribers: RwLock<Vec<Arc<dyn TriggerSubscriber>>>,
}

impl TriggerBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, subscriber: Arc<dyn TriggerSubscriber>) {
        tracing::debug!("trigger subscriber registered: {}", subscriber.name());
        self.subscribers.write().push(subscriber);
    }

    /// Deliver `trigger` to every subscriber in registration order.
    pub fn publish(&self, trigger: &RecordingTrigger) {
        // Clone the list so subscribers may register others without deadlocking.
        let subscribers: Vec<_> = self.subscribers.read().clone();
        for subscriber in subscribers {
            subscriber.on_trigger(trigger);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Recorder {
        name: String,
        log: Arc<Mutex<Vec<(String, RecordingTrigger)>>>,
    }

    impl TriggerSubscriber for Recorder {
        fn on_trigger(&self, trigger: &RecordingTrigger) {
            self.log.lock().push((self.name.clone(), *trigger));
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    #[test]
    fn publish_without_subscribers_is_a_noop() {
        let bus = TriggerBus::new();
        bus.publish(&RecordingTrigger::PeriodicTick);
        assert!(bus.subscribers.read().is_empty());
    }

    #[test]
    fn publish_reaches_subscribers_in_registration_order() {
        let bus = TriggerBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for name in ["first", "second"] {
            bus.register(Arc::new(Recorder {
                name: name.into(),
                log: log.clone(),
            }));
        }

        bus.publish(&RecordingTrigger::LevelChanged(42));

        let log = log.lock();
        assert_eq!(
            *log,
            vec![
                ("first".to_string(), RecordingTrigger::LevelChanged(42)),
                ("second".to_string(), RecordingTrigger::LevelChanged(42)),
            ]
        );
    }
}
