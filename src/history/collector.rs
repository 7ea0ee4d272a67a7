use crate::history::policy::RecordingPolicy;
use crate::history::source::BatterySource;
use crate::history::trigger::{RecordingTrigger, TriggerBus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Publish a `PeriodicTick` every `interval`, forever.
///
/// The first tick fires one full interval after start, matching the
/// unconditional re-save cadence.
pub async fn run_periodic_ticks(bus: Arc<TriggerBus>, interval: Duration) {
    let interval = interval.max(Duration::from_millis(1));
    loop {
        tokio::time::sleep(interval).await;
        dispatch(&bus, RecordingTrigger::PeriodicTick).await;
    }
}

/// Poll `source` and publish `LevelChanged` whenever the reading moves.
///
/// The first reading is always published so an empty history gets its
/// bootstrap entry.
pub async fn run_level_watcher(
    source: Arc<dyn BatterySource>,
    bus: Arc<TriggerBus>,
    poll_interval: Duration,
) {
    let poll_interval = poll_interval.max(Duration::from_millis(1));
    let mut last_seen: Option<u8> = None;
    loop {
        let level = source.current_level();
        if last_seen != Some(level) {
            last_seen = Some(level);
            dispatch(&bus, RecordingTrigger::LevelChanged(level)).await;
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// Re-send the whole buffer once per message on `requests`, until every
/// requester is gone. Returns the number of requests served.
pub async fn run_send_requests(
    policy: Arc<RecordingPolicy>,
    mut requests: mpsc::UnboundedReceiver<()>,
) -> u64 {
    let mut served = 0u64;
    while requests.recv().await.is_some() {
        let policy = Arc::clone(&policy);
        match tokio::task::spawn_blocking(move || policy.trigger_send()).await {
            Ok(report) => {
                served += 1;
                tracing::info!(
                    "battery history send request served: {} sent, {} failed",
                    report.sent,
                    report.failed
                );
            }
            Err(e) => tracing::error!("battery history send request failed: {e}"),
        }
    }
    served
}

/// Subscribers do blocking storage and link I/O, so run them off the reactor.
async fn dispatch(bus: &Arc<TriggerBus>, trigger: RecordingTrigger) {
    let bus = Arc::clone(bus);
    if let Err(e) = tokio::task::spawn_blocking(move || bus.publish(&trigger)).await {
        tracing::error!("battery history trigger dispatch failed: {e}");
    }
}
