use crate::history::error::NotifyError;
use crate::history::relay::{NotificationSink, RelayChunk};
use crate::rpc::proto;
use prost::Message;
use tokio::sync::mpsc;

/// Forwards relayed chunks to the RPC layer as encoded `Notification`s.
pub struct RpcNotifier {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl RpcNotifier {
    /// Create a notifier and the queue its encoded notifications land on.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationSink for RpcNotifier {
    fn notify(&self, chunk: &RelayChunk) -> Result<(), NotifyError> {
        let payload = proto::Notification::from(chunk).encode_to_vec();
        self.tx
            .send(payload)
            .map_err(|_| NotifyError("notification queue closed".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::relay::{chunks, Receiver, RelayRole};
    use crate::history::HistoryEntry;
    use crate::rpc::proto::notification::NotificationType;
    use std::sync::Arc;

    #[test]
    fn receiver_notifications_reach_the_queue_in_arrival_order() {
        let (notifier, mut rx) = RpcNotifier::channel();
        let receiver = Receiver::new(Arc::new(notifier));
        let entries = vec![HistoryEntry::new(0, 99), HistoryEntry::new(60, 93)];
        let stream: Vec<_> = chunks(&entries).collect();

        receiver.on_frame(&stream[1].encode()).unwrap();
        receiver.on_frame(&stream[0].encode()).unwrap();

        let mut seen = Vec::new();
        while let Ok(bytes) = rx.try_recv() {
            let decoded = proto::Notification::decode(bytes.as_slice()).unwrap();
            let Some(NotificationType::BatteryHistoryEntry(n)) = decoded.notification_type else {
                panic!("missing notification payload");
            };
            seen.push((n.entry_index, n.battery_level, n.is_last));
        }
        assert_eq!(seen, vec![(1, 93, true), (0, 99, false)]);
    }

    #[test]
    fn closed_queue_is_a_notify_error() {
        let (notifier, rx) = RpcNotifier::channel();
        drop(rx);
        let receiver = Receiver::new(Arc::new(notifier));
        let frame = chunks(&[HistoryEntry::new(1, 1)]).next().unwrap().encode();
        assert!(receiver.on_frame(&frame).is_err());
        assert_eq!(receiver.forwarded(), 0);
    }
}
