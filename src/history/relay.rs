//! Chunked relay of the history buffer across the device link.
//!
//! The reporting device streams its whole buffer, one frame per entry, after
//! every append. The aggregating device forwards each frame it receives as a
//! notification without reassembling or reordering anything.

use crate::history::entry::{HistoryEntry, MAX_LEVEL};
use crate::history::error::{FrameError, NotifyError, RelayError, TransportError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

/// Wire size: `timestamp u32 | level u8 | index u16 | total u16 | is_last u8`.
pub const FRAME_SIZE: usize = 10;

/// One wire unit of a relay stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RelayChunk {
    pub entry: HistoryEntry,
    pub index: u16,
    pub total: u16,
    pub is_last: bool,
}

impl RelayChunk {
    pub fn encode(&self) -> [u8; FRAME_SIZE] {
        let mut frame = [0u8; FRAME_SIZE];
        frame[..4].copy_from_slice(&self.entry.timestamp.to_le_bytes());
        frame[4] = self.entry.level;
        frame[5..7].copy_from_slice(&self.index.to_le_bytes());
        frame[7..9].copy_from_slice(&self.total.to_le_bytes());
        frame[9] = u8::from(self.is_last);
        frame
    }

    pub fn decode(frame: &[u8]) -> Result<Self, FrameError> {
        let frame: &[u8; FRAME_SIZE] = frame.try_into().map_err(|_| FrameError::Length {
            expected: FRAME_SIZE,
            actual: frame.len(),
        })?;
        if frame[4] > MAX_LEVEL {
            return Err(FrameError::Level(frame[4]));
        }
        let entry = HistoryEntry::new(
            u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]),
            frame[4],
        );
        let index = u16::from_le_bytes([frame[5], frame[6]]);
        let total = u16::from_le_bytes([frame[7], frame[8]]);
        let is_last = match frame[9] {
            0 => false,
            1 => true,
            other => return Err(FrameError::LastFlag(other)),
        };
        if index >= total {
            return Err(FrameError::IndexOutOfRange { index, total });
        }
        if is_last != (index == total - 1) {
            return Err(FrameError::InconsistentLast {
                index,
                total,
                is_last,
            });
        }
        Ok(Self {
            entry,
            index,
            total,
            is_last,
        })
    }
}

/// Split `entries` into one chunk per entry, oldest first.
pub fn chunks(entries: &[HistoryEntry]) -> impl Iterator<Item = RelayChunk> + '_ {
    // Buffer capacity is bounded by u16::MAX, so nothing is cut off in practice.
    let total = u16::try_from(entries.len()).unwrap_or(u16::MAX);
    entries
        .iter()
        .take(usize::from(total))
        .enumerate()
        .map(move |(i, entry)| {
            let index = i as u16;
            RelayChunk {
                entry: *entry,
                index,
                total,
                is_last: index + 1 == total,
            }
        })
}

/// Outgoing side of the point-to-point device link. One frame per call.
pub trait DeviceLink: Send + Sync {
    fn send(&self, frame: &[u8]) -> Result<(), TransportError>;
}

/// In-process device link over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelLink {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

/// Create a connected link and the receiving end its frames arrive on.
pub fn channel_link() -> (ChannelLink, mpsc::UnboundedReceiver<Vec<u8>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelLink { tx }, rx)
}

impl DeviceLink for ChannelLink {
    fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
        self.tx
            .send(frame.to_vec())
            .map_err(|_| TransportError::Closed)
    }
}

/// Device link over UDP, one datagram per frame.
#[derive(Debug)]
pub struct UdpLink {
    socket: UdpSocket,
    peer: SocketAddr,
}

impl UdpLink {
    /// Bind an ephemeral local port of the same family as `peer`.
    pub async fn connect(peer: SocketAddr) -> std::io::Result<Self> {
        let local: SocketAddr = match peer {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local).await?;
        // `try_send_to` needs write readiness to have been observed once.
        socket.writable().await?;
        tracing::info!("relay link sending to {peer}");
        Ok(Self { socket, peer })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

impl DeviceLink for UdpLink {
    fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
        match self.socket.try_send_to(frame, self.peer) {
            Ok(n) if n == frame.len() => Ok(()),
            Ok(n) => Err(TransportError::Send(format!(
                "short datagram: {n} of {} bytes",
                frame.len()
            ))),
            Err(e) => Err(TransportError::Send(e.to_string())),
        }
    }
}

/// Where the aggregating device delivers relayed chunks.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, chunk: &RelayChunk) -> Result<(), NotifyError>;
}

/// Device role in the relay, chosen once at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Reporting,
    Aggregating,
}

/// Per-stream delivery tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamReport {
    pub sent: usize,
    pub failed: usize,
}

/// Role-specific relay behavior.
pub trait RelayRole: Send + Sync {
    fn role(&self) -> Role;

    /// Stream the current buffer contents after a local change.
    fn stream(&self, entries: &[HistoryEntry]) -> StreamReport;

    /// Handle one frame that arrived over the link.
    fn on_frame(&self, frame: &[u8]) -> Result<(), RelayError>;
}

/// Reporting-device relay: pushes every entry over the link.
pub struct Sender {
    link: Arc<dyn DeviceLink>,
}

impl Sender {
    pub fn new(link: Arc<dyn DeviceLink>) -> Self {
        Self { link }
    }
}

impl RelayRole for Sender {
    fn role(&self) -> Role {
        Role::Reporting
    }

    fn stream(&self, entries: &[HistoryEntry]) -> StreamReport {
        let mut report = StreamReport::default();
        for chunk in chunks(entries) {
            match self.link.send(&chunk.encode()) {
                Ok(()) => {
                    report.sent += 1;
                    tracing::debug!(
                        "relayed battery history entry {}/{}",
                        chunk.index,
                        chunk.total
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(
                        "failed to relay battery history entry {}/{}: {e}",
                        chunk.index,
                        chunk.total
                    );
                }
            }
        }
        report
    }

    fn on_frame(&self, _frame: &[u8]) -> Result<(), RelayError> {
        Err(RelayError::UnexpectedInbound)
    }
}

/// Aggregating-device relay: forwards received chunks as notifications.
pub struct Receiver {
    sink: Arc<dyn NotificationSink>,
    forwarded: AtomicU64,
}

impl Receiver {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            sink,
            forwarded: AtomicU64::new(0),
        }
    }

    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }
}

impl RelayRole for Receiver {
    fn role(&self) -> Role {
        Role::Aggregating
    }

    fn stream(&self, _entries: &[HistoryEntry]) -> StreamReport {
        StreamReport::default()
    }

    fn on_frame(&self, frame: &[u8]) -> Result<(), RelayError> {
        let chunk = RelayChunk::decode(frame)?;
        tracing::debug!(
            "received battery history entry {}/{} ({}% at {}s)",
            chunk.index,
            chunk.total,
            chunk.entry.level,
            chunk.entry.timestamp
        );
        self.sink.notify(&chunk)?;
        self.forwarded.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Feed every frame arriving on `frames` into `role` until the link closes.
/// Returns the number of frames consumed.
pub async fn pump_link(role: Arc<dyn RelayRole>, mut frames: mpsc::UnboundedReceiver<Vec<u8>>) -> u64 {
    let mut consumed = 0u64;
    while let Some(frame) = frames.recv().await {
        consumed += 1;
        if let Err(e) = role.on_frame(&frame) {
            tracing::warn!("dropping relay frame: {e}");
        }
    }
    tracing::debug!("device link closed after {consumed} frames");
    consumed
}

/// Feed every datagram arriving on `socket` into `role`, forever.
pub async fn pump_datagrams(role: Arc<dyn RelayRole>, socket: UdpSocket) {
    let mut buf = [0u8; 64];
    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("relay link receive error: {e}");
                continue;
            }
        };
        if let Err(e) = role.on_frame(&buf[..len]) {
            tracing::warn!("dropping relay frame from {from}: {e}");
        }
    }
}
