// Protobuf messages for the battery history RPC subsystem.
// Field tags are part of the wire contract; never renumber them.

use crate::history::{HistoryEntry, RelayChunk};

#[derive(Clone, PartialEq, prost::Message)]
pub struct Request {
    #[prost(oneof = "request::RequestType", tags = "1, 2")]
    pub request_type: Option<request::RequestType>,
}

pub mod request {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum RequestType {
        #[prost(message, tag = "1")]
        GetBatteryHistory(super::GetBatteryHistoryRequest),
        #[prost(message, tag = "2")]
        ClearBatteryHistory(super::ClearBatteryHistoryRequest),
    }
}

#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct GetBatteryHistoryRequest {}

#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct ClearBatteryHistoryRequest {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Response {
    #[prost(oneof = "response::ResponseType", tags = "1, 2, 3")]
    pub response_type: Option<response::ResponseType>,
}

pub mod response {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum ResponseType {
        #[prost(message, tag = "1")]
        Error(super::ErrorResponse),
        #[prost(message, tag = "2")]
        BatteryHistory(super::GetBatteryHistoryResponse),
        #[prost(message, tag = "3")]
        ClearBatteryHistory(super::ClearBatteryHistoryResponse),
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ErrorResponse {
    #[prost(string, tag = "1")]
    pub message: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GetBatteryHistoryResponse {
    #[prost(uint32, tag = "1")]
    pub current_battery: u32,
    #[prost(uint32, tag = "2")]
    pub total_entries: u32,
    #[prost(message, repeated, tag = "3")]
    pub entries: Vec<BatteryHistoryEntry>,
}

#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct BatteryHistoryEntry {
    #[prost(uint32, tag = "1")]
    pub timestamp: u32,
    #[prost(uint32, tag = "2")]
    pub battery_percentage: u32,
}

#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct ClearBatteryHistoryResponse {
    #[prost(bool, tag = "1")]
    pub success: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Notification {
    #[prost(oneof = "notification::NotificationType", tags = "1")]
    pub notification_type: Option<notification::NotificationType>,
}

pub mod notification {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum NotificationType {
        #[prost(message, tag = "1")]
        BatteryHistoryEntry(super::BatteryHistoryEntryNotification),
    }
}

#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct BatteryHistoryEntryNotification {
    #[prost(uint32, tag = "1")]
    pub timestamp: u32,
    #[prost(uint32, tag = "2")]
    pub battery_level: u32,
    #[prost(uint32, tag = "3")]
    pub entry_index: u32,
    #[prost(uint32, tag = "4")]
    pub total_entries: u32,
    #[prost(bool, tag = "5")]
    pub is_last: bool,
}

impl From<HistoryEntry> for BatteryHistoryEntry {
    fn from(entry: HistoryEntry) -> Self {
        Self {
            timestamp: entry.timestamp,
            battery_percentage: u32::from(entry.level),
        }
    }
}

impl From<&RelayChunk> for Notification {
    fn from(chunk: &RelayChunk) -> Self {
        Self {
            notification_type: Some(notification::NotificationType::BatteryHistoryEntry(
                BatteryHistoryEntryNotification {
                    timestamp: chunk.entry.timestamp,
                    battery_level: u32::from(chunk.entry.level),
                    entry_index: u32::from(chunk.index),
                    total_entries: u32::from(chunk.total),
                    is_last: chunk.is_last,
                },
            )),
        }
    }
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            response_type: Some(response::ResponseType::Error(ErrorResponse {
                message: message.into(),
            })),
        }
    }
}
