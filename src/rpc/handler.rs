use crate::history::{HistoryError, QueryService};
use crate::rpc::proto::{self, request::RequestType, response::ResponseType};
use prost::Message;

/// Decoded request, closed over the operations this subsystem supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcRequest {
    GetHistory,
    ClearHistory,
    /// A well-formed request carrying no variant we know about.
    Unknown,
}

impl From<proto::Request> for RpcRequest {
    fn from(request: proto::Request) -> Self {
        match request.request_type {
            Some(RequestType::GetBatteryHistory(_)) => Self::GetHistory,
            Some(RequestType::ClearBatteryHistory(_)) => Self::ClearHistory,
            None => Self::Unknown,
        }
    }
}

/// Answers battery history RPC calls. Never fails: every problem becomes an
/// `ErrorResponse`.
pub struct RpcHandler {
    query: QueryService,
}

impl RpcHandler {
    pub fn new(query: QueryService) -> Self {
        Self { query }
    }

    pub fn decode_request(payload: &[u8]) -> Result<RpcRequest, prost::DecodeError> {
        proto::Request::decode(payload).map(RpcRequest::from)
    }

    pub fn handle(&self, payload: &[u8]) -> proto::Response {
        match Self::decode_request(payload) {
            Ok(request) => self.dispatch(request),
            Err(e) => {
                tracing::warn!("failed to decode battery history request: {e}");
                proto::Response::error("Failed to decode request")
            }
        }
    }

    /// Handle a raw payload and return the encoded response.
    pub fn handle_encoded(&self, payload: &[u8]) -> Vec<u8> {
        self.handle(payload).encode_to_vec()
    }

    pub fn dispatch(&self, request: RpcRequest) -> proto::Response {
        let response_type = match request {
            RpcRequest::GetHistory => match self.get_history() {
                Ok(history) => ResponseType::BatteryHistory(history),
                Err(e) => {
                    tracing::error!("failed to get battery history entries: {e}");
                    return proto::Response::error("Failed to process request");
                }
            },
            RpcRequest::ClearHistory => ResponseType::ClearBatteryHistory(self.clear_history()),
            RpcRequest::Unknown => {
                tracing::warn!("unsupported battery history request");
                return proto::Response::error("Unsupported request");
            }
        };
        proto::Response {
            response_type: Some(response_type),
        }
    }

    fn get_history(&self) -> Result<proto::GetBatteryHistoryResponse, HistoryError> {
        tracing::debug!("received get battery history request");
        let current_battery = u32::from(self.query.get_current_level());
        let total_entries = self.query.get_count();
        let entries: Vec<proto::BatteryHistoryEntry> = self
            .query
            .get_entries(self.query.capacity())?
            .into_iter()
            .map(Into::into)
            .collect();

        tracing::debug!(
            "returning {} battery history entries (current: {current_battery}%)",
            entries.len()
        );
        Ok(proto::GetBatteryHistoryResponse {
            current_battery,
            total_entries: u32::try_from(total_entries).unwrap_or(u32::MAX),
            entries,
        })
    }

    fn clear_history(&self) -> proto::ClearBatteryHistoryResponse {
        tracing::debug!("received clear battery history request");
        let success = match self.query.clear() {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("failed to clear battery history: {e}");
                false
            }
        };
        proto::ClearBatteryHistoryResponse { success }
    }
}
