pub mod handler;
pub mod notify;
pub mod proto;

pub use handler::{RpcHandler, RpcRequest};
pub use notify::RpcNotifier;
