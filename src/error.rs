use thiserror::Error;

/// Failure of a node-to-node call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    #[error("peer {0} is unreachable")]
    Unreachable(String),
    #[error("call to {0} timed out")]
    Timeout(String),
    #[error("malformed peer address {0}")]
    BadAddress(String),
    #[error("unexpected response from {address}: expected {expected}")]
    UnexpectedResponse {
        address: String,
        expected: &'static str,
    },
    #[error("peer {address} answered with an error: {message}")]
    Remote { address: String, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("local request handler is gone")]
    HandlerGone,
}
