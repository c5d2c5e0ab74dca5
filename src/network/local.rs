use super::protocol::{Request, Response};
use super::rpc::{RequestHandler, Transport};
use crate::error::RpcError;
use async_trait::async_trait;
use log::debug;
use std::{
    collections::HashMap,
    sync::{Arc, RwLock, Weak},
};

/// In-process transport routing calls between peers living in one process.
#[derive(Default)]
pub struct LocalNetwork {
    peers: RwLock<HashMap<String, Weak<dyn RequestHandler>>>,
}

impl LocalNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, address: &str, handler: Weak<dyn RequestHandler>) {
        self.peers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(address.to_string(), handler);
    }

    /// Makes `address` unreachable, as if the peer went down.
    pub fn unregister(&self, address: &str) {
        self.peers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(address);
    }

    fn lookup(&self, address: &str) -> Option<Arc<dyn RequestHandler>> {
        self.peers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(address)
            .and_then(Weak::upgrade)
    }
}

#[async_trait]
impl Transport for LocalNetwork {
    async fn send(&self, address: &str, request: Request) -> Result<Response, RpcError> {
        let handler = self
            .lookup(address)
            .ok_or_else(|| RpcError::Unreachable(address.to_string()))?;
        debug!("(local) {} -> {}", request.kind(), address);
        serve(handler, request).await
    }
}

/// Runs `handler` on a task of its own, like an inbound libp2p request.
pub(crate) async fn serve(
    handler: Arc<dyn RequestHandler>,
    request: Request,
) -> Result<Response, RpcError> {
    tokio::spawn(async move { handler.handle(request).await })
        .await
        .map_err(|e| RpcError::Transport(e.to_string()))
}
