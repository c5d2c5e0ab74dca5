use super::local::serve;
use super::protocol::{LinkUpdate, Request, Response};
use crate::config::HonestyMode;
use crate::error::RpcError;
use crate::ledger::{Block, Entity, Transaction};
use crate::skipgraph::{Direction, Identity, NameId};
use crate::validation::Attestation;
use crate::wallet::PublicKey;
use async_trait::async_trait;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Delivers one request to the peer at `address` and waits for its answer.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, address: &str, request: Request) -> Result<Response, RpcError>;
}

/// Serves inbound requests.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, request: Request) -> Response;
}

/// Outbound side of a node: calls addressed to the node itself are served
/// in-process, everything else goes through the transport under a timeout.
pub struct Rpc {
    local_address: String,
    local: Weak<dyn RequestHandler>,
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl Rpc {
    pub fn new(
        local_address: String,
        local: Weak<dyn RequestHandler>,
        transport: Arc<dyn Transport>,
        timeout: Duration,
    ) -> Self {
        Self {
            local_address,
            local,
            transport,
            timeout,
        }
    }

    pub fn local_address(&self) -> &str {
        &self.local_address
    }

    pub async fn call(&self, address: &str, request: Request) -> Result<Response, RpcError> {
        if address == self.local_address {
            let handler = self.local.upgrade().ok_or(RpcError::HandlerGone)?;
            return serve(handler, request).await;
        }
        match tokio::time::timeout(self.timeout, self.transport.send(address, request)).await {
            Ok(result) => result,
            Err(_) => Err(RpcError::Timeout(address.to_string())),
        }
    }

    /// Typed client for the peer at `address`.
    pub fn peer<'a>(&'a self, address: &'a str) -> Remote<'a> {
        Remote { rpc: self, address }
    }
}

/// Typed view of the RPC surface of one peer.
pub struct Remote<'a> {
    rpc: &'a Rpc,
    address: &'a str,
}

impl<'a> Remote<'a> {
    async fn call(&self, request: Request) -> Result<Response, RpcError> {
        match self.rpc.call(self.address, request).await? {
            Response::Error(message) => Err(RpcError::Remote {
                address: self.address.to_string(),
                message,
            }),
            response => Ok(response),
        }
    }

    fn unexpected<T>(&self, expected: &'static str) -> Result<T, RpcError> {
        Err(RpcError::UnexpectedResponse {
            address: self.address.to_string(),
            expected,
        })
    }

    async fn identity(&self, request: Request) -> Result<Option<Identity>, RpcError> {
        match self.call(request).await? {
            Response::Identity(identity) => Ok(identity),
            _ => self.unexpected("identity"),
        }
    }

    async fn ack(&self, request: Request) -> Result<(), RpcError> {
        match self.call(request).await? {
            Response::Ack => Ok(()),
            _ => self.unexpected("ack"),
        }
    }

    pub async fn insert_search(
        &self,
        level: usize,
        direction: Direction,
        owner: u64,
        target: &NameId,
        hops: u32,
    ) -> Result<Option<Identity>, RpcError> {
        self.identity(Request::InsertSearch {
            level,
            direction,
            owner,
            target: target.clone(),
            hops,
        })
        .await
    }

    pub async fn search_num(
        &self,
        target: u64,
        level: usize,
        hops: u32,
    ) -> Result<Option<Identity>, RpcError> {
        self.identity(Request::SearchNum {
            target,
            level,
            hops,
        })
        .await
    }

    pub async fn search_by_num_id(&self, target: u64) -> Result<Option<Identity>, RpcError> {
        self.identity(Request::SearchByNumId { target }).await
    }

    pub async fn search_name(
        &self,
        target: &NameId,
        owner: u64,
        level: usize,
        direction: Direction,
        hops: u32,
    ) -> Result<Option<Identity>, RpcError> {
        self.identity(Request::SearchName {
            target: target.clone(),
            owner,
            level,
            direction,
            hops,
        })
        .await
    }

    pub async fn search_by_name_id(&self, target: &NameId) -> Result<Option<Identity>, RpcError> {
        self.identity(Request::SearchByNameId {
            target: target.clone(),
        })
        .await
    }

    pub async fn get_neighbor(
        &self,
        level: usize,
        direction: Direction,
        owner: u64,
    ) -> Result<Option<Identity>, RpcError> {
        self.identity(Request::GetNeighbor {
            level,
            direction,
            owner,
        })
        .await
    }

    pub async fn get_left_node(&self, level: usize, owner: u64) -> Result<Option<Identity>, RpcError> {
        self.get_neighbor(level, Direction::Left, owner).await
    }

    pub async fn get_right_node(&self, level: usize, owner: u64) -> Result<Option<Identity>, RpcError> {
        self.get_neighbor(level, Direction::Right, owner).await
    }

    pub async fn get_left_num_id(&self, level: usize, owner: u64) -> Result<Option<u64>, RpcError> {
        Ok(self.get_left_node(level, owner).await?.map(|n| n.num_id))
    }

    pub async fn get_right_num_id(&self, level: usize, owner: u64) -> Result<Option<u64>, RpcError> {
        Ok(self.get_right_node(level, owner).await?.map(|n| n.num_id))
    }

    pub async fn get_left_name_id(&self, level: usize, owner: u64) -> Result<Option<NameId>, RpcError> {
        Ok(self.get_left_node(level, owner).await?.map(|n| n.name_id))
    }

    pub async fn get_right_name_id(&self, level: usize, owner: u64) -> Result<Option<NameId>, RpcError> {
        Ok(self.get_right_node(level, owner).await?.map(|n| n.name_id))
    }

    pub async fn set_neighbor(
        &self,
        level: usize,
        direction: Direction,
        node: Option<Identity>,
        owner: u64,
    ) -> Result<(), RpcError> {
        self.ack(Request::SetNeighbor {
            level,
            direction,
            owner,
            node,
        })
        .await
    }

    pub async fn set_left_node(&self, level: usize, node: &Identity, owner: u64) -> Result<(), RpcError> {
        self.set_neighbor(level, Direction::Left, Some(node.clone()), owner)
            .await
    }

    pub async fn set_right_node(&self, level: usize, node: &Identity, owner: u64) -> Result<(), RpcError> {
        self.set_neighbor(level, Direction::Right, Some(node.clone()), owner)
            .await
    }

    /// Links `owner` to `node` only while the link still refers to `expected`.
    pub async fn link_neighbor(
        &self,
        level: usize,
        direction: Direction,
        owner: u64,
        expected: Option<u64>,
        node: &Identity,
    ) -> Result<LinkUpdate, RpcError> {
        match self
            .call(Request::LinkNeighbor {
                level,
                direction,
                owner,
                expected,
                node: node.clone(),
            })
            .await?
        {
            Response::Link(update) => Ok(update),
            _ => self.unexpected("link update"),
        }
    }

    pub async fn adopt_neighbor(
        &self,
        level: usize,
        direction: Direction,
        owner: u64,
        node: &Identity,
    ) -> Result<(), RpcError> {
        self.ack(Request::AdoptNeighbor {
            level,
            direction,
            owner,
            node: node.clone(),
        })
        .await
    }

    /// Asks the peer to run PoV on the entity carried by `request`.
    pub async fn attest(&self, request: Request) -> Result<Attestation, RpcError> {
        match self.call(request).await? {
            Response::Attestation(attestation) => Ok(attestation),
            _ => self.unexpected("attestation"),
        }
    }

    pub async fn validate_transaction(&self, tx: &Transaction) -> Result<Attestation, RpcError> {
        self.attest(Request::ValidateTransaction(tx.clone())).await
    }

    pub async fn validate_block(&self, block: &Block) -> Result<Attestation, RpcError> {
        self.attest(Request::ValidateBlock(block.clone())).await
    }

    pub async fn get_public_key(&self) -> Result<PublicKey, RpcError> {
        match self.call(Request::GetPublicKey).await? {
            Response::PublicKey(key) => Ok(key),
            _ => self.unexpected("public key"),
        }
    }

    pub async fn get_mode(&self) -> Result<HonestyMode, RpcError> {
        match self.call(Request::GetMode).await? {
            Response::Mode(mode) => Ok(mode),
            _ => self.unexpected("mode"),
        }
    }

    pub async fn get_node(&self, num_id: u64) -> Result<Option<Entity>, RpcError> {
        match self.call(Request::GetNode { num_id }).await? {
            Response::Entity(entity) => Ok(entity),
            _ => self.unexpected("entity"),
        }
    }

    pub async fn delete(&self, num_id: u64) -> Result<(), RpcError> {
        self.ack(Request::Delete { num_id }).await
    }
}
