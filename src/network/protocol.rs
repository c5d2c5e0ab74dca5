use crate::config::HonestyMode;
use crate::ledger::{Block, Entity, Transaction};
use crate::skipgraph::{Direction, Identity, NameId};
use crate::validation::Attestation;
use crate::wallet::PublicKey;
use async_trait::async_trait;
use futures::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use libp2p::core::ProtocolName;
use libp2p::request_response::RequestResponseCodec;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::io;

pub const OVERLAY_PROTOCOL_ID: &[u8] = b"/lightchain/overlay/0.1";

/// Upper bound on a single framed message.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

#[derive(Clone)]
pub struct OverlayProtocol;

impl ProtocolName for OverlayProtocol {
    fn protocol_name(&self) -> &[u8] {
        OVERLAY_PROTOCOL_ID
    }
}

/// Calls every peer answers. `hops` is the remaining delegation budget.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub enum Request {
    /// Walk `direction` at `level` from the entry `owner` until an entry shares
    /// more than `level` leading bits with `target`
    InsertSearch {
        level: usize,
        direction: Direction,
        owner: u64,
        target: NameId,
        hops: u32,
    },
    SearchNum {
        target: u64,
        level: usize,
        hops: u32,
    },
    SearchByNumId {
        target: u64,
    },
    /// Continue a prefix search from the entry `owner`
    SearchName {
        target: NameId,
        owner: u64,
        level: usize,
        direction: Direction,
        hops: u32,
    },
    SearchByNameId {
        target: NameId,
    },
    GetNeighbor {
        level: usize,
        direction: Direction,
        owner: u64,
    },
    /// `node: None` unlinks the slot
    SetNeighbor {
        level: usize,
        direction: Direction,
        owner: u64,
        node: Option<Identity>,
    },
    /// Point the link of `owner` at `node` if it still refers to `expected`
    LinkNeighbor {
        level: usize,
        direction: Direction,
        owner: u64,
        expected: Option<u64>,
        node: Identity,
    },
    /// Point the link of `owner` at `node` unless a closer entry is linked
    AdoptNeighbor {
        level: usize,
        direction: Direction,
        owner: u64,
        node: Identity,
    },
    /// Proof of validation over a transaction
    ValidateTransaction(Transaction),
    /// Proof of validation over a block
    ValidateBlock(Block),
    GetPublicKey,
    GetMode,
    GetNode {
        num_id: u64,
    },
    Delete {
        num_id: u64,
    },
}

impl Request {
    pub fn kind(&self) -> &'static str {
        match self {
            Request::InsertSearch { .. } => "insert-search",
            Request::SearchNum { .. } => "search-num",
            Request::SearchByNumId { .. } => "search-by-num-id",
            Request::SearchName { .. } => "search-name",
            Request::SearchByNameId { .. } => "search-by-name-id",
            Request::GetNeighbor { .. } => "get-neighbor",
            Request::SetNeighbor { .. } => "set-neighbor",
            Request::LinkNeighbor { .. } => "link-neighbor",
            Request::AdoptNeighbor { .. } => "adopt-neighbor",
            Request::ValidateTransaction(_) => "pov-transaction",
            Request::ValidateBlock(_) => "pov-block",
            Request::GetPublicKey => "get-public-key",
            Request::GetMode => "get-mode",
            Request::GetNode { .. } => "get-node",
            Request::Delete { .. } => "delete",
        }
    }
}

/// Outcome of a [`Request::LinkNeighbor`].
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub enum LinkUpdate {
    Linked,
    /// The link held something else, returned here
    Conflict(Option<Identity>),
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub enum Response {
    Identity(Option<Identity>),
    Link(LinkUpdate),
    Attestation(Attestation),
    PublicKey(PublicKey),
    Mode(HonestyMode),
    Entity(Option<Entity>),
    /// Acknowledges the request
    Ack,
    /// Request could not be served
    Error(String),
}

/// Length-prefixed bincode framing.
#[derive(Clone, Default)]
pub struct OverlayCodec;

async fn read_frame<T, M>(io: &mut T) -> io::Result<M>
where
    T: AsyncRead + Unpin + Send,
    M: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    io.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds limit", len),
        ));
    }

    let mut buf = vec![0u8; len];
    io.read_exact(&mut buf).await?;
    bincode::deserialize(&buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

async fn write_frame<T, M>(io: &mut T, message: &M) -> io::Result<()>
where
    T: AsyncWrite + Unpin + Send,
    M: Serialize + Sync,
{
    let data =
        bincode::serialize(message).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    io.write_all(&(data.len() as u32).to_be_bytes()).await?;
    io.write_all(&data).await?;
    io.close().await
}

#[async_trait]
impl RequestResponseCodec for OverlayCodec {
    type Protocol = OverlayProtocol;
    type Request = Request;
    type Response = Response;

    async fn read_request<T>(&mut self, _: &OverlayProtocol, io: &mut T) -> io::Result<Request>
    where
        T: AsyncRead + Unpin + Send,
    {
        read_frame(io).await
    }

    async fn read_response<T>(&mut self, _: &OverlayProtocol, io: &mut T) -> io::Result<Response>
    where
        T: AsyncRead + Unpin + Send,
    {
        read_frame(io).await
    }

    async fn write_request<T>(
        &mut self,
        _: &OverlayProtocol,
        io: &mut T,
        request: Request,
    ) -> io::Result<()>
    where
        T: AsyncWrite + Unpin + Send,
    {
        write_frame(io, &request).await
    }

    async fn write_response<T>(
        &mut self,
        _: &OverlayProtocol,
        io: &mut T,
        response: Response,
    ) -> io::Result<()>
    where
        T: AsyncWrite + Unpin + Send,
    {
        write_frame(io, &response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::io::Cursor;

    fn frame<M: Serialize + Sync>(message: &M) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        futures::executor::block_on(write_frame(&mut buf, message)).unwrap();
        buf.into_inner()
    }

    #[test]
    fn request_survives_framing() {
        let request = Request::InsertSearch {
            level: 3,
            direction: Direction::Left,
            owner: 42,
            target: NameId::from_num(9, 8),
            hops: 7,
        };
        let bytes = frame(&request);
        assert_eq!(
            u32::from_be_bytes(bytes[..4].try_into().unwrap()) as usize,
            bytes.len() - 4
        );
        let decoded: Request =
            futures::executor::block_on(read_frame(&mut Cursor::new(bytes))).unwrap();
        match decoded {
            Request::InsertSearch {
                level,
                direction,
                owner,
                target,
                hops,
            } => {
                assert_eq!((level, direction, owner, hops), (3, Direction::Left, 42, 7));
                assert_eq!(target, NameId::from_num(9, 8));
            }
            other => panic!("decoded into {:?}", other),
        }
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let mut bytes = ((MAX_MESSAGE_SIZE + 1) as u32).to_be_bytes().to_vec();
        bytes.extend_from_slice(&[0u8; 8]);
        let result: io::Result<Response> =
            futures::executor::block_on(read_frame(&mut Cursor::new(bytes)));
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::InvalidData);
    }
}
