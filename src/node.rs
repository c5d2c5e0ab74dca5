use crate::config::{HonestyMode, NodeConfig};
use crate::hashing::{Hasher, Keccak};
use crate::ledger::{Entity, ViewEntry, ViewTable};
use crate::network::{LinkUpdate, Request, RequestHandler, Response, Rpc, Transport};
use crate::skipgraph::{Identity, NameId, Overlay, OverlayQuery};
use crate::telemetry::Telemetry;
use crate::wallet::{key_num_id, PublicKey, Wallet};
use async_trait::async_trait;
use log::{debug, info};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// One LightChain peer: its overlay share, its keys and its view of the chain.
pub struct Node {
    pub(crate) identity: Identity,
    pub(crate) config: NodeConfig,
    pub(crate) wallet: Wallet,
    pub(crate) hasher: Arc<dyn Hasher>,
    pub(crate) overlay: Overlay,
    pub(crate) rpc: Arc<Rpc>,
    pub(crate) telemetry: Arc<dyn Telemetry>,
    view: Mutex<ViewTable>,
}

impl Node {
    /// Builds a node reachable at `config.address`. It is not part of any
    /// overlay until [`Node::join`] succeeds.
    pub fn new(
        config: NodeConfig,
        wallet: Wallet,
        transport: Arc<dyn Transport>,
        telemetry: Arc<dyn Telemetry>,
    ) -> Arc<Self> {
        let hasher: Arc<dyn Hasher> = Arc::new(Keccak);
        let bits = config.protocol.name_bits;
        let num_id = key_num_id(&*hasher, &wallet.public_key(), bits);
        let name_id = hasher.hash_str(NameId::from_num(num_id, bits).as_str(), bits);
        let identity = Identity::new(config.address.clone(), num_id, name_id);

        Arc::new_cyclic(|node: &Weak<Node>| {
            let handler: Weak<dyn RequestHandler> = node.clone();
            let rpc = Arc::new(Rpc::new(
                config.address.clone(),
                handler,
                transport,
                config.rpc_timeout(),
            ));
            let overlay = Overlay::new(
                config.address.clone(),
                config.introducer.clone(),
                bits,
                config.max_hops,
                rpc.clone(),
            );
            Node {
                identity,
                config,
                wallet,
                hasher,
                overlay,
                rpc,
                telemetry,
                view: Mutex::new(ViewTable::new()),
            }
        })
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn address(&self) -> &str {
        &self.identity.address
    }

    pub fn num_id(&self) -> u64 {
        self.identity.num_id
    }

    pub fn name_id(&self) -> &NameId {
        &self.identity.name_id
    }

    pub fn public_key(&self) -> PublicKey {
        self.wallet.public_key()
    }

    pub fn mode(&self) -> HonestyMode {
        self.config.mode
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    /// The overlay as the ledger sees it.
    pub fn query(&self) -> &dyn OverlayQuery {
        &self.overlay
    }

    /// Everything this node currently hosts.
    pub fn hosted(&self) -> Vec<Entity> {
        self.overlay.storage().entries()
    }

    pub fn view_entry(&self, owner: u64) -> Option<ViewEntry> {
        self.view().get(owner).cloned()
    }

    /// Guard over the view table; never keep it across an await.
    pub(crate) fn view(&self) -> MutexGuard<'_, ViewTable> {
        self.view.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Inserts the node's own identity into the overlay.
    pub async fn join(&self) -> bool {
        let joined = self.overlay.insert(Entity::Peer(self.identity.clone())).await;
        if joined {
            info!("(node) {} joined", self.identity);
        }
        joined
    }
}

#[async_trait]
impl RequestHandler for Node {
    async fn handle(&self, request: Request) -> Response {
        debug!("(node) {} serving {}", self.address(), request.kind());
        match request {
            Request::InsertSearch {
                level,
                direction,
                owner,
                target,
                hops,
            } => Response::Identity(
                self.overlay
                    .insert_search(level, direction, owner, &target, hops)
                    .await,
            ),
            Request::SearchNum {
                target,
                level,
                hops,
            } => Response::Identity(self.overlay.search_num(target, level, hops).await),
            Request::SearchByNumId { target } => {
                Response::Identity(self.overlay.search_by_num_id(target).await)
            }
            Request::SearchName {
                target,
                owner,
                level,
                direction,
                hops,
            } => Response::Identity(
                self.overlay
                    .search_name(&target, owner, level, direction, hops)
                    .await,
            ),
            Request::SearchByNameId { target } => {
                Response::Identity(self.overlay.search_by_name_id(&target).await)
            }
            Request::GetNeighbor {
                level,
                direction,
                owner,
            } => Response::Identity(self.overlay.neighbor_of(owner, level, direction)),
            Request::SetNeighbor {
                level,
                direction,
                owner,
                node,
            } => {
                if self.overlay.set_neighbor_of(owner, level, direction, node) {
                    Response::Ack
                } else {
                    Response::Error(format!("no entry {} at level {}", owner, level))
                }
            }
            Request::LinkNeighbor {
                level,
                direction,
                owner,
                expected,
                node,
            } => match self
                .overlay
                .storage()
                .compare_and_link(owner, level, direction, expected, node)
            {
                Some(Ok(())) => Response::Link(LinkUpdate::Linked),
                Some(Err(actual)) => Response::Link(LinkUpdate::Conflict(actual)),
                None => Response::Error(format!("no entry {} at level {}", owner, level)),
            },
            Request::AdoptNeighbor {
                level,
                direction,
                owner,
                node,
            } => {
                if self.overlay.storage().adopt(owner, level, direction, node) {
                    Response::Ack
                } else {
                    Response::Error(format!("no entry {} at level {}", owner, level))
                }
            }
            Request::ValidateTransaction(tx) => {
                Response::Attestation(self.pov_transaction(&tx).await)
            }
            Request::ValidateBlock(block) => Response::Attestation(self.pov_block(&block).await),
            Request::GetPublicKey => Response::PublicKey(self.public_key()),
            Request::GetMode => Response::Mode(self.mode()),
            Request::GetNode { num_id } => Response::Entity(self.overlay.get_node(num_id)),
            Request::Delete { num_id } => {
                if self.overlay.delete(num_id).await {
                    Response::Ack
                } else {
                    Response::Error(format!("no deletable entry {}", num_id))
                }
            }
        }
    }
}
