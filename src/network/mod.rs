pub mod local;
pub mod protocol;
pub mod rpc;

pub use local::LocalNetwork;
pub use protocol::{LinkUpdate, Request, Response};
pub use rpc::{Remote, RequestHandler, Rpc, Transport};

use self::protocol::{OverlayCodec, OverlayProtocol};
use crate::error::RpcError;
use async_trait::async_trait;
use futures::StreamExt;
use libp2p::{
    core::{
        muxing::StreamMuxerBox,
        transport::{upgrade::Version, Boxed},
        upgrade::SelectUpgrade,
    },
    dns::TokioDnsConfig,
    identity::Keypair,
    mplex::MplexConfig,
    multiaddr::Protocol,
    noise,
    request_response::{
        ProtocolSupport, RequestId, RequestResponse, RequestResponseConfig, RequestResponseEvent,
        RequestResponseMessage, ResponseChannel,
    },
    swarm::{SwarmBuilder, SwarmEvent},
    tcp::TokioTcpConfig,
    yamux::YamuxConfig,
    Multiaddr, NetworkBehaviour, PeerId, Swarm, Transport as _,
};
use log::{debug, error};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{
    io, select,
    sync::{mpsc, oneshot},
};

#[derive(NetworkBehaviour)]
#[behaviour(out_event = "BehaviourEvent")]
struct Behaviour {
    overlay: RequestResponse<OverlayCodec>,
}

impl Behaviour {
    pub fn new(request_timeout: Duration) -> Self {
        let mut config = RequestResponseConfig::default();
        config.set_request_timeout(request_timeout);

        let overlay = RequestResponse::new(
            OverlayCodec::default(),
            std::iter::once((OverlayProtocol, ProtocolSupport::Full)),
            config,
        );

        Behaviour { overlay }
    }
}

pub enum BehaviourEvent {
    Overlay(RequestResponseEvent<Request, Response>),
}

impl From<RequestResponseEvent<Request, Response>> for BehaviourEvent {
    fn from(event: RequestResponseEvent<Request, Response>) -> Self {
        BehaviourEvent::Overlay(event)
    }
}

pub struct CustomExecutor;
impl libp2p::core::Executor for CustomExecutor {
    fn exec(
        &self,
        future: std::pin::Pin<Box<dyn std::future::Future<Output = ()> + 'static + Send>>,
    ) {
        tokio::task::spawn(future);
    }
}

/// Uses TCP encrypted using noise DH and MPlex for multiplexing
pub fn build_transport(identity_keypair: &Keypair) -> io::Result<Boxed<(PeerId, StreamMuxerBox)>> {
    // noise config
    let keypair = noise::Keypair::<noise::X25519>::new()
        .into_authentic(identity_keypair)
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
    let noise_config = noise::NoiseConfig::xx(keypair).into_authenticated();

    Ok(TokioDnsConfig::system(TokioTcpConfig::new())?
        .upgrade(Version::V1)
        .authenticate(noise_config)
        .multiplex(SelectUpgrade::new(
            YamuxConfig::default(),
            MplexConfig::new(),
        ))
        .timeout(Duration::from_secs(20))
        .map(|(peer_id, muxer), _| (peer_id, StreamMuxerBox::new(muxer)))
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err))
        .boxed())
}

/// Splits `/ip4/../tcp/../p2p/<peer>` into the peer id and its dialable address.
pub fn split_peer_address(address: &str) -> Result<(PeerId, Multiaddr), RpcError> {
    let bad = || RpcError::BadAddress(address.to_string());
    let mut multiaddr: Multiaddr = address.parse().map_err(|_| bad())?;
    match multiaddr.pop() {
        Some(Protocol::P2p(hash)) => PeerId::from_multihash(hash)
            .map(|peer_id| (peer_id, multiaddr))
            .map_err(|_| bad()),
        _ => Err(bad()),
    }
}

/// libp2p request-response host for the overlay protocol.
pub struct Network {
    /// keypair of the node
    pub keypair: Keypair,
    /// Multiaddr the swarm ended up listening on
    pub node_address: Option<Multiaddr>,

    swarm: Swarm<Behaviour>,

    command_sender: mpsc::Sender<Command>,
    command_receiver: mpsc::Receiver<Command>,

    pending_outbound_requests: HashMap<RequestId, oneshot::Sender<Result<Response, RpcError>>>,
}

impl Network {
    /// Binding the listen address is the one failure that is fatal for a node.
    pub fn new(
        keypair: Keypair,
        listen_on: Multiaddr,
        request_timeout: Duration,
    ) -> Result<Self, anyhow::Error> {
        let transport = build_transport(&keypair)?;
        let behaviour = Behaviour::new(request_timeout);
        let mut swarm = SwarmBuilder::new(transport, behaviour, keypair.public().to_peer_id())
            .executor(Box::new(CustomExecutor))
            .build();

        swarm
            .listen_on(listen_on.clone())
            .map_err(|e| anyhow::anyhow!("failed to listen on {}: {}", listen_on, e))?;

        let (command_sender, command_receiver) = mpsc::channel(64);

        Ok(Self {
            keypair,
            node_address: None,
            swarm,

            command_sender,
            command_receiver,

            pending_outbound_requests: Default::default(),
        })
    }

    pub fn peer_id(&self) -> PeerId {
        self.keypair.public().to_peer_id()
    }

    /// Transport handle to give to the node.
    pub fn handle(&self) -> NetworkHandle {
        NetworkHandle {
            command_sender: self.command_sender.clone(),
        }
    }

    /// Drives the swarm; inbound requests are served by `handler`.
    pub async fn run(mut self, handler: Arc<dyn RequestHandler>) {
        loop {
            select! {
                command = self.command_receiver.recv() => {
                    match command {
                        Some(val) => {
                            self.command_handler(val).await
                        },
                        None => {return},
                    }
                }
                swarm_event = self.swarm.next() => {
                    match swarm_event {
                        Some(event) => {
                            self.swarm_event_handler(event, &handler).await;
                        }
                        None => {return}
                    }
                }
            }
        }
    }

    async fn command_handler(&mut self, command: Command) {
        match command {
            Command::SendRequest {
                peer_id,
                address,
                request,
                sender,
            } => {
                let overlay = &mut self.swarm.behaviour_mut().overlay;
                overlay.add_address(&peer_id, address);
                let request_id = overlay.send_request(&peer_id, request);
                self.pending_outbound_requests.insert(request_id, sender);
            }
            Command::SendResponse { channel, response } => {
                if self
                    .swarm
                    .behaviour_mut()
                    .overlay
                    .send_response(channel, response)
                    .is_err()
                {
                    error!("(overlay) response dropped: inbound channel already closed");
                }
            }
        }
    }

    async fn swarm_event_handler<E: std::fmt::Debug>(
        &mut self,
        event: SwarmEvent<BehaviourEvent, E>,
        handler: &Arc<dyn RequestHandler>,
    ) {
        match event {
            SwarmEvent::Behaviour(BehaviourEvent::Overlay(event)) => match event {
                RequestResponseEvent::Message { peer, message } => match message {
                    RequestResponseMessage::Request {
                        request_id,
                        request,
                        channel,
                    } => {
                        debug!(
                            "(overlay) {} request {} from {}",
                            request.kind(),
                            request_id,
                            peer
                        );
                        // Serving may itself call out through this swarm, so it
                        // must not block the event loop.
                        let handler = handler.clone();
                        let commands = self.command_sender.clone();
                        tokio::spawn(async move {
                            let response = handler.handle(request).await;
                            if commands
                                .send(Command::SendResponse { channel, response })
                                .await
                                .is_err()
                            {
                                error!("(overlay) network loop gone before response was sent");
                            }
                        });
                    }
                    RequestResponseMessage::Response {
                        request_id,
                        response,
                    } => {
                        if let Some(sender) = self.pending_outbound_requests.remove(&request_id) {
                            let _ = sender.send(Ok(response));
                        } else {
                            error!(
                                "(overlay) response channel missing for request id {} for peer {}",
                                request_id, peer
                            );
                        }
                    }
                },
                RequestResponseEvent::OutboundFailure {
                    peer,
                    request_id,
                    error,
                } => {
                    if let Some(sender) = self.pending_outbound_requests.remove(&request_id) {
                        let _ = sender.send(Err(RpcError::Transport(format!(
                            "{:?} (peer {})",
                            error, peer
                        ))));
                    } else {
                        error!(
                            "(overlay) response channel missing for request id {}",
                            request_id
                        );
                    }
                }
                RequestResponseEvent::InboundFailure {
                    peer,
                    request_id,
                    error,
                } => {
                    error!(
                        "(overlay) inbound request {} from {} failed: {:?}",
                        request_id, peer, error
                    );
                }
                RequestResponseEvent::ResponseSent { peer, request_id } => {
                    debug!("(overlay) response {} sent to {}", request_id, peer);
                }
            },

            SwarmEvent::IncomingConnection {
                local_addr,
                send_back_addr,
            } => {
                debug!(
                    "(swarm) incoming connection {:?} {:?} ",
                    local_addr, send_back_addr
                );
            }
            SwarmEvent::ConnectionEstablished {
                peer_id,
                endpoint,
                num_established,
                ..
            } => {
                debug!(
                    "(swarm) connection established {:?} {:?} {:?} ",
                    peer_id, endpoint, num_established
                );
            }
            SwarmEvent::ConnectionClosed {
                peer_id,
                endpoint,
                num_established,
                cause,
            } => {
                debug!(
                    "(swarm) connection closed {:?} {:?} {:?} {:?} ",
                    peer_id, endpoint, num_established, cause
                );
            }
            SwarmEvent::NewListenAddr {
                listener_id,
                address,
            } => {
                debug!(
                    "(swarm) new listener id {:?} and addr {:?} ",
                    listener_id, address
                );
                self.node_address = Some(address);
            }
            _ => {}
        }
    }
}

#[derive(Debug)]
pub enum Command {
    SendRequest {
        peer_id: PeerId,
        address: Multiaddr,
        request: Request,
        sender: oneshot::Sender<Result<Response, RpcError>>,
    },
    SendResponse {
        channel: ResponseChannel<Response>,
        response: Response,
    },
}

/// [`Transport`] backed by a running [`Network`].
#[derive(Clone)]
pub struct NetworkHandle {
    command_sender: mpsc::Sender<Command>,
}

#[async_trait]
impl Transport for NetworkHandle {
    async fn send(&self, address: &str, request: Request) -> Result<Response, RpcError> {
        let (peer_id, multiaddr) = split_peer_address(address)?;
        let (sender, receiver) = oneshot::channel();
        self.command_sender
            .send(Command::SendRequest {
                peer_id,
                address: multiaddr,
                request,
                sender,
            })
            .await
            .map_err(|_| RpcError::Transport("network loop stopped".to_string()))?;
        receiver
            .await
            .map_err(|_| RpcError::Unreachable(address.to_string()))?
    }
}
