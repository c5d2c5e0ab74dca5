#![allow(dead_code)]

use lightchain_node::config::{HonestyMode, NodeConfig};
use lightchain_node::network::{LocalNetwork, RequestHandler};
use lightchain_node::node::Node;
use lightchain_node::telemetry::MemoryTelemetry;
use lightchain_node::wallet::Wallet;
use std::sync::{Arc, Weak};

pub fn secret(index: usize) -> String {
    format!("{:064x}", index + 1)
}

pub fn wallet(index: usize) -> Wallet {
    Wallet::from_secret_hex(&secret(index)).unwrap()
}

/// Builds a node and makes it reachable on `network`, without joining.
pub fn spawn_node(
    network: &Arc<LocalNetwork>,
    index: usize,
    introducer: Option<&str>,
    mode: HonestyMode,
) -> (Arc<Node>, Arc<MemoryTelemetry>) {
    let mut config = NodeConfig::new(format!("peer-{}", index)).with_mode(mode);
    if let Some(introducer) = introducer {
        config = config.with_introducer(introducer);
    }
    let telemetry = Arc::new(MemoryTelemetry::new());
    let node = Node::new(config, wallet(index), network.clone(), telemetry.clone());
    let weak = Arc::downgrade(&node);
    let handler: Weak<dyn RequestHandler> = weak;
    network.register(node.address(), handler);
    (node, telemetry)
}

/// In-process overlay; node 0 founds it and introduces everyone else.
pub struct Cluster {
    pub network: Arc<LocalNetwork>,
    pub nodes: Vec<Arc<Node>>,
    pub telemetry: Vec<Arc<MemoryTelemetry>>,
}

impl Cluster {
    pub async fn start(size: usize) -> Self {
        Self::with_modes(&vec![HonestyMode::Honest; size]).await
    }

    pub async fn with_modes(modes: &[HonestyMode]) -> Self {
        let network = LocalNetwork::new();
        let mut nodes: Vec<Arc<Node>> = Vec::new();
        let mut telemetry = Vec::new();
        for (index, mode) in modes.iter().enumerate() {
            let introducer = nodes.first().map(|n| n.address().to_string());
            let (node, events) = spawn_node(&network, index, introducer.as_deref(), *mode);
            assert!(node.join().await, "node {} failed to join", index);
            nodes.push(node);
            telemetry.push(events);
        }
        Self {
            network,
            nodes,
            telemetry,
        }
    }

    pub fn node(&self, address: &str) -> &Arc<Node> {
        self.nodes
            .iter()
            .find(|n| n.address() == address)
            .unwrap()
    }
}
