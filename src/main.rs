use anyhow::{bail, Context};
use clap::Parser;
use libp2p::{identity::Keypair, Multiaddr};
use lightchain_node::chain::ViewUpdateOutcome;
use lightchain_node::config::{HonestyMode, NodeConfig};
use lightchain_node::network::{Network, RequestHandler};
use lightchain_node::node::Node;
use lightchain_node::telemetry::LogTelemetry;
use lightchain_node::wallet::Wallet;
use log::{debug, info, warn};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::{select, signal, time};

/// LightChain peer on a skip graph overlay
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON node configuration; flags below override it
    #[arg(short, long, env = "LIGHTCHAIN_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "LIGHTCHAIN_LISTEN", default_value = "/ip4/0.0.0.0/tcp/4000")]
    listen: Multiaddr,

    /// Address peers dial, defaults to the listen address
    #[arg(long, env = "LIGHTCHAIN_ADVERTISE")]
    advertise: Option<Multiaddr>,

    /// Full address (with /p2p/<peer id>) of a node already in the overlay
    #[arg(short, long, env = "LIGHTCHAIN_INTRODUCER")]
    introducer: Option<String>,

    #[arg(short, long, env = "LIGHTCHAIN_MODE")]
    mode: Option<HonestyMode>,

    /// Hex secp256k1 secret, a random key is used when absent
    #[arg(long, env = "LIGHTCHAIN_SECRET")]
    secret: Option<String>,

    /// Found the chain by inserting the genesis block
    #[arg(long, default_value_t = false)]
    genesis: bool,

    /// Transactions to issue, one per tick
    #[arg(short, long, env = "LIGHTCHAIN_TRANSACTIONS", default_value_t = 0)]
    transactions: usize,

    /// Seconds between ticks
    #[arg(long, env = "LIGHTCHAIN_INTERVAL", default_value_t = 5)]
    interval: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let keypair = Keypair::generate_ed25519();
    let advertise = args.advertise.clone().unwrap_or_else(|| args.listen.clone());
    let address = format!("{}/p2p/{}", advertise, keypair.public().to_peer_id());

    let mut config = match &args.config {
        Some(path) => NodeConfig::load(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => NodeConfig::new(address.clone()),
    };
    config.address = address;
    if let Some(introducer) = args.introducer.clone() {
        config.introducer = Some(introducer);
    }
    if let Some(mode) = args.mode {
        config.mode = mode;
    }

    let wallet = match &args.secret {
        Some(secret) => Wallet::from_secret_hex(secret)?,
        None => Wallet::random(),
    };

    let network = Network::new(keypair, args.listen.clone(), config.rpc_timeout())?;
    let node = Node::new(
        config,
        wallet,
        Arc::new(network.handle()),
        Arc::new(LogTelemetry),
    );
    let handler: Arc<dyn RequestHandler> = node.clone();
    tokio::spawn(network.run(handler));
    info!("node {} listening as {}", node.num_id(), node.address());

    if !node.join().await {
        bail!("could not join the overlay");
    }
    if args.genesis {
        node.insert_genesis().await?;
    }

    let mut interval = time::interval(Duration::from_secs(args.interval.max(1)));
    let mut issued = 0;
    loop {
        select! {
            _ = interval.tick() => {
                if issued < args.transactions {
                    let content = format!("{}:{}", node.num_id(), issued);
                    match node.create_transaction(&content).await {
                        Ok(Some(_)) => issued += 1,
                        Ok(None) => {}
                        Err(e) => warn!("transaction not issued: {:#}", e),
                    }
                }
                node.update_view_table().await;
                match node.view_update().await {
                    ViewUpdateOutcome::Extended(block) => {
                        info!("chain extended to index {}", block.index)
                    }
                    outcome => debug!("view update: {:?}", outcome),
                }
            }
            _ = signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }
    Ok(())
}
