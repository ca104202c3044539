use actix_web::{App, HttpServer, web};
use dotenvy::dotenv;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use pow_ledger::api::{self, AppState};
use pow_ledger::network::{HttpPeerClient, PeerSet, sync_with_peer};
use pow_ledger::storage::SledStore;
use pow_ledger::{ChainConfig, KeyPair, Ledger, Mode, NodeConfig, wallet};

/// Mine, commit and gossip blocks until `cancel` flips.
async fn mining_loop(
    ledger: Arc<Ledger>,
    peers: Arc<PeerSet>,
    client: HttpPeerClient,
    reward_address: String,
    lowest_fee: u64,
    cancel: watch::Receiver<bool>,
) {
    info!("⛏️ mining to {reward_address} (lowest fee {lowest_fee})");
    while let Some(block) = ledger
        .mine_block_until(&reward_address, lowest_fee, &cancel)
        .await
    {
        let index = block.index;
        match ledger.add_block(block.clone(), Mode::Strict) {
            Ok(()) => {
                peers.broadcast_block(&client, &block).await;
            }
            // a peer's block landed first
            Err(e) => warn!("mined block #{index} discarded: {e}"),
        }
    }
    info!("mining stopped");
}

/// Periodically merge the peers our peers know about.
async fn discovery_loop(
    peers: Arc<PeerSet>,
    client: HttpPeerClient,
    period: Duration,
    mut cancel: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let added = peers.discover(&client).await;
                if added > 0 {
                    info!("discovered {added} peers ({} known)", peers.len());
                }
            }
            _ = cancel.changed() => break,
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let _ = dotenv();
    env_logger::init();

    let node = NodeConfig::from_env();
    let chain_config = ChainConfig::from_env();

    if let Some(address) = &node.miner_address {
        if let Err(e) = wallet::parse_address(address) {
            error!("MINER_ADDRESS is not a 96-hex-char public key: {e}");
            return Err(std::io::Error::other(e));
        }
    }

    let store = SledStore::open(&node.chain_db).map_err(std::io::Error::other)?;
    let ledger = Ledger::open(chain_config, Box::new(store)).map_err(std::io::Error::other)?;
    let ledger = Arc::new(ledger);
    let peers = Arc::new(PeerSet::new(node.public_url.clone()));
    let client = HttpPeerClient::new(Duration::from_secs(node.peer_timeout_secs))
        .map_err(std::io::Error::other)?;

    if let Some(peer) = &node.sync_peer {
        match sync_with_peer(&ledger, &peers, &client, peer).await {
            Ok(applied) => info!("synced {applied} blocks from {peer}"),
            Err(e) => {
                error!("sync with {peer} failed: {e}");
                return Err(std::io::Error::other(e));
            }
        }
    }

    if ledger.is_empty() {
        let address = match &node.miner_address {
            Some(address) => address.clone(),
            None => {
                let keys = KeyPair::generate();
                warn!(
                    "no MINER_ADDRESS, genesis paid to fresh key {} (private {})",
                    keys.address(),
                    keys.private_hex()
                );
                keys.address().to_string()
            }
        };
        info!("mining genesis block (difficulty {})", chain_config.initial_difficulty);
        let hash = ledger.mine_genesis(&address).map_err(std::io::Error::other)?;
        info!("genesis {hash}");
    }

    let (stop_mining, cancel) = watch::channel(false);
    actix_web::rt::spawn(discovery_loop(
        peers.clone(),
        client.clone(),
        Duration::from_secs(node.discover_secs),
        cancel.clone(),
    ));
    if let Some(address) = node.miner_address.clone() {
        actix_web::rt::spawn(mining_loop(
            ledger.clone(),
            peers.clone(),
            client.clone(),
            address,
            node.lowest_fee,
            cancel,
        ));
    }

    println!(
        "⛓️ Starting node at http://{}:{} (height {})",
        node.host,
        node.port,
        ledger.height()
    );

    let state = web::Data::new(AppState::new(ledger, peers, client));

    let result = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(api::init_routes)
    })
    .bind((node.host.as_str(), node.port))?
    .run()
    .await;

    let _ = stop_mining.send(true);
    result
}
