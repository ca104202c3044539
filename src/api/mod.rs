mod balance;
mod chain;
mod health;
pub mod models;
mod peers;
mod tx;
mod wallet;

use actix_web::web::{JsonConfig, ServiceConfig};

use crate::blockchain::MAX_BLOCK_BYTES;

pub use models::AppState;

/// Largest JSON body accepted: a full block plus its header and coinbase.
pub const MAX_PAYLOAD_BYTES: usize = MAX_BLOCK_BYTES + 64 * 1024;

/// Node-to-node and wallet routes, served from the root so peers can
/// address each other as `host:port`.
pub fn init_routes(cfg: &mut ServiceConfig) {
    cfg.app_data(JsonConfig::default().limit(MAX_PAYLOAD_BYTES))
        .service(health::health_check)
        .service(chain::post_block)
        .service(chain::get_block)
        .service(chain::get_last_block)
        .service(chain::get_block_range)
        .service(chain::get_height)
        .service(chain::get_difficulty)
        .service(chain::get_reward)
        .service(chain::get_config)
        .service(tx::post_transaction)
        .service(tx::get_pending)
        .service(tx::get_nonce)
        .service(balance::get_balance)
        .service(peers::get_peers)
        .service(peers::post_peer)
        .service(wallet::create_wallet);
}
