use actix_web::{HttpResponse, Responder, get, post, web};
use log::{debug, info};

use super::models::AppState;
use crate::blockchain::{Block, Mode};
use crate::network::Ack;

/// Accept a block mined elsewhere and gossip it onward if it extends our tip.
#[post("/block")]
pub async fn post_block(state: web::Data<AppState>, body: web::Json<Block>) -> impl Responder {
    let block = body.into_inner();
    let index = block.index;
    match state.ledger.add_block(block.clone(), Mode::Strict) {
        Ok(()) => {
            info!("API - accepted block #{index} from peer");
            let (peers, client) = (state.peers.clone(), state.client.clone());
            actix_web::rt::spawn(async move {
                peers.broadcast_block(&client, &block).await;
            });
            HttpResponse::Ok().json(Ack::accepted())
        }
        Err(e) => {
            debug!("API - block #{index} declined: {e}");
            HttpResponse::Ok().json(Ack::declined(e))
        }
    }
}

#[get("/blocks/{index}")]
pub async fn get_block(state: web::Data<AppState>, path: web::Path<u64>) -> impl Responder {
    match state.ledger.block_at(path.into_inner()) {
        Some(block) => HttpResponse::Ok().json(block),
        None => HttpResponse::NotFound().json(Ack::declined("no block at that index")),
    }
}

#[get("/lastblock")]
pub async fn get_last_block(state: web::Data<AppState>) -> impl Responder {
    match state.ledger.last_block() {
        Some(block) => HttpResponse::Ok().json(block),
        None => HttpResponse::NotFound().json(Ack::declined("chain is empty")),
    }
}

/// Blocks with `start <= index < end`, clipped to our height.
#[get("/blockrange/{start}/{end}")]
pub async fn get_block_range(
    state: web::Data<AppState>,
    path: web::Path<(u64, u64)>,
) -> impl Responder {
    let (start, end) = path.into_inner();
    HttpResponse::Ok().json(state.ledger.blocks_in_range(start, end))
}

#[get("/height")]
pub async fn get_height(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.ledger.height())
}

#[get("/difficulty")]
pub async fn get_difficulty(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.ledger.difficulty())
}

#[get("/reward")]
pub async fn get_reward(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.ledger.reward())
}

#[get("/config")]
pub async fn get_config(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.ledger.config())
}
