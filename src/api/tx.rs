use actix_web::{HttpResponse, Responder, get, post, web};
use log::{debug, info};

use super::models::AppState;
use crate::network::Ack;
use crate::transaction::Transaction;

/// Admit a signed transaction to the pending pool and relay it if new.
#[post("/transaction")]
pub async fn post_transaction(
    state: web::Data<AppState>,
    body: web::Json<Transaction>,
) -> impl Responder {
    let tx = body.into_inner();
    let hash = tx.hash();
    match state.ledger.add_transaction(tx.clone()) {
        Ok(true) => {
            info!("API - pending += {hash}");
            let (peers, client) = (state.peers.clone(), state.client.clone());
            actix_web::rt::spawn(async move {
                peers.broadcast_transaction(&client, &tx).await;
            });
            HttpResponse::Ok().json(Ack::accepted())
        }
        // already pending, nothing to relay
        Ok(false) => HttpResponse::Ok().json(Ack::accepted()),
        Err(e) => {
            debug!("API - tx {hash} declined: {e}");
            HttpResponse::Ok().json(Ack::declined(e))
        }
    }
}

#[get("/pending")]
pub async fn get_pending(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.ledger.pending_transactions())
}

/// Nonce the next transaction from `address` must carry.
#[get("/nonce/{address}")]
pub async fn get_nonce(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    HttpResponse::Ok().json(state.ledger.nonce(&path.into_inner()))
}
