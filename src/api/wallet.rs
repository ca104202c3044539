use actix_web::{HttpResponse, Responder, post};

use super::models::NewWalletResponse;
use crate::wallet::KeyPair;

/// Generate a throwaway key pair (development helper; the key is not kept).
#[post("/wallet/new")]
pub async fn create_wallet() -> impl Responder {
    let keys = KeyPair::generate();
    HttpResponse::Ok().json(NewWalletResponse {
        private_key: keys.private_hex(),
        address: keys.address().to_string(),
    })
}
