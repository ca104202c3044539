use actix_web::{HttpResponse, Responder, get, post, web};

use super::models::AppState;
use crate::network::{Ack, PeerAnnouncement};

#[get("/peers")]
pub async fn get_peers(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.peers.snapshot())
}

/// A node announcing itself.
#[post("/peers")]
pub async fn post_peer(
    state: web::Data<AppState>,
    body: web::Json<PeerAnnouncement>,
) -> impl Responder {
    if state.peers.add(&body.url) {
        HttpResponse::Ok().json(Ack::accepted())
    } else {
        HttpResponse::Ok().json(Ack::declined("self or already known"))
    }
}
