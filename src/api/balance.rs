use actix_web::{HttpResponse, Responder, get, web};

use super::models::AppState;

#[get("/balance/{address}")]
pub async fn get_balance(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    HttpResponse::Ok().json(state.ledger.balance(&path.into_inner()))
}
