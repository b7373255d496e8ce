use actix_web::{HttpResponse, Responder, get, post, web};
use log::{info, warn};

use super::models::{
    AppState, BlockView, ChainResponse, DifficultyResponse, RejectedResponse, ValidateResponse,
};
use crate::blockchain::Block;

/// Get the full blockchain.
#[get("/chain/")]
pub async fn get_chain(state: web::Data<AppState>) -> impl Responder {
    let bc = state.blockchain.lock().expect("mutex poisoned");
    let resp = ChainResponse {
        length: bc.len(),
        difficulty: bc.difficulty(),
        chain: bc.blocks().iter().map(BlockView::from).collect(),
    };
    HttpResponse::Ok().json(resp)
}

/// Validate the whole chain.
#[get("/validate/")]
pub async fn validate_chain(state: web::Data<AppState>) -> impl Responder {
    let bc = state.blockchain.lock().expect("mutex poisoned");
    let resp = ValidateResponse {
        valid: bc.is_valid_chain(),
        length: bc.len(),
        difficulty: bc.difficulty(),
    };
    HttpResponse::Ok().json(resp)
}

/// Difficulty the next block must meet.
#[get("/difficulty/")]
pub async fn get_difficulty(state: web::Data<AppState>) -> impl Responder {
    let bc = state.blockchain.lock().expect("mutex poisoned");
    HttpResponse::Ok().json(DifficultyResponse {
        difficulty: bc.difficulty(),
    })
}

#[get("/blocks/latest/")]
pub async fn latest_block(state: web::Data<AppState>) -> impl Responder {
    let bc = state.blockchain.lock().expect("mutex poisoned");
    HttpResponse::Ok().json(BlockView::from(bc.latest_block()))
}

/// Submit a block mined elsewhere. It is validated against the current tip.
#[post("/blocks/")]
pub async fn submit_block(state: web::Data<AppState>, body: web::Json<Block>) -> impl Responder {
    let candidate = body.into_inner();
    let index = candidate.index();

    let mut bc = state.blockchain.lock().expect("mutex poisoned");
    match bc.submit(candidate) {
        Ok(block) => {
            info!("SUBMIT - accepted block #{} hash={}", index, block.hash());
            HttpResponse::Ok().json(BlockView::from(block))
        }
        Err(e) => {
            warn!("SUBMIT - block #{} refused: {}", index, e);
            HttpResponse::BadRequest().json(RejectedResponse::new(e))
        }
    }
}
