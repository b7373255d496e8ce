use actix_web::{HttpResponse, Responder, get, web};

use super::models::{AppState, StatsResponse};
use crate::blockchain::{BLOCK_GENERATION_INTERVAL_MS, DIFFICULTY_ADJUSTMENT_INTERVAL};

#[get("/stats/")]
pub async fn get_stats(state: web::Data<AppState>) -> impl Responder {
    let bc = state.blockchain.lock().expect("mutex poisoned");
    let blocks = bc.blocks();
    let height = blocks.len();
    let latest = bc.latest_block();

    let last_interval_ms = if height >= 2 {
        Some(latest.timestamp() - blocks[height - 2].timestamp())
    } else {
        None
    };

    // average over the last full adjustment window
    let window = DIFFICULTY_ADJUSTMENT_INTERVAL as usize;
    let avg_interval_ms = if height > window {
        let oldest = &blocks[height - 1 - window];
        Some((latest.timestamp() - oldest.timestamp()) as f64 / window as f64)
    } else {
        None
    };

    HttpResponse::Ok().json(StatsResponse {
        height,
        difficulty: bc.difficulty(),
        target_block_interval_ms: BLOCK_GENERATION_INTERVAL_MS,
        adjust_interval: DIFFICULTY_ADJUSTMENT_INTERVAL,
        blocks_until_retarget: DIFFICULTY_ADJUSTMENT_INTERVAL
            - latest.index() % DIFFICULTY_ADJUSTMENT_INTERVAL,
        last_interval_ms,
        avg_interval_ms,
    })
}
