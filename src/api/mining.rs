use actix_web::{HttpResponse, Responder, post, rt, web};
use log::{debug, error, info, warn};

use super::models::{AppState, CoinbaseRequest, MineRequest, MineResponse, RejectedResponse};
use crate::blockchain::{BlockTemplate, CancelToken, pow};
use crate::transaction::Transaction;
use crate::wallet::validate_address;

/// Mine an arbitrary payload into the next block.
#[post("/mine/")]
pub async fn mine_block(state: web::Data<AppState>, req: web::Json<MineRequest>) -> impl Responder {
    let data = req.into_inner().data;
    if data.is_null() {
        return HttpResponse::BadRequest().json(RejectedResponse::new("data required"));
    }

    let template = {
        let bc = state.blockchain.lock().expect("mutex poisoned");
        bc.template(data)
    };
    seal(&state, template, CancelToken::new()).await
}

/// Mine a block whose payload is the coinbase reward for `miner_address`.
#[post("/mine/coinbase/")]
pub async fn mine_coinbase(
    state: web::Data<AppState>,
    req: web::Json<CoinbaseRequest>,
) -> impl Responder {
    let address = match validate_address(req.miner_address.trim()) {
        Ok(a) => a,
        Err(e) => return HttpResponse::BadRequest().json(RejectedResponse::new(e)),
    };

    let template = {
        let bc = state.blockchain.lock().expect("mutex poisoned");
        let next_index = bc.latest_block().index() + 1;
        let coinbase = Transaction::coinbase(&address, next_index);
        debug!("MINER - coinbase {} for block #{}", coinbase.id, next_index);
        match serde_json::to_value(&coinbase) {
            Ok(v) => bc.template(v),
            Err(e) => {
                error!("MINER - cannot encode coinbase: {e}");
                return HttpResponse::InternalServerError().finish();
            }
        }
    };
    seal(&state, template, CancelToken::new()).await
}

/* -------------------- Helpers -------------------- */

/// Run the nonce search off the async executor and without the chain lock,
/// then append the result if the tip has not moved in the meantime. The search
/// is cancelled on timeout and when this future is dropped before it finishes.
pub(super) async fn seal(state: &AppState, template: BlockTemplate, cancel: CancelToken) -> HttpResponse {
    let guard = cancel.drop_guard();
    let timer = state.mining_timeout.map(|timeout| {
        let timer = cancel.clone();
        rt::spawn(async move {
            rt::time::sleep(timeout).await;
            timer.cancel();
        })
    });

    let index = template.index;
    let search = web::block(move || pow::search(&template, &cancel)).await;
    if let Some(timer) = timer {
        timer.abort();
    }
    guard.disarm();

    let candidate = match search {
        Ok(Ok(block)) => block,
        Ok(Err(e)) => {
            warn!("MINER - block #{} not sealed: {}", index, e);
            return HttpResponse::ServiceUnavailable().json(RejectedResponse::new(e));
        }
        Err(e) => {
            error!("MINER - search task failed: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    let mut bc = state.blockchain.lock().expect("mutex poisoned");
    match bc.submit(candidate) {
        Ok(block) => {
            let resp = MineResponse {
                mined_index: block.index(),
                hash: block.hash(),
                nonce: block.nonce(),
                difficulty: block.difficulty(),
            };
            info!(
                "MINER - sealed block #{} (hash={}, nonce={})",
                resp.mined_index, resp.hash, resp.nonce
            );
            HttpResponse::Ok().json(resp)
        }
        Err(e) => {
            warn!("MINER - stale template for block #{}: {}", index, e);
            HttpResponse::Conflict().json(RejectedResponse::new(e))
        }
    }
}
