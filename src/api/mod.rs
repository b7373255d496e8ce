mod chain;
mod health;
mod mining;
pub mod models;
mod stats;

use actix_web::web::{self, ServiceConfig};

pub use models::AppState;

pub fn init_routes(cfg: &mut ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(health::health_check)
            .service(chain::get_chain)
            .service(chain::validate_chain)
            .service(chain::get_difficulty)
            .service(chain::latest_block)
            .service(chain::submit_block)
            .service(mining::mine_block)
            .service(mining::mine_coinbase)
            .service(stats::get_stats),
    );
}
