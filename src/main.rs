use actix_web::{App, HttpServer, web};
use dotenvy::dotenv;
use log::info;

use pow_chain::api::{self, AppState};
use pow_chain::blockchain;
use pow_chain::config::Config;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let _ = dotenv();
    env_logger::init();

    let config = Config::from_env();
    let chain = blockchain::instance();
    {
        let bc = chain.lock().expect("mutex poisoned");
        info!(
            "CHAIN - height {} next difficulty {}",
            bc.len(),
            bc.difficulty()
        );
    }

    println!(
        "⛓️ Starting proof-of-work node at http://{}:{}",
        config.host, config.port
    );

    let state = web::Data::new(AppState::new(chain, config.mining_timeout));

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(api::init_routes)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
