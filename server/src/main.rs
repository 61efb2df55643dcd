use std::sync::Arc;

use actix::Arbiter;
use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use anyhow::Context;

use whiteboard_server::config::ServerConfig;
use whiteboard_server::handlers;
use whiteboard_server::server::ServerHandle;
use whiteboard_system::{Clock, SystemClock};

fn cors(allowed_origins: &[String]) -> Cors {
    let cors = Cors::default().allow_any_method().allow_any_header();
    if allowed_origins.is_empty() {
        return cors.allow_any_origin();
    }
    allowed_origins
        .iter()
        .fold(cors, |cors, origin| cors.allowed_origin(origin))
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    env_logger::init();

    let config = ServerConfig::load().context("Failed to load configuration")?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // One arbiter per shard so that separate sessions progress in parallel.
    let arbiters: Vec<Arbiter> = (0..config.shards).map(|_| Arbiter::new()).collect();
    let server = web::Data::new(ServerHandle::spawn_with(&config, clock, |index, shard| {
        if !arbiters[index].spawn(shard) {
            log::error!("Arbiter for shard {} is not running", index);
        }
    }));
    let settings = web::Data::new(config.clone());

    log::info!(
        "Listening on {} with {} session shards",
        config.bind_addr,
        config.shards
    );
    let allowed_origins = config.allowed_origins.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(cors(&allowed_origins))
            .wrap(Logger::default())
            .app_data(server.clone())
            .app_data(settings.clone())
            .configure(handlers::root)
    })
    .bind(&config.bind_addr)
    .with_context(|| format!("Failed to bind {}", config.bind_addr))?
    .run()
    .await?;

    for arbiter in arbiters {
        arbiter.stop();
    }
    Ok(())
}
