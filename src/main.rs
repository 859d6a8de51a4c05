use actix_web::{middleware::Logger, App, HttpServer};
use anyhow::Context;
use dotenv::dotenv;

mod api;
mod config;
mod db;
mod error;
mod search;
mod services;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists
    dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = config::AppConfig::new().context("Failed to load configuration")?;

    log::info!(
        "Starting server on {}:{}",
        config.server.host,
        config.server.port
    );

    tokio::fs::create_dir_all(&config.storage.upload_path)
        .await
        .with_context(|| {
            format!(
                "Failed to create upload directory {}",
                config.storage.upload_path
            )
        })?;

    let pool = db::create_pool(&config.database.url, config.database.max_connections).await?;

    let bind = (config.server.host.clone(), config.server.port);
    let workers = config.server.workers;
    let state = api::AppState::new(config, pool);

    let mut server = HttpServer::new(move || {
        let state = state.clone();
        App::new()
            .wrap(Logger::default())
            .wrap(actix_cors::Cors::permissive()) // Configure properly in production
            .configure(move |cfg| state.register(cfg))
            .configure(api::configure)
    });
    if let Some(workers) = workers {
        server = server.workers(workers);
    }

    server.bind(bind)?.run().await?;
    Ok(())
}
