use actix_web::{App, HttpServer, middleware, web};
use anyhow::Context;
use log::info;

use medibook::{Config, Storage, configure, handlers, init_pool};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let pool = init_pool(&config.database_url, config.pool_size, config.busy_timeout)?;
    let storage = web::Data::new(Storage::new(pool));

    info!("listening on {}:{}", config.host, config.port);
    HttpServer::new(move || {
        App::new()
            .app_data(storage.clone())
            .wrap(middleware::Logger::default())
            .configure(configure)
            .default_service(web::to(handlers::not_found))
    })
    .bind((config.host.as_str(), config.port))
    .with_context(|| format!("failed to bind {}:{}", config.host, config.port))?
    .run()
    .await
    .context("server terminated with an error")
}
