mod classifier;
mod config;
mod routes;
#[cfg(test)]
mod test_support;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use classifier::ModelProvisioner;
use config::ServiceConfig;
use routes::configure_routes;
use std::env;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    let config = ServiceConfig::load().map_err(|e| {
        log::error!("Failed to load configuration: {}", e);
        std::io::Error::other(e.to_string())
    })?;

    // the model itself is loaded on the first prediction
    let provisioner = web::Data::new(ModelProvisioner::new(&config));
    let upload = web::Data::new(config.upload.clone());

    match provisioner.locator().remote_url() {
        Some(url) => log::info!("Remote model URL configured: {}", url),
        None => log::info!("No remote model URL configured; local search only"),
    }

    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::AUTHORIZATION,
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(provisioner.clone())
            .app_data(upload.clone())
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
