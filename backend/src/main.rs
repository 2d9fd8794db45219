use std::env;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use cxr_triage::config::TriageConfig;
use cxr_triage::inference::{ModelService, weights};
use cxr_triage::routes::{AppState, configure_routes};
use cxr_triage::verification::VerificationClient;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    dotenv::dotenv().ok();

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    let config = match TriageConfig::load() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Failed to load configuration: {}", e);
            return Err(std::io::Error::other(format!("Configuration error: {}", e)));
        }
    };

    let service = ModelService::new();
    let engine = service.get_or_init(|| weights::load_engine(&config));
    if let Some(reason) = engine.unavailable_reason() {
        log::warn!("Running in demo mode, results are not diagnostic: {}", reason);
    }

    let verifier = if config.verification.enabled {
        match VerificationClient::from_config(&config.verification) {
            Ok(client) => {
                log::info!("Verification enabled against {}", client.endpoint());
                Some(client)
            }
            Err(e) => {
                log::warn!("Verification disabled: {}", e);
                None
            }
        }
    } else {
        None
    };

    let bind_address = config.server.bind_address();
    let state = AppState {
        engine,
        config: Arc::new(config),
        verifier,
    };

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
            .app_data(web::Data::new(state.clone()))
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
