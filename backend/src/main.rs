mod config;
mod error;
mod job_controller;
mod pipeline;
mod secret;
mod services;
mod sheets;
mod source;
mod store;
#[cfg(test)]
mod testing;
mod watcher;

use crate::config::Config;
use crate::pipeline::orchestrator::{Orchestrator, SyncOptions};
use crate::secret::SecretCodec;
use crate::sheets::google::GoogleSheets;
use crate::sheets::SheetService;
use crate::source::mongo::MongoSource;
use crate::source::DocumentSource;
use crate::store::Store;
use crate::watcher::{ChangePropagator, WatcherRegistry};
use actix_web::{web, App, HttpServer};
use env_logger::Env;
use log::{error, info};
use std::io;
use std::sync::Arc;

#[actix_web::main]
async fn main() -> io::Result<()> {
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    let config = Config::from_env().map_err(|err| {
        error!("configuration: {err}");
        io::Error::new(io::ErrorKind::InvalidInput, err)
    })?;
    let store = Store::open(&config.database_path).map_err(|err| {
        error!("opening {}: {err}", config.database_path);
        io::Error::other(err)
    })?;

    let codec = SecretCodec::new(config.secret_key);
    let source: Arc<dyn DocumentSource> = Arc::new(MongoSource);
    let sheets: Arc<dyn SheetService> = Arc::new(GoogleSheets::new(&config));
    let registry = WatcherRegistry::new(
        store.clone(),
        source.clone(),
        ChangePropagator::new(store.clone(), sheets.clone()),
        codec.clone(),
    );
    let orchestrator = Orchestrator::new(
        store.clone(),
        source,
        sheets,
        codec,
        registry.clone(),
        SyncOptions {
            protect_tabs: config.protect_tabs,
            strict_shapes: config.strict_shapes,
        },
    );

    // Resume watching every binding saved by earlier runs.
    match registry.reload().await {
        Ok(count) => info!("resumed {count} watchers"),
        Err(err) => error!("could not load bindings: {err}"),
    }

    info!("Server running at http://{}:{}", config.host, config.port);

    HttpServer::new(move || {
        App::new()
            .app_data(web::JsonConfig::default().limit(1024 * 1024))
            .app_data(web::Data::new(store.clone()))
            .app_data(web::Data::new(registry.clone()))
            .app_data(web::Data::new(orchestrator.clone()))
            .service(services::projects::configure_routes())
            .service(services::users::configure_routes())
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
