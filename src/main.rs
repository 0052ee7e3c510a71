use std::sync::Arc;

use caballus_market::auth::{DynVerifier, SessionVerifier, TrustingVerifier};
use caballus_market::config::{Config, StoreKind};
use caballus_market::db::{MemoryStore, PgStore, Store};
use caballus_market::engine::Engine;
use caballus_market::error::Error;
use caballus_market::external::{DynNotifier, LogNotifier, WebhookNotifier};
use caballus_market::server::serve;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run().await {
        tracing::error!("{}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Error> {
    let config = Config::load()?;

    let notifier: DynNotifier = match &config.notification_webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone())),
        None => Arc::new(LogNotifier),
    };

    let (store, verifier): (Arc<dyn Store>, DynVerifier) = match config.store {
        StoreKind::Postgres => {
            let db_uri = config
                .database_url
                .as_deref()
                .ok_or_else(|| Error::config_error("DATABASE_URL is required"))?;

            let store = PgStore::new(db_uri, config.database_max_connections).await?;
            let verifier: DynVerifier = Arc::new(SessionVerifier::new(store.pool()).await?);
            let store: Arc<dyn Store> = Arc::new(store);

            (store, verifier)
        }
        StoreKind::Memory => {
            tracing::warn!("using the in-memory store, bearer tokens are taken as user ids");

            let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
            let verifier: DynVerifier = Arc::new(TrustingVerifier);

            (store, verifier)
        }
    };

    let engine = Engine::new(store, notifier, config.provider_search_radius_km)?;

    serve(Arc::new(engine), verifier, config.bind_address).await
}
