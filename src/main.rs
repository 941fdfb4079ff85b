use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use listing_harvester::{
    browser::ChromeRenderer,
    config::Settings,
    create_app,
    ocr::TesseractCli,
    store::{JobStore, MemoryStore, SeaOrmStore},
    AppState,
};
use migration::{Migrator, MigratorTrait};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing, RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::from_env().context("invalid configuration")?;

    let store: Arc<dyn JobStore> = match settings.database_url.as_deref() {
        Some(url) => {
            let store = SeaOrmStore::connect(url).await.context("failed to connect to database")?;
            if settings.run_migrations {
                Migrator::up(store.connection(), None).await.context("migrations failed")?;
                tracing::info!("Database migrations applied");
            }
            Arc::new(store)
        }
        None => {
            tracing::info!("DATABASE_URL not set; tracking jobs in memory");
            Arc::new(MemoryStore::new())
        }
    };

    let renderer = Arc::new(ChromeRenderer::new(settings.chrome_path.clone(), settings.headless));
    let ocr = Arc::new(TesseractCli::new(settings.tesseract_bin.clone()));
    let addr = settings.bind_addr();

    let app = create_app(AppState::new(settings, store, renderer, ocr));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("Scraper API listening on http://{}", addr);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
