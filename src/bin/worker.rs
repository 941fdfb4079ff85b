use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::Parser;
use listing_harvester::browser::ChromeRenderer;
use listing_harvester::cli::WorkerArgs;
use listing_harvester::config::Settings;
use listing_harvester::jobs::{run_job, JobContext, JobServices, WebhookDispatcher};
use listing_harvester::ocr::TesseractCli;
use listing_harvester::sites::SiteKind;
use listing_harvester::store::{JobStatus, JobStore, MemoryStore, SeaOrmStore};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialise tracing, RUST_LOG overrides INFO
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run().await {
        Ok(JobStatus::Failed) => std::process::exit(1),
        Ok(_) => {}
        Err(e) => {
            error!("{e:#}");
            std::process::exit(2);
        }
    }
}

async fn run() -> anyhow::Result<JobStatus> {
    let args = WorkerArgs::parse();
    let settings = Settings::from_env()?;

    let kind = SiteKind::detect(&args.category_url)
        .ok_or_else(|| anyhow!("no site adapter for {}", args.category_url))?;
    let spec = args.job_spec()?;

    let store: Arc<dyn JobStore> = match settings.database_url.as_deref() {
        Some(url) => Arc::new(SeaOrmStore::connect(url).await.context("failed to connect to database")?),
        None => {
            info!("DATABASE_URL not set; job logs go to stdout only");
            Arc::new(MemoryStore::new())
        }
    };

    let services = JobServices {
        renderer: Arc::new(ChromeRenderer::new(settings.chrome_path.clone(), settings.headless)),
        ocr: Arc::new(TesseractCli::new(settings.tesseract_bin.clone())),
        store,
        timings: settings.timings,
    };
    let dispatcher = WebhookDispatcher::new(reqwest::Client::new(), args.webhook_url);

    let report = run_job(JobContext::new(spec, kind.adapter(), dispatcher, services)).await;
    Ok(report.status)
}
