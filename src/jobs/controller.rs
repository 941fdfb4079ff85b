//! The crawl loop for one job.
//!
//! Pages run in increasing order and listings in discovery order, one at a
//! time. Cancellation is cooperative: the job's status is polled at the
//! start of each page, the start of each listing and right before each
//! dispatch. The terminal status is written once, at the very end.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Context;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::Instrument;

use super::dedup;
use super::log::JobLog;
use super::model::{JobSpec, RunMode};
use super::paginator::list_page;
use super::webhook::{DispatchOutcome, WebhookDispatcher};
use crate::browser::{BrowserSession, LaunchOptions, Renderer, ResourcePolicy};
use crate::config::Timings;
use crate::ocr::OcrEngine;
use crate::sites::{self, ExtractionContext, SiteAdapter};
use crate::store::{resolve_store, JobStatus, JobStore};

/// Process-wide collaborators a job borrows.
#[derive(Clone)]
pub struct JobServices {
    pub renderer: Arc<dyn Renderer>,
    pub ocr: Arc<dyn OcrEngine>,
    pub store: Arc<dyn JobStore>,
    pub timings: Timings,
}

/// Everything one running job owns. Passed through every step.
pub struct JobContext {
    pub spec: JobSpec,
    pub adapter: Arc<dyn SiteAdapter>,
    pub dispatcher: WebhookDispatcher,
    pub store: Arc<dyn JobStore>,
    pub renderer: Arc<dyn Renderer>,
    pub extraction: ExtractionContext,
    pub log: JobLog,
}

impl JobContext {
    pub fn new(
        spec: JobSpec,
        adapter: Arc<dyn SiteAdapter>,
        dispatcher: WebhookDispatcher,
        services: JobServices,
    ) -> Self {
        let log = JobLog::new(spec.job_id.clone(), services.store.clone());
        Self {
            spec,
            adapter,
            dispatcher,
            store: services.store,
            renderer: services.renderer,
            extraction: ExtractionContext {
                ocr: services.ocr,
                timings: services.timings,
            },
            log,
        }
    }

    /// Whether someone set the job to `stopped`. Jobs without an id can't be stopped.
    async fn stop_requested(&self) -> bool {
        let Some(job_id) = self.spec.job_id.as_deref() else {
            return false;
        };
        match self.store.job_status(job_id).await {
            Ok(status) => status == Some(JobStatus::Stopped),
            Err(e) => {
                tracing::warn!(job_id, "Status poll failed, continuing: {}", e);
                false
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobTally {
    /// Listings the receiver created.
    pub processed: usize,
    /// Already known, either to the store or to the receiver.
    pub skipped: usize,
    /// Dispatches that failed.
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub tally: JobTally,
    pub status: JobStatus,
}

impl JobReport {
    pub fn summary(&self) -> String {
        format!(
            "Processed: {} | Skipped: {} | Status: {}",
            self.tally.processed, self.tally.skipped, self.status
        )
    }
}

/// Resolves the job's store and runs it in the background.
///
/// Returns `None` from the task when the job's own store could not be opened;
/// there is nowhere to record the job in that case.
pub fn spawn_job(
    spec: JobSpec,
    adapter: Arc<dyn SiteAdapter>,
    dispatcher: WebhookDispatcher,
    services: JobServices,
) -> JoinHandle<Option<JobReport>> {
    let span = tracing::info_span!("job", job_id = spec.job_id.as_deref().unwrap_or("-"));
    tokio::spawn(
        async move {
            let mut services = services;
            match resolve_store(services.store.clone(), spec.store_override.as_deref()).await {
                Ok(store) => services.store = store,
                Err(e) => {
                    tracing::error!("Could not open the job's store: {}", e);
                    return None;
                }
            }
            Some(run_job(JobContext::new(spec, adapter, dispatcher, services)).await)
        }
        .instrument(span),
    )
}

/// Runs the job to a terminal status. Never fails: errors and panics both
/// end up as `failed`.
pub async fn run_job(ctx: JobContext) -> JobReport {
    let mut tally = JobTally::default();

    let outcome = AssertUnwindSafe(crawl(&ctx, &mut tally)).catch_unwind().await;
    let status = match outcome {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => {
            ctx.log.error(format!("Job failed: {e:#}")).await;
            JobStatus::Failed
        }
        Err(panic) => {
            ctx.log.error(format!("Job crashed: {}", panic_message(panic.as_ref()))).await;
            JobStatus::Failed
        }
    };

    let report = JobReport { tally, status };
    if tally.failed > 0 {
        ctx.log
            .warning(format!("{} listing(s) could not be delivered to the webhook", tally.failed))
            .await;
    }
    ctx.log.info(report.summary()).await;

    if let Some(job_id) = ctx.spec.job_id.as_deref() {
        if let Err(e) = ctx.store.finish_job(job_id, status).await {
            tracing::error!(job_id, "Failed to record terminal status {}: {}", status, e);
        }
    }
    report
}

async fn crawl(ctx: &JobContext, tally: &mut JobTally) -> anyhow::Result<JobStatus> {
    ctx.log
        .info(format!(
            "Starting {} crawl of {} ({} mode, pages {:?})",
            ctx.adapter.name(),
            ctx.spec.category_url,
            ctx.spec.mode,
            ctx.spec.pages
        ))
        .await;

    let launch = LaunchOptions {
        proxy: ctx.spec.proxy.clone(),
        resource_policy: ctx
            .spec
            .block_resources
            .then(|| ResourcePolicy::lightweight(ctx.adapter.phone_image_patterns())),
        navigation_timeout: Some(ctx.extraction.timings.navigation_timeout),
    };
    let session = ctx.renderer.launch(&launch).await.context("browser launch failed")?;

    let result = crawl_pages(ctx, session.as_ref(), tally).await;
    session.close().await;
    result
}

async fn crawl_pages(
    ctx: &JobContext,
    session: &dyn BrowserSession,
    tally: &mut JobTally,
) -> anyhow::Result<JobStatus> {
    for &page_number in &ctx.spec.pages {
        if ctx.stop_requested().await {
            ctx.log.info(format!("Stop requested before page {page_number}")).await;
            return Ok(JobStatus::Stopped);
        }

        ctx.log.info(format!("Scraping index page {page_number}")).await;
        let links = list_page(
            session,
            ctx.adapter.as_ref(),
            &ctx.spec.category_url,
            page_number,
            &ctx.extraction.timings,
        )
        .await
        .with_context(|| format!("index page {page_number} failed"))?;

        if links.is_empty() {
            ctx.log
                .info(format!("No listings on page {page_number}, nothing further to crawl"))
                .await;
            break;
        }

        let classified = dedup::classify(ctx.store.as_ref(), &links)
            .await
            .context("dedup check failed")?;
        ctx.log
            .info(format!(
                "Page {}: {} new, {} already scraped",
                page_number,
                classified.new.len(),
                classified.seen.len()
            ))
            .await;

        // Index pages list newest first, so the first known URL marks where
        // the previous run got to.
        let caught_up = ctx.spec.mode == RunMode::Watcher && classified.first_seen_at.is_some();
        // A caught-up watcher never reaches the seen URLs past the first one.
        tally.skipped += if caught_up { 1 } else { classified.seen.len() };
        let queue = if caught_up {
            classified.new_before_first_seen()
        } else {
            &classified.new[..]
        };

        for url in queue {
            if let Some(status) = process_listing(ctx, session, url, tally).await {
                return Ok(status);
            }
        }

        if caught_up {
            ctx.log
                .info("Reached already scraped listings, watcher run is up to date")
                .await;
            return Ok(JobStatus::Completed);
        }
    }
    Ok(JobStatus::Completed)
}

/// Extracts, dispatches and pauses for one listing. `Some` ends the job.
async fn process_listing(
    ctx: &JobContext,
    session: &dyn BrowserSession,
    url: &str,
    tally: &mut JobTally,
) -> Option<JobStatus> {
    if ctx.stop_requested().await {
        ctx.log.info(format!("Stop requested before {url}")).await;
        return Some(JobStatus::Stopped);
    }

    let payload = sites::extract_listing(session, ctx.adapter.as_ref(), url, &ctx.extraction).await;
    let missing = payload.missing_fields();
    if !missing.is_empty() {
        ctx.log
            .warning(format!("No {} found for {}", missing.join(" or "), url))
            .await;
    }

    if ctx.stop_requested().await {
        ctx.log.info(format!("Stop requested, {url} not dispatched")).await;
        return Some(JobStatus::Stopped);
    }

    match ctx.dispatcher.dispatch(&payload).await {
        DispatchOutcome::Created(id) => {
            tally.processed += 1;
            ctx.log.info(format!("Sent {url} (record {id})")).await;
        }
        DispatchOutcome::Skipped => {
            tally.skipped += 1;
            ctx.log.info(format!("Receiver already had {url}")).await;
        }
        DispatchOutcome::Failed(reason) => {
            tally.failed += 1;
            ctx.log.error(format!("Webhook dispatch failed for {url}: {reason}")).await;
        }
    }

    let pause = ctx.spec.delay.sample();
    tracing::debug!(secs = pause.as_secs_f64(), "Pausing before next listing");
    tokio::time::sleep(pause).await;
    None
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
