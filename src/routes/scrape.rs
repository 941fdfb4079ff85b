use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::browser::{LaunchOptions, ProxyConfig};
use crate::error::AppError;
use crate::jobs::{
    select_pages, spawn_job, DelayPolicy, JobSpec, RunMode, WebhookDispatcher,
};
use crate::location::LocationRecord;
use crate::sites::{self, DynamicAdapter, ListingPayload, Publi24Adapter, SiteAdapter, SiteKind};
use crate::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ScrapeAdvancedRequest {
    /// Listing URL. Only publi24.ro listings are supported.
    pub url: Option<String>,
}

#[derive(Debug, Default, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeAdvancedResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Connection string of a job-specific tracking database.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoreOverride {
    pub database_url: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BulkScrapeRequest {
    /// Category (index) page of an OLX or publi24.ro section
    pub category_url: Option<String>,
    /// Receiver that each listing is POSTed to
    pub webhook_url: Option<String>,
    /// Row in `scrape_jobs`; without it the job can't be stopped or tracked
    pub job_id: Option<String>,
    /// First page to crawl (default 1)
    pub page_num: Option<u32>,
    /// Number of consecutive pages from `pageNum`
    pub pages_to_scrape: Option<u32>,
    /// Seconds, lower bound of the pause after each listing (default 5)
    pub delay_min: Option<u64>,
    /// Seconds, upper bound of the pause after each listing (default 15)
    pub delay_max: Option<u64>,
    /// Fixed pause in milliseconds, used when no bounds are given
    pub delay_ms: Option<u64>,
    #[serde(default)]
    pub mode: RunMode,
    pub proxy_config: Option<ProxyConfig>,
    pub store_override: Option<StoreOverride>,
    /// Skip images, fonts, stylesheets and media except phone images
    #[serde(default)]
    pub block_resources: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DynamicScrapeRequest {
    pub category_url: Option<String>,
    pub job_id: Option<String>,
    pub page_num: Option<u32>,
    pub pages_to_scrape: Option<u32>,
    pub delay_min: Option<u64>,
    pub delay_max: Option<u64>,
    #[serde(default)]
    pub mode: RunMode,
    /// CSS selector matching listing links (or their containers) on index pages
    pub link_selector: Option<String>,
    /// Forwarded untouched to the remote parser
    #[serde(default)]
    pub extract_selectors: BTreeMap<String, String>,
    pub proxy_config: Option<ProxyConfig>,
    /// Base URL of the service exposing `/api/parse-listing`
    pub webhook_base_url: Option<String>,
    /// Forwarded untouched to the remote parser
    #[schema(value_type = Option<Object>)]
    pub site_credentials: Option<serde_json::Value>,
    /// Pagination query parameter (default `page`)
    pub page_param: Option<String>,
    pub store_override: Option<StoreOverride>,
    #[serde(default)]
    pub block_resources: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobAccepted {
    pub message: String,
    pub category_url: String,
    pub job_id: Option<String>,
}

/// Single-listing extraction, answered synchronously
#[utoipa::path(
    post,
    path = "/api/scrape-advanced",
    request_body = ScrapeAdvancedRequest,
    responses(
        (status = 200, description = "Phone number, unsupported-site message or extraction failure", body = ScrapeAdvancedResponse),
        (status = 400, description = "URL missing"),
        (status = 500, description = "Browser could not be started")
    )
)]
pub async fn scrape_advanced(
    State(state): State<AppState>,
    Json(request): Json<ScrapeAdvancedRequest>,
) -> Result<Json<ScrapeAdvancedResponse>, AppError> {
    let url = required(request.url, "URL is required")?;

    if SiteKind::detect(&url) != Some(SiteKind::Publi24) {
        return Ok(Json(ScrapeAdvancedResponse {
            message: Some("URL not supported by advanced scraper".to_string()),
            ..Default::default()
        }));
    }

    tracing::info!(%url, "Starting advanced scrape");
    let options = LaunchOptions {
        navigation_timeout: Some(state.settings.timings.navigation_timeout),
        ..Default::default()
    };
    let session = state.renderer.launch(&options).await?;
    let ctx = state.extraction_context();
    let payload = sites::extract_listing(session.as_ref(), &Publi24Adapter, &url, &ctx).await;
    session.close().await;

    let ListingPayload::Extracted(result) = payload else {
        return Err(AppError::InternalError("unexpected delegated payload".to_string()));
    };
    let response = match result.phone_number {
        Some(phone) => ScrapeAdvancedResponse {
            phone_number: Some(phone.to_string()),
            location: result.location,
            ..Default::default()
        },
        None => ScrapeAdvancedResponse {
            error: Some("Could not extract phone number".to_string()),
            ..Default::default()
        },
    };
    Ok(Json(response))
}

/// Start a background crawl of an OLX or publi24.ro category
#[utoipa::path(
    post,
    path = "/api/run-bulk-scrape",
    request_body = BulkScrapeRequest,
    responses(
        (status = 200, description = "Job accepted and running in the background", body = JobAccepted),
        (status = 400, description = "Missing or inconsistent parameters"),
        (status = 422, description = "Site not supported")
    )
)]
pub async fn run_bulk_scrape(
    State(state): State<AppState>,
    Json(request): Json<BulkScrapeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let category_url = required(request.category_url, "categoryUrl is required")?;
    let webhook_url = required(request.webhook_url, "webhookUrl is required")?;
    let kind = SiteKind::detect(&category_url).ok_or_else(|| {
        AppError::UnprocessableEntity(format!("no site adapter for {category_url}"))
    })?;

    let spec = JobSpec {
        job_id: request.job_id,
        category_url: category_url.clone(),
        webhook_url: webhook_url.clone(),
        pages: select_pages(request.page_num, request.pages_to_scrape).map_err(AppError::InvalidRequest)?,
        delay: delay_policy(request.delay_min, request.delay_max, request.delay_ms)?,
        mode: request.mode,
        proxy: validated_proxy(request.proxy_config)?,
        store_override: request.store_override.map(|s| s.database_url),
        block_resources: request.block_resources,
    };
    let dispatcher = WebhookDispatcher::new(state.http_client.clone(), webhook_url);

    Ok(accept(&state, spec, kind.adapter(), dispatcher, "Bulk scrape started"))
}

/// Start a background crawl of any site, with parsing done by a remote service
#[utoipa::path(
    post,
    path = "/api/run-dynamic-scrape",
    request_body = DynamicScrapeRequest,
    responses(
        (status = 200, description = "Job accepted and running in the background", body = JobAccepted),
        (status = 400, description = "Missing or inconsistent parameters")
    )
)]
pub async fn run_dynamic_scrape(
    State(state): State<AppState>,
    Json(request): Json<DynamicScrapeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let category_url = required(request.category_url, "categoryUrl is required")?;
    let link_selector = required(request.link_selector, "linkSelector is required")?;
    let webhook_base_url = required(request.webhook_base_url, "webhookBaseUrl is required")?;
    url::Url::parse(&category_url)
        .map_err(|e| AppError::InvalidRequest(format!("categoryUrl is not a valid URL: {e}")))?;

    let mut adapter = DynamicAdapter::new(link_selector);
    adapter.extract_selectors = request.extract_selectors;
    adapter.site_credentials = request.site_credentials;
    if let Some(param) = request.page_param.filter(|p| !p.trim().is_empty()) {
        adapter.page_param = param;
    }

    let dispatcher = WebhookDispatcher::parse_listing(state.http_client.clone(), &webhook_base_url);
    let spec = JobSpec {
        job_id: request.job_id,
        category_url,
        webhook_url: dispatcher.url().to_string(),
        pages: select_pages(request.page_num, request.pages_to_scrape).map_err(AppError::InvalidRequest)?,
        delay: delay_policy(request.delay_min, request.delay_max, None)?,
        mode: request.mode,
        proxy: validated_proxy(request.proxy_config)?,
        store_override: request.store_override.map(|s| s.database_url),
        block_resources: request.block_resources,
    };

    Ok(accept(&state, spec, Arc::new(adapter), dispatcher, "Dynamic scrape started"))
}

fn accept(
    state: &AppState,
    spec: JobSpec,
    adapter: Arc<dyn SiteAdapter>,
    dispatcher: WebhookDispatcher,
    message: &str,
) -> (StatusCode, Json<JobAccepted>) {
    let accepted = JobAccepted {
        message: message.to_string(),
        category_url: spec.category_url.clone(),
        job_id: spec.job_id.clone(),
    };
    tracing::info!(
        job_id = spec.job_id.as_deref().unwrap_or("-"),
        adapter = adapter.name(),
        "{}",
        message
    );
    // Detached: the caller only gets the acknowledgment.
    let _ = spawn_job(spec, adapter, dispatcher, state.job_services());
    (StatusCode::OK, Json(accepted))
}

fn required(value: Option<String>, message: &str) -> Result<String, AppError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::InvalidRequest(message.to_string()))
}

/// Bounds win over `delayMs`; a lone bound is paired with the default for the other.
pub fn delay_policy(min: Option<u64>, max: Option<u64>, fixed_ms: Option<u64>) -> Result<DelayPolicy, AppError> {
    match (min, max, fixed_ms) {
        (None, None, Some(ms)) => Ok(DelayPolicy::Fixed(Duration::from_millis(ms))),
        (min, max, _) => DelayPolicy::from_bounds(min, max).map_err(AppError::InvalidRequest),
    }
}

fn validated_proxy(proxy: Option<ProxyConfig>) -> Result<Option<ProxyConfig>, AppError> {
    match proxy {
        Some(proxy) if proxy.server.trim().is_empty() => {
            Err(AppError::InvalidRequest("proxyConfig.server is required".to_string()))
        }
        other => Ok(other),
    }
}
