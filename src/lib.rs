use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_governor::{governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer};
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod browser;
pub mod cli;
pub mod config;
pub mod entities;
pub mod error;
pub mod jobs;
pub mod location;
pub mod ocr;
pub mod phone;
pub mod routes;
pub mod sites;
pub mod store;

use browser::Renderer;
use config::Settings;
use jobs::JobServices;
use ocr::OcrEngine;
use sites::ExtractionContext;
use store::JobStore;

/// Shared handles for request handlers and the jobs they start.
#[derive(Clone)]
pub struct AppState {
    pub http_client: reqwest::Client,
    pub store: Arc<dyn JobStore>,
    pub renderer: Arc<dyn Renderer>,
    pub ocr: Arc<dyn OcrEngine>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(
        settings: Settings,
        store: Arc<dyn JobStore>,
        renderer: Arc<dyn Renderer>,
        ocr: Arc<dyn OcrEngine>,
    ) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            store,
            renderer,
            ocr,
            settings: Arc::new(settings),
        }
    }

    pub fn job_services(&self) -> JobServices {
        JobServices {
            renderer: self.renderer.clone(),
            ocr: self.ocr.clone(),
            store: self.store.clone(),
            timings: self.settings.timings,
        }
    }

    pub fn extraction_context(&self) -> ExtractionContext {
        ExtractionContext {
            ocr: self.ocr.clone(),
            timings: self.settings.timings,
        }
    }
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = String)
    )
)]
async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "Service is healthy")
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Listing Harvester API",
        version = "0.1.0"
    ),
    paths(
        health_check,
        routes::scrape::scrape_advanced,
        routes::scrape::run_bulk_scrape,
        routes::scrape::run_dynamic_scrape
    ),
    components(schemas(
        routes::scrape::ScrapeAdvancedRequest,
        routes::scrape::ScrapeAdvancedResponse,
        routes::scrape::BulkScrapeRequest,
        routes::scrape::DynamicScrapeRequest,
        routes::scrape::StoreOverride,
        routes::scrape::JobAccepted,
        browser::ProxyConfig,
        jobs::RunMode,
        location::LocationRecord
    ))
)]
struct ApiDoc;

/// Create the application with all routes and middleware
pub fn create_app(state: AppState) -> Router {
    let api_doc = ApiDoc::openapi();

    let api_routes = Router::new()
        .route("/api/scrape-advanced", post(routes::scrape_advanced))
        .route("/api/run-bulk-scrape", post(routes::run_bulk_scrape))
        .route("/api/run-dynamic-scrape", post(routes::run_dynamic_scrape))
        .with_state(state.clone());

    // Rate limiting only covers the scrape endpoints, not health or docs.
    let api_routes = match state.settings.rate_limit_per_minute {
        Some(per_minute) => {
            let governor_conf = GovernorConfigBuilder::default()
                .key_extractor(SmartIpKeyExtractor)
                .period(Duration::from_millis(60_000 / u64::from(per_minute.max(1))))
                .burst_size(per_minute.max(1))
                .finish();
            match governor_conf {
                Some(config) => api_routes.layer(GovernorLayer {
                    config: Arc::new(config),
                }),
                None => {
                    tracing::warn!(per_minute, "Invalid rate limit, serving without limiter");
                    api_routes
                }
            }
        }
        None => api_routes,
    };

    let docs_router = SwaggerUi::new("/docs").url("/api-doc/openapi.json", api_doc);

    Router::new()
        .route("/health", get(health_check))
        .merge(api_routes)
        .merge(docs_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}
