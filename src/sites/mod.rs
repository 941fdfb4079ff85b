//! Site adapters: everything that differs between classified-ad sites.

pub mod dynamic;
pub mod listing;
pub mod olx;
pub mod publi24;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use url::Url;

use crate::browser::{self, BrowserSession, Page};
use crate::config::Timings;
use crate::location::LocationRecord;
use crate::ocr::OcrEngine;
use crate::phone::PhoneNumber;

pub use dynamic::DynamicAdapter;
pub use olx::OlxAdapter;
pub use publi24::Publi24Adapter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteKind {
    Olx,
    Publi24,
}

impl SiteKind {
    /// Picks the site family from the URL host.
    pub fn detect(url: &str) -> Option<Self> {
        let host = Url::parse(url).ok()?.host_str()?.to_ascii_lowercase();
        if host.starts_with("olx.") || host.contains(".olx.") {
            Some(SiteKind::Olx)
        } else if host == "publi24.ro" || host.ends_with(".publi24.ro") {
            Some(SiteKind::Publi24)
        } else {
            None
        }
    }

    pub fn adapter(self) -> Arc<dyn SiteAdapter> {
        match self {
            SiteKind::Olx => Arc::new(OlxAdapter),
            SiteKind::Publi24 => Arc::new(Publi24Adapter),
        }
    }
}

/// What one listing produced in-process.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub url: String,
    pub phone_number: Option<PhoneNumber>,
    pub location: Option<LocationRecord>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
}

impl ExtractionResult {
    pub fn empty(url: &str) -> Self {
        Self {
            url: url.to_string(),
            phone_number: None,
            location: None,
            parameters: BTreeMap::new(),
        }
    }
}

/// Rendered listing handed to a remote parser instead of being parsed here.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegatedListing {
    pub url: String,
    pub html: Option<String>,
    pub extract_selectors: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_credentials: Option<serde_json::Value>,
}

/// Body posted to the webhook for one listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ListingPayload {
    Extracted(ExtractionResult),
    Delegated(DelegatedListing),
}

impl ListingPayload {
    pub fn url(&self) -> &str {
        match self {
            ListingPayload::Extracted(result) => &result.url,
            ListingPayload::Delegated(listing) => &listing.url,
        }
    }

    /// Names of the fields that came back empty, for warning logs.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        match self {
            ListingPayload::Extracted(result) => {
                if result.phone_number.is_none() {
                    missing.push("phone");
                }
                if result.location.is_none() {
                    missing.push("location");
                }
            }
            ListingPayload::Delegated(listing) => {
                if listing.html.is_none() {
                    missing.push("html");
                }
            }
        }
        missing
    }
}

/// Per-listing collaborators.
#[derive(Clone)]
pub struct ExtractionContext {
    pub ocr: Arc<dyn OcrEngine>,
    pub timings: Timings,
}

#[async_trait]
pub trait SiteAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Index URL for `page`, with the site's pagination parameter set.
    fn page_url(&self, category_url: &str, page: u32) -> Result<String, url::ParseError>;

    /// URL fragments of responses that must load even when subresources are blocked.
    fn phone_image_patterns(&self) -> &'static [&'static str] {
        &[]
    }

    /// Listing links on an index page that is already loaded, in page order.
    async fn discover_links(&self, page: &dyn Page, base: &Url, timings: &Timings) -> browser::Result<Vec<String>>;

    /// Runs on a fresh page that has not navigated yet. Must not fail.
    async fn extract_listing(&self, page: &dyn Page, url: &str, ctx: &ExtractionContext) -> ListingPayload;

    /// Payload dispatched when no page could even be opened.
    fn fallback_payload(&self, url: &str) -> ListingPayload {
        ListingPayload::Extracted(ExtractionResult::empty(url))
    }
}

/// Extracts one listing on its own page and always releases that page.
pub async fn extract_listing(
    session: &dyn BrowserSession,
    adapter: &dyn SiteAdapter,
    url: &str,
    ctx: &ExtractionContext,
) -> ListingPayload {
    let page = match session.new_page().await {
        Ok(page) => page,
        Err(e) => {
            tracing::warn!(%url, "Could not open page for listing: {}", e);
            return adapter.fallback_payload(url);
        }
    };

    let payload = adapter.extract_listing(page.as_ref(), url, ctx).await;

    if let Err(e) = page.close().await {
        tracing::debug!(%url, "Closing listing page failed: {}", e);
    }
    payload
}

/// Sets (or replaces) the pagination query parameter.
pub(crate) fn with_page_param(category_url: &str, param: &str, page: u32) -> Result<String, url::ParseError> {
    let mut url = Url::parse(category_url)?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != param)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (key, value) in &kept {
            pairs.append_pair(key, value);
        }
        pairs.append_pair(param, &page.to_string());
    }
    Ok(url.to_string())
}

/// Absolute http(s) URL for a link found on `base`, without fragment.
pub(crate) fn absolutize(base: &Url, href: &str) -> Option<String> {
    let mut url = base.join(href.trim()).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    url.set_fragment(None);
    Some(url.to_string())
}
