use std::collections::BTreeMap;

use async_trait::async_trait;
use url::Url;

use super::{absolutize, with_page_param, DelegatedListing, ExtractionContext, ListingPayload, SiteAdapter};
use crate::browser::{self, js_string, Page};
use crate::config::Timings;

pub const DEFAULT_PAGE_PARAM: &str = "page";

/// Caller-described site: links come from a CSS selector and parsing is
/// left to a remote endpoint, which receives the rendered HTML.
#[derive(Debug, Clone)]
pub struct DynamicAdapter {
    pub link_selector: String,
    pub extract_selectors: BTreeMap<String, String>,
    pub site_credentials: Option<serde_json::Value>,
    pub page_param: String,
}

impl DynamicAdapter {
    pub fn new(link_selector: impl Into<String>) -> Self {
        Self {
            link_selector: link_selector.into(),
            extract_selectors: BTreeMap::new(),
            site_credentials: None,
            page_param: DEFAULT_PAGE_PARAM.to_string(),
        }
    }

    fn delegated(&self, url: &str, html: Option<String>) -> ListingPayload {
        ListingPayload::Delegated(DelegatedListing {
            url: url.to_string(),
            html,
            extract_selectors: self.extract_selectors.clone(),
            site_credentials: self.site_credentials.clone(),
        })
    }

    fn links_script(&self) -> String {
        format!(
            "Array.from(document.querySelectorAll({})).map(el => el.getAttribute('href') || (el.querySelector('a') && el.querySelector('a').getAttribute('href'))).filter(Boolean)",
            js_string(&self.link_selector)
        )
    }
}

#[async_trait]
impl SiteAdapter for DynamicAdapter {
    fn name(&self) -> &'static str {
        "dynamic"
    }

    fn page_url(&self, category_url: &str, page: u32) -> Result<String, url::ParseError> {
        with_page_param(category_url, &self.page_param, page)
    }

    async fn discover_links(&self, page: &dyn Page, base: &Url, _timings: &Timings) -> browser::Result<Vec<String>> {
        let found = page.evaluate(&self.links_script()).await?;
        let hrefs = found.as_array().map(Vec::as_slice).unwrap_or_default();
        Ok(hrefs
            .iter()
            .filter_map(|href| href.as_str())
            .filter_map(|href| absolutize(base, href))
            .collect())
    }

    async fn extract_listing(&self, page: &dyn Page, url: &str, ctx: &ExtractionContext) -> ListingPayload {
        if let Err(e) = page.goto(url).await {
            tracing::warn!(%url, "Listing navigation failed: {}", e);
            return self.delegated(url, None);
        }
        tokio::time::sleep(ctx.timings.render_settle).await;

        match page.content().await {
            Ok(html) => self.delegated(url, Some(html)),
            Err(e) => {
                tracing::warn!(%url, "Could not read listing DOM: {}", e);
                self.delegated(url, None)
            }
        }
    }

    fn fallback_payload(&self, url: &str) -> ListingPayload {
        self.delegated(url, None)
    }
}
