use async_trait::async_trait;
use select::document::Document;
use select::predicate::{Attr, Name, Predicate};
use url::Url;

use super::listing::{extract_standard_listing, node_text, ListingDom, ListingProfile};
use super::{absolutize, with_page_param, ExtractionContext, ListingPayload, SiteAdapter};
use crate::browser::{self, Page};
use crate::config::Timings;
use crate::location::LocationSource;
use crate::phone::OcrPadding;

const PAGE_PARAM: &str = "page";

const SCROLL_HEIGHT_SCRIPT: &str = "document.body.scrollHeight";
const SCROLL_TO_BOTTOM_SCRIPT: &str = "window.scrollTo(0, document.body.scrollHeight); true";

const PROFILE: ListingProfile = ListingProfile {
    consent_accept: "#onetrust-accept-btn-handler",
    overlay_cleanup_script: r#"(() => {
        document.querySelectorAll('#onetrust-consent-sdk, .onetrust-pc-dark-filter').forEach(el => el.remove());
        document.body.style.overflow = 'auto';
        return true;
    })()"#,
    reveal_controls: &[
        r#"button[data-testid="show-phone"]"#,
        r#"button[data-cy="ad-contact-phone"]"#,
    ],
    phone_image_patterns: &[],
    padding: OcrPadding::None,
};

/// olx.ro and sibling OLX domains. Phones are revealed as text.
#[derive(Debug, Clone, Copy, Default)]
pub struct OlxAdapter;

impl LocationSource for OlxAdapter {
    fn address_text(&self, doc: &Document) -> Option<String> {
        let widget = doc.find(Attr("data-testid", "map-aside-section")).next()?;
        widget
            .find(Name("p"))
            .next()
            .and_then(node_text)
            .or_else(|| node_text(widget))
    }

    fn breadcrumb_trail(&self, doc: &Document) -> Vec<String> {
        doc.find(Attr("data-testid", "breadcrumbs").descendant(Name("li")))
            .filter_map(node_text)
            .collect()
    }
}

impl ListingDom for OlxAdapter {
    fn phone_text(&self, doc: &Document) -> Option<String> {
        doc.find(Attr("data-testid", "contact-phone"))
            .next()
            .and_then(node_text)
    }
}

#[async_trait]
impl SiteAdapter for OlxAdapter {
    fn name(&self) -> &'static str {
        "olx"
    }

    fn page_url(&self, category_url: &str, page: u32) -> Result<String, url::ParseError> {
        with_page_param(category_url, PAGE_PARAM, page)
    }

    async fn discover_links(&self, page: &dyn Page, base: &Url, timings: &Timings) -> browser::Result<Vec<String>> {
        scroll_until_stable(page, timings).await?;
        let html = page.content().await?;
        Ok(card_links(&html, base))
    }

    async fn extract_listing(&self, page: &dyn Page, url: &str, ctx: &ExtractionContext) -> ListingPayload {
        ListingPayload::Extracted(extract_standard_listing(page, url, &PROFILE, self, ctx).await)
    }
}

/// Cards mount lazily; keep scrolling until the page stops growing.
async fn scroll_until_stable(page: &dyn Page, timings: &Timings) -> browser::Result<()> {
    let mut height = page.evaluate(SCROLL_HEIGHT_SCRIPT).await?.as_f64().unwrap_or(0.0);
    for attempt in 1..=timings.scroll_attempts {
        page.evaluate(SCROLL_TO_BOTTOM_SCRIPT).await?;
        tokio::time::sleep(timings.scroll_pause).await;
        let next = page.evaluate(SCROLL_HEIGHT_SCRIPT).await?.as_f64().unwrap_or(0.0);
        if next <= height {
            tracing::debug!(attempt, height, "Index page height settled");
            break;
        }
        height = next;
    }
    Ok(())
}

/// First anchor inside each listing card, in page order.
pub fn card_links(html: &str, base: &Url) -> Vec<String> {
    let doc = Document::from(html);
    doc.find(Attr("data-cy", "l-card"))
        .filter_map(|card| card.find(Name("a")).next())
        .filter_map(|a| a.attr("href"))
        .filter_map(|href| absolutize(base, href))
        .collect()
}
