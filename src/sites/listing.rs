//! The per-listing procedure shared by the built-in site adapters:
//! capture phone images, load, clear consent overlays, read the location,
//! then reveal and decode the phone.

use select::document::Document;
use select::node::Node;

use super::{ExtractionContext, ExtractionResult};
use crate::browser::{ClickMode, Page, ResponseFeed};
use crate::config::Timings;
use crate::location::{collapse_whitespace, extract_location, extract_parameters, LocationSource};
use crate::phone::{self, OcrPadding, PhoneNumber};

/// Static description of how a site's listing page behaves.
#[derive(Debug, Clone, Copy)]
pub struct ListingProfile {
    /// CSS selector of the consent overlay's accept button.
    pub consent_accept: &'static str,
    /// Removes leftover overlay elements and re-enables scrolling.
    pub overlay_cleanup_script: &'static str,
    /// CSS selectors of the reveal-phone control, in priority order.
    pub reveal_controls: &'static [&'static str],
    pub phone_image_patterns: &'static [&'static str],
    pub padding: OcrPadding,
}

/// DOM reads on a rendered listing.
pub trait ListingDom: LocationSource {
    /// Text of the phone control or phone field, if any.
    fn phone_text(&self, doc: &Document) -> Option<String>;
}

pub async fn extract_standard_listing(
    page: &dyn Page,
    url: &str,
    profile: &ListingProfile,
    dom: &(dyn ListingDom + Sync),
    ctx: &ExtractionContext,
) -> ExtractionResult {
    let mut feed = if profile.phone_image_patterns.is_empty() {
        None
    } else {
        match page.capture_responses(profile.phone_image_patterns).await {
            Ok(feed) => Some(feed),
            Err(e) => {
                tracing::warn!(%url, "Phone image capture unavailable: {}", e);
                None
            }
        }
    };

    if let Err(e) = page.goto(url).await {
        tracing::warn!(%url, "Listing navigation failed: {}", e);
        return ExtractionResult::empty(url);
    }
    tokio::time::sleep(ctx.timings.render_settle).await;

    dismiss_overlays(page, profile, &ctx.timings).await;

    let html = match page.content().await {
        Ok(html) => html,
        Err(e) => {
            tracing::warn!(%url, "Could not read listing DOM: {}", e);
            String::new()
        }
    };

    let location = extract_location(&html, dom);
    let parameters = extract_parameters(&html);
    let phone_number = read_phone(page, &html, profile, dom, feed.as_mut(), ctx).await;

    ExtractionResult {
        url: url.to_string(),
        phone_number,
        location: (!location.is_empty()).then_some(location),
        parameters,
    }
}

/// Clicks the consent accept button if it shows up, then strips whatever
/// overlay is left so later clicks reach the page.
async fn dismiss_overlays(page: &dyn Page, profile: &ListingProfile, timings: &Timings) {
    match page.wait_for(profile.consent_accept, timings.consent_timeout).await {
        Ok(true) => {
            if let Err(e) = page.click(profile.consent_accept, ClickMode::Normal).await {
                tracing::debug!("Consent accept click failed: {}", e);
            }
        }
        Ok(false) => {}
        Err(e) => tracing::debug!("Consent overlay check failed: {}", e),
    }

    if let Err(e) = page.evaluate(profile.overlay_cleanup_script).await {
        tracing::debug!("Overlay cleanup script failed: {}", e);
    }
}

async fn read_phone(
    page: &dyn Page,
    initial_html: &str,
    profile: &ListingProfile,
    dom: &(dyn ListingDom + Sync),
    feed: Option<&mut ResponseFeed>,
    ctx: &ExtractionContext,
) -> Option<PhoneNumber> {
    if let Some(phone) = phone_text(initial_html, dom).as_deref().and_then(phone::from_plain_text) {
        return Some(phone);
    }

    let any_control = profile.reveal_controls.join(", ");
    let clicked = match page.wait_for(&any_control, ctx.timings.reveal_timeout).await {
        Ok(true) => click_first(page, profile.reveal_controls).await,
        Ok(false) => false,
        Err(e) => {
            tracing::debug!("Reveal control lookup failed: {}", e);
            false
        }
    };
    if !clicked {
        tracing::debug!("No reveal control could be clicked");
    }
    tokio::time::sleep(ctx.timings.reveal_settle).await;

    let revealed_text = match page.content().await {
        Ok(html) => phone_text(&html, dom),
        Err(e) => {
            tracing::debug!("Could not re-read DOM after reveal: {}", e);
            None
        }
    };

    if let Some(phone) = revealed_text.as_deref().and_then(phone::from_plain_text) {
        return Some(phone);
    }

    let image = match feed {
        Some(feed) => feed.latest_phone_image(ctx.timings.phone_image_wait).await,
        None => None,
    };

    let decoded = phone::decode(
        revealed_text.as_deref(),
        image.as_deref(),
        ctx.ocr.as_ref(),
        profile.padding,
    )
    .await;

    // Revealed text may be spaced out ("0722 123 456") and fail the digit-run check.
    decoded.or_else(|| revealed_text.as_deref().and_then(PhoneNumber::from_digits))
}

async fn click_first(page: &dyn Page, selectors: &[&str]) -> bool {
    for selector in selectors {
        match page.click(selector, ClickMode::Force).await {
            Ok(()) => return true,
            Err(e) => tracing::debug!(selector, "Reveal click skipped: {}", e),
        }
    }
    false
}

fn phone_text(html: &str, dom: &dyn ListingDom) -> Option<String> {
    let doc = Document::from(html);
    dom.phone_text(&doc)
}

/// Collapsed text of a node, `None` when blank.
pub(crate) fn node_text(node: Node<'_>) -> Option<String> {
    let text = collapse_whitespace(&node.text());
    (!text.is_empty()).then_some(text)
}
