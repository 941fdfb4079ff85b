use async_trait::async_trait;
use select::document::Document;
use select::node::Node;
use select::predicate::{Attr, Class, Name, Predicate};
use url::Url;

use super::listing::{extract_standard_listing, node_text, ListingDom, ListingProfile};
use super::{absolutize, with_page_param, ExtractionContext, ListingPayload, SiteAdapter};
use crate::browser::{self, Page};
use crate::config::Timings;
use crate::location::LocationSource;
use crate::phone::OcrPadding;

const PAGE_PARAM: &str = "pag";

/// Romanian mobile numbers start with 07; OCR tends to drop it on this site.
pub const MOBILE_PREFIX: &str = "07";

pub const PHONE_IMAGE_PATTERNS: &[&str] = &["PhoneNumberImages", "Telefon"];

const PROFILE: ListingProfile = ListingProfile {
    consent_accept: "#didomi-notice-agree-button",
    overlay_cleanup_script: r#"(() => {
        document.querySelectorAll('[id^="didomi"]').forEach(el => el.remove());
        document.body.style.overflow = 'auto';
        return true;
    })()"#,
    reveal_controls: &[
        r#".show-phone-number button[data-action="phone"]"#,
        "button.btn-show-phone",
        "#showPhone",
        "#showPhoneBottom",
    ],
    phone_image_patterns: PHONE_IMAGE_PATTERNS,
    padding: OcrPadding::MobilePrefix(MOBILE_PREFIX),
};

/// publi24.ro: phone numbers are served as images after the reveal click.
#[derive(Debug, Clone, Copy, Default)]
pub struct Publi24Adapter;

impl LocationSource for Publi24Adapter {
    fn address_text(&self, doc: &Document) -> Option<String> {
        let control = Name("a")
            .or(Name("button"))
            .or(Name("span"))
            .and(Attr("data-action", "address").or(Class("show-address")));
        if let Some(text) = doc.find(control).next().and_then(sibling_text) {
            return Some(text);
        }
        doc.find(Class("article-location")).next().and_then(node_text)
    }

    fn breadcrumb_trail(&self, doc: &Document) -> Vec<String> {
        doc.find(Class("breadcrumb").descendant(Name("li")))
            .filter_map(node_text)
            .collect()
    }
}

impl ListingDom for Publi24Adapter {
    fn phone_text(&self, doc: &Document) -> Option<String> {
        let phone_button = Name("button").and(Attr("data-action", "phone"));
        doc.find(Class("show-phone-number").descendant(phone_button))
            .next()
            .or_else(|| doc.find(Name("button").and(Class("btn-show-phone"))).next())
            .or_else(|| doc.find(Attr("id", "showPhone")).next())
            .or_else(|| doc.find(Attr("id", "showPhoneBottom")).next())
            .and_then(node_text)
    }
}

#[async_trait]
impl SiteAdapter for Publi24Adapter {
    fn name(&self) -> &'static str {
        "publi24"
    }

    fn page_url(&self, category_url: &str, page: u32) -> Result<String, url::ParseError> {
        with_page_param(category_url, PAGE_PARAM, page)
    }

    fn phone_image_patterns(&self) -> &'static [&'static str] {
        PHONE_IMAGE_PATTERNS
    }

    async fn discover_links(&self, page: &dyn Page, base: &Url, _timings: &Timings) -> browser::Result<Vec<String>> {
        let html = page.content().await?;
        Ok(listing_links(&html, base))
    }

    async fn extract_listing(&self, page: &dyn Page, url: &str, ctx: &ExtractionContext) -> ListingPayload {
        ListingPayload::Extracted(extract_standard_listing(page, url, &PROFILE, self, ctx).await)
    }
}

/// Anchors in listing titles; falls back to any ad-detail link.
pub fn listing_links(html: &str, base: &Url) -> Vec<String> {
    let doc = Document::from(html);
    let titled: Vec<String> = doc
        .find(Class("article-title").descendant(Name("a")))
        .filter_map(|a| a.attr("href"))
        .filter_map(|href| absolutize(base, href))
        .collect();
    if !titled.is_empty() {
        return titled;
    }

    doc.find(Name("a"))
        .filter_map(|a| a.attr("href"))
        .filter(|href| href.contains("/anunturi/") && href.ends_with(".html"))
        .filter_map(|href| absolutize(base, href))
        .collect()
}

/// Inline elements that may carry the address next to the control.
const ADDRESS_SIBLINGS: &[&str] = &["span", "strong", "b", "em", "small", "address"];

/// Longer sibling text is page content, not an address.
const MAX_ADDRESS_CHARS: usize = 200;

/// Text of the control's inline siblings, i.e. the address it sits next to.
fn sibling_text(control: Node<'_>) -> Option<String> {
    let parent = control.parent()?;
    let parts: Vec<String> = parent
        .children()
        .filter(|child| child.index() != control.index())
        .filter(|child| child.name().map_or(true, |name| ADDRESS_SIBLINGS.contains(&name)))
        .filter_map(node_text)
        .collect();
    let text = parts.join(" ");
    (!text.is_empty() && text.chars().count() <= MAX_ADDRESS_CHARS).then_some(text)
}
