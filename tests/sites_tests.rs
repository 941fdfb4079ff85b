mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use common::{phone_png, FakeOcr, FakeRenderer, FakeSite};
use listing_harvester::browser::{BrowserSession, CapturedResponse, LaunchOptions, Page, Renderer};
use listing_harvester::config::Timings;
use listing_harvester::sites::{
    self, olx, publi24, DynamicAdapter, ExtractionContext, ListingPayload, OlxAdapter, Publi24Adapter,
    SiteAdapter, SiteKind,
};
use serde_json::json;
use url::Url;

const OLX_AD: &str = "https://www.olx.ro/d/oferta/apartament-2-camere-IDabc12.html";
const PUBLI24_AD: &str = "https://www.publi24.ro/anunturi/imobiliare/de-vanzare/apartamente/anunt/garsoniera/x1y2.html";

fn ctx(ocr: FakeOcr) -> ExtractionContext {
    ExtractionContext {
        ocr: Arc::new(ocr),
        timings: Timings::immediate(),
    }
}

#[test]
fn test_site_detection_by_host() {
    assert_eq!(SiteKind::detect("https://www.olx.ro/imobiliare/"), Some(SiteKind::Olx));
    assert_eq!(SiteKind::detect("https://olx.pl/nieruchomosci/"), Some(SiteKind::Olx));
    assert_eq!(SiteKind::detect("https://www.publi24.ro/anunturi/"), Some(SiteKind::Publi24));
    assert_eq!(SiteKind::detect("https://publi24.ro/anunturi/"), Some(SiteKind::Publi24));
    assert_eq!(SiteKind::detect("https://www.notpubli24.ro/"), None);
    assert_eq!(SiteKind::detect("https://example.com/?ref=olx.ro"), None);
    assert_eq!(SiteKind::detect("not a url"), None);
}

#[test]
fn test_page_urls_use_site_parameter() {
    assert_eq!(
        OlxAdapter.page_url("https://www.olx.ro/imobiliare/?currency=EUR&page=4", 2).unwrap(),
        "https://www.olx.ro/imobiliare/?currency=EUR&page=2"
    );
    assert_eq!(
        Publi24Adapter.page_url("https://www.publi24.ro/anunturi/imobiliare/", 3).unwrap(),
        "https://www.publi24.ro/anunturi/imobiliare/?pag=3"
    );
    let mut dynamic = DynamicAdapter::new("a.listing");
    dynamic.page_param = "p".to_string();
    assert_eq!(
        dynamic.page_url("https://example.com/cars", 5).unwrap(),
        "https://example.com/cars?p=5"
    );
    assert!(OlxAdapter.page_url("olx.ro/imobiliare", 1).is_err());
}

#[test]
fn test_olx_card_links_take_first_anchor_per_card() {
    let base = Url::parse("https://www.olx.ro/imobiliare/?page=1").unwrap();
    let html = r#"
      <div data-cy="l-card"><a href="/d/oferta/a-IDa.html#gallery">A</a><a href="/d/oferta/a-IDa.html?promo">promo</a></div>
      <div data-cy="l-card"><a href="https://www.olx.ro/d/oferta/b-IDb.html">B</a></div>
      <div data-cy="l-card"><span>no link</span></div>
      <a href="/d/oferta/outside-card.html">outside</a>"#;

    assert_eq!(
        olx::card_links(html, &base),
        vec![
            "https://www.olx.ro/d/oferta/a-IDa.html",
            "https://www.olx.ro/d/oferta/b-IDb.html"
        ]
    );
}

#[test]
fn test_publi24_links_fall_back_to_ad_anchors() {
    let base = Url::parse("https://www.publi24.ro/anunturi/imobiliare/?pag=1").unwrap();
    let titled = r#"<div class="article-title"><a href="/anunturi/x/a.html">A</a></div>
                    <a href="/anunturi/x/b.html">B</a>"#;
    assert_eq!(
        publi24::listing_links(titled, &base),
        vec!["https://www.publi24.ro/anunturi/x/a.html"]
    );

    let untitled = r#"<a href="/anunturi/x/b.html">B</a><a href="/anunturi/x/">cat</a>
                      <a href="javascript:void(0)">js</a><a href="https://www.publi24.ro/anunturi/x/c.html">C</a>"#;
    assert_eq!(
        publi24::listing_links(untitled, &base),
        vec![
            "https://www.publi24.ro/anunturi/x/b.html",
            "https://www.publi24.ro/anunturi/x/c.html"
        ]
    );
}

#[tokio::test]
async fn test_olx_listing_phone_revealed_as_text() {
    let site = FakeSite::new()
        .page(
            OLX_AD,
            r#"<div data-testid="map-aside-section"><p>Brasov, Tractorul</p></div>
               <button data-testid="show-phone">Suna vanzatorul</button>"#,
        )
        .revealed(
            OLX_AD,
            r#"<div data-testid="map-aside-section"><p>Brasov, Tractorul</p></div>
               <a data-testid="contact-phone">0722 123 456</a>"#,
        );
    let renderer = FakeRenderer::new(site);
    let session = renderer.launch(&LaunchOptions::default()).await.unwrap();

    let payload = sites::extract_listing(session.as_ref(), &OlxAdapter, OLX_AD, &ctx(FakeOcr::reading(""))).await;

    let ListingPayload::Extracted(result) = payload else {
        panic!("expected in-process extraction");
    };
    assert_eq!(result.phone_number.unwrap().as_str(), "0722123456");
    let location = result.location.unwrap();
    assert_eq!(location.county.as_deref(), Some("Brasov"));
    assert_eq!(location.city.as_deref(), Some("Tractorul"));
    assert_eq!(renderer.site.opened_pages(), 1);
    assert_eq!(renderer.site.closed_pages(), 1);
}

#[tokio::test]
async fn test_publi24_listing_phone_from_intercepted_image() {
    let site = FakeSite::new()
        .page(
            PUBLI24_AD,
            r#"<ul class="breadcrumb"><li>Acasa</li><li>Constanta</li><li>Mangalia</li></ul>
               <div class="show-phone-number"><button data-action="phone">Arata telefon</button></div>"#,
        )
        .capture(
            PUBLI24_AD,
            CapturedResponse {
                url: "https://www.publi24.ro/DetailAd/PhoneNumberImages?adId=x1y2".to_string(),
                content_type: "image/png".to_string(),
                body: phone_png(),
            },
        );
    let renderer = FakeRenderer::new(site);
    let session = renderer.launch(&LaunchOptions::default()).await.unwrap();

    // The site's images drop the leading "07".
    let payload = sites::extract_listing(
        session.as_ref(),
        &Publi24Adapter,
        PUBLI24_AD,
        &ctx(FakeOcr::reading("22 123 456")),
    )
    .await;

    let ListingPayload::Extracted(result) = payload else {
        panic!("expected in-process extraction");
    };
    let phone = result.phone_number.unwrap();
    assert_eq!(phone.as_str(), "0722123456");
    let location = result.location.unwrap();
    assert_eq!(location.county.as_deref(), Some("Constanta"));
    assert_eq!(location.city.as_deref(), Some("Mangalia"));
    assert_eq!(renderer.site.closed_pages(), 1);
}

#[tokio::test]
async fn test_listing_extraction_survives_every_step_failing() {
    // Nothing is served for this URL: navigation, reveal and OCR all fail.
    let renderer = FakeRenderer::new(FakeSite::new());
    let session = renderer.launch(&LaunchOptions::default()).await.unwrap();
    let ctx = ctx(FakeOcr::failing("engine crashed"));

    for adapter in [&OlxAdapter as &dyn SiteAdapter, &Publi24Adapter] {
        let payload = sites::extract_listing(session.as_ref(), adapter, PUBLI24_AD, &ctx).await;
        assert_eq!(payload.url(), PUBLI24_AD);
        assert_eq!(payload.missing_fields(), vec!["phone", "location"]);
    }
    assert_eq!(renderer.site.opened_pages(), 2);
    assert_eq!(renderer.site.closed_pages(), 2);
}

#[tokio::test]
async fn test_dynamic_adapter_delegates_rendered_html() {
    let index = "https://cars.example.com/list?page=1";
    let ad = "https://cars.example.com/ad/77";
    let site = FakeSite::new()
        .page(index, "<html></html>")
        .evaluation(index, json!(["/ad/77", "https://cars.example.com/ad/78", 42]))
        .page(ad, "<html><h1>Dacia</h1></html>");
    let renderer = FakeRenderer::new(site);
    let session = renderer.launch(&LaunchOptions::default()).await.unwrap();

    let mut adapter = DynamicAdapter::new("div.card > a");
    adapter.extract_selectors = BTreeMap::from([("price".to_string(), ".price".to_string())]);
    adapter.site_credentials = Some(json!({ "user": "demo" }));

    let page = session.new_page().await.unwrap();
    page.goto(index).await.unwrap();
    let links = adapter
        .discover_links(page.as_ref(), &Url::parse(index).unwrap(), &Timings::immediate())
        .await
        .unwrap();
    assert_eq!(links, vec![ad, "https://cars.example.com/ad/78"]);

    let payload = sites::extract_listing(session.as_ref(), &adapter, ad, &ctx(FakeOcr::reading(""))).await;
    let body = serde_json::to_value(&payload).unwrap();
    assert_eq!(body["url"], ad);
    assert_eq!(body["html"], "<html><h1>Dacia</h1></html>");
    assert_eq!(body["extractSelectors"]["price"], ".price");
    assert_eq!(body["siteCredentials"]["user"], "demo");
}

const OLX_INDEX: &str = "https://www.olx.ro/imobiliare/?page=1";
const OLX_INDEX_HTML: &str = r#"<div data-cy="l-card"><a href="/d/oferta/casa-IDq.html">Casa</a></div>"#;

async fn olx_links_after_scrolling(site: FakeSite, timings: &Timings) -> (Vec<String>, usize) {
    let renderer = FakeRenderer::new(site);
    let session = renderer.launch(&LaunchOptions::default()).await.unwrap();
    let page = session.new_page().await.unwrap();
    page.goto(OLX_INDEX).await.unwrap();
    let links = OlxAdapter
        .discover_links(page.as_ref(), &Url::parse(OLX_INDEX).unwrap(), timings)
        .await
        .unwrap();
    (links, renderer.site.scrolls())
}

#[tokio::test]
async fn test_olx_scrolls_until_page_height_settles() {
    let site = FakeSite::new().page(OLX_INDEX, OLX_INDEX_HTML).scroll_growth(OLX_INDEX, 2);
    let timings = Timings { scroll_attempts: 10, ..Timings::immediate() };

    let (links, scrolls) = olx_links_after_scrolling(site, &timings).await;

    // Two scrolls load more cards, the third finds nothing new.
    assert_eq!(scrolls, 3);
    assert_eq!(links, vec!["https://www.olx.ro/d/oferta/casa-IDq.html"]);
}

#[tokio::test]
async fn test_olx_scrolling_stops_after_max_attempts() {
    let site = FakeSite::new().page(OLX_INDEX, OLX_INDEX_HTML).scroll_growth(OLX_INDEX, usize::MAX);
    let timings = Timings::immediate();

    let (links, scrolls) = olx_links_after_scrolling(site, &timings).await;

    assert_eq!(scrolls, timings.scroll_attempts as usize);
    assert_eq!(links.len(), 1);
}

#[tokio::test]
async fn test_olx_static_page_scrolls_once() {
    let site = FakeSite::new().page(OLX_INDEX, OLX_INDEX_HTML);
    let (_, scrolls) = olx_links_after_scrolling(site, &Timings::immediate()).await;
    assert_eq!(scrolls, 1);
}

#[test]
fn test_extracted_payload_wire_shape() {
    let mut result = sites::ExtractionResult::empty(OLX_AD);
    result.phone_number = listing_harvester::phone::PhoneNumber::from_digits("0722123456");
    let body = serde_json::to_value(ListingPayload::Extracted(result)).unwrap();

    assert_eq!(body["url"], OLX_AD);
    assert_eq!(body["phoneNumber"], "0722123456");
    assert!(body["location"].is_null());
    assert!(body.get("parameters").is_none());
}
