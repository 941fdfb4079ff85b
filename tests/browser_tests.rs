mod common;

use std::time::Duration;

use common::phone_png;
use listing_harvester::browser::{CapturedResponse, ResourceKind, ResourcePolicy, ResponseFeed};

fn response(url: &str, content_type: &str, body: Vec<u8>) -> CapturedResponse {
    CapturedResponse {
        url: url.to_string(),
        content_type: content_type.to_string(),
        body,
    }
}

#[test]
fn test_lightweight_policy_keeps_phone_images() {
    let policy = ResourcePolicy::lightweight(&["PhoneNumberImages", "Telefon"]);

    assert!(policy.should_block("https://cdn.publi24.ro/img/ad-123.jpg", ResourceKind::Image));
    assert!(policy.should_block("https://fonts.gstatic.com/roboto.woff2", ResourceKind::Font));
    assert!(policy.should_block("https://www.publi24.ro/site.css", ResourceKind::Stylesheet));
    assert!(!policy.should_block(
        "https://www.publi24.ro/DetailAd/PhoneNumberImages?adId=9",
        ResourceKind::Image
    ));
    assert!(!policy.should_block("https://www.publi24.ro/anunturi/x.html", ResourceKind::Document));
    assert!(!policy.should_block("https://www.publi24.ro/app.js", ResourceKind::Script));
}

#[tokio::test]
async fn test_feed_returns_newest_usable_image() {
    let (sender, mut feed) = ResponseFeed::channel();
    let first = phone_png();
    let mut second = phone_png();
    second.push(0);

    sender.send(response("https://x/PhoneNumberImages/1", "image/png", first)).unwrap();
    sender.send(response("https://x/PhoneNumberImages/2", "image/png", second.clone())).unwrap();
    sender.send(response("https://x/Telefon/meta", "application/json", b"{}".to_vec())).unwrap();

    let image = feed.latest_phone_image(Duration::ZERO).await;
    assert_eq!(image, Some(second));
}

#[tokio::test(start_paused = true)]
async fn test_feed_waits_for_late_response() {
    let (sender, mut feed) = ResponseFeed::channel();
    let png = phone_png();
    let late = png.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        sender.send(response("https://x/Telefon/1", "image/png", late)).unwrap();
    });

    let image = feed.latest_phone_image(Duration::from_secs(3)).await;
    assert_eq!(image, Some(png));
}

#[tokio::test(start_paused = true)]
async fn test_feed_times_out_without_image() {
    let (sender, mut feed) = ResponseFeed::channel();
    sender.send(response("https://x/Telefon/1", "text/html", b"<p>no</p>".to_vec())).unwrap();

    let started = tokio::time::Instant::now();
    let image = feed.latest_phone_image(Duration::from_secs(3)).await;
    assert_eq!(image, None);
    assert!(started.elapsed() >= Duration::from_secs(3));
    drop(sender);
}
