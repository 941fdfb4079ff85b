#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{extract::State, routing::post, Json, Router};
use listing_harvester::browser::{
    BrowserError, BrowserSession, CapturedResponse, ClickMode, LaunchOptions, Page, Renderer, ResponseFeed,
};
use listing_harvester::ocr::{OcrEngine, OcrError};
use listing_harvester::store::{JobStatus, MemoryStore};
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;

/// Pages, reveal results and captured responses served by the fake browser, keyed by URL.
#[derive(Default)]
pub struct FakeSite {
    pages: HashMap<String, String>,
    revealed: HashMap<String, String>,
    captures: HashMap<String, Vec<CapturedResponse>>,
    evaluations: HashMap<String, Value>,
    scroll_growth: HashMap<String, usize>,
    scrolls: AtomicUsize,
    panic_on: Option<String>,
    stop_on: Option<(String, MemoryStore, String)>,
    visits: Mutex<Vec<String>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
    launches: Mutex<Vec<LaunchOptions>>,
    fail_launch: AtomicBool,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    /// DOM after a forced click on the reveal control.
    pub fn revealed(mut self, url: &str, html: &str) -> Self {
        self.revealed.insert(url.to_string(), html.to_string());
        self
    }

    /// Responses delivered to a capture subscription when `url` loads.
    pub fn capture(mut self, url: &str, captured: CapturedResponse) -> Self {
        self.captures.entry(url.to_string()).or_default().push(captured);
        self
    }

    /// Result of any `querySelectorAll` script evaluated on `url`.
    pub fn evaluation(mut self, url: &str, value: Value) -> Self {
        self.evaluations.insert(url.to_string(), value);
        self
    }

    /// The document on `url` grows after each of its first `times` scrolls to the bottom.
    pub fn scroll_growth(mut self, url: &str, times: usize) -> Self {
        self.scroll_growth.insert(url.to_string(), times);
        self
    }

    pub fn panic_on(mut self, url: &str) -> Self {
        self.panic_on = Some(url.to_string());
        self
    }

    /// Marks `job_id` as stopped in `store` as soon as `url` is visited.
    pub fn stop_on(mut self, url: &str, store: MemoryStore, job_id: &str) -> Self {
        self.stop_on = Some((url.to_string(), store, job_id.to_string()));
        self
    }

    pub fn failing_launch(self) -> Self {
        self.fail_launch.store(true, Ordering::SeqCst);
        self
    }

    pub fn visits(&self) -> Vec<String> {
        self.visits.lock().unwrap().clone()
    }

    /// Scroll-to-bottom scripts evaluated so far.
    pub fn scrolls(&self) -> usize {
        self.scrolls.load(Ordering::SeqCst)
    }

    pub fn opened_pages(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed_pages(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn launches(&self) -> Vec<LaunchOptions> {
        self.launches.lock().unwrap().clone()
    }
}

#[derive(Clone)]
pub struct FakeRenderer {
    pub site: Arc<FakeSite>,
}

impl FakeRenderer {
    pub fn new(site: FakeSite) -> Self {
        Self { site: Arc::new(site) }
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn BrowserSession>, BrowserError> {
        if self.site.fail_launch.load(Ordering::SeqCst) {
            return Err(BrowserError::Engine("chrome not found".to_string()));
        }
        self.site.launches.lock().unwrap().push(options.clone());
        Ok(Box::new(FakeSession { site: self.site.clone() }))
    }
}

struct FakeSession {
    site: Arc<FakeSite>,
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn new_page(&self) -> Result<Box<dyn Page>, BrowserError> {
        self.site.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakePage {
            site: self.site.clone(),
            current: Mutex::new(None),
            revealed: AtomicBool::new(false),
            capture: Mutex::new(None),
        }))
    }

    async fn close(self: Box<Self>) {}
}

struct FakePage {
    site: Arc<FakeSite>,
    current: Mutex<Option<String>>,
    revealed: AtomicBool,
    capture: Mutex<Option<(Vec<String>, UnboundedSender<CapturedResponse>)>>,
}

impl FakePage {
    fn current(&self) -> Option<String> {
        self.current.lock().unwrap().clone()
    }
}

#[async_trait]
impl Page for FakePage {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        self.site.visits.lock().unwrap().push(url.to_string());
        if self.site.panic_on.as_deref() == Some(url) {
            panic!("renderer crashed on {url}");
        }
        if let Some((stop_url, store, job_id)) = &self.site.stop_on {
            if stop_url == url {
                store.set_status(job_id, JobStatus::Stopped).await;
            }
        }
        if !self.site.pages.contains_key(url) {
            return Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: "net::ERR_NAME_NOT_RESOLVED".to_string(),
            });
        }
        *self.current.lock().unwrap() = Some(url.to_string());

        if let Some((patterns, sender)) = self.capture.lock().unwrap().as_ref() {
            for captured in self.site.captures.get(url).into_iter().flatten() {
                if patterns.iter().any(|p| captured.url.contains(p.as_str())) {
                    let _ = sender.send(captured.clone());
                }
            }
        }
        Ok(())
    }

    async fn content(&self) -> Result<String, BrowserError> {
        let url = self
            .current()
            .ok_or_else(|| BrowserError::Engine("no document loaded".to_string()))?;
        if self.revealed.load(Ordering::SeqCst) {
            if let Some(html) = self.site.revealed.get(&url) {
                return Ok(html.clone());
            }
        }
        Ok(self.site.pages.get(&url).cloned().unwrap_or_default())
    }

    async fn evaluate(&self, script: &str) -> Result<Value, BrowserError> {
        let url = self.current().unwrap_or_default();
        if script.contains("querySelectorAll") {
            if let Some(value) = self.site.evaluations.get(&url) {
                return Ok(value.clone());
            }
        }
        if script.contains("scrollTo(") {
            self.site.scrolls.fetch_add(1, Ordering::SeqCst);
            return Ok(Value::Bool(true));
        }
        if script.trim() == "document.body.scrollHeight" {
            let growth = self.site.scroll_growth.get(&url).copied().unwrap_or(0);
            let grown = self.site.scrolls().min(growth);
            return Ok(json!(2400 + 800 * grown));
        }
        Ok(Value::Bool(true))
    }

    async fn wait_for(&self, _selector: &str, _timeout: Duration) -> Result<bool, BrowserError> {
        Ok(self.current().is_some())
    }

    async fn click(&self, selector: &str, mode: ClickMode) -> Result<(), BrowserError> {
        let url = self.current().unwrap_or_default();
        match mode {
            // Consent buttons: nothing to do.
            ClickMode::Normal => Ok(()),
            ClickMode::Force if self.site.revealed.contains_key(&url) || self.site.captures.contains_key(&url) => {
                self.revealed.store(true, Ordering::SeqCst);
                Ok(())
            }
            ClickMode::Force => Err(BrowserError::ElementNotFound(selector.to_string())),
        }
    }

    async fn capture_responses(&self, url_patterns: &[&str]) -> Result<ResponseFeed, BrowserError> {
        let (sender, feed) = ResponseFeed::channel();
        let patterns = url_patterns.iter().map(|p| p.to_string()).collect();
        *self.capture.lock().unwrap() = Some((patterns, sender));
        Ok(feed)
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.site.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// OCR stand-in that always reads the same text.
pub struct FakeOcr {
    reply: Result<String, String>,
    calls: AtomicUsize,
}

impl FakeOcr {
    pub fn reading(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OcrEngine for FakeOcr {
    async fn recognize(&self, _png: &[u8]) -> Result<String, OcrError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply.clone().map_err(OcrError::Engine)
    }
}

/// A small dark-on-light PNG, enough for the preprocessing step.
pub fn phone_png() -> Vec<u8> {
    let img = image::RgbImage::from_fn(12, 4, |x, _| {
        if x % 3 == 0 {
            image::Rgb([20, 20, 20])
        } else {
            image::Rgb([235, 235, 235])
        }
    });
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png).unwrap();
    out
}

/// Webhook receiver on a loopback port that records payloads.
#[derive(Clone, Default)]
pub struct Receiver {
    pub received: Arc<Mutex<Vec<Value>>>,
    /// URLs the receiver claims to already have.
    pub known: Arc<Vec<String>>,
    /// URLs for which the receiver answers with an error.
    pub rejects: Arc<Vec<String>>,
}

impl Receiver {
    pub fn received_urls(&self) -> Vec<String> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .filter_map(|body| body["url"].as_str().map(str::to_string))
            .collect()
    }
}

async fn receive(State(receiver): State<Receiver>, Json(body): Json<Value>) -> Json<Value> {
    let url = body["url"].as_str().unwrap_or_default().to_string();
    let count = {
        let mut received = receiver.received.lock().unwrap();
        received.push(body);
        received.len()
    };
    if receiver.known.contains(&url) {
        Json(json!({ "status": "skipped" }))
    } else if receiver.rejects.contains(&url) {
        Json(json!({ "error": "listing rejected" }))
    } else {
        Json(json!({ "id": format!("rec-{count}") }))
    }
}

/// Starts `receiver` and returns its base address, e.g. `http://127.0.0.1:41234`.
pub async fn spawn_receiver(receiver: Receiver) -> String {
    let app = Router::new()
        .route("/webhook", post(receive))
        .route("/api/parse-listing", post(receive))
        .with_state(receiver);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}
