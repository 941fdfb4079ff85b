//! Rendering-engine capability.
//!
//! The crawl pipeline only talks to these traits. `chrome` provides the
//! headless Chrome implementation; tests drive the pipeline with fakes.

pub mod chrome;

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::mpsc;
use utoipa::ToSchema;

pub use chrome::ChromeRenderer;

use crate::phone;

pub type Result<T> = std::result::Result<T, BrowserError>;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("Browser engine error: {0}")]
    Engine(String),

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("No element matches selector: {0}")]
    ElementNotFound(String),

    #[error("Script evaluation failed: {0}")]
    Script(String),
}

/// Proxy settings a job may ask the browser to route through.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    /// Proxy server, e.g. `http://10.0.0.2:3128`
    pub server: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    pub proxy: Option<ProxyConfig>,
    pub resource_policy: Option<ResourcePolicy>,
    pub navigation_timeout: Option<Duration>,
}

/// Starts one browser session per job.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn BrowserSession>>;
}

/// A browser process with a single browsing context.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Opens a fresh page. Pages are never reused across listings.
    async fn new_page(&self) -> Result<Box<dyn Page>>;

    async fn close(self: Box<Self>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickMode {
    /// A real pointer click; overlays can swallow it.
    Normal,
    /// Dispatched straight to the element, ignoring anything on top of it.
    Force,
}

#[async_trait]
pub trait Page: Send + Sync {
    async fn goto(&self, url: &str) -> Result<()>;

    /// Serialized DOM as currently rendered.
    async fn content(&self) -> Result<String>;

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;

    /// Whether an element matching `selector` shows up within `timeout`.
    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<bool>;

    async fn click(&self, selector: &str, mode: ClickMode) -> Result<()>;

    /// Subscribe to network responses whose URL contains any of `url_patterns`.
    /// Must be called before `goto` so early responses are not missed.
    async fn capture_responses(&self, url_patterns: &[&str]) -> Result<ResponseFeed>;

    async fn close(&self) -> Result<()>;
}

/// A network response body captured while the page was loading.
#[derive(Debug, Clone)]
pub struct CapturedResponse {
    pub url: String,
    pub content_type: String,
    pub body: Vec<u8>,
}

/// Subscription to captured responses of a single page.
pub struct ResponseFeed {
    receiver: mpsc::UnboundedReceiver<CapturedResponse>,
}

impl ResponseFeed {
    pub fn channel() -> (mpsc::UnboundedSender<CapturedResponse>, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (sender, Self { receiver })
    }

    /// Newest captured phone image, waiting up to `timeout` if nothing usable
    /// has arrived yet.
    pub async fn latest_phone_image(&mut self, timeout: Duration) -> Option<Vec<u8>> {
        let mut latest = None;
        while let Ok(captured) = self.receiver.try_recv() {
            if let Some(image) = phone::image_from_capture(&captured) {
                latest = Some(image);
            }
        }
        if latest.is_some() {
            return latest;
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, self.receiver.recv()).await {
                Ok(Some(captured)) => {
                    if let Some(image) = phone::image_from_capture(&captured) {
                        return Some(image);
                    }
                }
                Ok(None) | Err(_) => return None,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Document,
    Script,
    Stylesheet,
    Image,
    Font,
    Media,
    Xhr,
    Other,
}

/// Which subresources the browser may skip to save bandwidth.
#[derive(Debug, Clone)]
pub struct ResourcePolicy {
    blocked: Vec<ResourceKind>,
    always_allow: Vec<String>,
}

impl ResourcePolicy {
    /// Blocks images, fonts, stylesheets and media, except URLs containing
    /// any of `always_allow` (phone images must still load).
    pub fn lightweight(always_allow: &[&str]) -> Self {
        Self {
            blocked: vec![
                ResourceKind::Image,
                ResourceKind::Font,
                ResourceKind::Stylesheet,
                ResourceKind::Media,
            ],
            always_allow: always_allow.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn should_block(&self, url: &str, kind: ResourceKind) -> bool {
        if self.always_allow.iter().any(|p| url.contains(p.as_str())) {
            return false;
        }
        self.blocked.contains(&kind)
    }
}

/// JSON string literal for embedding a selector into a script.
pub(crate) fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}
