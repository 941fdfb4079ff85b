use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use headless_chrome::browser::tab::RequestPausedDecision;
use headless_chrome::browser::transport::{SessionId, Transport};
use headless_chrome::protocol::cdp::Fetch::events::RequestPausedEvent;
use headless_chrome::protocol::cdp::Fetch::{FailRequest, RequestPattern, RequestStage};
use headless_chrome::protocol::cdp::Network::events::ResponseReceivedEventParams;
use headless_chrome::protocol::cdp::Network::{ErrorReason, GetResponseBodyReturnObject, ResourceType};
use headless_chrome::{Browser, Tab};

use super::{
    js_string, BrowserError, BrowserSession, CapturedResponse, ClickMode, LaunchOptions, Page,
    ProxyConfig, Renderer, ResourceKind, ResourcePolicy, ResponseFeed, Result,
};

const LAUNCH_ARGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--disable-setuid-sandbox",
];

// The transport drops an idle browser after this long; anti-ban pauses and
// OCR can leave it quiet for a while.
const IDLE_BROWSER_TIMEOUT: Duration = Duration::from_secs(600);

/// Launches a local Chrome/Chromium through the DevTools protocol.
#[derive(Debug, Clone)]
pub struct ChromeRenderer {
    chrome_path: Option<PathBuf>,
    headless: bool,
}

impl ChromeRenderer {
    pub fn new(chrome_path: Option<PathBuf>, headless: bool) -> Self {
        Self { chrome_path, headless }
    }
}

#[async_trait]
impl Renderer for ChromeRenderer {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn BrowserSession>> {
        let chrome_path = self.chrome_path.clone();
        let headless = self.headless;
        let proxy_server = options.proxy.as_ref().map(|p| p.server.clone());

        let browser = blocking(move || {
            let args: Vec<&OsStr> = LAUNCH_ARGS.iter().map(OsStr::new).collect();
            let launch = headless_chrome::LaunchOptions::default_builder()
                .headless(headless)
                .sandbox(false)
                .path(chrome_path)
                .proxy_server(proxy_server.as_deref())
                .idle_browser_timeout(IDLE_BROWSER_TIMEOUT)
                .args(args)
                .build()
                .map_err(|e| anyhow::anyhow!("invalid launch options: {e}"))?;
            Browser::new(launch)
        })
        .await?;

        tracing::info!(proxy = options.proxy.is_some(), "Browser launched");

        Ok(Box::new(ChromeSession {
            browser,
            proxy: options.proxy.clone(),
            resource_policy: options.resource_policy.clone(),
            navigation_timeout: options.navigation_timeout.unwrap_or(Duration::from_secs(30)),
        }))
    }
}

struct ChromeSession {
    browser: Browser,
    proxy: Option<ProxyConfig>,
    resource_policy: Option<ResourcePolicy>,
    navigation_timeout: Duration,
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn new_page(&self) -> Result<Box<dyn Page>> {
        let browser = self.browser.clone();
        let proxy = self.proxy.clone();
        let policy = self.resource_policy.clone();
        let timeout = self.navigation_timeout;

        let tab = blocking(move || {
            let tab = browser.new_tab()?;
            tab.set_default_timeout(timeout);
            tab.set_user_agent(ua_generator::ua::spoof_ua(), None, None)?;

            let proxy_auth = proxy
                .as_ref()
                .filter(|p| p.username.is_some())
                .map(|p| (p.username.clone(), p.password.clone()));
            if let Some((username, password)) = proxy_auth.clone() {
                tab.authenticate(username, password)?;
            }

            match policy {
                Some(policy) => {
                    let patterns = [RequestPattern {
                        url_pattern: Some("*".to_string()),
                        resource_Type: None,
                        request_stage: Some(RequestStage::Request),
                    }];
                    tab.enable_fetch(Some(&patterns), Some(proxy_auth.is_some()))?;
                    let interceptor = Arc::new(
                        move |_transport: Arc<Transport>,
                              _session: SessionId,
                              event: RequestPausedEvent| {
                            let params = event.params;
                            let kind = resource_kind(&params.resource_Type);
                            if policy.should_block(&params.request.url, kind) {
                                RequestPausedDecision::Fail(FailRequest {
                                    request_id: params.request_id,
                                    error_reason: ErrorReason::BlockedByClient,
                                })
                            } else {
                                RequestPausedDecision::Continue(None)
                            }
                        },
                    );
                    tab.enable_request_interception(interceptor)?;
                }
                None if proxy_auth.is_some() => {
                    tab.enable_fetch(None, Some(true))?;
                }
                None => {}
            }
            Ok(tab)
        })
        .await?;

        Ok(Box::new(ChromePage { tab }))
    }

    async fn close(self: Box<Self>) {
        // Dropping the last handle kills the browser process.
        let browser = self.browser;
        let _ = tokio::task::spawn_blocking(move || drop(browser)).await;
    }
}

struct ChromePage {
    tab: Arc<Tab>,
}

#[async_trait]
impl Page for ChromePage {
    async fn goto(&self, url: &str) -> Result<()> {
        let tab = self.tab.clone();
        let target = url.to_string();
        blocking(move || {
            tab.navigate_to(&target)?;
            tab.wait_until_navigated()?;
            Ok(())
        })
        .await
        .map_err(|e| BrowserError::Navigation {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    async fn content(&self) -> Result<String> {
        let tab = self.tab.clone();
        blocking(move || tab.get_content()).await
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let tab = self.tab.clone();
        let script = script.to_string();
        let remote = blocking(move || tab.evaluate(&script, true))
            .await
            .map_err(|e| BrowserError::Script(e.to_string()))?;
        Ok(remote.value.unwrap_or(serde_json::Value::Null))
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<bool> {
        let tab = self.tab.clone();
        let selector = selector.to_string();
        blocking(move || {
            let found = if timeout.is_zero() {
                tab.find_element(&selector).is_ok()
            } else {
                tab.wait_for_element_with_custom_timeout(&selector, timeout).is_ok()
            };
            Ok(found)
        })
        .await
    }

    async fn click(&self, selector: &str, mode: ClickMode) -> Result<()> {
        match mode {
            ClickMode::Normal => {
                let tab = self.tab.clone();
                let target = selector.to_string();
                blocking(move || {
                    tab.find_element(&target)?.click()?;
                    Ok(())
                })
                .await
                .map_err(|_| BrowserError::ElementNotFound(selector.to_string()))
            }
            ClickMode::Force => {
                let script = format!(
                    "(() => {{ const el = document.querySelector({}); if (!el) return false; el.click(); return true; }})()",
                    js_string(selector)
                );
                match self.evaluate(&script).await? {
                    serde_json::Value::Bool(true) => Ok(()),
                    _ => Err(BrowserError::ElementNotFound(selector.to_string())),
                }
            }
        }
    }

    async fn capture_responses(&self, url_patterns: &[&str]) -> Result<ResponseFeed> {
        let (sender, feed) = ResponseFeed::channel();
        let patterns: Vec<String> = url_patterns.iter().map(|p| p.to_string()).collect();
        let tab = self.tab.clone();

        blocking(move || {
            tab.register_response_handling(
                "phone-capture",
                Box::new(
                    move |params: ResponseReceivedEventParams,
                          fetch_body: &dyn Fn() -> anyhow::Result<GetResponseBodyReturnObject>| {
                        let url = params.response.url.clone();
                        if !patterns.iter().any(|p| url.contains(p.as_str())) {
                            return;
                        }
                        let Ok(body) = fetch_body() else {
                            tracing::debug!(%url, "Could not read captured response body");
                            return;
                        };
                        let bytes = if body.base_64_encoded {
                            match base64::engine::general_purpose::STANDARD.decode(body.body.as_bytes()) {
                                Ok(bytes) => bytes,
                                Err(_) => return,
                            }
                        } else {
                            body.body.into_bytes()
                        };
                        let _ = sender.send(CapturedResponse {
                            url,
                            content_type: params.response.mime_type.clone(),
                            body: bytes,
                        });
                    },
                ),
            )?;
            Ok(())
        })
        .await?;

        Ok(feed)
    }

    async fn close(&self) -> Result<()> {
        let tab = self.tab.clone();
        blocking(move || tab.close(true).map(|_| ())).await
    }
}

fn resource_kind(resource: &ResourceType) -> ResourceKind {
    match resource {
        ResourceType::Document => ResourceKind::Document,
        ResourceType::Script => ResourceKind::Script,
        ResourceType::Stylesheet => ResourceKind::Stylesheet,
        ResourceType::Image => ResourceKind::Image,
        ResourceType::Font => ResourceKind::Font,
        ResourceType::Media => ResourceKind::Media,
        ResourceType::Xhr | ResourceType::Fetch => ResourceKind::Xhr,
        _ => ResourceKind::Other,
    }
}

/// Runs a synchronous DevTools call on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| BrowserError::Engine(e.to_string()))?
        .map_err(|e| BrowserError::Engine(e.to_string()))
}
