use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use rand::Rng;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::browser::ProxyConfig;

/// Anti-ban pause bounds when the caller gives none.
pub const DEFAULT_DELAY_MIN_SECS: u64 = 5;
pub const DEFAULT_DELAY_MAX_SECS: u64 = 15;

/// Upper bound on `pagesToScrape` for one job.
pub const MAX_PAGES_PER_JOB: u32 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Process every configured page.
    #[default]
    History,
    /// Stop at the first listing already in the store. Assumes index pages
    /// list the newest ads first.
    Watcher,
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "history" => Ok(RunMode::History),
            "watcher" => Ok(RunMode::Watcher),
            other => Err(format!("unknown mode '{other}', expected history or watcher")),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::History => f.write_str("history"),
            RunMode::Watcher => f.write_str("watcher"),
        }
    }
}

/// Pause taken after every webhook dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayPolicy {
    /// Whole seconds drawn uniformly from `min..=max`.
    Uniform { min: u64, max: u64 },
    Fixed(Duration),
}

impl Default for DelayPolicy {
    fn default() -> Self {
        DelayPolicy::Uniform {
            min: DEFAULT_DELAY_MIN_SECS,
            max: DEFAULT_DELAY_MAX_SECS,
        }
    }
}

impl DelayPolicy {
    pub fn uniform(min: u64, max: u64) -> Result<Self, String> {
        if min > max {
            return Err(format!("delayMin ({min}) must not exceed delayMax ({max})"));
        }
        Ok(DelayPolicy::Uniform { min, max })
    }

    /// Uniform bounds where a missing side takes its default, widened so a
    /// lone bound never conflicts with it.
    pub fn from_bounds(min: Option<u64>, max: Option<u64>) -> Result<Self, String> {
        let min = min.unwrap_or_else(|| DEFAULT_DELAY_MIN_SECS.min(max.unwrap_or(DEFAULT_DELAY_MIN_SECS)));
        let max = max.unwrap_or_else(|| DEFAULT_DELAY_MAX_SECS.max(min));
        Self::uniform(min, max)
    }

    pub fn sample(&self) -> Duration {
        match *self {
            DelayPolicy::Uniform { min, max } => Duration::from_secs(rand::rng().random_range(min..=max)),
            DelayPolicy::Fixed(delay) => delay,
        }
    }
}

/// Everything a crawl job needs, resolved from the request.
#[derive(Debug, Clone)]
pub struct JobSpec {
    /// `None` for ad-hoc runs: no status, no persisted logs, no cancellation.
    pub job_id: Option<String>,
    pub category_url: String,
    /// Where listing payloads are POSTed.
    pub webhook_url: String,
    /// Index pages in increasing order.
    pub pages: Vec<u32>,
    pub delay: DelayPolicy,
    pub mode: RunMode,
    pub proxy: Option<ProxyConfig>,
    /// Job-specific store connection instead of the process default.
    pub store_override: Option<String>,
    /// Skip images, fonts, stylesheets and media while browsing.
    pub block_resources: bool,
}

impl JobSpec {
    pub fn new(category_url: impl Into<String>, webhook_url: impl Into<String>) -> Self {
        Self {
            job_id: None,
            category_url: category_url.into(),
            webhook_url: webhook_url.into(),
            pages: vec![1],
            delay: DelayPolicy::default(),
            mode: RunMode::default(),
            proxy: None,
            store_override: None,
            block_resources: false,
        }
    }
}

/// `pagesToScrape = n` covers `start..start+n`; otherwise the single page.
pub fn select_pages(page_num: Option<u32>, pages_to_scrape: Option<u32>) -> Result<Vec<u32>, String> {
    let start = page_num.unwrap_or(1);
    if start == 0 {
        return Err("pageNum must be at least 1".to_string());
    }
    match pages_to_scrape {
        Some(0) => Err("pagesToScrape must be at least 1".to_string()),
        Some(count) if count > MAX_PAGES_PER_JOB => {
            Err(format!("pagesToScrape must be at most {MAX_PAGES_PER_JOB}"))
        }
        Some(count) => {
            let end = start
                .checked_add(count)
                .ok_or_else(|| "page range overflows".to_string())?;
            Ok((start..end).collect())
        }
        None => Ok(vec![start]),
    }
}
