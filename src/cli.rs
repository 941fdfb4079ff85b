//! Command-line flags of the `listing-worker` binary.

use anyhow::anyhow;
use clap::Parser;

use crate::jobs::{select_pages, DelayPolicy, JobSpec, RunMode};

#[derive(Debug, Parser)]
#[command(name = "listing-worker", about = "Runs one bulk scrape job in the foreground")]
pub struct WorkerArgs {
    /// Category index URL (OLX or publi24.ro)
    #[arg(long)]
    pub category_url: String,

    /// Receiver that gets one POST per listing
    #[arg(long)]
    pub webhook_url: String,

    /// Tracks status and logs under this id
    #[arg(long)]
    pub job_id: Option<String>,

    /// First index page
    #[arg(long)]
    pub page: Option<u32>,

    /// Number of index pages from `--page` on
    #[arg(long)]
    pub pages: Option<u32>,

    /// history or watcher
    #[arg(long, default_value = "history")]
    pub mode: RunMode,

    #[arg(long, value_name = "SECS")]
    pub delay_min: Option<u64>,

    #[arg(long, value_name = "SECS")]
    pub delay_max: Option<u64>,
}

impl WorkerArgs {
    pub fn job_spec(&self) -> anyhow::Result<JobSpec> {
        let mut spec = JobSpec::new(self.category_url.clone(), self.webhook_url.clone());
        spec.job_id = self.job_id.clone();
        spec.mode = self.mode;
        spec.pages = select_pages(self.page, self.pages).map_err(|e| anyhow!(e))?;
        if self.delay_min.is_some() || self.delay_max.is_some() {
            spec.delay = DelayPolicy::from_bounds(self.delay_min, self.delay_max).map_err(|e| anyhow!(e))?;
        }
        Ok(spec)
    }
}
