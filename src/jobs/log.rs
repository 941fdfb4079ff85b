use std::sync::Arc;

use crate::store::{JobStore, LogLevel};

/// Per-job log sink: every line goes to `tracing`, and to `scrape_logs`
/// when the job has an id. A failed insert never fails the job.
#[derive(Clone)]
pub struct JobLog {
    job_id: Option<String>,
    store: Arc<dyn JobStore>,
}

impl JobLog {
    pub fn new(job_id: Option<String>, store: Arc<dyn JobStore>) -> Self {
        Self { job_id, store }
    }

    pub async fn info(&self, message: impl AsRef<str>) {
        self.write(LogLevel::Info, message.as_ref()).await;
    }

    pub async fn warning(&self, message: impl AsRef<str>) {
        self.write(LogLevel::Warning, message.as_ref()).await;
    }

    pub async fn error(&self, message: impl AsRef<str>) {
        self.write(LogLevel::Error, message.as_ref()).await;
    }

    async fn write(&self, level: LogLevel, message: &str) {
        let job_id = self.job_id.as_deref().unwrap_or("-");
        match level {
            LogLevel::Info => tracing::info!(job_id, "{}", message),
            LogLevel::Warning => tracing::warn!(job_id, "{}", message),
            LogLevel::Error => tracing::error!(job_id, "{}", message),
        }

        let Some(job_id) = self.job_id.as_deref() else {
            return;
        };
        if let Err(e) = self.store.append_log(job_id, level, message).await {
            tracing::error!(job_id, "Failed to persist job log: {}", e);
        }
    }
}
