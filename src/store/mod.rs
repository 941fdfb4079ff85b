//! Job tracking store: job status, job log stream and the set of URLs
//! already handed to the webhook receiver.

pub mod sea;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Mutex;

pub use sea::SeaOrmStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Stopped,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Stopped => "stopped",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" | "queued" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "stopped" => Some(JobStatus::Stopped),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Current status as recorded by whoever owns the job row.
    async fn job_status(&self, job_id: &str) -> Result<Option<JobStatus>, StoreError>;

    /// Records the terminal status and completion time.
    async fn finish_job(&self, job_id: &str, status: JobStatus) -> Result<(), StoreError>;

    async fn append_log(&self, job_id: &str, level: LogLevel, message: &str) -> Result<(), StoreError>;

    async fn is_url_scraped(&self, url: &str) -> Result<bool, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub job_id: String,
    pub level: LogLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MemoryState {
    jobs: HashMap<String, (JobStatus, Option<DateTime<Utc>>)>,
    logs: Vec<LogEntry>,
    scraped: HashSet<String>,
}

/// In-process store, used when no database is configured.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a job's status as an external owner would (e.g. a stop request).
    pub async fn set_status(&self, job_id: &str, status: JobStatus) {
        let mut state = self.state.lock().await;
        let entry = state.jobs.entry(job_id.to_string()).or_insert((status, None));
        entry.0 = status;
    }

    pub async fn mark_scraped(&self, url: &str) {
        self.state.lock().await.scraped.insert(url.to_string());
    }

    pub async fn logs(&self, job_id: &str) -> Vec<LogEntry> {
        let state = self.state.lock().await;
        state.logs.iter().filter(|l| l.job_id == job_id).cloned().collect()
    }

    pub async fn completed_at(&self, job_id: &str) -> Option<DateTime<Utc>> {
        self.state.lock().await.jobs.get(job_id).and_then(|(_, at)| *at)
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn job_status(&self, job_id: &str) -> Result<Option<JobStatus>, StoreError> {
        Ok(self.state.lock().await.jobs.get(job_id).map(|(status, _)| *status))
    }

    async fn finish_job(&self, job_id: &str, status: JobStatus) -> Result<(), StoreError> {
        self.state
            .lock()
            .await
            .jobs
            .insert(job_id.to_string(), (status, Some(Utc::now())));
        Ok(())
    }

    async fn append_log(&self, job_id: &str, level: LogLevel, message: &str) -> Result<(), StoreError> {
        self.state.lock().await.logs.push(LogEntry {
            job_id: job_id.to_string(),
            level,
            message: message.to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn is_url_scraped(&self, url: &str) -> Result<bool, StoreError> {
        Ok(self.state.lock().await.scraped.contains(url))
    }
}

/// Opens the store a job asked for, or falls back to the process default.
pub async fn resolve_store(
    default: Arc<dyn JobStore>,
    override_database_url: Option<&str>,
) -> Result<Arc<dyn JobStore>, StoreError> {
    match override_database_url {
        Some(url) => Ok(Arc::new(SeaOrmStore::connect(url).await?)),
        None => Ok(default),
    }
}
