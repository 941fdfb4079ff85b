use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Database, DatabaseConnection, EntityTrait, QueryFilter, Set,
};

use super::{JobStatus, JobStore, LogLevel, StoreError};
use crate::entities::{scrape_jobs, scrape_logs, scraped_urls};

/// Postgres-backed store over `scrape_jobs`, `scrape_logs` and `scraped_urls`.
#[derive(Debug, Clone)]
pub struct SeaOrmStore {
    db: DatabaseConnection,
}

impl SeaOrmStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let db = Database::connect(database_url).await?;
        Ok(Self { db })
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[async_trait]
impl JobStore for SeaOrmStore {
    async fn job_status(&self, job_id: &str) -> Result<Option<JobStatus>, StoreError> {
        let job = scrape_jobs::Entity::find_by_id(job_id.to_string())
            .one(&self.db)
            .await?;
        Ok(job.and_then(|j| JobStatus::parse(&j.status)))
    }

    async fn finish_job(&self, job_id: &str, status: JobStatus) -> Result<(), StoreError> {
        let result = scrape_jobs::Entity::update_many()
            .col_expr(scrape_jobs::Column::Status, Expr::value(status.as_str()))
            .col_expr(scrape_jobs::Column::CompletedAt, Expr::value(Utc::now()))
            .filter(scrape_jobs::Column::Id.eq(job_id))
            .exec(&self.db)
            .await?;
        if result.rows_affected == 0 {
            tracing::warn!(job_id, "No scrape_jobs row to mark as {}", status);
        }
        Ok(())
    }

    async fn append_log(&self, job_id: &str, level: LogLevel, message: &str) -> Result<(), StoreError> {
        let entry = scrape_logs::ActiveModel {
            job_id: Set(job_id.to_string()),
            message: Set(message.to_string()),
            log_level: Set(level.as_str().to_string()),
            created_at: Set(Utc::now()),
            ..Default::default()
        };
        entry.insert(&self.db).await?;
        Ok(())
    }

    async fn is_url_scraped(&self, url: &str) -> Result<bool, StoreError> {
        let found = scraped_urls::Entity::find()
            .filter(scraped_urls::Column::Url.eq(url))
            .one(&self.db)
            .await?;
        Ok(found.is_some())
    }
}
