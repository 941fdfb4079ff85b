use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ScrapeJobs::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(ScrapeJobs::Id).string().not_null().primary_key())
                    .col(
                        ColumnDef::new(ScrapeJobs::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(ScrapeJobs::CompletedAt).timestamp_with_time_zone().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ScrapeLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ScrapeLogs::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ScrapeLogs::JobId).string().not_null())
                    .col(ColumnDef::new(ScrapeLogs::Message).text().not_null())
                    .col(ColumnDef::new(ScrapeLogs::LogLevel).string().not_null())
                    .col(
                        ColumnDef::new(ScrapeLogs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_scrape_logs_job_id")
                    .table(ScrapeLogs::Table)
                    .col(ScrapeLogs::JobId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ScrapedUrls::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ScrapedUrls::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ScrapedUrls::Url).text().not_null().unique_key())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ScrapedUrls::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ScrapeLogs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ScrapeJobs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ScrapeJobs {
    Table,
    Id,
    Status,
    CompletedAt,
}

#[derive(DeriveIden)]
enum ScrapeLogs {
    Table,
    Id,
    JobId,
    Message,
    LogLevel,
    CreatedAt,
}

#[derive(DeriveIden)]
enum ScrapedUrls {
    Table,
    Id,
    Url,
}
