pub mod scrape_jobs;
pub mod scrape_logs;
pub mod scraped_urls;

pub use scrape_jobs::Entity as ScrapeJobs;
pub use scrape_logs::Entity as ScrapeLogs;
pub use scraped_urls::Entity as ScrapedUrls;
