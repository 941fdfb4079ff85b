use std::collections::HashSet;

use anyhow::Context;
use url::Url;

use crate::browser::BrowserSession;
use crate::config::Timings;
use crate::sites::SiteAdapter;

/// Loads index page `page_number` and returns its listing URLs, unique
/// within the page and in discovery order.
pub async fn list_page(
    session: &dyn BrowserSession,
    adapter: &dyn SiteAdapter,
    category_url: &str,
    page_number: u32,
    timings: &Timings,
) -> anyhow::Result<Vec<String>> {
    let page_url = adapter
        .page_url(category_url, page_number)
        .with_context(|| format!("invalid category URL {category_url}"))?;
    let base = Url::parse(&page_url)?;

    let page = session.new_page().await?;
    let links = async {
        page.goto(&page_url).await?;
        tokio::time::sleep(timings.render_settle).await;
        adapter.discover_links(page.as_ref(), &base, timings).await
    }
    .await;

    if let Err(e) = page.close().await {
        tracing::debug!(%page_url, "Closing index page failed: {}", e);
    }

    let mut seen = HashSet::new();
    let links: Vec<String> = links?
        .into_iter()
        .filter(|link| seen.insert(link.clone()))
        .collect();
    tracing::info!(adapter = adapter.name(), page = page_number, links = links.len(), "Index page listed");
    Ok(links)
}
