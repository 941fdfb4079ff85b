use std::collections::HashSet;

use crate::store::{JobStore, StoreError};

/// Discovered URLs split against the store's seen set, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classified {
    pub new: Vec<String>,
    pub seen: Vec<String>,
    /// Index into `new` where the first seen URL appeared; everything from
    /// there on was discovered after it.
    pub first_seen_at: Option<usize>,
}

impl Classified {
    /// URLs that come before the first seen one. Watcher mode stops there.
    pub fn new_before_first_seen(&self) -> &[String] {
        match self.first_seen_at {
            Some(at) => &self.new[..at],
            None => &self.new,
        }
    }
}

/// Exact string match, no canonicalization. Duplicates on the page are
/// checked once and kept once.
pub async fn classify(store: &dyn JobStore, urls: &[String]) -> Result<Classified, StoreError> {
    let mut out = Classified::default();
    let mut checked = HashSet::new();

    for url in urls {
        if !checked.insert(url.as_str()) {
            continue;
        }
        if store.is_url_scraped(url).await? {
            out.first_seen_at.get_or_insert(out.new.len());
            out.seen.push(url.clone());
        } else {
            out.new.push(url.clone());
        }
    }
    Ok(out)
}
