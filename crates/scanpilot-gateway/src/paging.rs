//! Offset-style page walking

use std::future::Future;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Default number of items requested per page
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// One page of a listing endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Total items across all pages, as reported by the service
    pub total_count: u64,
    pub items: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(total_count: u64, items: Vec<T>) -> Self {
        Self { total_count, items }
    }

    pub fn empty() -> Self {
        Self {
            total_count: 0,
            items: Vec::new(),
        }
    }
}

/// Exhaust a paged listing into one collection.
///
/// The total is read from page 0 only. Items keep arrival order. A short
/// total ends the walk early; a page with no items before the total is
/// reached also ends it. Page errors are returned as-is.
pub async fn fetch_all<T, E, F, Fut>(page_size: u32, mut fetch_page: F) -> Result<Vec<T>, E>
where
    F: FnMut(u32, u32) -> Fut,
    Fut: Future<Output = Result<Page<T>, E>>,
{
    let page_size = page_size.max(1);

    let first = fetch_page(0, page_size).await?;
    let total = first.total_count;
    let mut items = first.items;
    let mut page = 0;

    while (items.len() as u64) < total {
        page += 1;
        let next = fetch_page(page, page_size).await?;
        if next.items.is_empty() {
            warn!(
                "Page {} came back empty with {}/{} items collected, stopping",
                page,
                items.len(),
                total
            );
            break;
        }
        items.extend(next.items);
    }

    debug!("Fetched {} items over {} pages", items.len(), page + 1);
    Ok(items)
}
