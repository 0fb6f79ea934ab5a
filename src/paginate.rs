use crate::browser::{recoverable, Browser, BrowserResult};
use crate::extract;
use crate::locate;
use crate::model::ListingRow;
use crate::util::settle;
use std::collections::HashSet;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct Listing {
    pub rows: Vec<ListingRow>,
    pub pages: u32,
    pub index: PageIndex,
}

/// Which listing page each serial was read from, so a row can be found
/// again after the browser has moved on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageIndex {
    /// Serials per page in table order, page 1 first.
    pages: Vec<Vec<String>>,
}

impl PageIndex {
    pub fn push_page(&mut self, serials: Vec<String>) {
        self.pages.push(serials);
    }

    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    /// 1-based page the serial was first seen on.
    pub fn page_of(&self, serial: &str) -> Option<u32> {
        self.pages
            .iter()
            .position(|page| page.iter().any(|s| s == serial))
            .map(|i| i as u32 + 1)
    }

    /// Page currently displayed, judged from its rows. An exact match on the
    /// serial sequence wins; otherwise the page of the first known serial.
    pub fn current(&self, rows: &[ListingRow]) -> Option<u32> {
        let shows = |page: &Vec<String>| {
            !page.is_empty() && page.iter().map(String::as_str).eq(rows.iter().map(|r| r.serial.as_str()))
        };
        if let Some(i) = self.pages.iter().position(shows) {
            return Some(i as u32 + 1);
        }
        rows.iter().find_map(|r| self.page_of(&r.serial))
    }
}

/// Walk the results table page by page, at most `max_pages` pages.
///
/// Stops at the first page without an enabled "next" control. Reaching the
/// ceiling returns what was collected so far. A serial already seen on an
/// earlier page is dropped.
pub async fn collect_rows(
    browser: &dyn Browser,
    max_pages: u32,
    settle_ms: u64,
) -> BrowserResult<Listing> {
    let max_pages = max_pages.max(1);
    let next = locate::next_page();
    let mut listing = Listing::default();
    let mut seen = HashSet::new();

    loop {
        listing.pages += 1;
        let html = browser.page_source().await?;
        let rows = extract::listing_rows(&html);
        info!("page {}: {} rows", listing.pages, rows.len());
        listing
            .index
            .push_page(rows.iter().map(|r| r.serial.clone()).collect());
        for row in rows {
            if seen.insert(row.serial.clone()) {
                listing.rows.push(row);
            } else {
                warn!("serial {} repeated on page {}; keeping the first", row.serial, listing.pages);
            }
        }

        if listing.pages >= max_pages {
            info!("page ceiling {max_pages} reached");
            break;
        }
        let Some(found) = next.resolve(browser).await? else {
            break;
        };
        if !recoverable(browser.is_enabled(found.handle).await)?.unwrap_or(false) {
            break;
        }
        if recoverable(browser.click(found.handle).await)?.is_none() {
            break;
        }
        settle(settle_ms).await;
    }

    Ok(listing)
}

/// Step through the pager until the listing shows page `target`, at most one
/// step per indexed page. `Ok(false)` when the page cannot be reached: the
/// current page is unknown, a control is missing or disabled, or a click did
/// not land.
pub async fn seek_page(
    browser: &dyn Browser,
    index: &PageIndex,
    target: u32,
    settle_ms: u64,
) -> BrowserResult<bool> {
    let (next, previous) = (locate::next_page(), locate::previous_page());
    for _ in 0..=index.page_count() {
        let Some(html) = recoverable(browser.page_source().await)? else {
            return Ok(false);
        };
        let Some(current) = index.current(&extract::listing_rows(&html)) else {
            debug!("current listing page unknown");
            return Ok(false);
        };
        if current == target {
            return Ok(true);
        }
        let control = if current < target { &next } else { &previous };
        debug!("on page {current}, want {target}; trying {}", control.intent());
        let Some(found) = control.resolve(browser).await? else {
            return Ok(false);
        };
        if !recoverable(browser.is_enabled(found.handle).await)?.unwrap_or(false) {
            return Ok(false);
        }
        if recoverable(browser.click(found.handle).await)?.is_none() {
            return Ok(false);
        }
        settle(settle_ms).await;
    }
    Ok(false)
}
