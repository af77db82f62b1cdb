//! Fixed-size numbered page helpers.
//!
//! Feeds are sliced into 1-indexed pages of ten posts. Requests beyond the
//! last valid page clamp to the last page instead of failing, and anything
//! unparseable counts as page one.

use serde::Deserialize;

pub const FEED_PAGE_SIZE: u32 = 10;

/// A 1-indexed page number as requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageNumber(u32);

impl PageNumber {
    pub const FIRST: PageNumber = PageNumber(1);

    pub fn new(number: u32) -> Self {
        Self(number.max(1))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl Default for PageNumber {
    fn default() -> Self {
        Self::FIRST
    }
}

/// Query parameters shared by all feed routes.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct PageQuery {
    page: Option<String>,
}

impl PageQuery {
    /// Parse the requested page, treating absent, unparseable, or
    /// non-positive values as page one.
    pub fn page_number(&self) -> PageNumber {
        self.page
            .as_deref()
            .and_then(|raw| raw.trim().parse::<u32>().ok())
            .map(PageNumber::new)
            .unwrap_or(PageNumber::FIRST)
    }
}

/// Number of pages needed for `total_items`; an empty collection still has
/// one (empty) page.
pub fn total_pages(total_items: u64, page_size: u32) -> u32 {
    if total_items == 0 {
        return 1;
    }
    let size = u64::from(page_size.max(1));
    let pages = total_items.div_ceil(size);
    u32::try_from(pages).unwrap_or(u32::MAX)
}

/// Clamp a requested page into `1..=total_pages`.
pub fn clamp_page(requested: PageNumber, total_pages: u32) -> u32 {
    requested.get().min(total_pages.max(1))
}

pub fn offset(page: u32, page_size: u32) -> u64 {
    u64::from(page.saturating_sub(1)) * u64::from(page_size)
}

/// One materialized page plus the metadata the presentation layer needs.
#[derive(Debug, Clone)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub current_page: u32,
    pub total_pages: u32,
    pub total_items: u64,
}

impl<T> Paginated<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            current_page: 1,
            total_pages: 1,
            total_items: 0,
        }
    }

    pub fn has_previous(&self) -> bool {
        self.current_page > 1
    }

    pub fn has_next(&self) -> bool {
        self.current_page < self.total_pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(total_pages(0, 10), 1);
        assert_eq!(total_pages(1, 10), 1);
        assert_eq!(total_pages(10, 10), 1);
        assert_eq!(total_pages(11, 10), 2);
        assert_eq!(total_pages(15, 10), 2);
    }

    #[test]
    fn out_of_range_pages_clamp_to_the_last_page() {
        assert_eq!(clamp_page(PageNumber::new(99), 2), 2);
        assert_eq!(clamp_page(PageNumber::new(2), 2), 2);
        assert_eq!(clamp_page(PageNumber::new(1), 2), 1);
    }

    #[test]
    fn zero_requests_become_page_one() {
        assert_eq!(PageNumber::new(0).get(), 1);
    }

    #[test]
    fn unparseable_query_values_become_page_one() {
        let query = PageQuery {
            page: Some("abc".to_string()),
        };
        assert_eq!(query.page_number(), PageNumber::FIRST);

        let query = PageQuery {
            page: Some("-3".to_string()),
        };
        assert_eq!(query.page_number(), PageNumber::FIRST);

        let query = PageQuery { page: None };
        assert_eq!(query.page_number(), PageNumber::FIRST);
    }

    #[test]
    fn offsets_are_zero_based() {
        assert_eq!(offset(1, 10), 0);
        assert_eq!(offset(2, 10), 10);
        assert_eq!(offset(3, 10), 20);
    }
}
