//! Page arithmetic for discussion listings. Ordering itself happens in SQL.

use serde::Serialize;

use crate::error::{DiscussionError, DiscussionResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub const DEFAULT_LIMIT: u32 = 20;

    pub fn new(page: i64, limit: i64) -> DiscussionResult<Self> {
        if page < 1 {
            return Err(DiscussionError::invalid("Page must be at least 1"));
        }
        if limit < 1 {
            return Err(DiscussionError::invalid("Limit must be greater than 0"));
        }
        let page = u32::try_from(page).map_err(|_| DiscussionError::invalid("Page is too large"))?;
        let limit =
            u32::try_from(limit).map_err(|_| DiscussionError::invalid("Limit is too large"))?;
        Ok(Self { page, limit })
    }

    /// Rows to skip before this page starts
    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize).saturating_mul(self.limit as usize)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub current_page: u32,
    pub total_pages: u32,
    pub total: usize,
}

impl<T> Page<T> {
    /// Wrap one already-sliced page of rows out of `total` matches
    pub fn new(items: Vec<T>, request: PageRequest, total: usize) -> Self {
        Self {
            items,
            current_page: request.page,
            total_pages: total_pages(total, request.limit),
            total,
        }
    }
}

/// ceil(match_count / limit), never below 1
pub fn total_pages(match_count: usize, limit: u32) -> u32 {
    let limit = limit.max(1) as usize;
    let pages = match_count.div_ceil(limit).max(1);
    u32::try_from(pages).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_pages() {
        assert_eq!(total_pages(0, 10), 1);
        assert_eq!(total_pages(3, 1), 3);
        assert_eq!(total_pages(10, 10), 1);
        assert_eq!(total_pages(11, 10), 2);
    }

    #[test]
    fn test_page_request_validation() {
        assert!(PageRequest::new(0, 10).is_err());
        assert!(PageRequest::new(1, 0).is_err());
        assert!(PageRequest::new(-3, 10).is_err());
        assert_eq!(PageRequest::new(2, 5).unwrap(), PageRequest { page: 2, limit: 5 });
    }

    #[test]
    fn test_offset_skips_earlier_pages() {
        assert_eq!(PageRequest::new(1, 10).unwrap().offset(), 0);
        assert_eq!(PageRequest::new(3, 7).unwrap().offset(), 14);
        let huge = PageRequest { page: u32::MAX, limit: u32::MAX };
        assert!(huge.offset() > 0);
    }

    #[test]
    fn test_page_reports_totals() {
        let page = Page::new(vec!["c"], PageRequest::new(3, 1).unwrap(), 3);
        assert_eq!(page.current_page, 3);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.total, 3);

        let beyond = Page::new(Vec::<&str>::new(), PageRequest::new(4, 2).unwrap(), 0);
        assert!(beyond.items.is_empty());
        assert_eq!(beyond.total_pages, 1);
    }
}
