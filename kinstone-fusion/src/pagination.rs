//! Limit/offset pagination for list endpoints

use serde::Deserialize;

/// Page size used when the caller gives none
pub const DEFAULT_PAGE_SIZE: i64 = 50;

/// Largest page a single request may ask for
pub const MAX_PAGE_SIZE: i64 = 200;

/// Sanitized LIMIT/OFFSET pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    /// Clamp a requested window to `[1, MAX_PAGE_SIZE]` rows starting at `offset >= 0`
    ///
    /// # Examples
    /// ```
    /// use kinstone_fusion::pagination::{Page, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
    ///
    /// let p = Page::new(None, None);
    /// assert_eq!(p.limit, DEFAULT_PAGE_SIZE);
    /// assert_eq!(p.offset, 0);
    ///
    /// let p = Page::new(Some(10_000), Some(-5));
    /// assert_eq!(p.limit, MAX_PAGE_SIZE);
    /// assert_eq!(p.offset, 0);
    /// ```
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Self {
        Self {
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
            offset: offset.unwrap_or(0).max(0),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// `?limit=&offset=` query parameters
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl From<&PageQuery> for Page {
    fn from(query: &PageQuery) -> Self {
        Page::new(query.limit, query.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let p = Page::default();
        assert_eq!(p.limit, DEFAULT_PAGE_SIZE);
        assert_eq!(p.offset, 0);
    }

    #[test]
    fn test_limit_clamped_low() {
        assert_eq!(Page::new(Some(0), None).limit, 1);
        assert_eq!(Page::new(Some(-3), None).limit, 1);
    }

    #[test]
    fn test_limit_clamped_high() {
        assert_eq!(Page::new(Some(MAX_PAGE_SIZE + 1), None).limit, MAX_PAGE_SIZE);
    }

    #[test]
    fn test_negative_offset() {
        assert_eq!(Page::new(Some(10), Some(-1)).offset, 0);
    }

    #[test]
    fn test_from_query() {
        let query = PageQuery {
            limit: Some(20),
            offset: Some(40),
        };
        assert_eq!(
            Page::from(&query),
            Page {
                limit: 20,
                offset: 40
            }
        );
    }
}
