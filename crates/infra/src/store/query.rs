//! Pagination and paged results.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Pagination parameters for queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Maximum number of items to return.
    pub limit: u32,
    /// Offset for pagination (0-based).
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

impl Pagination {
    /// Fill in missing values and clamp the limit to `1..=max`.
    pub fn bounded(limit: Option<u32>, offset: Option<u32>, default: u32, max: u32) -> Self {
        Self {
            limit: limit.unwrap_or(default).clamp(1, max.max(1)),
            offset: offset.unwrap_or(0),
        }
    }

    /// Everything up to `limit`, from the start.
    pub fn first(limit: u32) -> Self {
        Self { limit, offset: 0 }
    }
}

/// Paginated query result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    /// The items on this page.
    pub items: Vec<T>,
    /// Total number of items matching the filter (across all pages).
    pub total: u64,
    /// Pagination parameters used.
    pub pagination: Pagination,
    /// Whether there are more items available.
    pub has_more: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_capped_and_never_zero() {
        let bounded = |limit, offset| Pagination::bounded(limit, offset, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE);
        assert_eq!(bounded(Some(5000), None).limit, MAX_PAGE_SIZE);
        assert_eq!(bounded(Some(0), None).limit, 1);
        assert_eq!(bounded(None, Some(7)), Pagination { limit: 50, offset: 7 });
    }

    #[test]
    fn bounded_uses_supplied_defaults() {
        let p = Pagination::bounded(None, None, 20, 100);
        assert_eq!(p.limit, 20);
        assert_eq!(Pagination::bounded(Some(500), None, 20, 100).limit, 100);
    }
}
