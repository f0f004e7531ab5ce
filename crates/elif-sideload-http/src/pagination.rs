//! Page number pagination

use elif_sideload::SideloadConfig;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Query parameters for pagination
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq)]
pub struct PageParams {
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

/// Pagination metadata for responses
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PaginationMeta {
    pub current_page: usize,
    pub per_page: usize,
    pub total_items: usize,
    pub total_pages: usize,
    pub has_next: bool,
    pub has_prev: bool,
}

impl PaginationMeta {
    pub fn new(page: usize, per_page: usize, total: usize) -> Self {
        let total_pages = if per_page > 0 {
            total.div_ceil(per_page)
        } else {
            0
        };

        Self {
            current_page: page,
            per_page,
            total_items: total,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }
}

/// Resolved window for one request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pagination {
    pub page: usize,
    pub per_page: usize,
}

impl Pagination {
    /// `None` when the view does not paginate
    pub fn resolve(params: PageParams, config: &SideloadConfig) -> Option<Self> {
        let page_size = config.page_size?;
        let per_page = params
            .per_page
            .unwrap_or(page_size)
            .clamp(1, config.max_page_size.max(1));
        Some(Self {
            page: params.page.unwrap_or(1).max(1),
            per_page,
        })
    }

    /// Rows to skip; saturates for pages past the addressable range
    pub fn offset(&self) -> usize {
        (self.page - 1).saturating_mul(self.per_page)
    }

    pub fn meta(&self, total: usize) -> PaginationMeta {
        PaginationMeta::new(self.page, self.per_page, total)
    }
}

/// Wrap a payload as `{"data": ..., "meta": ...}`
pub fn paginated(data: Value, meta: PaginationMeta) -> Value {
    json!({
        "data": data,
        "meta": meta,
    })
}
