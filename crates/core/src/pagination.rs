use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    #[must_use]
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.max(1),
        }
    }
}

/// Per-statement pagination as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationInfo {
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridPagination {
    pub page: u32,
    pub page_size: u32,
    pub total_rows: u64,
    pub total_pages: u32,
}

impl GridPagination {
    #[must_use]
    pub fn first_page(page_size: u32) -> Self {
        Self {
            page: 1,
            page_size: page_size.max(1),
            total_rows: 0,
            total_pages: 1,
        }
    }

    /// Explicit backend pagination wins; otherwise pages are derived from the row total.
    #[must_use]
    pub fn derive(
        explicit: Option<PaginationInfo>,
        total_rows: Option<u64>,
        row_count: usize,
        requested: PageRequest,
    ) -> Self {
        let total_rows = total_rows.unwrap_or(row_count as u64);
        match explicit {
            Some(info) => Self {
                page: info.page,
                page_size: info.page_size,
                total_rows,
                total_pages: info.total_pages,
            },
            None => Self {
                page: requested.page,
                page_size: requested.page_size,
                total_rows,
                total_pages: total_pages(total_rows, requested.page_size),
            },
        }
    }

    #[must_use]
    pub fn accepts_page_change(&self, current_page: u32, new_page: u32) -> bool {
        new_page >= 1 && new_page <= self.total_pages && new_page != current_page
    }

    #[must_use]
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    #[must_use]
    pub fn has_previous(&self) -> bool {
        self.page > 1
    }
}

#[must_use]
pub fn total_pages(total_rows: u64, page_size: u32) -> u32 {
    if page_size == 0 {
        return 1;
    }
    let pages = total_rows.div_ceil(u64::from(page_size)).max(1);
    u32::try_from(pages).unwrap_or(u32::MAX)
}
