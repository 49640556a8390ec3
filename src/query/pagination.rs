pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 1000;

/// A requested page: 1-based page number and page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    limit: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    /// Pages below 1 clamp to 1; a missing or non-positive size falls back to
    /// the default.
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        let page = page
            .map(|p| p.clamp(1, u32::MAX as i64) as u32)
            .unwrap_or(1);
        let limit = match limit {
            Some(l) if l > 0 => l.min(MAX_PAGE_SIZE as i64) as u32,
            _ => DEFAULT_PAGE_SIZE,
        };
        Self { page, limit }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> PageWindow {
        PageWindow {
            skip: (self.page as u64 - 1) * self.limit as u64,
            limit: Some(self.limit as u64),
        }
    }

    pub fn total_pages(&self, total_count: u64) -> u64 {
        total_count.div_ceil(self.limit as u64)
    }
}

/// The (skip, limit) pair handed to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub skip: u64,
    pub limit: Option<u64>,
}

impl PageWindow {
    pub fn unbounded() -> Self {
        Self {
            skip: 0,
            limit: None,
        }
    }

    pub fn apply<T>(&self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        let iter = items.into_iter().skip(self.skip as usize);
        match self.limit {
            Some(limit) => iter.take(limit as usize).collect(),
            None => iter.collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_pages: u64,
    pub current_page: u32,
    pub total_count: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total_count: u64, request: &PageRequest) -> Self {
        Self {
            items,
            total_pages: request.total_pages(total_count),
            current_page: request.page(),
            total_count,
        }
    }
}
