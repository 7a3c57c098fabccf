use std::num::NonZeroUsize;

use derive_setters::Setters;
use tracing::trace;

use crate::domain::{DEFAULT_PAGE_SIZE, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Setters)]
#[setters(prefix = "with_")]
pub struct PagerConfig {
    pub page_size: NonZeroUsize,
    /// Jump back to the first page whenever a new record set is loaded.
    pub reset_on_load: bool,
}

impl Default for PagerConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            reset_on_load: false,
        }
    }
}

/// Client side pagination over a fully loaded record set.
///
/// The record set is kept untouched once loaded, the visible slice is derived
/// from it on every call. Pages are 1-based.
#[derive(Debug)]
pub struct Pager<T = Record> {
    data: Vec<T>,
    current_page: usize,
    page_size: NonZeroUsize,
    reset_on_load: bool,
}

impl<T> Pager<T> {
    pub fn new(config: PagerConfig) -> Self {
        Self {
            data: Vec::new(),
            current_page: 1,
            page_size: config.page_size,
            reset_on_load: config.reset_on_load,
        }
    }

    /// Replace the whole record set.
    ///
    /// The current page is kept unless `reset_on_load` is set. A page that no
    /// longer exists is clamped to the new last page. An empty set keeps the
    /// page as it is.
    pub fn load(&mut self, records: Vec<T>) {
        self.data = records;
        if self.reset_on_load {
            self.current_page = 1;
        }
        let total = self.total_pages();
        if total >= 1 && self.current_page > total {
            self.current_page = total;
        }
        trace!(
            "Pager loaded {} records, page {}/{}",
            self.data.len(),
            self.current_page,
            total
        );
    }

    pub fn visible_slice(&self) -> &[T] {
        let size = self.page_size.get();
        let start = (self.current_page - 1).saturating_mul(size);
        if start >= self.data.len() {
            return &[];
        }
        let end = std::cmp::min(start.saturating_add(size), self.data.len());
        &self.data[start..end]
    }

    /// Returns true if the page changed.
    pub fn next_page(&mut self) -> bool {
        if self.current_page < self.total_pages() {
            self.current_page += 1;
            true
        } else {
            false
        }
    }

    /// Returns true if the page changed.
    pub fn prev_page(&mut self) -> bool {
        if self.current_page > 1 {
            self.current_page -= 1;
            true
        } else {
            false
        }
    }

    pub fn total_pages(&self) -> usize {
        self.data.len().div_ceil(self.page_size.get())
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn page_size(&self) -> usize {
        self.page_size.get()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn records(&self) -> &[T] {
        &self.data
    }
}
