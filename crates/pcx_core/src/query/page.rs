//! Paging types.

use crate::error::{CoreError, CoreResult};
use pcx_storage::{Sort, Window};

/// Requested window of a paged query.
///
/// Records `[offset, offset + limit)` are returned, after the optional sort.
/// Ties in the sort are broken by ascending key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    offset: u64,
    limit: u64,
    sort: Option<Sort>,
}

impl PageRequest {
    /// Window of `limit` records starting at `offset`.
    #[must_use]
    pub const fn new(offset: u64, limit: u64) -> Self {
        Self {
            offset,
            limit,
            sort: None,
        }
    }

    /// Zero-based page `page` of `size` records.
    #[must_use]
    pub const fn of(page: u64, size: u64) -> Self {
        Self::new(page.saturating_mul(size), size)
    }

    /// First page of `size` records.
    #[must_use]
    pub const fn first(size: u64) -> Self {
        Self::new(0, size)
    }

    /// Sets the sort.
    #[must_use]
    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    /// The request for the following page.
    #[must_use]
    pub fn next(&self) -> Self {
        Self {
            offset: self.offset.saturating_add(self.limit),
            limit: self.limit,
            sort: self.sort.clone(),
        }
    }

    /// Records skipped.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    /// Maximum records returned.
    #[must_use]
    pub const fn limit(&self) -> u64 {
        self.limit
    }

    /// Requested sort.
    #[must_use]
    pub fn sort(&self) -> Option<&Sort> {
        self.sort.as_ref()
    }

    /// Zero-based page number; a request between page boundaries reports
    /// the page containing its first record.
    #[must_use]
    pub const fn page_number(&self) -> u64 {
        if self.limit == 0 {
            0
        } else {
            self.offset / self.limit
        }
    }

    pub(crate) fn validate(&self, max_page_size: u64) -> CoreResult<()> {
        if self.limit == 0 {
            return Err(CoreError::invalid_operation("page size must be positive"));
        }
        if self.limit > max_page_size {
            return Err(CoreError::invalid_operation(format!(
                "page size {} exceeds maximum {max_page_size}",
                self.limit
            )));
        }
        Ok(())
    }

    pub(crate) fn window(&self) -> Window {
        Window::new(self.offset, self.limit).sorted(self.sort.clone())
    }
}

/// One page of results together with the total number of matches.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    content: Vec<T>,
    offset: u64,
    limit: u64,
    total: u64,
}

impl<T> Page<T> {
    pub(crate) fn new(content: Vec<T>, request: &PageRequest, total: u64) -> Self {
        Self {
            content,
            offset: request.offset,
            limit: request.limit,
            total,
        }
    }

    /// Records on this page.
    #[must_use]
    pub fn content(&self) -> &[T] {
        &self.content
    }

    /// Consumes the page, returning its records.
    #[must_use]
    pub fn into_content(self) -> Vec<T> {
        self.content
    }

    /// Number of records on this page.
    #[must_use]
    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// Returns `true` if this page holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Total matching records across all pages.
    #[must_use]
    pub const fn total_elements(&self) -> u64 {
        self.total
    }

    /// Requested page size.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.limit
    }

    /// Records skipped before this page.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    /// Zero-based page number.
    #[must_use]
    pub const fn number(&self) -> u64 {
        if self.limit == 0 {
            0
        } else {
            self.offset / self.limit
        }
    }

    /// `ceil(total / size)`.
    #[must_use]
    pub const fn total_pages(&self) -> u64 {
        if self.limit == 0 {
            0
        } else {
            self.total.div_ceil(self.limit)
        }
    }

    /// Returns `true` if records exist past this page.
    #[must_use]
    pub const fn has_next(&self) -> bool {
        self.offset.saturating_add(self.limit) < self.total
    }

    /// Returns `true` if records exist before this page.
    #[must_use]
    pub const fn has_previous(&self) -> bool {
        self.offset > 0
    }

    /// Returns `true` for the first page.
    #[must_use]
    pub const fn is_first(&self) -> bool {
        !self.has_previous()
    }

    /// Returns `true` for the last page.
    #[must_use]
    pub const fn is_last(&self) -> bool {
        !self.has_next()
    }

    /// Converts the records, keeping the paging information.
    #[must_use]
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            offset: self.offset,
            limit: self.limit,
            total: self.total,
        }
    }

    /// Converts the records with a fallible function.
    ///
    /// # Errors
    ///
    /// Returns the first error `f` returns.
    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<Page<U>, E> {
        Ok(Page {
            content: self.content.into_iter().map(f).collect::<Result<_, E>>()?,
            offset: self.offset,
            limit: self.limit,
            total: self.total,
        })
    }
}

impl<T> IntoIterator for Page<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.content.into_iter()
    }
}

/// One page of results without a total.
///
/// Cheaper than [`Page`]: whether more records follow is found by reading
/// one record past the page.
#[derive(Debug, Clone, PartialEq)]
pub struct Slice<T> {
    content: Vec<T>,
    offset: u64,
    limit: u64,
    has_next: bool,
}

impl<T> Slice<T> {
    pub(crate) fn new(content: Vec<T>, request: &PageRequest, has_next: bool) -> Self {
        Self {
            content,
            offset: request.offset,
            limit: request.limit,
            has_next,
        }
    }

    /// Records in this slice.
    #[must_use]
    pub fn content(&self) -> &[T] {
        &self.content
    }

    /// Consumes the slice, returning its records.
    #[must_use]
    pub fn into_content(self) -> Vec<T> {
        self.content
    }

    /// Zero-based page number.
    #[must_use]
    pub const fn number(&self) -> u64 {
        if self.limit == 0 {
            0
        } else {
            self.offset / self.limit
        }
    }

    /// Returns `true` if records exist past this slice.
    #[must_use]
    pub const fn has_next(&self) -> bool {
        self.has_next
    }

    /// Returns `true` if records exist before this slice.
    #[must_use]
    pub const fn has_previous(&self) -> bool {
        self.offset > 0
    }

    /// Converts the records, keeping the paging information.
    #[must_use]
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Slice<U> {
        Slice {
            content: self.content.into_iter().map(f).collect(),
            offset: self.offset,
            limit: self.limit,
            has_next: self.has_next,
        }
    }
}
