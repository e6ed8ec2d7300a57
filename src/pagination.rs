//! The page shape shared by every list endpoint.

use serde::{ser::SerializeMap, Serialize, Serializer};

/// Page size of the public search.
pub(crate) const SEARCH_PAGE_SIZE: usize = 12;
/// Default page size of the admin listing table.
pub(crate) const ADMIN_PAGE_SIZE: usize = 20;
/// Default page size of inquiry inboxes and review lists.
pub(crate) const INBOX_PAGE_SIZE: usize = 10;
/// No caller may ask for more than this many items per page.
pub(crate) const MAX_PAGE_SIZE: usize = 100;

/// A requested page: 1-based number and page size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct PageRequest {
    pub(crate) page: usize,
    pub(crate) limit: usize,
}

impl PageRequest {
    /// Reads `page` and `limit` from raw input. Missing, unparsable or zero
    /// values fall back to page 1 and `default_limit`; a limit above
    /// `max_limit` is clamped.
    pub(crate) fn parse(
        page: Option<&str>,
        limit: Option<&str>,
        default_limit: usize,
        max_limit: usize,
    ) -> Self {
        let positive = |raw: Option<&str>| {
            raw.and_then(|raw| raw.trim().parse::<usize>().ok())
                .filter(|n| *n > 0)
        };
        Self {
            page: positive(page).unwrap_or(1),
            limit: positive(limit)
                .unwrap_or(default_limit)
                .min(max_limit)
                .max(1),
        }
    }

    pub(crate) fn first(limit: usize) -> Self {
        Self { page: 1, limit }
    }

    fn offset(self) -> usize {
        (self.page - 1).saturating_mul(self.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        PageRequest::first(SEARCH_PAGE_SIZE)
    }
}

/// One page of results.
///
/// `pages` is `ceil(total / limit)`. A page past the last one is empty
/// rather than an error.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Page<T> {
    /// Number of items on this page.
    pub(crate) count: usize,
    /// Number of items on all pages.
    pub(crate) total: usize,
    pub(crate) page: usize,
    pub(crate) pages: usize,
    pub(crate) items: Vec<T>,
}

impl<T> Page<T> {
    /// Cuts the requested page out of the full, already ordered result.
    pub(crate) fn slice(all: Vec<T>, request: PageRequest) -> Self {
        let total = all.len();
        let items: Vec<T> = all
            .into_iter()
            .skip(request.offset())
            .take(request.limit)
            .collect();
        Self {
            count: items.len(),
            total,
            page: request.page,
            pages: total.div_ceil(request.limit),
            items,
        }
    }

    pub(crate) fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<Page<U>, E> {
        let items = self.items.into_iter().map(f).collect::<Result<Vec<_>, E>>()?;
        Ok(Page {
            count: self.count,
            total: self.total,
            page: self.page,
            pages: self.pages,
            items,
        })
    }
}

/// The JSON body of a list response:
/// `{success, count, total, page, pages, <key>: [...]}`.
pub(crate) struct PageBody<'a, T> {
    pub(crate) key: &'static str,
    pub(crate) page: &'a Page<T>,
}

impl<T: Serialize> Serialize for PageBody<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(6))?;
        map.serialize_entry("success", &true)?;
        map.serialize_entry("count", &self.page.count)?;
        map.serialize_entry("total", &self.page.total)?;
        map.serialize_entry("page", &self.page.page)?;
        map.serialize_entry("pages", &self.page.pages)?;
        map.serialize_entry(self.key, &self.page.items)?;
        map.end()
    }
}
