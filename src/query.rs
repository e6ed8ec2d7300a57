use std::cmp::Ordering;

use anyhow::Result;

use crate::{
    database::{Database, Property, PropertyStatus},
    filter::{Predicate, PropertyFilter, SearchParams},
    pagination::{Page, PageRequest},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum SortKey {
    #[default]
    Newest,
    Oldest,
    PriceLow,
    PriceHigh,
    Popular,
}

impl SortKey {
    /// Unknown or missing keys sort newest first.
    pub(crate) fn parse(raw: Option<&str>) -> Self {
        match raw.map(|raw| raw.trim().to_ascii_lowercase()).as_deref() {
            Some("oldest") => Self::Oldest,
            Some("price_low" | "price-low" | "price_asc") => Self::PriceLow,
            Some("price_high" | "price-high" | "price_desc") => Self::PriceHigh,
            Some("popular" | "views") => Self::Popular,
            _ => Self::Newest,
        }
    }

    /// Orders by the sort key, then by id in the same direction. Ids are
    /// unique, so the order is total and pages never overlap or skip rows.
    fn compare(self, a: &Property, b: &Property) -> Ordering {
        match self {
            SortKey::Newest => b
                .created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id)),
            SortKey::Oldest => a
                .created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id)),
            SortKey::PriceLow => a.price.cmp(&b.price).then_with(|| a.id.cmp(&b.id)),
            SortKey::PriceHigh => b.price.cmp(&a.price).then_with(|| b.id.cmp(&a.id)),
            SortKey::Popular => b.views.cmp(&a.views).then_with(|| b.id.cmp(&a.id)),
        }
    }

    pub(crate) fn sort(self, properties: &mut [Property]) {
        properties.sort_by(|a, b| self.compare(a, b));
    }
}

/// Restrictions imposed by the caller rather than by the searcher: public
/// search only sees available listings, "my properties" only the caller's.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Scope {
    pub(crate) owner: Option<u64>,
    pub(crate) status: Option<PropertyStatus>,
}

impl Scope {
    pub(crate) fn available() -> Self {
        Self {
            owner: None,
            status: Some(PropertyStatus::Available),
        }
    }

    fn predicates(self) -> impl Iterator<Item = Predicate> {
        self.owner
            .map(Predicate::Owner)
            .into_iter()
            .chain(self.status.map(Predicate::Status))
    }
}

#[derive(Clone, Debug, Default)]
pub(crate) struct ListingQuery {
    pub(crate) filter: PropertyFilter,
    pub(crate) scope: Scope,
    pub(crate) sort: SortKey,
    pub(crate) page: PageRequest,
}

impl ListingQuery {
    pub(crate) fn from_params(
        params: &SearchParams,
        scope: Scope,
        default_limit: usize,
        max_limit: usize,
    ) -> Self {
        Self {
            filter: PropertyFilter::normalize(params),
            scope,
            sort: SortKey::parse(params.sort.as_deref()),
            page: PageRequest::parse(
                params.page.as_deref(),
                params.limit.as_deref(),
                default_limit,
                max_limit,
            ),
        }
    }
}

/// Runs a listing query against the store and returns the requested page.
pub(crate) fn execute(db: &Database, query: &ListingQuery) -> Result<Page<Property>> {
    let mut predicates = query.filter.predicates()?;
    predicates.extend(query.scope.predicates());

    let mut matched = Vec::new();
    for property in db.properties() {
        let property = property?;
        if predicates.iter().all(|predicate| predicate.matches(&property)) {
            matched.push(db.with_counters(property)?);
        }
    }
    query.sort.sort(&mut matched);
    Ok(Page::slice(matched, query.page))
}
