use async_graphql::{ComplexObject, Context, Object, Result, SimpleObject};
use chrono::Utc;

use super::database_error;
use crate::{
    database::{Database, Property},
    filter::SearchParams,
    listing::{self, OwnerInfo},
    pagination::{Page, MAX_PAGE_SIZE, SEARCH_PAGE_SIZE},
    query::{self, ListingQuery, Scope},
};

/// One page of search results.
#[derive(SimpleObject)]
struct PropertyPage {
    /// The number of listings on this page.
    count: usize,
    /// The number of listings on all pages.
    total: usize,
    page: usize,
    pages: usize,
    items: Vec<Property>,
}

impl From<Page<Property>> for PropertyPage {
    fn from(page: Page<Property>) -> Self {
        Self {
            count: page.count,
            total: page.total,
            page: page.page,
            pages: page.pages,
            items: page.items,
        }
    }
}

#[ComplexObject]
impl Property {
    /// The listing owner. Contact details are present only if the owner
    /// published a profile.
    #[allow(clippy::unused_async)]
    async fn owner(&self, ctx: &Context<'_>) -> Result<OwnerInfo> {
        let db = ctx.data::<Database>()?;
        OwnerInfo::load(db, self.owner_id).map_err(database_error)
    }
}

#[derive(Default)]
pub(super) struct PropertyQuery;

#[Object]
impl PropertyQuery {
    /// Searches available listings. The filter takes the same raw values as
    /// the REST query string and is normalized the same way.
    #[allow(clippy::unused_async)]
    async fn properties(
        &self,
        ctx: &Context<'_>,
        #[graphql(default)] filter: SearchParams,
    ) -> Result<PropertyPage> {
        let db = ctx.data::<Database>()?;
        let query =
            ListingQuery::from_params(&filter, Scope::available(), SEARCH_PAGE_SIZE, MAX_PAGE_SIZE);
        let page = query::execute(db, &query).map_err(database_error)?;
        Ok(page.into())
    }

    /// Listings with a running promotion, newest first.
    #[allow(clippy::unused_async)]
    async fn featured_properties(
        &self,
        ctx: &Context<'_>,
        limit: Option<usize>,
    ) -> Result<Vec<Property>> {
        let db = ctx.data::<Database>()?;
        let limit = limit.map(|limit| limit.to_string());
        listing::featured_properties(db, limit.as_deref(), Utc::now()).map_err(database_error)
    }

    /// Looks up one listing. Unlike the REST detail view this does not count
    /// as a view.
    #[allow(clippy::unused_async)]
    async fn property(&self, ctx: &Context<'_>, id: u64) -> Result<Option<Property>> {
        let db = ctx.data::<Database>()?;
        db.property(id).map_err(database_error)
    }
}
