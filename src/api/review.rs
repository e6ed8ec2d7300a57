use async_graphql::{Context, Object, Result, SimpleObject};

use crate::{
    database::{Database, Review},
    error::AppError,
    pagination::{PageRequest, INBOX_PAGE_SIZE, MAX_PAGE_SIZE},
    review::{self, RatingSummary},
};

/// One page of approved reviews and the summary over all of them.
#[derive(SimpleObject)]
struct ReviewPage {
    count: usize,
    total: usize,
    page: usize,
    pages: usize,
    items: Vec<Review>,
    summary: RatingSummary,
}

#[derive(Default)]
pub(super) struct ReviewQuery;

#[Object]
impl ReviewQuery {
    /// Approved reviews of a listing, newest first.
    #[allow(clippy::unused_async)]
    async fn property_reviews(
        &self,
        ctx: &Context<'_>,
        property_id: u64,
        page: Option<usize>,
        limit: Option<usize>,
    ) -> Result<ReviewPage> {
        let db = ctx.data::<Database>()?;
        let request = PageRequest {
            page: page.filter(|page| *page > 0).unwrap_or(1),
            limit: limit
                .filter(|limit| *limit > 0)
                .unwrap_or(INBOX_PAGE_SIZE)
                .min(MAX_PAGE_SIZE),
        };
        let (page, summary) = review::approved(db, property_id, request).map_err(|e| {
            if let AppError::Internal(cause) = &e {
                return super::database_error(cause);
            }
            e.public_message().into()
        })?;
        Ok(ReviewPage {
            count: page.count,
            total: page.total,
            page: page.page,
            pages: page.pages,
            items: page.items,
            summary,
        })
    }
}
