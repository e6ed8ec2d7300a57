use serde::{Deserialize, Serialize};
use warp::{filters::BoxedFilter, http::StatusCode, reply::Response, Filter, Rejection, Reply};

use super::{document, identity, json_body, message, with_ctx, Ctx, ListParams};
use crate::{
    database::Review,
    identity::Identity,
    pagination::PageBody,
    review::{self, RatingSummary, ReviewInput},
};

#[derive(Debug, Deserialize)]
struct ResponseInput {
    message: String,
}

#[derive(Debug, Deserialize)]
struct StatusInput {
    status: String,
}

/// A page of approved reviews followed by the listing's rating summary.
#[derive(Serialize)]
struct ReviewsBody<'a> {
    #[serde(flatten)]
    page: PageBody<'a, Review>,
    summary: &'a RatingSummary,
}

pub(super) fn routes(ctx: Ctx) -> BoxedFilter<(Response,)> {
    let create = warp::path!("properties" / u64 / "reviews")
        .and(warp::post())
        .and(identity())
        .and(json_body::<ReviewInput>())
        .and(with_ctx(ctx.clone()))
        .and_then(create);
    let list = warp::path!("properties" / u64 / "reviews")
        .and(warp::get())
        .and(warp::query::<ListParams>())
        .and(with_ctx(ctx.clone()))
        .and_then(list);
    let update = warp::path!("reviews" / u64)
        .and(warp::put())
        .and(identity())
        .and(json_body::<ReviewInput>())
        .and(with_ctx(ctx.clone()))
        .and_then(update);
    let delete = warp::path!("reviews" / u64)
        .and(warp::delete())
        .and(identity())
        .and(with_ctx(ctx.clone()))
        .and_then(delete);
    let helpful = warp::path!("reviews" / u64 / "helpful")
        .and(warp::post())
        .and(identity())
        .and(with_ctx(ctx.clone()))
        .and_then(helpful);
    let respond = warp::path!("reviews" / u64 / "response")
        .and(warp::post())
        .and(identity())
        .and(json_body::<ResponseInput>())
        .and(with_ctx(ctx.clone()))
        .and_then(respond);
    let queue = warp::path!("admin" / "reviews")
        .and(warp::get())
        .and(identity())
        .and(warp::query::<ListParams>())
        .and(with_ctx(ctx.clone()))
        .and_then(queue);
    let moderate = warp::path!("admin" / "reviews" / u64)
        .and(warp::patch())
        .and(identity())
        .and(json_body::<StatusInput>())
        .and(with_ctx(ctx))
        .and_then(moderate);

    create
        .or(list)
        .unify()
        .or(update)
        .unify()
        .or(delete)
        .unify()
        .or(helpful)
        .unify()
        .or(respond)
        .unify()
        .or(queue)
        .unify()
        .or(moderate)
        .unify()
        .boxed()
}

async fn create(
    property_id: u64,
    identity: Identity,
    input: ReviewInput,
    ctx: Ctx,
) -> Result<Response, Rejection> {
    let review = ctx
        .run(move |db| review::create(db, &identity, property_id, input))
        .await?;
    Ok(document(StatusCode::CREATED, "review", &review))
}

async fn list(property_id: u64, params: ListParams, ctx: Ctx) -> Result<Response, Rejection> {
    let (page, summary) = ctx
        .run(move |db| {
            review::approved_page(
                db,
                property_id,
                params.page.as_deref(),
                params.limit.as_deref(),
            )
        })
        .await?;
    let body = ReviewsBody {
        page: PageBody {
            key: "reviews",
            page: &page,
        },
        summary: &summary,
    };
    Ok(warp::reply::json(&body).into_response())
}

async fn update(
    id: u64,
    identity: Identity,
    input: ReviewInput,
    ctx: Ctx,
) -> Result<Response, Rejection> {
    let review = ctx
        .run(move |db| review::update(db, &identity, id, input))
        .await?;
    Ok(document(StatusCode::OK, "review", &review))
}

async fn delete(id: u64, identity: Identity, ctx: Ctx) -> Result<Response, Rejection> {
    ctx.run(move |db| review::delete(db, &identity, id)).await?;
    Ok(message(StatusCode::OK, true, "review deleted"))
}

async fn helpful(id: u64, identity: Identity, ctx: Ctx) -> Result<Response, Rejection> {
    let review = ctx
        .run(move |db| review::vote_helpful(db, &identity, id))
        .await?;
    Ok(document(StatusCode::OK, "review", &review))
}

async fn respond(
    id: u64,
    identity: Identity,
    input: ResponseInput,
    ctx: Ctx,
) -> Result<Response, Rejection> {
    let review = ctx
        .run(move |db| review::respond(db, &identity, id, &input.message))
        .await?;
    Ok(document(StatusCode::OK, "review", &review))
}

async fn queue(identity: Identity, params: ListParams, ctx: Ctx) -> Result<Response, Rejection> {
    let page = ctx
        .run(move |db| {
            review::moderation_queue(
                db,
                &identity,
                params.status.as_deref(),
                params.page.as_deref(),
                params.limit.as_deref(),
            )
        })
        .await?;
    Ok(super::page("reviews", &page))
}

async fn moderate(
    id: u64,
    identity: Identity,
    input: StatusInput,
    ctx: Ctx,
) -> Result<Response, Rejection> {
    let review = ctx
        .run(move |db| review::moderate(db, &identity, id, &input.status))
        .await?;
    Ok(document(StatusCode::OK, "review", &review))
}
