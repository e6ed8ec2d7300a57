use chrono::Utc;
use serde::Deserialize;
use warp::{filters::BoxedFilter, http::StatusCode, reply::Response, Filter, Rejection};

use super::{document, identity, json_body, message, page, with_ctx, Ctx, ListParams};
use crate::{
    filter::SearchParams,
    identity::Identity,
    listing::{self, PropertyInput},
};

#[derive(Debug, Default, Deserialize)]
struct LimitParams {
    limit: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusInput {
    status: String,
}

fn verified_by_default() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyInput {
    #[serde(default = "verified_by_default")]
    is_verified: bool,
}

#[derive(Debug, Deserialize)]
struct FeatureInput {
    days: i64,
}

/// Search input from the query string. Repeating a key is accepted.
fn search_params() -> impl Filter<Extract = (SearchParams,), Error = Rejection> + Clone {
    warp::query::<Vec<(String, String)>>().map(SearchParams::from_query)
}

pub(super) fn routes(ctx: Ctx) -> BoxedFilter<(Response,)> {
    let search = warp::path!("properties")
        .and(warp::get())
        .and(search_params())
        .and(with_ctx(ctx.clone()))
        .and_then(search);
    let create = warp::path!("properties")
        .and(warp::post())
        .and(identity())
        .and(json_body::<PropertyInput>())
        .and(with_ctx(ctx.clone()))
        .and_then(create);
    let featured = warp::path!("properties" / "featured")
        .and(warp::get())
        .and(warp::query::<LimitParams>())
        .and(with_ctx(ctx.clone()))
        .and_then(featured);
    let mine = warp::path!("properties" / "mine")
        .and(warp::get())
        .and(identity())
        .and(search_params())
        .and(with_ctx(ctx.clone()))
        .and_then(mine);
    let admin_table = warp::path!("admin" / "properties")
        .and(warp::get())
        .and(identity())
        .and(search_params())
        .and(with_ctx(ctx.clone()))
        .and_then(admin_table);
    let detail = warp::path!("properties" / u64)
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and_then(detail);
    let update = warp::path!("properties" / u64)
        .and(warp::put())
        .and(identity())
        .and(json_body::<PropertyInput>())
        .and(with_ctx(ctx.clone()))
        .and_then(update);
    let delete = warp::path!("properties" / u64)
        .and(warp::delete())
        .and(identity())
        .and(with_ctx(ctx.clone()))
        .and_then(delete);
    let status = warp::path!("properties" / u64 / "status")
        .and(warp::patch())
        .and(identity())
        .and(json_body::<StatusInput>())
        .and(with_ctx(ctx.clone()))
        .and_then(change_status);
    let verify = warp::path!("properties" / u64 / "verify")
        .and(warp::patch())
        .and(identity())
        .and(json_body::<VerifyInput>())
        .and(with_ctx(ctx.clone()))
        .and_then(verify);
    let feature = warp::path!("properties" / u64 / "feature")
        .and(warp::post())
        .and(identity())
        .and(json_body::<FeatureInput>())
        .and(with_ctx(ctx.clone()))
        .and_then(feature);
    let favorite = warp::path!("properties" / u64 / "favorite")
        .and(warp::post())
        .and(identity())
        .and(with_ctx(ctx.clone()))
        .and_then(toggle_favorite);
    let favorites = warp::path!("favorites")
        .and(warp::get())
        .and(identity())
        .and(warp::query::<ListParams>())
        .and(with_ctx(ctx))
        .and_then(favorites);

    search
        .or(create)
        .unify()
        .or(featured)
        .unify()
        .or(mine)
        .unify()
        .or(admin_table)
        .unify()
        .or(detail)
        .unify()
        .or(update)
        .unify()
        .or(delete)
        .unify()
        .or(status)
        .unify()
        .or(verify)
        .unify()
        .or(feature)
        .unify()
        .or(favorite)
        .unify()
        .or(favorites)
        .unify()
        .boxed()
}

async fn search(params: SearchParams, ctx: Ctx) -> Result<Response, Rejection> {
    let found = ctx.run(move |db| listing::search(db, &params)).await?;
    Ok(page("properties", &found))
}

async fn create(identity: Identity, input: PropertyInput, ctx: Ctx) -> Result<Response, Rejection> {
    let created = ctx
        .run(move |db| listing::create(db, &identity, input))
        .await?;
    Ok(document(StatusCode::CREATED, "property", &created))
}

async fn featured(params: LimitParams, ctx: Ctx) -> Result<Response, Rejection> {
    let listings = ctx
        .run(move |db| listing::featured(db, params.limit.as_deref(), Utc::now()))
        .await?;
    Ok(document(StatusCode::OK, "properties", &listings))
}

async fn mine(identity: Identity, params: SearchParams, ctx: Ctx) -> Result<Response, Rejection> {
    let found = ctx
        .run(move |db| listing::mine(db, &identity, &params))
        .await?;
    Ok(page("properties", &found))
}

async fn admin_table(
    identity: Identity,
    params: SearchParams,
    ctx: Ctx,
) -> Result<Response, Rejection> {
    let found = ctx
        .run(move |db| listing::admin_table(db, &identity, &params))
        .await?;
    Ok(page("properties", &found))
}

async fn detail(id: u64, ctx: Ctx) -> Result<Response, Rejection> {
    let listing = ctx.run(move |db| listing::detail(db, id)).await?;
    Ok(document(StatusCode::OK, "property", &listing))
}

async fn update(
    id: u64,
    identity: Identity,
    input: PropertyInput,
    ctx: Ctx,
) -> Result<Response, Rejection> {
    let listing = ctx
        .run(move |db| listing::update(db, &identity, id, input))
        .await?;
    Ok(document(StatusCode::OK, "property", &listing))
}

async fn delete(id: u64, identity: Identity, ctx: Ctx) -> Result<Response, Rejection> {
    ctx.run(move |db| listing::delete(db, &identity, id)).await?;
    Ok(message(StatusCode::OK, true, "property deleted"))
}

async fn change_status(
    id: u64,
    identity: Identity,
    input: StatusInput,
    ctx: Ctx,
) -> Result<Response, Rejection> {
    let listing = ctx
        .run(move |db| listing::change_status(db, &identity, id, &input.status))
        .await?;
    Ok(document(StatusCode::OK, "property", &listing))
}

async fn verify(
    id: u64,
    identity: Identity,
    input: VerifyInput,
    ctx: Ctx,
) -> Result<Response, Rejection> {
    let listing = ctx
        .run(move |db| listing::verify(db, &identity, id, input.is_verified))
        .await?;
    Ok(document(StatusCode::OK, "property", &listing))
}

async fn feature(
    id: u64,
    identity: Identity,
    input: FeatureInput,
    ctx: Ctx,
) -> Result<Response, Rejection> {
    let listing = ctx
        .run(move |db| listing::feature(db, &identity, id, input.days, Utc::now()))
        .await?;
    Ok(document(StatusCode::OK, "property", &listing))
}

async fn toggle_favorite(id: u64, identity: Identity, ctx: Ctx) -> Result<Response, Rejection> {
    let favorited = ctx
        .run(move |db| listing::toggle_favorite(db, &identity, id))
        .await?;
    Ok(document(StatusCode::OK, "favorited", &favorited))
}

async fn favorites(
    identity: Identity,
    params: ListParams,
    ctx: Ctx,
) -> Result<Response, Rejection> {
    let found = ctx
        .run(move |db| {
            listing::favorites(db, &identity, params.page.as_deref(), params.limit.as_deref())
        })
        .await?;
    Ok(page("properties", &found))
}
