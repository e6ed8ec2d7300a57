use chrono::Utc;
use warp::{filters::BoxedFilter, http::StatusCode, reply::Response, Filter, Rejection};

use super::{document, identity, json_body, with_ctx, Ctx};
use crate::{
    dashboard,
    identity::Identity,
    profile::{self, ProfileInput},
};

pub(super) fn routes(ctx: Ctx) -> BoxedFilter<(Response,)> {
    let profile = warp::path!("users" / "me")
        .and(warp::put())
        .and(identity())
        .and(json_body::<ProfileInput>())
        .and(with_ctx(ctx.clone()))
        .and_then(update_profile);
    let dashboard = warp::path!("dashboard")
        .and(warp::get())
        .and(identity())
        .and(with_ctx(ctx))
        .and_then(dashboard);

    profile.or(dashboard).unify().boxed()
}

async fn update_profile(
    identity: Identity,
    input: ProfileInput,
    ctx: Ctx,
) -> Result<Response, Rejection> {
    let profile = ctx
        .run(move |db| profile::update_profile(db, &identity, input))
        .await?;
    Ok(document(StatusCode::OK, "user", &profile))
}

async fn dashboard(identity: Identity, ctx: Ctx) -> Result<Response, Rejection> {
    let summary = ctx
        .run(move |db| dashboard::dashboard(db, &identity, Utc::now()))
        .await?;
    Ok(document(StatusCode::OK, "dashboard", &summary))
}
