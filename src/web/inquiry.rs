use chrono::Utc;
use serde::Deserialize;
use warp::{filters::BoxedFilter, http::StatusCode, reply::Response, Filter, Rejection};

use super::{document, identity, json_body, message, page, with_ctx, Ctx, ListParams};
use crate::{
    identity::Identity,
    inquiry::{self, InquiryInput, Mailbox},
};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ReplyInput {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusInput {
    status: String,
}

pub(super) fn routes(ctx: Ctx) -> BoxedFilter<(Response,)> {
    let create = warp::path!("inquiries")
        .and(warp::post())
        .and(identity())
        .and(json_body::<InquiryInput>())
        .and(with_ctx(ctx.clone()))
        .and_then(create);
    let sent = warp::path!("inquiries" / "sent")
        .and(warp::get())
        .and(identity())
        .and(warp::query::<ListParams>())
        .and(with_ctx(ctx.clone()))
        .and_then(|identity: Identity, params: ListParams, ctx: Ctx| {
            mailbox(Mailbox::Sent, identity, params, ctx)
        });
    let received = warp::path!("inquiries" / "received")
        .and(warp::get())
        .and(identity())
        .and(warp::query::<ListParams>())
        .and(with_ctx(ctx.clone()))
        .and_then(|identity: Identity, params: ListParams, ctx: Ctx| {
            mailbox(Mailbox::Received, identity, params, ctx)
        });
    let open = warp::path!("inquiries" / u64)
        .and(warp::get())
        .and(identity())
        .and(with_ctx(ctx.clone()))
        .and_then(open);
    let reply = warp::path!("inquiries" / u64 / "responses")
        .and(warp::post())
        .and(identity())
        .and(json_body::<ReplyInput>())
        .and(with_ctx(ctx.clone()))
        .and_then(reply);
    let status = warp::path!("inquiries" / u64 / "status")
        .and(warp::patch())
        .and(identity())
        .and(json_body::<StatusInput>())
        .and(with_ctx(ctx.clone()))
        .and_then(change_status);
    let delete = warp::path!("inquiries" / u64)
        .and(warp::delete())
        .and(identity())
        .and(with_ctx(ctx))
        .and_then(delete);

    create
        .or(sent)
        .unify()
        .or(received)
        .unify()
        .or(open)
        .unify()
        .or(reply)
        .unify()
        .or(status)
        .unify()
        .or(delete)
        .unify()
        .boxed()
}

async fn create(identity: Identity, input: InquiryInput, ctx: Ctx) -> Result<Response, Rejection> {
    let today = Utc::now().date_naive();
    let inquiry = ctx
        .run(move |db| inquiry::create(db, &identity, input, today))
        .await?;
    Ok(document(StatusCode::CREATED, "inquiry", &inquiry))
}

async fn mailbox(
    mailbox: Mailbox,
    identity: Identity,
    params: ListParams,
    ctx: Ctx,
) -> Result<Response, Rejection> {
    let found = ctx
        .run(move |db| {
            inquiry::mailbox(
                db,
                &identity,
                mailbox,
                params.status.as_deref(),
                params.page.as_deref(),
                params.limit.as_deref(),
            )
        })
        .await?;
    Ok(page("inquiries", &found))
}

async fn open(id: u64, identity: Identity, ctx: Ctx) -> Result<Response, Rejection> {
    let inquiry = ctx.run(move |db| inquiry::open(db, &identity, id)).await?;
    Ok(document(StatusCode::OK, "inquiry", &inquiry))
}

async fn reply(
    id: u64,
    identity: Identity,
    input: ReplyInput,
    ctx: Ctx,
) -> Result<Response, Rejection> {
    let inquiry = ctx
        .run(move |db| inquiry::reply(db, &identity, id, input.message.as_deref()))
        .await?;
    Ok(document(StatusCode::OK, "inquiry", &inquiry))
}

async fn change_status(
    id: u64,
    identity: Identity,
    input: StatusInput,
    ctx: Ctx,
) -> Result<Response, Rejection> {
    let inquiry = ctx
        .run(move |db| inquiry::change_status(db, &identity, id, &input.status))
        .await?;
    Ok(document(StatusCode::OK, "inquiry", &inquiry))
}

async fn delete(id: u64, identity: Identity, ctx: Ctx) -> Result<Response, Rejection> {
    ctx.run(move |db| inquiry::delete(db, &identity, id)).await?;
    Ok(message(StatusCode::OK, true, "inquiry deleted"))
}
