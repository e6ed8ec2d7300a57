mod account;
mod alert;
mod inquiry;
mod property;
mod review;

use std::{convert::Infallible, future::Future, net::SocketAddr, path::Path, time::Duration};

use anyhow::{Context as _, Result};
use async_graphql_warp::{GraphQLBadRequest, GraphQLResponse};
use serde::{de::DeserializeOwned, ser::SerializeMap, Deserialize, Serialize, Serializer};
use tracing::{error, info, warn};
use warp::{
    filters::body::BodyDeserializeError,
    http::StatusCode,
    reject::{
        InvalidHeader, InvalidQuery, LengthRequired, MethodNotAllowed, PayloadTooLarge,
        UnsupportedMediaType,
    },
    reply::Response,
    Filter, Rejection, Reply,
};

use crate::{
    api::Schema,
    database::Database,
    error::{AppError, AppResult},
    identity::{Identity, Role, USER_ID_HEADER, USER_ROLE_HEADER},
    pagination::{Page, PageBody},
};

const MAX_BODY_BYTES: u64 = 64 * 1024;

/// What every handler needs: the store and the time it may spend on it.
#[derive(Clone)]
pub(crate) struct Ctx {
    db: Database,
    timeout: Duration,
}

impl Ctx {
    pub(crate) fn new(db: Database, timeout: Duration) -> Self {
        Self { db, timeout }
    }

    /// Runs store work on the blocking pool. Work that outlives the request
    /// timeout answers 503; the task itself is left to finish.
    async fn run<T, F>(&self, f: F) -> Result<T, Rejection>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> AppResult<T> + Send + 'static,
    {
        let db = self.db.clone();
        let task = tokio::task::spawn_blocking(move || f(&db));
        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result.map_err(Rejection::from),
            Ok(Err(join_error)) => Err(AppError::Internal(join_error.into()).into()),
            Err(_) => {
                warn!("request timed out after {:?}", self.timeout);
                Err(AppError::Timeout.into())
            }
        }
    }
}

fn with_ctx(ctx: Ctx) -> impl Filter<Extract = (Ctx,), Error = Infallible> + Clone {
    warp::any().map(move || ctx.clone())
}

/// The caller as identified by the gateway. Requests without a user id are
/// rejected with 401.
fn identity() -> impl Filter<Extract = (Identity,), Error = Rejection> + Clone {
    warp::header::optional::<u64>(USER_ID_HEADER)
        .and(warp::header::optional::<String>(USER_ROLE_HEADER))
        .and_then(|user_id: Option<u64>, role: Option<String>| async move {
            let user_id = user_id.ok_or(AppError::Unauthorized)?;
            let role = match role {
                Some(role) => role.parse::<Role>()?,
                None => Role::default(),
            };
            Ok::<_, Rejection>(Identity::new(user_id, role))
        })
}

fn json_body<T>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone
where
    T: DeserializeOwned + Send,
{
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

/// `page` and `limit` for list endpoints, plus an optional `status` filter.
#[derive(Clone, Debug, Default, Deserialize)]
struct ListParams {
    page: Option<String>,
    limit: Option<String>,
    status: Option<String>,
}

/// `{success: true, <key>: value}`.
struct Document<'a, T> {
    key: &'static str,
    value: &'a T,
}

impl<T: Serialize> Serialize for Document<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("success", &true)?;
        map.serialize_entry(self.key, self.value)?;
        map.end()
    }
}

fn document<T: Serialize>(status: StatusCode, key: &'static str, value: &T) -> Response {
    warp::reply::with_status(warp::reply::json(&Document { key, value }), status).into_response()
}

fn page<T: Serialize>(key: &'static str, page: &Page<T>) -> Response {
    warp::reply::json(&PageBody { key, page }).into_response()
}

#[derive(Serialize)]
struct MessageBody<'a> {
    success: bool,
    message: &'a str,
}

fn message(status: StatusCode, success: bool, message: &str) -> Response {
    warp::reply::with_status(warp::reply::json(&MessageBody { success, message }), status)
        .into_response()
}

/// Every route of the service, with errors rendered as
/// `{success: false, message}`.
pub(crate) fn routes(
    ctx: Ctx,
    schema: Schema,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone + Send + Sync + 'static {
    let graphql = warp::path("graphql")
        .and(warp::path::end())
        .and(async_graphql_warp::graphql(schema))
        .and_then(
            |(schema, request): (Schema, async_graphql::Request)| async move {
                Ok::<_, Infallible>(GraphQLResponse::from(schema.execute(request).await))
            },
        )
        .map(Reply::into_response);

    property::routes(ctx.clone())
        .or(review::routes(ctx.clone()))
        .unify()
        .or(inquiry::routes(ctx.clone()))
        .unify()
        .or(alert::routes(ctx.clone()))
        .unify()
        .or(account::routes(ctx))
        .unify()
        .or(graphql)
        .unify()
        .recover(handle_rejection)
        .with(warp::trace::request())
}

/// Renders a rejection as `{success: false, message}`.
///
/// A request that several routes turned down may carry several rejections;
/// errors raised by a matching route win over routing misses.
async fn handle_rejection(rejection: Rejection) -> Result<Response, Infallible> {
    let (status, text) = if let Some(error) = rejection.find::<AppError>() {
        if let AppError::Internal(cause) = error {
            error!("{cause:#}");
        }
        (error.status(), error.public_message())
    } else if let Some(e) = rejection.find::<BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("invalid request body: {e}"))
    } else if let Some(e) = rejection.find::<InvalidQuery>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if let Some(e) = rejection.find::<InvalidHeader>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if let Some(e) = rejection.find::<GraphQLBadRequest>() {
        (StatusCode::BAD_REQUEST, e.0.to_string())
    } else if rejection.find::<LengthRequired>().is_some() {
        (StatusCode::LENGTH_REQUIRED, "content-length required".to_string())
    } else if rejection.find::<PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "request body too large".to_string())
    } else if rejection.find::<UnsupportedMediaType>().is_some() {
        (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "expected a JSON request body".to_string(),
        )
    } else if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, "route not found".to_string())
    } else if rejection.find::<MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "method not allowed".to_string())
    } else {
        error!("unhandled rejection: {rejection:?}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal server error".to_string(),
        )
    };
    Ok(message(status, false, &text))
}

/// Serves every route until `shutdown` resolves. TLS is used when both a
/// certificate and a key are given.
pub(crate) async fn serve(
    ctx: Ctx,
    schema: Schema,
    addr: SocketAddr,
    tls: Option<(&Path, &Path)>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let server = warp::serve(routes(ctx, schema));
    if let Some((cert, key)) = tls {
        let (addr, running) = server
            .tls()
            .cert_path(cert)
            .key_path(key)
            .bind_with_graceful_shutdown(addr, shutdown);
        info!("listening on https://{addr}");
        running.await;
    } else {
        let (addr, running) = server
            .try_bind_with_graceful_shutdown(addr, shutdown)
            .with_context(|| format!("cannot listen on {addr}"))?;
        info!("listening on http://{addr}");
        running.await;
    }
    info!("server stopped");
    Ok(())
}
