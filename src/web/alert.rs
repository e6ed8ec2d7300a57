use warp::{filters::BoxedFilter, http::StatusCode, reply::Response, Filter, Rejection};

use super::{document, identity, json_body, message, with_ctx, Ctx};
use crate::{
    alert::{self, AlertInput},
    identity::Identity,
};

pub(super) fn routes(ctx: Ctx) -> BoxedFilter<(Response,)> {
    let create = warp::path!("alerts")
        .and(warp::post())
        .and(identity())
        .and(json_body::<AlertInput>())
        .and(with_ctx(ctx.clone()))
        .and_then(create);
    let list = warp::path!("alerts")
        .and(warp::get())
        .and(identity())
        .and(with_ctx(ctx.clone()))
        .and_then(list);
    let get = warp::path!("alerts" / u64)
        .and(warp::get())
        .and(identity())
        .and(with_ctx(ctx.clone()))
        .and_then(get);
    let update = warp::path!("alerts" / u64)
        .and(warp::put())
        .and(identity())
        .and(json_body::<AlertInput>())
        .and(with_ctx(ctx.clone()))
        .and_then(update);
    let delete = warp::path!("alerts" / u64)
        .and(warp::delete())
        .and(identity())
        .and(with_ctx(ctx.clone()))
        .and_then(delete);
    let toggle = warp::path!("alerts" / u64 / "toggle")
        .and(warp::patch())
        .and(identity())
        .and(with_ctx(ctx.clone()))
        .and_then(toggle);
    let matches = warp::path!("alerts" / u64 / "matches")
        .and(warp::get())
        .and(identity())
        .and(with_ctx(ctx))
        .and_then(matches);

    create
        .or(list)
        .unify()
        .or(get)
        .unify()
        .or(update)
        .unify()
        .or(delete)
        .unify()
        .or(toggle)
        .unify()
        .or(matches)
        .unify()
        .boxed()
}

async fn create(identity: Identity, input: AlertInput, ctx: Ctx) -> Result<Response, Rejection> {
    let alert = ctx
        .run(move |db| alert::create(db, &identity, input))
        .await?;
    Ok(document(StatusCode::CREATED, "alert", &alert))
}

async fn list(identity: Identity, ctx: Ctx) -> Result<Response, Rejection> {
    let alerts = ctx.run(move |db| alert::list(db, &identity)).await?;
    Ok(document(StatusCode::OK, "alerts", &alerts))
}

async fn get(id: u64, identity: Identity, ctx: Ctx) -> Result<Response, Rejection> {
    let alert = ctx.run(move |db| alert::get(db, &identity, id)).await?;
    Ok(document(StatusCode::OK, "alert", &alert))
}

async fn update(
    id: u64,
    identity: Identity,
    input: AlertInput,
    ctx: Ctx,
) -> Result<Response, Rejection> {
    let alert = ctx
        .run(move |db| alert::update(db, &identity, id, input))
        .await?;
    Ok(document(StatusCode::OK, "alert", &alert))
}

async fn delete(id: u64, identity: Identity, ctx: Ctx) -> Result<Response, Rejection> {
    ctx.run(move |db| alert::delete(db, &identity, id)).await?;
    Ok(message(StatusCode::OK, true, "alert deleted"))
}

async fn toggle(id: u64, identity: Identity, ctx: Ctx) -> Result<Response, Rejection> {
    let alert = ctx.run(move |db| alert::toggle(db, &identity, id)).await?;
    Ok(document(StatusCode::OK, "alert", &alert))
}

async fn matches(id: u64, identity: Identity, ctx: Ctx) -> Result<Response, Rejection> {
    let listings = ctx
        .run(move |db| alert::matches(db, &identity, id))
        .await?;
    Ok(document(StatusCode::OK, "properties", &listings))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use warp::http::StatusCode;

    use crate::{
        database::property::fixtures::{insert_on, property},
        web::test_support::{anonymous, as_user, TestServer},
    };

    #[tokio::test]
    async fn alert_matches_what_search_returns() {
        let server = TestServer::new();
        let cheap = insert_on(&server.db, property(1, "Mumbai", 8_000_000, 2), 1);
        insert_on(&server.db, property(1, "Mumbai", 30_000_000, 2), 2);
        let newer = insert_on(&server.db, property(2, "Navi Mumbai", 9_000_000, 2), 3);
        insert_on(&server.db, property(2, "Thane", 9_000_000, 2), 4);

        let (status, body) = server
            .send(as_user("POST", "/alerts", 5, "buyer").json(&json!({
                "name": "Mumbai under 1 crore",
                "criteria": {"city": "mumbai", "maxPrice": 10000000, "bedrooms": "2"},
                "frequency": "weekly",
            })))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["alert"]["isActive"], true);
        assert_eq!(body["alert"]["frequency"], "weekly");
        let id = body["alert"]["id"].as_u64().unwrap();

        let (status, body) = server
            .send(as_user("GET", &format!("/alerts/{id}/matches"), 5, "buyer"))
            .await;
        assert_eq!(status, StatusCode::OK);
        let ids: Vec<_> = body["properties"]
            .as_array()
            .unwrap()
            .iter()
            .map(|listing| listing["id"].as_u64().unwrap())
            .collect();
        assert_eq!(ids, vec![newer.id, cheap.id]);

        let (_, body) = server
            .send(anonymous(
                "GET",
                "/properties?city=mumbai&maxPrice=10000000&bedrooms=2",
            ))
            .await;
        assert_eq!(body["properties"][0]["id"], newer.id);
        assert_eq!(body["properties"][1]["id"], cheap.id);
        assert_eq!(body["total"], 2);
    }

    #[tokio::test]
    async fn criteria_must_constrain_something() {
        let server = TestServer::new();
        let refused = [
            json!({}),
            json!({"minPrice": "abc", "sort": "popular"}),
            json!("mumbai"),
        ];
        for criteria in refused {
            let (status, body) = server
                .send(as_user("POST", "/alerts", 5, "buyer").json(&json!({"criteria": criteria})))
                .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["success"], false);
        }
        let (_, body) = server.send(as_user("GET", "/alerts", 5, "buyer")).await;
        assert_eq!(body, json!({"success": true, "alerts": []}));
    }

    #[tokio::test]
    async fn alerts_are_private() {
        let server = TestServer::new();
        let (_, body) = server
            .send(
                as_user("POST", "/alerts", 5, "buyer")
                    .json(&json!({"criteria": {"city": "Pune"}})),
            )
            .await;
        assert_eq!(body["alert"]["name"], "Property alert");
        let path = format!("/alerts/{}", body["alert"]["id"]);

        for request in [
            as_user("GET", &path, 6, "buyer"),
            as_user("DELETE", &path, 6, "buyer"),
            as_user("PATCH", &format!("{path}/toggle"), 6, "buyer"),
            as_user("GET", &format!("{path}/matches"), 6, "buyer"),
        ] {
            let (status, body) = server.send(request).await;
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert_eq!(body["message"], "alert not found");
        }

        let (_, body) = server
            .send(as_user("PATCH", &format!("{path}/toggle"), 5, "buyer"))
            .await;
        assert_eq!(body["alert"]["isActive"], false);
        let (_, body) = server
            .send(as_user("PUT", &path, 5, "buyer").json(&json!({"name": "Pune flats"})))
            .await;
        assert_eq!(body["alert"]["name"], "Pune flats");
        assert_eq!(body["alert"]["isActive"], false);

        let (status, _) = server.send(as_user("DELETE", &path, 5, "buyer")).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = server.send(as_user("GET", &path, 5, "buyer")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
