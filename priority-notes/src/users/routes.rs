use crate::{
    ctx::{BaseParams, USER_SESSION_KEY},
    openapi::{
        aide::{
            axum::{
                routing::{get, post, post_with},
                ApiRouter,
            },
            NoApi,
        },
        Json,
    },
    shared::MessageResponse,
    state::AppState,
    Result,
};
use axum::http::StatusCode;
use tower_sessions::Session;

use super::{auth, Credentials, RegisterUser, UserProfile};

pub fn router(state: AppState) -> ApiRouter {
    ApiRouter::new()
        .api_route(
            "/auth/register",
            post_with(register, |t| t.response::<201, Json<UserProfile>>()),
        )
        .api_route("/auth/login", post(login))
        .api_route("/auth/logout", post(logout))
        .api_route("/auth/me", get(me))
        .with_state(state)
}

async fn register(
    NoApi(base): NoApi<BaseParams>,
    Json(args): Json<RegisterUser>,
) -> Result<(StatusCode, Json<UserProfile>)> {
    let user = auth::register(base.db, args).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

async fn login(
    NoApi(session): NoApi<Session>,
    NoApi(base): NoApi<BaseParams>,
    Json(credentials): Json<Credentials>,
) -> Result<Json<UserProfile>> {
    let user = auth::authenticate(base.db, credentials).await?;

    session.cycle_id().await?;
    session
        .insert(USER_SESSION_KEY, crate::ctx::User::from(&user))
        .await?;

    tracing::info!("{} logged in", user.email);

    Ok(Json(user.into()))
}

async fn logout(NoApi(session): NoApi<Session>) -> Result<Json<MessageResponse>> {
    session.flush().await?;
    Ok(Json(MessageResponse::new("Signed out")))
}

async fn me(NoApi(base): NoApi<BaseParams>) -> Result<Json<UserProfile>> {
    let user_id = base.ctx.require_user_id()?;
    let user = auth::find_one_by_id(base.db, user_id).await?;
    Ok(Json(user.into()))
}

#[cfg(test)]
mod tests {
    use crate::{
        db::{init_test_db, DB},
        errors::Result,
        users::UserProfile,
    };
    use axum_test::TestServer;
    use serde_json::json;

    #[tokio::test]
    async fn register_login_me_logout() -> Result<()> {
        let db = init_test_db().await?;
        let server = test_server(db).await?;

        let response = server
            .post("/auth/register")
            .json(&json!({ "email": "me@mail.com", "password": "correct horse", "name": "Me" }))
            .await;
        assert_eq!(response.status_code(), 201);
        assert_eq!(response.json::<UserProfile>().email, "me@mail.com");

        let response = server.get("/auth/me").expect_failure().await;
        assert_eq!(response.status_code(), 401);

        let response = server
            .post("/auth/login")
            .json(&json!({ "email": "me@mail.com", "password": "correct horse" }))
            .await;
        assert_eq!(response.status_code(), 200);

        let response = server.get("/auth/me").await;
        assert_eq!(response.json::<UserProfile>().name.as_deref(), Some("Me"));

        server.post("/auth/logout").await;

        let response = server.get("/auth/me").expect_failure().await;
        assert_eq!(response.status_code(), 401);
        Ok(())
    }

    #[tokio::test]
    async fn login_with_wrong_password() -> Result<()> {
        let db = init_test_db().await?;
        let server = test_server(db).await?;

        server
            .post("/auth/register")
            .json(&json!({ "email": "me@mail.com", "password": "correct horse" }))
            .await;

        let response = server
            .post("/auth/login")
            .json(&json!({ "email": "me@mail.com", "password": "wrong horse" }))
            .expect_failure()
            .await;
        assert_eq!(response.status_code(), 401);
        assert_eq!(response.json::<serde_json::Value>()["error"], "unauthorized");
        Ok(())
    }

    #[tokio::test]
    async fn register_twice_conflicts() -> Result<()> {
        let db = init_test_db().await?;
        let server = test_server(db).await?;

        let body = json!({ "email": "me@mail.com", "password": "correct horse" });
        server.post("/auth/register").json(&body).await;

        let response = server.post("/auth/register").json(&body).expect_failure().await;
        assert_eq!(response.status_code(), 409);
        Ok(())
    }

    async fn test_server(db: DB) -> Result<TestServer> {
        crate::tests::test_server(db, super::router).await
    }
}
