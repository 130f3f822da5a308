use axum::{
    extract::{Extension, FromRequestParts, Request},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::{users::UserId, Error, DB};

/// Session key holding the signed-in [`User`].
pub const USER_SESSION_KEY: &str = "user";

#[derive(Clone, Debug, FromRequestParts)]
pub struct BaseParams {
    pub ctx: Ctx,
    #[from_request(via(Extension))]
    pub db: DB,
}

impl BaseParams {
    pub fn new(db: DB, ctx: Ctx) -> Self {
        Self { db, ctx }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct User {
    pub id: UserId,
    pub email: String,
}

/// Request-scoped identity. Every note store operation receives one explicitly.
#[derive(Clone, Debug)]
pub struct Ctx {
    pub user: Option<User>,
}

impl Ctx {
    pub fn new(user: Option<User>) -> Self {
        Self { user }
    }

    pub fn get_user_id(&self) -> Option<UserId> {
        self.user.as_ref().map(|u| u.id)
    }

    /// The signed-in user's id, or `Unauthorized`.
    pub fn require_user_id(&self) -> crate::Result<UserId> {
        self.get_user_id().ok_or(Error::Unauthorized)
    }
}

impl<S> FromRequestParts<S> for Ctx
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|(_, message)| Error::Unexpected(message.into()))?;

        let user = session.get::<User>(USER_SESSION_KEY).await?;

        Ok(Self { user })
    }
}

#[derive(Clone)]
pub struct ReqCtx {
    pub user: Option<User>,
}

tokio::task_local! {
    pub static REQ_CTX: ReqCtx;
}

pub async fn with_ctx(ctx: Ctx, request: Request, next: Next) -> crate::Result<Response> {
    Ok(REQ_CTX.scope(ReqCtx { user: ctx.user }, next.run(request)).await)
}
