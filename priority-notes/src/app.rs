use aide::scalar::Scalar;
use axum::{middleware, response::IntoResponse, routing::get, Extension, Json, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_sessions::{
    cookie::{time::Duration, SameSite},
    Expiry, MemoryStore, SessionManagerLayer,
};

use rand::Rng;
use serde_json::json;

use crate::{
    config,
    ctx::with_ctx,
    db::DB,
    errors::{self, on_error, ErrorResponseDocs},
    notes,
    openapi::{
        self,
        aide::axum::{ApiRouter, IntoApiResponse},
        OpenApi,
    },
    state::AppState,
    users,
};

pub struct AppParams<Router>
where
    Router: FnOnce(AppState) -> ApiRouter,
{
    pub db: DB,
    pub router: Router,
}

/// Auth and note routes.
pub fn api_router(state: AppState) -> ApiRouter {
    ApiRouter::new()
        .merge(users::router(state.clone()))
        .merge(notes::router(state))
}

pub async fn create<R>(AppParams { db, router }: AppParams<R>) -> errors::Result<(Router, OpenApi)>
where
    R: FnOnce(AppState) -> ApiRouter,
{
    let config = config();
    let mut api = OpenApi::default();

    let state = AppState { conn: db.clone() };

    let docs_router = axum::Router::new()
        .route(
            "/__docs__",
            get(Scalar::new("/__docs__/spec.json")
                .with_title("Priority Notes API")
                .axum_handler()),
        )
        .route("/__docs__/spec.json", get(serve_docs));

    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(config.secure_cookies)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(Duration::days(config.session_inactivity_days)));

    let app = ApiRouter::new()
        .route("/__version__", get(version))
        .route("/__heartbeat__", get(heartbeat))
        .route("/__lbheartbeat__", get(lbheartbeat))
        .merge(docs_router)
        .merge(router(state))
        .finish_api_with(&mut api, |t| {
            t.title("Priority Notes")
                .default_response::<openapi::Json<ErrorResponseDocs>>()
        })
        .layer(
            ServiceBuilder::new()
                .layer(session_layer)
                .layer(Extension(db))
                .layer(Extension(Arc::new(api.clone())))
                .layer(middleware::from_fn(with_ctx))
                .layer(middleware::from_fn(on_error)),
        );

    Ok((app, api))
}

async fn version() -> impl IntoResponse {
    let config = config();
    Json(json!({
        "source" : config.source,
        "version": config.app_version.as_deref().unwrap_or(&config.version),
        "commit" : config.git_commit,
        "build"  : config.pipeline_id
    }))
}

async fn heartbeat() -> impl IntoResponse {
    let random: u32 = rand::thread_rng().gen_range(0..=10000);

    Json(json!({
        "status" : "ok",
        "random": random,
    }))
}

async fn lbheartbeat() -> impl IntoResponse {
    ""
}

async fn serve_docs(Extension(api): Extension<Arc<OpenApi>>) -> impl IntoApiResponse {
    openapi::Json(api).into_response()
}
