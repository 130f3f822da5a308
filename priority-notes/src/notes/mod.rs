pub mod handlers;
mod model;
mod routes;

pub use model::*;

use crate::{openapi::aide::axum::ApiRouter, state::AppState};

pub fn router(state: AppState) -> ApiRouter {
    ApiRouter::new().merge(routes::router(state))
}
