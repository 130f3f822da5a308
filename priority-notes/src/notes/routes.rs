use crate::{
    ctx::BaseParams,
    openapi::{
        aide::{
            axum::{routing::get, ApiRouter, IntoApiResponse},
            NoApi,
        },
        Json, Path,
    },
    shared::MessageResponse,
    state::AppState,
};
use axum::http::StatusCode;
use schemars::JsonSchema;
use serde::Deserialize;

use super::{handlers, CreateNote, Note, NoteId, UpdateNote};

#[derive(Debug, Deserialize, JsonSchema)]
struct NoteIdPath {
    note_id: NoteId,
}

pub fn router(state: AppState) -> ApiRouter {
    ApiRouter::new()
        .api_route(
            "/notes",
            get(find_notes).post_with(create_note, |t| t.response::<201, Json<Note>>()),
        )
        .api_route(
            "/notes/{note_id}",
            get(get_note).patch(update_note).delete(delete_note),
        )
        .with_state(state)
}

async fn find_notes(NoApi(base): NoApi<BaseParams>) -> impl IntoApiResponse {
    handlers::find_notes(base).await.map(Json)
}

async fn create_note(NoApi(base): NoApi<BaseParams>, Json(args): Json<CreateNote>) -> impl IntoApiResponse {
    handlers::create_note(args, base)
        .await
        .map(|note| (StatusCode::CREATED, Json(note)))
}

async fn get_note(
    Path(NoteIdPath { note_id }): Path<NoteIdPath>,
    NoApi(base): NoApi<BaseParams>,
) -> impl IntoApiResponse {
    handlers::get_note(note_id, base).await.map(Json)
}

async fn update_note(
    Path(NoteIdPath { note_id }): Path<NoteIdPath>,
    NoApi(base): NoApi<BaseParams>,
    Json(args): Json<UpdateNote>,
) -> impl IntoApiResponse {
    handlers::update_note(note_id, args, base).await.map(Json)
}

async fn delete_note(
    Path(NoteIdPath { note_id }): Path<NoteIdPath>,
    NoApi(base): NoApi<BaseParams>,
) -> impl IntoApiResponse {
    handlers::delete_note(note_id, base)
        .await
        .map(|_| Json(MessageResponse::new("Note deleted")))
}
