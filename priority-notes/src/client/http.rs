use reqwest::{RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};

use crate::{
    notes::{self, CreateNote, Note, UpdateNote},
    shared::MessageResponse,
    users::{Credentials, RegisterUser, UserProfile},
};

use super::{Error, NoteStore, Result};

/// Note store reached over HTTP. The session cookie set by `login` is kept in
/// the client's cookie jar and sent with every later request.
#[derive(Clone, Debug)]
pub struct HttpNoteStore {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl HttpNoteStore {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder().cookie_store(true).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub async fn register(&self, user: &RegisterUser) -> Result<UserProfile> {
        send(self.client.post(self.url("/auth/register")).json(user)).await
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<UserProfile> {
        send(self.client.post(self.url("/auth/login")).json(credentials)).await
    }

    pub async fn logout(&self) -> Result<()> {
        send::<MessageResponse>(self.client.post(self.url("/auth/logout"))).await?;
        Ok(())
    }
}

impl NoteStore for HttpNoteStore {
    async fn list(&self) -> Result<Vec<Note>> {
        send(self.client.get(self.url("/notes"))).await
    }

    async fn create(&self, note: CreateNote) -> Result<Note> {
        send(self.client.post(self.url("/notes")).json(&note)).await
    }

    async fn update(&self, id: notes::NoteId, patch: UpdateNote) -> Result<Note> {
        send(self.client.patch(self.url(&format!("/notes/{id}"))).json(&patch)).await
    }

    async fn delete(&self, id: notes::NoteId) -> Result<()> {
        send::<MessageResponse>(self.client.delete(self.url(&format!("/notes/{id}")))).await?;
        Ok(())
    }
}

async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
    let response = request.send().await?;
    let status = response.status();

    if status.is_success() {
        return Ok(response.json().await?);
    }

    let message = match response.json::<ErrorBody>().await {
        Ok(body) => body.message,
        Err(_) => status.to_string(),
    };
    tracing::debug!(%status, message = %message, "note store request failed");

    Err(error_for_status(status, message))
}

fn error_for_status(status: StatusCode, message: String) -> Error {
    match status {
        StatusCode::BAD_REQUEST => Error::ValidationFailed(message),
        StatusCode::UNAUTHORIZED => Error::AuthenticationRequired,
        StatusCode::NOT_FOUND => Error::NotFound(message),
        status => Error::Store(format!("{status}: {message}")),
    }
}
