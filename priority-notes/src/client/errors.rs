pub type Result<T> = core::result::Result<T, Error>;

/// Failures surfaced by the note engine. None of them leaves the engine in a
/// broken state; the caller may retry any operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    ValidationFailed(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Authentication required")]
    AuthenticationRequired,
    #[error("Store failure: {0}")]
    Store(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl From<crate::Error> for Error {
    fn from(error: crate::Error) -> Self {
        match error {
            crate::Error::NotFound(message) => Error::NotFound(message),
            crate::Error::Unauthorized | crate::Error::InvalidCredentials => Error::AuthenticationRequired,
            crate::Error::Validation(message) => Error::ValidationFailed(message),
            error => Error::Store(error.to_string()),
        }
    }
}
