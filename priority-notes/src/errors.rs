use std::sync::{Arc, OnceLock};

use crate::{ctx::REQ_CTX, error_responses};
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Request,
    },
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use schemars::{
    schema::{Schema, SchemaObject, SubschemaValidation},
    schema_for, schema_for_value, JsonSchema,
};
use serde::Serialize;
use serde_json::Value;

pub use response::{ErrorResponse, ErrorResponseDocs};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("not_found")]
    NotFound(String),

    // auth
    #[error("unauthorized")]
    Unauthorized,
    #[error("invalid_credentials")]
    InvalidCredentials,
    #[error("conflict")]
    Conflict(String),

    // validation
    #[error("validation")]
    Validation(String),
    #[error("validation")]
    JsonValidation(#[from] JsonRejection),
    #[error("validation")]
    PathValidation(#[from] PathRejection),

    #[error(transparent)]
    DB(crate::db::Error),

    #[error(transparent)]
    Session(#[from] tower_sessions::session::Error),

    // other
    #[error(transparent)]
    /// An application-specific error.
    App(Box<dyn std::error::Error + Send + Sync + 'static>),

    #[error("unexpected")]
    Unexpected(String),
}

impl From<crate::db::Error> for Error {
    fn from(error: crate::db::Error) -> Self {
        match error {
            crate::db::Error::NotFound(msg) => Self::NotFound(msg),
            error => Self::DB(error),
        }
    }
}

/// crate::Error <--> tokio_rusqlite::Error
/// ```rust,ignore
/// impl From<tokio_rusqlite::Error> for Error { }
/// impl From<Error> for tokio_rusqlite::Error { }
/// ```
/// Errors returned from inside a `db.call` closure come back unchanged.
pub mod db_mappers {
    use super::*;
    use crate::db::rusqlite;
    use crate::db::tokio_rusqlite;

    impl From<tokio_rusqlite::Error> for Error {
        fn from(error: tokio_rusqlite::Error) -> Self {
            match error {
                tokio_rusqlite::Error::Other(err) => match err.downcast::<Error>() {
                    Ok(error) => *error,
                    Err(err) => Error::DB(tokio_rusqlite::Error::Other(err).into()),
                },
                error => crate::db::Error::from(error).into(),
            }
        }
    }

    impl From<rusqlite::Error> for Error {
        fn from(error: rusqlite::Error) -> Self {
            crate::db::Error::from(error).into()
        }
    }

    impl From<Error> for tokio_rusqlite::Error {
        fn from(error: Error) -> Self {
            tokio_rusqlite::Error::Other(error.into())
        }
    }
}

// Response

error_responses! {
    not_found: 404,
    validation: 400,
    path_validation: 400,
    json_validation: 400,
    unauthorized: 401,
    conflict: 409,
    unexpected: 500
}

impl From<&Error> for ErrorResponse {
    fn from(error: &Error) -> Self {
        let errors = errors();
        match error {
            Error::NotFound(message) => errors.not_found.with_message(message),
            Error::Unauthorized => errors.unauthorized.with_message("Authentication required"),
            Error::InvalidCredentials => errors.unauthorized.with_message("Invalid email or password"),
            Error::Conflict(message) => errors.conflict.with_message(message),
            Error::Validation(message) => errors.validation.with_message(message),
            Error::JsonValidation(error) => errors.json_validation.with_message(error.body_text()),
            Error::PathValidation(error) => errors.path_validation.with_message(error.body_text()),
            _ => errors.unexpected.with_message("Unexpected error"),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let error = Arc::new(self);

        let error_res = ErrorResponse::from(error.as_ref());
        let status = error_res.status;

        let mut res = axum::Json(error_res).into_response();
        res.extensions_mut().insert(error);

        *res.status_mut() = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        res
    }
}

pub async fn on_error(request: Request, next: Next) -> Response {
    let response = next.run(request).await;

    let error = response.extensions().get::<Arc<Error>>().map(Arc::as_ref);
    if let Some(error) = error {
        let user_id = REQ_CTX
            .try_with(|ctx| ctx.user.as_ref().map(|u| u.id))
            .ok()
            .flatten();
        match response.status() {
            status if status.is_server_error() => tracing::error!(?user_id, "{:?}", error),
            _ => tracing::warn!(?user_id, "{:?}", error),
        }
    }

    response
}

mod response {
    use serde_json::Map;

    use super::*;

    #[derive(Debug, Serialize, Clone, Default, JsonSchema)]
    pub struct ErrorResponse {
        pub error: String,
        pub message: Option<String>,
        pub status: u16,
        pub details: Option<Map<String, Value>>,
    }

    impl ErrorResponse {
        pub fn new(error: impl Into<String>, status: u16) -> Self {
            Self {
                error: error.into(),
                status,
                ..Default::default()
            }
        }

        pub fn with_message(&self, message: impl Into<String>) -> Self {
            let mut res = self.clone();
            res.message = Some(message.into());
            res
        }
    }

    pub struct ErrorResponseDocs;

    impl JsonSchema for ErrorResponseDocs {
        fn schema_name() -> String {
            String::from("ErrorResponse")
        }

        fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
            let mut example_schema = schema_for_value!(errors());
            let examples = example_schema.schema.metadata().examples.clone();

            let error_schemas = examples
                .first()
                .and_then(Value::as_object)
                .map(|responses| responses.values().filter_map(error_schema).collect::<Vec<_>>())
                .unwrap_or_default();

            let schema = SchemaObject {
                subschemas: Some(Box::new(SubschemaValidation {
                    one_of: Some(error_schemas),
                    ..Default::default()
                })),
                ..Default::default()
            };

            schema.into()
        }
    }

    /// One `oneOf` branch per registered error kind, with `error` and `status` pinned.
    fn error_schema(example: &Value) -> Option<Schema> {
        let error = example.get("error")?.as_str()?.to_string();
        let status = example.get("status")?.as_u64()?;

        let mut schema = schema_for!(ErrorResponse).schema;
        let obj = schema.object();
        if let Some(Schema::Object(obj)) = obj.properties.get_mut("status") {
            obj.enum_values = Some(vec![Value::from(status)]);
        }
        if let Some(Schema::Object(obj)) = obj.properties.get_mut("error") {
            obj.enum_values = Some(vec![Value::from(error)]);
        }

        Some(Schema::from(schema))
    }

    /// Typed responses with a custom JSON schema
    /// ```rust,ignore
    /// error_responses! {
    ///     not_found: 404,
    ///     unexpected: 500
    /// }
    ///
    /// impl From<&Error> for ErrorResponse {
    ///     fn from(error: &Error) -> Self {
    ///     let errors = errors(); // <- from macro
    ///     match error {
    ///         Error::NotFound(message) => errors.not_found.with_message(message),
    ///         Error::Unexpected(message) => errors.unexpected.with_message(message),
    ///     }
    /// }
    /// ```
    #[macro_export]
    macro_rules! error_responses {
        (
            $($name:ident: $code:expr),* $(,)?
        ) => {
            #[derive(Debug, Clone, Serialize)]
            struct Responses {
                $(
                    $name: ErrorResponse,
                )*
            }

            static ERRORS: OnceLock<Responses> = OnceLock::new();

            fn errors() -> &'static Responses {
                ERRORS.get_or_init(|| Responses {
                    $(
                        $name: ErrorResponse::new(stringify!($name), $code),
                    )*
                })
            }
        };
    }
}
