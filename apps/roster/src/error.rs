use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

/// Structured error body returned to API clients.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
}

/// What went wrong, independent of how it is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The entity is absent.
    NotFound,
    /// Creating something that is already there.
    AlreadyExists,
    /// Adding a user to a filter they already belong to.
    AlreadyMember,
    /// A bad key or value supplied by a caller.
    InvalidInput,
    /// The caller lacks the permission the operation requires.
    Forbidden,
    /// Network or database hiccup; retrying later may succeed.
    Transient,
    /// Programming or configuration error.
    Fatal,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::AlreadyExists => "ALREADY_EXISTS",
            ErrorKind::AlreadyMember => "ALREADY_MEMBER",
            ErrorKind::InvalidInput => "BAD_REQUEST",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::Transient => "UNAVAILABLE",
            ErrorKind::Fatal => "INTERNAL_ERROR",
        }
    }

    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::AlreadyExists | ErrorKind::AlreadyMember => StatusCode::CONFLICT,
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Fatal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Application-level error shared by the stores, the sync loops and the API.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyExists, message)
    }

    pub fn already_member(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyMember, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    /// `AlreadyExists` and `AlreadyMember` are no-ops from a caller's view.
    pub fn is_noop(&self) -> bool {
        matches!(self.kind, ErrorKind::AlreadyExists | ErrorKind::AlreadyMember)
    }

    pub fn is_transient(&self) -> bool {
        self.kind == ErrorKind::Transient
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        if matches!(self.kind, ErrorKind::Transient | ErrorKind::Fatal) {
            tracing::error!(kind = ?self.kind, message = %self.message, "request failed");
        }
        let body = ApiErrorBody {
            error: ApiErrorDetail {
                code: self.kind.code().to_string(),
                message: self.message,
            },
        };
        (self.kind.status(), Json(body)).into_response()
    }
}

impl From<diesel::result::Error> for Error {
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error as DieselError};

        match err {
            DieselError::NotFound => Self::not_found("Record not found"),
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                Self::already_exists(info.message().to_string())
            }
            DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info) => {
                Self::not_found(info.message().to_string())
            }
            err => {
                tracing::error!(?err, "database error");
                Self::transient("A database error occurred")
            }
        }
    }
}

impl From<diesel_async::pooled_connection::deadpool::PoolError> for Error {
    fn from(err: diesel_async::pooled_connection::deadpool::PoolError) -> Self {
        tracing::error!(?err, "pool error");
        Self::transient("Database pool unavailable")
    }
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        tracing::error!(?err, "redis error");
        Self::transient("Queue backend unavailable")
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        tracing::warn!(?err, "http request failed");
        Self::transient("Upstream service unavailable")
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::invalid_input(format!("malformed payload: {err}"))
    }
}
