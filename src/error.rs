use axum::extract::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::fmt::Debug;

/// Codes below 100 are internal failures and are never shown to clients.
/// Codes from 100 up are caller-facing and keep their message.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message} (code {code})")]
pub struct Error {
    pub code: i32,
    pub message: String,
}

pub const VALIDATION: i32 = 100;
pub const UNAUTHORIZED: i32 = 101;
pub const FORBIDDEN: i32 = 102;
pub const NOT_FOUND: i32 = 103;
pub const CONFLICT: i32 = 104;

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::database_error(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::reqwest_error(err)
    }
}

impl From<oso::OsoError> for Error {
    fn from(err: oso::OsoError) -> Self {
        Error::authorizor_error(err)
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match self.code {
            1..=99 => "Internal Server Error",
            _ => self.message.as_str(),
        };

        let body = Json(json!({
            "code": self.code,
            "error": message,
        }));

        (status, body).into_response()
    }
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self.code {
            VALIDATION => StatusCode::BAD_REQUEST,
            UNAUTHORIZED => StatusCode::UNAUTHORIZED,
            FORBIDDEN => StatusCode::FORBIDDEN,
            NOT_FOUND => StatusCode::NOT_FOUND,
            CONFLICT => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self {
            code: VALIDATION,
            message: message.into(),
        }
    }

    pub fn unauthorized_error() -> Self {
        Self {
            code: UNAUTHORIZED,
            message: "unauthorized".into(),
        }
    }

    pub fn forbidden_error(message: impl Into<String>) -> Self {
        Self {
            code: FORBIDDEN,
            message: message.into(),
        }
    }

    pub fn not_found_error(message: impl Into<String>) -> Self {
        Self {
            code: NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn conflict_error(message: impl Into<String>) -> Self {
        Self {
            code: CONFLICT,
            message: message.into(),
        }
    }

    pub fn is_validation_error(&self) -> bool {
        self.code == VALIDATION
    }

    pub fn is_unauthorized_error(&self) -> bool {
        self.code == UNAUTHORIZED
    }

    pub fn is_forbidden_error(&self) -> bool {
        self.code == FORBIDDEN
    }

    pub fn is_not_found_error(&self) -> bool {
        self.code == NOT_FOUND
    }

    pub fn is_conflict_error(&self) -> bool {
        self.code == CONFLICT
    }

    pub fn database_error<T: Debug>(err: T) -> Self {
        tracing::error!("database error: {:?}", err);
        Self {
            code: 2,
            message: "database error".into(),
        }
    }

    pub fn reqwest_error(err: reqwest::Error) -> Self {
        tracing::error!("reqwest error: {:?}", err);
        Self {
            code: 3,
            message: "reqwest error".into(),
        }
    }

    pub fn upstream_error() -> Self {
        Self {
            code: 4,
            message: "upstream error".into(),
        }
    }

    pub fn config_error(message: impl Into<String>) -> Self {
        Self {
            code: 5,
            message: message.into(),
        }
    }

    pub fn authorizor_error(err: oso::OsoError) -> Self {
        tracing::error!("authorizor error: {:?}", err);
        Self {
            code: 6,
            message: "authorizor error".into(),
        }
    }

    pub fn server_error<T: Debug>(err: T) -> Self {
        tracing::error!("server error: {:?}", err);
        Self {
            code: 7,
            message: "server error".into(),
        }
    }
}

#[test]
fn caller_facing_errors_map_to_client_statuses() {
    assert_eq!(
        Error::validation_error("bad").status_code(),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        Error::unauthorized_error().status_code(),
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        Error::forbidden_error("nope").status_code(),
        StatusCode::FORBIDDEN
    );
    assert_eq!(
        Error::not_found_error("gone").status_code(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        Error::conflict_error("bid is no longer available").status_code(),
        StatusCode::CONFLICT
    );
}

#[test]
fn internal_errors_hide_their_message() {
    let response = Error::database_error("connection refused").into_response();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let response = Error::conflict_error("request cannot be cancelled").into_response();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}
