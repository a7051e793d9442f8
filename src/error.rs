//! HTTP-facing errors.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::users::StoreError;

pub const EXPIRED_CODE: &str = "EXPIRED_CODE";
pub const INVALID_CODE: &str = "INVALID_CODE";

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("Email already registered")]
    EmailTaken,

    #[error("User not found")]
    UserNotFound,

    #[error("Invalid verification code")]
    InvalidCode,

    #[error("Verification code expired. Please request a new code.")]
    ExpiredCode,

    /// Same message for unknown accounts and wrong passwords.
    #[error("Incorrect username or password")]
    InvalidCredentials,

    #[error("Could not validate credentials")]
    Unauthorized,

    #[error("Email address has not been verified")]
    NotVerified,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidCode | Self::ExpiredCode => StatusCode::BAD_REQUEST,
            Self::EmailTaken => StatusCode::CONFLICT,
            Self::UserNotFound => StatusCode::NOT_FOUND,
            Self::InvalidCredentials | Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotVerified => StatusCode::FORBIDDEN,
            Self::Store(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable marker so clients can tell the code failures apart.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::ExpiredCode => Some(EXPIRED_CODE),
            Self::InvalidCode => Some(INVALID_CODE),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match &self {
            Self::Store(err) => {
                error!(error = %err, "store request failed");
                "Internal server error".to_owned()
            }
            Self::Internal(err) => {
                error!(error = ?err, "server returned 500 status");
                "Internal server error".to_owned()
            }
            other => other.to_string(),
        };

        let mut response = (
            status,
            Json(ErrorBody {
                detail,
                code: self.code(),
            }),
        )
            .into_response();

        let headers = response.headers_mut();
        if matches!(self, Self::ExpiredCode) {
            headers.insert("x-error-code", HeaderValue::from_static(EXPIRED_CODE));
        }
        if status == StatusCode::UNAUTHORIZED {
            headers.insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
