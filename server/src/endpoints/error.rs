// SPDX-FileCopyrightText: 2025 Keyfold Developers <hello@keyfold.dev>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::fmt::{Display, Formatter};

use actix_web::error::{InternalError, JsonPayloadError, QueryPayloadError};
use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, ResponseError};

use kfbackend::auth::AuthError;
use kfbackend::errors::StorageError;
use kfbackend::sync::errors::{DeleteError, ManifestError, PullError, PushError};
use kfbackend::sync::records::InvalidRecord;
use kftypes::errors::{ErrorBody, ErrorCode};

/// Error surfaced to API callers: a taxonomy code plus a short detail,
/// rendered as the JSON error body with the matching status code. Storage
/// internals are logged, never leaked.
#[derive(Debug, Clone)]
pub struct ApiError {
    code: ErrorCode,
    detail: String,
}

impl ApiError {
    pub(crate) fn new(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }

    pub(crate) fn unauthenticated() -> Self {
        Self::new(
            ErrorCode::Unauthenticated,
            "missing or invalid bearer credential",
        )
    }

    pub(crate) fn invalid_request(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, detail)
    }

    fn storage(error: StorageError) -> Self {
        tracing::error!(%error, "storage failure");
        Self::new(ErrorCode::StorageUnavailable, "durable store unavailable")
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.detail)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self.code {
            ErrorCode::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorCode::InvalidRequest | ErrorCode::InvalidReference => StatusCode::BAD_REQUEST,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::StorageUnavailable | ErrorCode::Canceled => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.code,
            detail: self.detail.clone(),
        })
    }
}

impl From<AuthError> for ApiError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::Unauthenticated => Self::unauthenticated(),
            AuthError::Storage(error) => Self::storage(error),
        }
    }
}

impl From<ManifestError> for ApiError {
    fn from(error: ManifestError) -> Self {
        match error {
            ManifestError::Storage(error) => Self::storage(error),
        }
    }
}

impl From<PullError> for ApiError {
    fn from(error: PullError) -> Self {
        match error {
            PullError::Storage(error) => Self::storage(error),
        }
    }
}

impl From<PushError> for ApiError {
    fn from(error: PushError) -> Self {
        match error {
            PushError::InvalidReference(item_uuid) => Self::new(
                ErrorCode::InvalidReference,
                format!("unknown parent key reference: {item_uuid}"),
            ),
            PushError::Conflict(item_uuid) => Self::new(
                ErrorCode::Conflict,
                format!("conflicting write for item {item_uuid}"),
            ),
            PushError::Storage(error) => Self::storage(error),
        }
    }
}

impl From<DeleteError> for ApiError {
    fn from(error: DeleteError) -> Self {
        match error {
            DeleteError::Storage(error) => Self::storage(error),
        }
    }
}

impl From<InvalidRecord> for ApiError {
    fn from(error: InvalidRecord) -> Self {
        Self::invalid_request(error.to_string())
    }
}

/// Rewrites actix's default JSON extractor failure into the taxonomy body.
pub(crate) fn json_error_handler(error: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = ApiError::invalid_request(error.to_string()).error_response();
    InternalError::from_response(error, response).into()
}

/// Same for query-string extraction (e.g. an invalid `zone` parameter).
pub(crate) fn query_error_handler(
    error: QueryPayloadError,
    _req: &HttpRequest,
) -> actix_web::Error {
    let response = ApiError::invalid_request(error.to_string()).error_response();
    InternalError::from_response(error, response).into()
}
