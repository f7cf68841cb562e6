/*
 * Responsibility
 * - 認証/認可の失敗種別 (AuthError) と呼び出し側に見える Code の対応
 * - interceptor chain が返す CallError の定義
 * - IntoResponse 実装 (HTTP status / JSON error body)
 */
use std::fmt;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Caller-visible status codes.
///
/// The transport adapter maps these onto its own status space; `Unauthenticated`
/// and `PermissionDenied` are kept apart all the way out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Code {
    InvalidArgument,
    Unauthenticated,
    PermissionDenied,
    NotFound,
    Unimplemented,
    Unavailable,
    Internal,
}

impl Code {
    pub fn as_str(&self) -> &'static str {
        match self {
            Code::InvalidArgument => "invalid_argument",
            Code::Unauthenticated => "unauthenticated",
            Code::PermissionDenied => "permission_denied",
            Code::NotFound => "not_found",
            Code::Unimplemented => "unimplemented",
            Code::Unavailable => "unavailable",
            Code::Internal => "internal",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            Code::InvalidArgument => StatusCode::BAD_REQUEST,
            Code::Unauthenticated => StatusCode::UNAUTHORIZED,
            Code::PermissionDenied => StatusCode::FORBIDDEN,
            Code::NotFound | Code::Unimplemented => StatusCode::NOT_FOUND,
            Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Code::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authentication and authorization failures.
///
/// `Clone` because the exact failure is recorded in the call context and handed
/// back verbatim to every later reader (permission gates, audit logging).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("authentication required")]
    MissingToken,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("missing required permission: {}", display_permission(.unit, .permission))]
    MissingPermission {
        permission: String,
        unit: Option<String>,
    },

    #[error("failed to fetch verification keys: {0}")]
    KeyFetchFailure(String),

    #[error("failed to issue access token: {0}")]
    TokenIssuanceFailure(String),

    #[error("no authentication information in context")]
    NoAuthInContext,
}

fn display_permission(unit: &Option<String>, permission: &str) -> String {
    match unit {
        Some(unit) => format!("{unit}/{permission}"),
        None => permission.to_string(),
    }
}

impl AuthError {
    pub fn invalid_token(reason: impl Into<String>) -> Self {
        Self::InvalidToken(reason.into())
    }

    pub fn missing_permission(permission: impl Into<String>) -> Self {
        Self::MissingPermission {
            permission: permission.into(),
            unit: None,
        }
    }

    pub fn missing_unit_permission(unit: impl Into<String>, permission: impl Into<String>) -> Self {
        Self::MissingPermission {
            permission: permission.into(),
            unit: Some(unit.into()),
        }
    }

    pub fn code(&self) -> Code {
        match self {
            AuthError::MissingToken | AuthError::InvalidToken(_) | AuthError::NoAuthInContext => {
                Code::Unauthenticated
            }
            AuthError::MissingPermission { .. } => Code::PermissionDenied,
            AuthError::KeyFetchFailure(_) | AuthError::TokenIssuanceFailure(_) => {
                Code::Unavailable
            }
        }
    }
}

/// Status produced by a business handler (or the procedure router).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct Status {
    pub code: Code,
    pub message: String,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn unimplemented(procedure: &str) -> Self {
        Self::new(Code::Unimplemented, format!("{procedure} is not implemented"))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Code::Internal, message)
    }
}

/// Everything an interceptor chain can fail with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Handler(#[from] Status),

    /// An authorization gate found no usable authentication. Holds the
    /// recorded cause, e.g. a key outage seen by an optional authentication gate.
    #[error("authentication required: {0}")]
    Unauthenticated(AuthError),
}

impl CallError {
    /// Missing or failed authentication as seen by an authorization gate.
    ///
    /// Token failures pass through unchanged; any other recorded cause is
    /// wrapped so the caller still sees `Unauthenticated`.
    pub fn unauthenticated(cause: AuthError) -> Self {
        match cause.code() {
            Code::Unauthenticated => CallError::Auth(cause),
            _ => CallError::Unauthenticated(cause),
        }
    }

    pub fn code(&self) -> Code {
        match self {
            CallError::Auth(e) => e.code(),
            CallError::Handler(s) => s.code,
            CallError::Unauthenticated(_) => Code::Unauthenticated,
        }
    }

    pub fn auth(&self) -> Option<&AuthError> {
        match self {
            CallError::Auth(e) | CallError::Unauthenticated(e) => Some(e),
            CallError::Handler(_) => None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: Code,
    pub message: String,
}

impl IntoResponse for CallError {
    fn into_response(self) -> Response {
        let code = self.code();
        let body = ErrorBody {
            code,
            message: self.to_string(),
        };

        (code.http_status(), Json(body)).into_response()
    }
}
