// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, warn};

use crate::keys::KeyError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }
}

impl From<KeyError> for ApiError {
    fn from(err: KeyError) -> Self {
        let status = match &err {
            KeyError::Validation(_) => StatusCode::BAD_REQUEST,
            KeyError::NotFound(_) => StatusCode::NOT_FOUND,
            KeyError::Storage(_) | KeyError::Parse(_) => StatusCode::BAD_GATEWAY,
            KeyError::Crypto(_) => StatusCode::INTERNAL_SERVER_ERROR,
            KeyError::TimedOut { .. } => StatusCode::GATEWAY_TIMEOUT,
            KeyError::Cancelled(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        if status.is_server_error() {
            error!(error = %err, "Key operation failed");
        } else {
            warn!(error = %err, "Key operation rejected");
        }
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}
