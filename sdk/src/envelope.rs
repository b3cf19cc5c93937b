//! Transport envelope
//!
//! Every transport-facing result resolves to `{ success, data, error, status }`.

use serde::{Deserialize, Serialize};

use crate::errors::{EngineError, ErrorExt};

/// Message substituted for internal errors outside debug mode
pub const GENERIC_ERROR_MESSAGE: &str = "Internal server error";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: serde_json::Value,
    pub error: Option<String>,
    /// HTTP-style status code
    pub status: u16,
}

impl ApiResponse {
    /// Create a successful response with JSON data
    pub fn ok(data: serde_json::Value) -> Self {
        Self::with_status(200, data)
    }

    /// Create a successful response with an explicit status (e.g. 201)
    pub fn with_status(status: u16, data: serde_json::Value) -> Self {
        Self {
            success: true,
            data,
            error: None,
            status,
        }
    }

    /// Serialize `value` into a successful response
    pub fn from_serializable<T: Serialize>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(data) => Self::ok(data),
            Err(e) => Self::internal(e.to_string(), false),
        }
    }

    /// Create an error response from an engine error.
    ///
    /// Caller errors keep their message. Internal errors are replaced by a
    /// generic message unless `debug` is set.
    pub fn from_error(err: &EngineError, debug: bool) -> Self {
        let status = err.status_code();
        let message = if status >= 500 && !debug {
            // Agent/shutdown errors are operator-facing, keep the hint
            if status == 503 {
                err.user_hint().to_string()
            } else {
                GENERIC_ERROR_MESSAGE.to_string()
            }
        } else {
            err.to_string()
        };
        Self {
            success: false,
            data: serde_json::Value::Null,
            error: Some(message),
            status,
        }
    }

    fn internal(detail: String, debug: bool) -> Self {
        Self {
            success: false,
            data: serde_json::Value::Null,
            error: Some(if debug {
                detail
            } else {
                GENERIC_ERROR_MESSAGE.to_string()
            }),
            status: 500,
        }
    }
}

impl<T: Serialize> From<Result<T, EngineError>> for ApiResponse {
    fn from(result: Result<T, EngineError>) -> Self {
        match result {
            Ok(value) => Self::from_serializable(&value),
            Err(e) => Self::from_error(&e, false),
        }
    }
}
