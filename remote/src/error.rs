// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Error code reported by the remote store.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCode {
    /// The user account is temporarily unavailable.
    AccountTemporarilyUnavailable,
    /// The request reached the network but failed.
    NetworkFailure,
    /// The network is not reachable.
    NetworkUnavailable,
    /// The service is unavailable.
    ServiceUnavailable,
    /// The zone is busy with other requests.
    ZoneBusy,
    /// The client is being rate limited.
    RequestRateLimited,
    /// The record changed on the server since it was last read.
    ServerRecordChanged,
    /// A record with the same id already exists.
    RecordAlreadyExists,
    /// The record or zone does not exist.
    UnknownItem,
    /// The change token is no longer valid; the client must start over.
    ChangeTokenExpired,
    /// The request was malformed or violated the schema.
    InvalidArguments,
    /// The client is not authenticated.
    NotAuthenticated,
    /// Any other server error.
    #[serde(other)]
    Other,
}

impl ErrorCode {
    /// Wire name of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AccountTemporarilyUnavailable => "accountTemporarilyUnavailable",
            Self::NetworkFailure => "networkFailure",
            Self::NetworkUnavailable => "networkUnavailable",
            Self::ServiceUnavailable => "serviceUnavailable",
            Self::ZoneBusy => "zoneBusy",
            Self::RequestRateLimited => "requestRateLimited",
            Self::ServerRecordChanged => "serverRecordChanged",
            Self::RecordAlreadyExists => "recordAlreadyExists",
            Self::UnknownItem => "unknownItem",
            Self::ChangeTokenExpired => "changeTokenExpired",
            Self::InvalidArguments => "invalidArguments",
            Self::NotAuthenticated => "notAuthenticated",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of remote operation a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Block fetch by query.
    Query,
    /// Incremental change-feed fetch.
    FetchChanges,
    /// Saving a record.
    Save,
    /// Deleting a record.
    Delete,
    /// Fetching a single record.
    Fetch,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Query => "query",
            Self::FetchChanges => "fetch-changes",
            Self::Save => "save",
            Self::Delete => "delete",
            Self::Fetch => "fetch",
        })
    }
}

/// Retry policy class of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// May succeed later; the caller decides when to retry.
    Transient,
    /// The server state differs from what the client assumed.
    Conflict,
    /// The item does not exist. Success for deletes.
    NotFound,
    /// Will never succeed; must not be retried.
    Permanent,
}

/// Classifies an error code for the given operation.
///
/// Anything not explicitly listed is permanent.
#[must_use]
pub const fn classify(code: ErrorCode, op: Operation) -> ErrorClass {
    match code {
        ErrorCode::AccountTemporarilyUnavailable
        | ErrorCode::NetworkFailure
        | ErrorCode::NetworkUnavailable
        | ErrorCode::ServiceUnavailable
        | ErrorCode::ZoneBusy
        | ErrorCode::RequestRateLimited => ErrorClass::Transient,
        ErrorCode::ServerRecordChanged | ErrorCode::RecordAlreadyExists => ErrorClass::Conflict,
        ErrorCode::UnknownItem => match op {
            Operation::Delete | Operation::Fetch => ErrorClass::NotFound,
            _ => ErrorClass::Permanent,
        },
        _ => ErrorClass::Permanent,
    }
}

/// Remote store errors.
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoteError {
    /// The server rejected the request with an error code.
    #[error("{code}: {message}")]
    Server {
        /// Server error code.
        code: ErrorCode,
        /// Human readable message.
        message: String,
        /// The offending field, when the server names one.
        field: Option<String>,
    },

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The server answered with something the driver does not understand.
    #[error("Invalid server response: {0}")]
    InvalidResponse(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The operation did not finish in time.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
}

impl RemoteError {
    /// Creates a server error with the given code.
    #[must_use]
    pub fn server(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Server {
            code,
            message: message.into(),
            field: None,
        }
    }

    /// The error code this error maps to.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Server { code, .. } => *code,
            Self::Http(_) | Self::Timeout(_) => ErrorCode::NetworkFailure,
            Self::InvalidResponse(_) | Self::Config(_) => ErrorCode::Other,
        }
    }

    /// The offending field, if the server reported one.
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Server { field, .. } => field.as_deref(),
            _ => None,
        }
    }

    /// Classifies this error for the given operation.
    #[must_use]
    pub const fn classify(&self, op: Operation) -> ErrorClass {
        classify(self.code(), op)
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else {
            Self::Http(e.to_string())
        }
    }
}

impl From<serde_json::Error> for RemoteError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidResponse(format!("JSON error: {e}"))
    }
}
