// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use trailsync_remote::{ErrorClass, Failure, Operation};

use crate::storage::StorageError;

/// Errors surfaced by the sync engine.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A remote operation failed but may succeed later.
    #[error("{op} failed, retry later: {message}")]
    Transient {
        /// Operation that failed.
        op: Operation,
        /// Failure description.
        message: String,
    },

    /// The server state differs from what the client assumed.
    #[error("{op} conflicted with the server: {message}")]
    Conflict {
        /// Operation that failed.
        op: Operation,
        /// Failure description.
        message: String,
    },

    /// The entity does not exist locally or remotely.
    #[error("not found: {0}")]
    NotFound(String),

    /// A remote operation failed and must not be retried.
    #[error("{op} failed permanently: {message}")]
    Permanent {
        /// Operation that failed.
        op: Operation,
        /// Failure description.
        message: String,
        /// Offending field, when the server named one.
        field: Option<String>,
    },

    /// The local snapshot could not be read or written.
    #[error("local persistence failed: {0}")]
    LocalPersistenceFailure(String),

    /// More than one remote record carries the same correlating key.
    #[error("{matches} remote records share external id {key}")]
    CorrelationAmbiguous {
        /// The correlating key.
        key: i64,
        /// How many records matched (the query is capped, so this is a lower bound).
        matches: usize,
    },

    /// A remote record could not be mapped onto the activity schema.
    #[error("invalid record {record}: {reason}")]
    Mapping {
        /// Id of the offending record.
        record: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The entity has local changes that must reach the remote first.
    #[error("{0} has unsynced local changes")]
    Unsynced(String),

    /// Blob storage failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SyncError {
    /// Whether the failure may go away on its own.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

impl From<Failure> for SyncError {
    fn from(failure: Failure) -> Self {
        let op = failure.op;
        let message = failure.error.to_string();
        match failure.class {
            ErrorClass::Transient => Self::Transient { op, message },
            ErrorClass::Conflict => Self::Conflict { op, message },
            ErrorClass::NotFound => Self::NotFound(message),
            ErrorClass::Permanent => Self::Permanent {
                op,
                message,
                field: failure.error.field().map(str::to_string),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use trailsync_remote::{ErrorCode, RemoteError};

    use super::*;

    #[test]
    fn failure_converts_by_class() {
        let failure = Failure::new(
            RemoteError::server(ErrorCode::ZoneBusy, "busy"),
            Operation::Save,
        );
        assert!(SyncError::from(failure).is_transient());

        let failure = Failure::new(
            RemoteError::Server {
                code: ErrorCode::InvalidArguments,
                message: "bad value".to_string(),
                field: Some("distanceMeters".to_string()),
            },
            Operation::Save,
        );
        match SyncError::from(failure) {
            SyncError::Permanent { field, .. } => assert_eq!(field.as_deref(), Some("distanceMeters")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
