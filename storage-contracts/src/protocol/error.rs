// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageErrorKind {
    InvalidInput,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    Conflict,
    Unsupported,
    Busy,
    Timeout,
    Unavailable,
    Internal,
}

impl StorageErrorKind {
    /// Map an API-server status code onto an error kind.
    pub fn from_code(code: u16) -> Self {
        match code {
            400 | 422 => Self::InvalidInput,
            403 | 401 => Self::PermissionDenied,
            404 => Self::NotFound,
            409 => Self::Conflict,
            423 => Self::Busy,
            501 => Self::Unsupported,
            503 => Self::Unavailable,
            504 | 408 => Self::Timeout,
            _ => Self::Internal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind:?}: {message}")]
pub struct StorageError {
    pub kind: StorageErrorKind,
    pub message: String,
}

impl StorageError {
    pub fn new(kind: StorageErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StorageErrorKind::NotFound, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == StorageErrorKind::NotFound
    }

    /// Conflicts, timeouts and busy resources are retried on a short requeue.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            StorageErrorKind::Conflict
                | StorageErrorKind::AlreadyExists
                | StorageErrorKind::Timeout
                | StorageErrorKind::Busy
                | StorageErrorKind::Unavailable
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_serialize_in_snake_case() {
        let kind = serde_json::to_value(StorageErrorKind::AlreadyExists).expect("serialize kind");
        assert_eq!(kind, serde_json::json!("already_exists"));
        let error = StorageError::not_found("PV local-pv-1a2b missing");
        assert_eq!(error.to_string(), "NotFound: PV local-pv-1a2b missing");
    }

    #[test]
    fn classifies_status_codes() {
        assert_eq!(StorageErrorKind::from_code(404), StorageErrorKind::NotFound);
        assert!(StorageError::new(StorageErrorKind::from_code(409), "x").is_transient());
        assert!(!StorageError::new(StorageErrorKind::from_code(403), "x").is_transient());
    }
}
