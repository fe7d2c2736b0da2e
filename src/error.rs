//! Coordinator error types

use mongodb::error::{ErrorKind, WriteFailure};
use std::fmt;

/// Errors surfaced by the migration coordination core
///
/// Lock contention and duplicate changelog inserts are deliberately NOT
/// errors: contention is a plain `false` from acquire, and a duplicate key on
/// the changelog is translated into "already applied" by the store.
#[derive(Debug)]
pub enum CoordinatorError {
    /// Invalid configuration (bad collection names, missing database name).
    /// Fatal, surfaced before any lock or index operation is attempted.
    Configuration(String),
    /// Underlying driver error
    Database(mongodb::error::Error),
    /// Index drop/create failed on the changelog collection. Fatal at
    /// startup: without the reconciled index the idempotency guarantee
    /// cannot be upheld.
    Index {
        name: String,
        source: mongodb::error::Error,
    },
}

impl fmt::Display for CoordinatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinatorError::Configuration(msg) => {
                write!(f, "Configuration error: {}", msg)
            }
            CoordinatorError::Database(e) => {
                write!(f, "MongoDB error: {}", e)
            }
            CoordinatorError::Index { name, source } => {
                write!(
                    f,
                    "Index operation failed on changelog index '{}': {}",
                    name, source
                )
            }
        }
    }
}

impl std::error::Error for CoordinatorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CoordinatorError::Configuration(_) => None,
            CoordinatorError::Database(e) => Some(e),
            CoordinatorError::Index { source, .. } => Some(source),
        }
    }
}

impl From<mongodb::error::Error> for CoordinatorError {
    fn from(error: mongodb::error::Error) -> Self {
        CoordinatorError::Database(error)
    }
}

/// Check whether a driver error is a duplicate-key rejection from a unique
/// index (server codes 11000/11001).
///
/// The changelog store relies on this to translate a rejected re-insert of
/// an already-executed changeset into a silent no-op.
pub(crate) fn is_duplicate_key(error: &mongodb::error::Error) -> bool {
    match error.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => {
            write_error.code == 11000 || write_error.code == 11001
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use mongodb::error::WriteError;

    fn write_error_with_code(code: i32) -> mongodb::error::Error {
        // WriteError is non-exhaustive, so build it the way the driver
        // does: from a server error document
        let write_error: WriteError = bson::from_document(doc! {
            "code": code,
            "errmsg": "write rejected",
        })
        .unwrap();
        mongodb::error::Error::from(ErrorKind::Write(WriteFailure::WriteError(write_error)))
    }

    #[test]
    fn test_duplicate_key_codes_are_classified() {
        assert!(is_duplicate_key(&write_error_with_code(11000)));
        assert!(is_duplicate_key(&write_error_with_code(11001)));
    }

    #[test]
    fn test_other_write_errors_are_not_duplicate_keys() {
        // 121: document validation failure
        assert!(!is_duplicate_key(&write_error_with_code(121)));
        assert!(!is_duplicate_key(&write_error_with_code(0)));
    }

    #[test]
    fn test_configuration_error_display() {
        let err = CoordinatorError::Configuration("lock collection name is empty".to_string());
        assert_eq!(
            format!("{}", err),
            "Configuration error: lock collection name is empty"
        );
    }

    #[test]
    fn test_configuration_error_has_no_source() {
        use std::error::Error;
        let err = CoordinatorError::Configuration("bad".to_string());
        assert!(err.source().is_none());
    }
}
