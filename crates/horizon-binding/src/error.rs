//! Error types for currency management.

/// Result type alias for binding operations.
pub type BindingResult<T> = std::result::Result<T, BindingError>;

/// Errors surfaced synchronously by binding operations.
///
/// None of these are retried or swallowed internally. An operation that
/// fails leaves the manager in the state it had before the call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindingError {
    /// A position outside `[0, count)` was requested on a non-empty list.
    #[error("position {position} is out of range for a list of {count} rows")]
    OutOfRange { position: isize, count: usize },

    /// A relation path segment cannot be navigated as a list.
    #[error("cannot bind to '{path}': segment '{segment}' {reason}")]
    InvalidRelation {
        path: String,
        segment: String,
        reason: String,
    },

    /// A path segment matches more than one member.
    #[error("binding to '{path}' is ambiguous: '{segment}' matches {}", .candidates.join(", "))]
    AmbiguousBinding {
        path: String,
        segment: String,
        candidates: Vec<String>,
    },

    /// The relation path is syntactically malformed.
    #[error("malformed binding path '{path}'")]
    InvalidPath { path: String },

    /// The bound list lacks a capability the operation requires.
    #[error("the bound list does not support {operation}")]
    NotSupported { operation: &'static str },

    /// The current row was read while the position is -1.
    #[error("there is no current row: the position is -1")]
    UninitializedAccess,

    /// A second add-new was started while one is pending (strict policy only).
    #[error("an add-new transaction is already pending at row {edit_index}")]
    EditInProgress { edit_index: usize },
}

impl BindingError {
    /// Create an out-of-range error.
    pub fn out_of_range(position: isize, count: usize) -> Self {
        Self::OutOfRange { position, count }
    }

    /// Create an invalid-relation error.
    pub fn invalid_relation(
        path: impl Into<String>,
        segment: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidRelation {
            path: path.into(),
            segment: segment.into(),
            reason: reason.into(),
        }
    }

    /// Create an ambiguous-binding error.
    pub fn ambiguous(
        path: impl Into<String>,
        segment: impl Into<String>,
        candidates: Vec<String>,
    ) -> Self {
        Self::AmbiguousBinding {
            path: path.into(),
            segment: segment.into(),
            candidates,
        }
    }

    /// Create a not-supported error.
    pub fn not_supported(operation: &'static str) -> Self {
        Self::NotSupported { operation }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = BindingError::out_of_range(12, 10);
        assert_eq!(
            err.to_string(),
            "position 12 is out of range for a list of 10 rows"
        );

        let err = BindingError::ambiguous(
            "Orders.items",
            "items",
            vec!["Items".to_string(), "items".to_string()],
        );
        assert!(err.to_string().contains("Items, items"));

        let err = BindingError::not_supported("add-new");
        assert_eq!(err.to_string(), "the bound list does not support add-new");
    }
}
