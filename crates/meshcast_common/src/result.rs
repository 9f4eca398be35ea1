//! Common result and error types for the meshcast router.

/// The standard result type for fallible internal operations.
///
/// `Err` indicates a broken internal invariant (a bug in meshcast), not a
/// problem with the machine description or the traffic being routed. Input
/// problems are reported through the routing crate's own error enum and the
/// diagnostic sink.
pub type MeshResult<T> = Result<T, InternalError>;

/// An internal error indicating a bug in meshcast, not a user input problem.
///
/// These errors should never occur during normal operation. If one does
/// occur, a routing structure was left in a state its own invariants forbid.
#[derive(Debug, thiserror::Error)]
#[error("internal router error: {message}")]
pub struct InternalError {
    /// Description of the internal error.
    pub message: String,
}

impl InternalError {
    /// Creates a new internal error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for InternalError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_format() {
        let err = InternalError::new("node detached twice");
        assert_eq!(format!("{err}"), "internal router error: node detached twice");
    }

    #[test]
    fn ok_path() {
        let r: MeshResult<i32> = Ok(42);
        assert_eq!(r.ok(), Some(42));
    }

    #[test]
    fn from_string() {
        let err: InternalError = "from string".to_string().into();
        assert_eq!(err.message, "from string");
    }
}
